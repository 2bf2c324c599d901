//! Stage 2: per-team match histories.
//!
//! A bounded worker pool walks the roster, pulls each team's past-match
//! JSON from the upstream API, resolves opponents through the tiered
//! matcher and materializes canonical gold rows. Per-team faults are
//! isolated: they go to the division error log and only abort the run when
//! the failed fraction crosses the configured threshold.

use std::collections::VecDeque;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Context};
use chrono::{NaiveDate, Utc};
use rand::Rng;
use scraper::{Html, Selector};
use serde::Serialize;
use serde_json::Value;

use crate::config::ScrapeConfig;
use crate::division_registry::DivisionRegistry;
use crate::error::{Error, Result};
use crate::http_client::get_page;
use crate::match_table::{self, AgeContext, MatchRow};
use crate::profile_cache::ProfileCache;
use crate::roster_fetch::{read_bronze, RosterTeam};
use crate::scrape_log::ScrapeLog;
use crate::team_matcher::{AgeBand, MatchTier, RegistryEntry, TeamRegistry};
use crate::team_normalizer::{normalize_team_name, reduce_team_key, token_overlap};

const RANKINGS_BASE_URL: &str = "https://rankings.gotsport.com";
const API_BASE_URL: &str = "https://system.gotsport.com/api/v1";

/// Rows older than this never enter the gold table; the ranking engine
/// applies its own tighter window on top.
const HISTORY_MAX_AGE_DAYS: i64 = 548;

#[derive(Debug, Clone, Default, Serialize)]
pub struct MatchesSummary {
    pub attempted: usize,
    pub succeeded: usize,
    pub zero_match: usize,
    pub failed: usize,
}

#[derive(Debug)]
pub struct MatchesResult {
    pub gold_path: PathBuf,
    pub rows_written: usize,
    pub summary: MatchesSummary,
}

pub fn history_url(external_id: &str) -> String {
    format!("{API_BASE_URL}/teams/{external_id}/matches?past=true")
}

fn search_url(team_name: &str) -> String {
    let query: String = team_name
        .chars()
        .map(|c| if c == ' ' { '+' } else { c })
        .filter(|c| c.is_alphanumeric() || *c == '+')
        .collect();
    format!("{RANKINGS_BASE_URL}/team_search?search={query}")
}

/// Scrape match histories for every roster team that carries an external id.
///
/// The pool observes `cancel`: in-flight teams finish, no new work starts.
/// Partial results are still written when at least one team succeeded.
pub fn scrape_matches(
    registry: &DivisionRegistry,
    division_key: &str,
    roster: &[RosterTeam],
    cfg: &ScrapeConfig,
    cancel: Arc<AtomicBool>,
) -> Result<MatchesResult> {
    registry.get(division_key)?;
    let paths = registry.paths(division_key);
    let log = Arc::new(ScrapeLog::new(&paths.error_log, division_key));
    let cache = Arc::new(ProfileCache::load(&paths.profile_cache));
    let team_registry = Arc::new(build_team_registry(registry, division_key, roster));

    let queue: VecDeque<RosterTeam> = roster
        .iter()
        .filter(|t| {
            if t.external_id.is_none() {
                log::debug!("skipping '{}': external_id_missing", t.team_name);
            }
            t.external_id.is_some()
        })
        .cloned()
        .collect();
    let attempted = queue.len();
    let queue = Arc::new(Mutex::new(queue));

    let (tx, rx) = mpsc::channel::<TeamOutcome>();
    let mut handles = Vec::new();
    for _ in 0..cfg.workers.max(1) {
        let queue = Arc::clone(&queue);
        let tx = tx.clone();
        let cancel = Arc::clone(&cancel);
        let log = Arc::clone(&log);
        let cache = Arc::clone(&cache);
        let team_registry = Arc::clone(&team_registry);
        let cfg = cfg.clone();
        handles.push(thread::spawn(move || {
            let worker = Worker {
                cfg,
                log,
                cache,
                registry: team_registry,
            };
            loop {
                if cancel.load(Ordering::Relaxed) {
                    break;
                }
                let Some(team) = queue.lock().expect("work queue lock poisoned").pop_front()
                else {
                    break;
                };
                let outcome = worker.run_team(&team);
                if tx.send(outcome).is_err() {
                    break;
                }
            }
        }));
    }
    drop(tx);

    let mut summary = MatchesSummary {
        attempted,
        ..Default::default()
    };
    let mut rows: Vec<MatchRow> = Vec::new();
    for outcome in rx {
        match outcome.rows {
            Ok(team_rows) => {
                if team_rows.is_empty() {
                    summary.zero_match += 1;
                } else {
                    rows.extend(team_rows);
                }
                summary.succeeded += 1;
            }
            Err(reason) => {
                summary.failed += 1;
                log::warn!("{division_key}: team '{}' failed: {reason}", outcome.team_key);
            }
        }
    }
    for handle in handles {
        let _ = handle.join();
    }

    // Both sides of a roster-vs-roster match report it; canonical ordering
    // plus the (date, a, b) primary key collapses the pair.
    match_table::sort_and_dedup(&mut rows);

    let rows_written = rows.len();
    if summary.succeeded > 0 {
        match_table::write_gold(&paths.gold_matches, &rows)?;
    }
    write_summary(&paths.scrape_summary, &summary)?;
    log.event(&format!(
        "matches scraped: {} rows, {}/{} teams ok",
        rows_written, summary.succeeded, summary.attempted
    ))?;

    let failed_fraction = if attempted == 0 {
        0.0
    } else {
        summary.failed as f64 / attempted as f64
    };
    if failed_fraction > cfg.failure_threshold {
        return Err(Error::ThresholdExceeded {
            failed: summary.failed,
            attempted,
            limit: cfg.failure_threshold * 100.0,
        });
    }

    Ok(MatchesResult {
        gold_path: paths.gold_matches,
        rows_written,
        summary,
    })
}

/// Union of the division's own roster and any adjacent-age bronze rosters
/// present on disk, for cross-age opponent resolution.
fn build_team_registry(
    registry: &DivisionRegistry,
    division_key: &str,
    roster: &[RosterTeam],
) -> TeamRegistry {
    let mut entries: Vec<RegistryEntry> = roster
        .iter()
        .map(|t| RegistryEntry {
            team_key: t.team_key.clone(),
            display_name: t.team_name.clone(),
            state: Some(t.state.clone()),
            external_id: t.external_id.clone(),
            band: AgeBand::Own,
        })
        .collect();
    for (delta, band) in [(1, AgeBand::Older), (-1, AgeBand::Younger)] {
        let Some(adjacent_key) = registry.adjacent_key(division_key, delta) else {
            continue;
        };
        let path = registry.paths(&adjacent_key).bronze_roster;
        let Ok(teams) = read_bronze(&path) else {
            continue;
        };
        entries.extend(teams.into_iter().map(|t| RegistryEntry {
            team_key: t.team_key,
            display_name: t.team_name,
            state: Some(t.state),
            external_id: t.external_id,
            band,
        }));
    }
    TeamRegistry::new(entries)
}

struct TeamOutcome {
    team_key: String,
    rows: Result<Vec<MatchRow>>,
}

struct Worker {
    cfg: ScrapeConfig,
    log: Arc<ScrapeLog>,
    cache: Arc<ProfileCache>,
    registry: Arc<TeamRegistry>,
}

impl Worker {
    fn run_team(&self, team: &RosterTeam) -> TeamOutcome {
        self.jitter_delay();
        TeamOutcome {
            team_key: team.team_key.clone(),
            rows: self.fetch_team_history(team),
        }
    }

    fn jitter_delay(&self) {
        let (lo, hi) = self.cfg.delay_range;
        let secs = rand::thread_rng().gen_range(lo..hi);
        thread::sleep(Duration::from_secs_f64(secs));
    }

    fn fetch_team_history(&self, team: &RosterTeam) -> Result<Vec<MatchRow>> {
        let mut profile_id = self.resolve_profile(team)?;
        let mut backoff_base = 1u64;
        let mut last_err = Error::TransientHttp("no attempts made".to_string());

        for attempt in 0..self.cfg.backoff_secs.len() {
            let url = history_url(&profile_id);
            match get_page(&url) {
                Ok(page) if page.is_success() => {
                    let (wire, dropped) = parse_history_json(&page.body)?;
                    for reason in dropped {
                        let _ = self.log.record(&team.team_key, attempt as u32 + 1, None, &reason);
                    }
                    return Ok(self.build_rows(team, wire, &url));
                }
                Ok(page) if page.status == 404 => {
                    let _ = self.log.record(
                        &team.team_key,
                        attempt as u32 + 1,
                        Some(404),
                        "profile gone; re-resolving via search",
                    );
                    self.cache.invalidate(&team.team_key).ok();
                    match self.search_profile(&team.team_name, &team.team_key) {
                        Ok(fresh) => profile_id = fresh,
                        Err(e) => last_err = e,
                    }
                }
                Ok(page) if page.status == 429 => {
                    // Upstream is throttling; double this worker's base for
                    // the remaining attempts.
                    backoff_base = backoff_base.saturating_mul(2);
                    let _ = self.log.record(
                        &team.team_key,
                        attempt as u32 + 1,
                        Some(429),
                        "rate limited",
                    );
                    last_err = Error::RateLimited(format!(
                        "'{}' still throttled after attempt {}",
                        team.team_name,
                        attempt + 1
                    ));
                }
                Ok(page) => {
                    let _ = self.log.record(
                        &team.team_key,
                        attempt as u32 + 1,
                        Some(page.status),
                        "history fetch",
                    );
                    last_err = Error::TransientHttp(format!("http {} from {url}", page.status));
                }
                Err(e) => {
                    let _ = self
                        .log
                        .record(&team.team_key, attempt as u32 + 1, None, &e.to_string());
                    last_err = Error::TransientHttp(e.to_string());
                }
            }
            if attempt + 1 < self.cfg.backoff_secs.len() {
                let secs = self.cfg.backoff_secs[attempt] * backoff_base;
                thread::sleep(Duration::from_secs(secs));
            }
        }
        Err(last_err)
    }

    /// Cache hit wins; the roster id seeds the cache; search is the last
    /// resort.
    fn resolve_profile(&self, team: &RosterTeam) -> Result<String> {
        if let Some(id) = self.cache.get(&team.team_key) {
            return Ok(id);
        }
        if let Some(id) = team.external_id.as_deref() {
            self.cache.insert(&team.team_key, id).ok();
            return Ok(id.to_string());
        }
        self.search_profile(&team.team_name, &team.team_key)
    }

    fn search_profile(&self, team_name: &str, team_key: &str) -> Result<String> {
        let page = get_page(&search_url(team_name))
            .map_err(|e| Error::TransientHttp(e.to_string()))?;
        if !page.is_success() {
            return Err(Error::TransientHttp(format!(
                "search returned http {}",
                page.status
            )));
        }
        let candidates = parse_search_results(&page.body);
        let Some(id) = select_search_candidate(team_key, &candidates, self.cfg.search_overlap_min)
        else {
            let _ = self
                .log
                .record(team_key, 0, None, "profile not found via search");
            return Err(Error::ProfileNotFound(team_name.to_string()));
        };
        self.cache.insert(team_key, &id).ok();
        Ok(id)
    }

    fn build_rows(&self, team: &RosterTeam, wire: Vec<WireMatch>, source_url: &str) -> Vec<MatchRow> {
        let today = Utc::now().date_naive();
        let oldest = today - chrono::Duration::days(HISTORY_MAX_AGE_DAYS);
        let mut rows = Vec::with_capacity(wire.len());
        for m in wire {
            if m.date < oldest || m.date > today {
                continue;
            }
            // The scraped side is ours by construction; the row's confidence
            // and age context describe how the other side resolved.
            let own_is_home = normalize_team_name(&m.home_team) == team.team_key
                || reduce_team_key(&normalize_team_name(&m.home_team))
                    == reduce_team_key(&team.team_key);
            let (opp_name, opp_id) = if own_is_home {
                (m.away_team.clone(), m.away_id.clone())
            } else {
                (m.home_team.clone(), m.home_id.clone())
            };
            let Ok(opp) = self.registry.resolve(&opp_name) else {
                let _ = self
                    .log
                    .record(&team.team_key, 0, None, "match row with empty opponent");
                continue;
            };
            let age_context = match (&opp.tier, opp.band) {
                (MatchTier::External, _) | (_, None) => AgeContext::Unknown,
                (_, Some(band)) => band.age_context(),
            };
            let (own_score, opp_score) = if own_is_home {
                (m.home_score, m.away_score)
            } else {
                (m.away_score, m.home_score)
            };
            let row = MatchRow {
                date: m.date,
                team_a_key: team.team_key.clone(),
                team_a_name: team.team_name.clone(),
                team_b_key: opp.team_key.clone(),
                team_b_name: opp.display_name.clone(),
                score_a: own_score,
                score_b: opp_score,
                competition: m.competition,
                source_url: source_url.to_string(),
                age_context,
                match_confidence: opp.confidence_label(opp_id.as_deref()),
            };
            rows.push(row.into_canonical());
        }
        rows
    }
}

/// One upstream match before canonicalization.
#[derive(Debug, Clone)]
pub struct WireMatch {
    pub date: NaiveDate,
    pub home_team: String,
    pub away_team: String,
    pub home_score: u32,
    pub away_score: u32,
    pub competition: String,
    pub home_id: Option<String>,
    pub away_id: Option<String>,
}

/// Parse the past-matches payload: a JSON array of match objects carrying
/// either explicit home/away fields or a `"A vs. B"` title. Rows missing
/// required fields are dropped and reported, not fatal.
pub fn parse_history_json(body: &str) -> anyhow::Result<(Vec<WireMatch>, Vec<String>)> {
    let trimmed = body.trim();
    if trimmed.is_empty() || trimmed == "null" {
        return Ok((Vec::new(), Vec::new()));
    }
    let root: Value = serde_json::from_str(trimmed).context("invalid history json")?;
    let arr = root
        .as_array()
        .or_else(|| root.get("matches").and_then(|v| v.as_array()))
        .ok_or_else(|| anyhow!("history json is not a match array"))?;

    let mut out = Vec::new();
    let mut dropped = Vec::new();
    for (idx, item) in arr.iter().enumerate() {
        match parse_wire_match(item) {
            Ok(m) => out.push(m),
            Err(reason) => dropped.push(format!("dropped match {}: {reason}", idx + 1)),
        }
    }
    Ok((out, dropped))
}

fn parse_wire_match(item: &Value) -> std::result::Result<WireMatch, String> {
    let (home_team, away_team) = match (
        string_at(item, &["home_team", "homeTeam"]),
        string_at(item, &["away_team", "awayTeam"]),
    ) {
        (Some(h), Some(a)) => (h, a),
        _ => {
            let title =
                string_at(item, &["title"]).ok_or("missing team names and title")?;
            split_title(&title).ok_or("title is not 'A vs. B'")?
        }
    };
    let raw_time = string_at(item, &["matchTime", "match_time", "date"])
        .ok_or("missing match time")?;
    let date = parse_match_date(&raw_time).ok_or("unparseable match time")?;
    let home_score = score_at(item, &["home_score", "homeScore"]).ok_or("non-numeric home score")?;
    let away_score = score_at(item, &["away_score", "awayScore"]).ok_or("non-numeric away score")?;
    let competition = string_at(item, &["event_name", "competition"])
        .or_else(|| {
            item.get("event")
                .and_then(|e| e.get("name"))
                .and_then(|v| v.as_str())
                .map(str::to_string)
        })
        .unwrap_or_default();
    Ok(WireMatch {
        date,
        home_team,
        away_team,
        home_score,
        away_score,
        competition,
        home_id: id_at(item, &["home_team_id", "homeTeamId"]),
        away_id: id_at(item, &["away_team_id", "awayTeamId"]),
    })
}

fn split_title(title: &str) -> Option<(String, String)> {
    let (home, away) = title.split_once(" vs. ").or_else(|| title.split_once(" vs "))?;
    let home = home.trim();
    let away = away.trim();
    (!home.is_empty() && !away.is_empty())
        .then(|| (home.to_string(), away.to_string()))
}

fn parse_match_date(raw: &str) -> Option<NaiveDate> {
    let day = raw.split(['T', ' ']).next()?;
    NaiveDate::parse_from_str(day, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(day, "%m/%d/%Y"))
        .ok()
}

fn string_at(item: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| {
        item.get(k)
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    })
}

fn score_at(item: &Value, keys: &[&str]) -> Option<u32> {
    keys.iter().find_map(|k| {
        let v = item.get(k)?;
        if let Some(n) = v.as_u64() {
            return u32::try_from(n).ok();
        }
        v.as_str()?.trim().parse().ok()
    })
}

fn id_at(item: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| {
        let v = item.get(k)?;
        v.as_u64()
            .map(|n| n.to_string())
            .or_else(|| v.as_str().map(str::to_string))
    })
}

/// Search results are anchors whose href carries `/teams/{id}`.
pub fn parse_search_results(body: &str) -> Vec<(String, String)> {
    let document = Html::parse_document(body);
    let link_sel = Selector::parse("a[href]").expect("static selector");
    let mut out = Vec::new();
    for anchor in document.select(&link_sel) {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        let Some(rest) = href.split("/teams/").nth(1) else {
            continue;
        };
        let id: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
        if id.is_empty() {
            continue;
        }
        let text = anchor.text().collect::<String>().trim().to_string();
        if !text.is_empty() {
            out.push((text, id));
        }
    }
    out
}

/// Exact beats reduced-key equality beats token overlap; overlap below the
/// floor yields nothing.
pub fn select_search_candidate(
    team_key: &str,
    candidates: &[(String, String)],
    overlap_min: f64,
) -> Option<String> {
    for (name, id) in candidates {
        if normalize_team_name(name) == team_key {
            return Some(id.clone());
        }
    }
    let reduced = reduce_team_key(team_key);
    for (name, id) in candidates {
        if reduce_team_key(&normalize_team_name(name)) == reduced {
            return Some(id.clone());
        }
    }
    let mut best: Option<(&str, f64)> = None;
    for (name, id) in candidates {
        let overlap = token_overlap(team_key, &normalize_team_name(name));
        if overlap < overlap_min {
            continue;
        }
        if best.map_or(true, |(_, prev)| overlap > prev) {
            best = Some((id, overlap));
        }
    }
    best.map(|(id, _)| id.to_string())
}

fn write_summary(path: &std::path::Path, summary: &MatchesSummary) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(summary)?;
    fs::write(path, json)?;
    Ok(())
}
