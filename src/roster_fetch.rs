//! Stage 1: division roster.
//!
//! The roster URL serves either a server-rendered ranking table or a JSON
//! array of team objects, depending on how the upstream happens to route
//! the division. We probe the content type and fall back to the other
//! parser before giving up. Output is the bronze roster CSV.

use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Context};
use chrono::{SecondsFormat, Utc};
use scraper::{Html, Selector};
use serde_json::Value;

use crate::config::ScrapeConfig;
use crate::division_registry::DivisionRegistry;
use crate::error::{Error, Result};
use crate::http_client::get_page;
use crate::scrape_log::ScrapeLog;
use crate::team_normalizer::normalize_team_name;

/// One bronze roster row.
#[derive(Debug, Clone)]
pub struct RosterTeam {
    pub team_name: String,
    pub team_key: String,
    pub external_id: Option<String>,
    pub club: String,
    pub state: String,
}

#[derive(Debug)]
pub struct RosterResult {
    pub teams: Vec<RosterTeam>,
    pub bronze_path: PathBuf,
}

/// Fetch, extract and persist the roster for one division.
pub fn scrape_roster(
    registry: &DivisionRegistry,
    division_key: &str,
    cfg: &ScrapeConfig,
) -> Result<RosterResult> {
    let division = registry.get(division_key)?;
    let paths = registry.paths(division_key);
    let log = ScrapeLog::new(&paths.error_log, division_key);

    let page = fetch_roster_page(&division.roster_url, cfg, &log)
        .map_err(|e| Error::TransientHttp(e.to_string()))?;

    let raw = extract_roster(&page.body, &page.content_type)
        .map_err(|e| Error::MalformedInput {
            path: PathBuf::from(&division.roster_url),
            reason: e.to_string(),
        })?;

    let teams = dedup_roster(raw, &division.state);
    if teams.is_empty() && !cfg.allow_empty_roster {
        return Err(Error::EmptyUpstream(division_key.to_string()));
    }

    let scraped_at = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
    write_bronze(&paths.bronze_roster, &teams, &scraped_at)?;
    log.event(&format!(
        "roster scraped: {} teams from {}",
        teams.len(),
        division.roster_url
    ))?;
    log::info!("{division_key}: roster has {} teams", teams.len());

    Ok(RosterResult {
        teams,
        bronze_path: paths.bronze_roster,
    })
}

fn fetch_roster_page(
    url: &str,
    cfg: &ScrapeConfig,
    log: &ScrapeLog,
) -> anyhow::Result<crate::http_client::FetchedPage> {
    let mut last_err = anyhow!("no attempts made");
    for (attempt, backoff) in cfg.backoff_secs.iter().enumerate() {
        match get_page(url) {
            Ok(page) if page.is_success() => return Ok(page),
            Ok(page) => {
                let _ = log.record("", attempt as u32 + 1, Some(page.status), "roster fetch");
                last_err = anyhow!("http {} from {url}", page.status);
            }
            Err(e) => {
                let _ = log.record("", attempt as u32 + 1, None, &e.to_string());
                last_err = e;
            }
        }
        if attempt + 1 < cfg.backoff_secs.len() {
            thread::sleep(Duration::from_secs(*backoff));
        }
    }
    Err(last_err)
}

/// Raw extraction before key normalization and dedup.
#[derive(Debug, Clone)]
pub struct RawRosterTeam {
    pub name: String,
    pub external_id: Option<String>,
    pub club: String,
    pub state: Option<String>,
}

/// Probe content type; fall back to the other parser when the preferred one
/// yields nothing.
pub fn extract_roster(body: &str, content_type: &str) -> anyhow::Result<Vec<RawRosterTeam>> {
    let prefers_json =
        content_type.contains("json") || body.trim_start().starts_with(['[', '{']);
    if prefers_json {
        match parse_roster_json(body) {
            Ok(teams) if !teams.is_empty() => return Ok(teams),
            _ => {}
        }
        return Ok(parse_roster_html(body));
    }
    let teams = parse_roster_html(body);
    if teams.is_empty() {
        return parse_roster_json(body);
    }
    Ok(teams)
}

/// JSON endpoint: an array of team objects, sometimes nested under "teams".
pub fn parse_roster_json(body: &str) -> anyhow::Result<Vec<RawRosterTeam>> {
    let root: Value = serde_json::from_str(body.trim()).context("invalid roster json")?;
    let arr = root
        .as_array()
        .or_else(|| root.get("teams").and_then(|v| v.as_array()))
        .ok_or_else(|| anyhow!("roster json is not a team array"))?;

    let mut out = Vec::new();
    for item in arr {
        let name = pick_str(item, &["teamName", "team_name", "name"]);
        let Some(name) = name else { continue };
        let external_id = pick_str(item, &["teamId", "team_id", "id"])
            .or_else(|| item.get("teamUrl").and_then(|v| v.as_str()).and_then(id_from_url))
            .filter(|s| !s.is_empty());
        out.push(RawRosterTeam {
            name,
            external_id,
            club: pick_str(item, &["club", "clubName"]).unwrap_or_default(),
            state: pick_str(item, &["state", "stateCode"]),
        });
    }
    Ok(out)
}

/// Server-rendered ranking table: first table on the page, header row
/// skipped, cells `[rank, team id, team name, points, ...]` with the
/// profile link carrying `/teams/{id}`.
pub fn parse_roster_html(body: &str) -> Vec<RawRosterTeam> {
    let document = Html::parse_document(body);
    let table_sel = Selector::parse("table").expect("static selector");
    let row_sel = Selector::parse("tr").expect("static selector");
    let cell_sel = Selector::parse("td").expect("static selector");
    let link_sel = Selector::parse("a").expect("static selector");

    let mut out = Vec::new();
    let Some(table) = document.select(&table_sel).next() else {
        return out;
    };
    for row in table.select(&row_sel).skip(1) {
        let cells: Vec<_> = row.select(&cell_sel).collect();
        if cells.len() < 3 {
            continue;
        }
        let cell_text =
            |idx: usize| cells[idx].text().collect::<String>().trim().to_string();
        let name = cell_text(2);
        if name.is_empty() {
            continue;
        }
        let from_cell = cell_text(1);
        let from_link = cells
            .iter()
            .find_map(|c| c.select(&link_sel).next())
            .and_then(|a| a.value().attr("href"))
            .and_then(id_from_url);
        let external_id = from_link.or_else(|| {
            (!from_cell.is_empty() && from_cell.chars().all(|c| c.is_ascii_digit()))
                .then_some(from_cell)
        });
        let club = if cells.len() > 4 { cell_text(4) } else { String::new() };
        out.push(RawRosterTeam {
            name,
            external_id,
            club,
            state: None,
        });
    }
    out
}

/// `/teams/12345` or `/teams/12345/game-history` → `12345`.
fn id_from_url(url: &str) -> Option<String> {
    let rest = url.split("/teams/").nth(1)?;
    let id: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    (!id.is_empty()).then_some(id)
}

/// Normalize, default missing states to the division's, drop duplicate
/// `(team_key, external_id)` pairs, keep rows unique by key, sort for
/// stable output.
pub fn dedup_roster(raw: Vec<RawRosterTeam>, division_state: &str) -> Vec<RosterTeam> {
    let mut teams: Vec<RosterTeam> = raw
        .into_iter()
        .map(|t| RosterTeam {
            team_key: normalize_team_name(&t.name),
            team_name: t.name,
            external_id: t.external_id,
            club: t.club,
            state: t
                .state
                .map(|s| s.to_lowercase())
                .unwrap_or_else(|| division_state.to_string()),
        })
        .collect();
    // Within one key, an id-bearing row sorts first so the key-level dedup
    // keeps it.
    teams.sort_by(|a, b| {
        a.team_key
            .cmp(&b.team_key)
            .then_with(|| b.external_id.cmp(&a.external_id))
    });
    teams.dedup_by(|next, kept| {
        next.team_key == kept.team_key && next.external_id == kept.external_id
    });
    teams.dedup_by(|next, kept| next.team_key == kept.team_key);
    for team in &teams {
        if team.external_id.is_none() {
            log::warn!(
                "roster team '{}' has no external id; stage 2 will skip it",
                team.team_name
            );
        }
    }
    teams
}

pub fn write_bronze(path: &Path, teams: &[RosterTeam], scraped_at: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("csv.tmp");
    {
        let mut writer = csv::Writer::from_path(&tmp)?;
        writer.write_record([
            "team_name",
            "team_key",
            "external_id",
            "club",
            "state",
            "scraped_at",
        ])?;
        for team in teams {
            writer.write_record([
                team.team_name.as_str(),
                team.team_key.as_str(),
                team.external_id.as_deref().unwrap_or(""),
                team.club.as_str(),
                team.state.as_str(),
                scraped_at,
            ])?;
        }
        writer.flush()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Read a bronze roster back, e.g. when `scrape-matches` runs in a separate
/// invocation from `scrape-teams`.
pub fn read_bronze(path: &Path) -> Result<Vec<RosterTeam>> {
    let malformed = |reason: String| Error::MalformedInput {
        path: path.to_path_buf(),
        reason,
    };
    let mut reader = csv::Reader::from_path(path).map_err(|e| malformed(e.to_string()))?;
    let mut teams = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| malformed(e.to_string()))?;
        let field = |idx: usize| record.get(idx).unwrap_or("").to_string();
        let external_id = field(2);
        teams.push(RosterTeam {
            team_name: field(0),
            team_key: field(1),
            external_id: (!external_id.is_empty()).then_some(external_id),
            club: field(3),
            state: field(4),
        });
    }
    Ok(teams)
}

fn pick_str(value: &Value, keys: &[&str]) -> Option<String> {
    for key in keys {
        if let Some(s) = value.get(key).and_then(|v| v.as_str()) {
            let trimmed = s.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
        if let Some(n) = value.get(key).and_then(|v| v.as_u64()) {
            return Some(n.to_string());
        }
    }
    None
}
