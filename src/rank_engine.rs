//! Ranking engine (V5.3E-Enhanced).
//!
//! Consumes the gold match table and the division's master roster, produces
//! one ranking row per roster team that played inside the window. Offense
//! and defense are tapered weighted goal rates, schedule strength comes
//! from the iterative solver, and the composite leans on schedule strength
//! because youth divisions are won and lost on who you actually played.

use std::fmt;
use std::fs;
use std::path::Path;

use chrono::NaiveDate;

use crate::config::{
    RankConfig, DEFENSE_WEIGHT, GAMES_PENALTY_FULL, OFFENSE_WEIGHT, SOS_WEIGHT,
};
use crate::error::Result;
use crate::match_table::{AgeContext, MatchRow};
use crate::opponent_strength::compute_iterative_sos;
use crate::roster_fetch::RosterTeam;
use crate::team_views::{explode_views, ranking_window, AdjacentRosters, OpponentIndex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeamStatus {
    Active,
    Provisional,
    Inactive,
}

impl fmt::Display for TeamStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TeamStatus::Active => "active",
            TeamStatus::Provisional => "provisional",
            TeamStatus::Inactive => "inactive",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone)]
pub struct RankingRow {
    pub rank: usize,
    pub team_key: String,
    pub team_name: String,
    pub state: String,
    pub status: TeamStatus,
    pub games_played: u32,
    pub wins: u32,
    pub losses: u32,
    pub ties: u32,
    pub goals_for: u32,
    pub goals_against: u32,
    pub offense_raw: f64,
    pub defense_raw: f64,
    pub sos_raw: f64,
    pub offense_norm: f64,
    pub defense_norm: f64,
    pub sos_norm: f64,
    pub power_score: f64,
    pub games_penalty: f64,
    pub power_score_adj: f64,
    pub last_game_date: NaiveDate,
    pub cross_age_games: u32,
    pub cross_age_pct: f64,
    pub cross_state_games: u32,
    pub cross_state_pct: f64,
}

impl RankingRow {
    pub fn record(&self) -> String {
        format!("{}-{}-{}", self.wins, self.losses, self.ties)
    }
}

#[derive(Debug, Clone)]
pub struct RankSummary {
    pub teams_ranked: usize,
    pub iterations: usize,
    pub converged: bool,
    pub window: Option<(NaiveDate, NaiveDate)>,
}

/// Rank one division. Deterministic for a given gold file: every ordering
/// is a stable sort on explicit keys and the reference date defaults to the
/// newest match in the input.
pub fn rank_division(
    rows: &[MatchRow],
    roster: &[RosterTeam],
    adjacent: &AdjacentRosters,
    division_state: &str,
    cfg: &RankConfig,
) -> (Vec<RankingRow>, RankSummary) {
    let index = OpponentIndex::new(roster, adjacent);
    let views_by_team = explode_views(rows, &index, cfg);
    let window = ranking_window(rows, cfg);
    let as_of = cfg
        .as_of
        .or(window.map(|(_, end)| end))
        .unwrap_or_else(|| chrono::Utc::now().date_naive());

    let sos = compute_iterative_sos(&views_by_team, cfg);
    if !sos.converged {
        log::warn!(
            "opponent-strength solver hit the iteration cap ({}) without converging",
            sos.iterations
        );
    }

    let mut out: Vec<RankingRow> = roster
        .iter()
        .filter_map(|team| {
            let views = views_by_team.get(&team.team_key)?;
            if views.is_empty() {
                return None;
            }
            let cap = cfg.goal_cap;
            let mut offense_raw = 0.0;
            let mut defense_raw = 0.0;
            let mut wins = 0;
            let mut losses = 0;
            let mut ties = 0;
            let mut goals_for = 0;
            let mut goals_against = 0;
            let mut cross_age_games = 0;
            let mut cross_state_games = 0;
            let mut last_game_date = views[0].date;
            for v in views {
                offense_raw += v.weight * f64::from(v.goals_for.min(cap));
                defense_raw += v.weight * f64::from(v.goals_against.min(cap));
                match v.goals_for.cmp(&v.goals_against) {
                    std::cmp::Ordering::Greater => wins += 1,
                    std::cmp::Ordering::Equal => ties += 1,
                    std::cmp::Ordering::Less => losses += 1,
                }
                goals_for += v.goals_for;
                goals_against += v.goals_against;
                if matches!(v.age_context, AgeContext::Older | AgeContext::Younger) {
                    cross_age_games += 1;
                }
                if index
                    .state_of(&v.opponent_key)
                    .is_some_and(|s| !s.eq_ignore_ascii_case(division_state))
                {
                    cross_state_games += 1;
                }
                last_game_date = last_game_date.max(v.date);
            }
            let games_played = views.len() as u32;
            let status = assign_status(games_played, last_game_date, as_of, cfg);
            let pct = |n: u32| 100.0 * f64::from(n) / f64::from(games_played);
            Some(RankingRow {
                rank: 0,
                team_key: team.team_key.clone(),
                team_name: team.team_name.clone(),
                state: team.state.clone(),
                status,
                games_played,
                wins,
                losses,
                ties,
                goals_for,
                goals_against,
                offense_raw,
                defense_raw,
                sos_raw: sos.sos_raw.get(&team.team_key).copied().unwrap_or(0.0),
                offense_norm: 0.0,
                defense_norm: 0.0,
                sos_norm: 0.0,
                power_score: 0.0,
                games_penalty: 0.0,
                power_score_adj: 0.0,
                last_game_date,
                cross_age_games,
                cross_age_pct: pct(cross_age_games),
                cross_state_games,
                cross_state_pct: pct(cross_state_games),
            })
        })
        .collect();

    normalize_metrics(&mut out);
    for row in &mut out {
        row.power_score = OFFENSE_WEIGHT * row.offense_norm
            + DEFENSE_WEIGHT * row.defense_norm
            + SOS_WEIGHT * row.sos_norm;
        row.games_penalty =
            (f64::from(row.games_played.min(GAMES_PENALTY_FULL)) / f64::from(GAMES_PENALTY_FULL))
                .sqrt();
        row.power_score_adj = row.power_score * row.games_penalty;
    }

    out.sort_by(|a, b| {
        b.power_score_adj
            .total_cmp(&a.power_score_adj)
            .then_with(|| b.games_played.cmp(&a.games_played))
            .then_with(|| a.team_key.cmp(&b.team_key))
    });
    for (idx, row) in out.iter_mut().enumerate() {
        row.rank = idx + 1;
    }

    let summary = RankSummary {
        teams_ranked: out.len(),
        iterations: sos.iterations,
        converged: sos.converged,
        window,
    };
    (out, summary)
}

fn assign_status(
    games_played: u32,
    last_game_date: NaiveDate,
    as_of: NaiveDate,
    cfg: &RankConfig,
) -> TeamStatus {
    if games_played < cfg.active_min_games {
        return TeamStatus::Provisional;
    }
    let idle_days = (as_of - last_game_date).num_days();
    if idle_days <= cfg.inactive_after_days {
        TeamStatus::Active
    } else {
        TeamStatus::Inactive
    }
}

/// Logistic normalization against the population: 1/(1+e^-((m-mu)/(1.5 sigma))).
/// Defense is inverted afterwards so larger is better everywhere.
fn normalize_metrics(rows: &mut [RankingRow]) {
    let offense = population(rows, |r| r.offense_raw);
    let defense = population(rows, |r| r.defense_raw);
    let sos = population(rows, |r| r.sos_raw);
    for row in rows {
        row.offense_norm = logistic(row.offense_raw, offense);
        row.defense_norm = 1.0 - logistic(row.defense_raw, defense);
        row.sos_norm = logistic(row.sos_raw, sos);
    }
}

fn population(rows: &[RankingRow], metric: impl Fn(&RankingRow) -> f64) -> (f64, f64) {
    if rows.is_empty() {
        return (0.0, 0.0);
    }
    let values: Vec<f64> = rows.iter().map(metric).collect();
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let var = values
        .iter()
        .map(|v| {
            let d = v - mean;
            d * d
        })
        .sum::<f64>()
        / values.len() as f64;
    (mean, var.sqrt())
}

fn logistic(value: f64, (mean, sigma): (f64, f64)) -> f64 {
    if sigma <= f64::EPSILON {
        return 0.5;
    }
    1.0 / (1.0 + (-(value - mean) / (1.5 * sigma)).exp())
}

/// Write the rankings CSV atomically.
pub fn write_rankings(path: &Path, rows: &[RankingRow]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("csv.tmp");
    {
        let mut writer = csv::Writer::from_path(&tmp)?;
        writer.write_record([
            "rank",
            "team_key",
            "team_name",
            "state",
            "status",
            "games_played",
            "wins",
            "losses",
            "ties",
            "goals_for",
            "goals_against",
            "offense_raw",
            "defense_raw",
            "sos_raw",
            "offense_norm",
            "defense_norm",
            "sos_norm",
            "power_score",
            "games_penalty",
            "power_score_adj",
            "last_game_date",
            "cross_age_games",
            "cross_age_pct",
            "cross_state_games",
            "cross_state_pct",
            "record",
        ])?;
        for row in rows {
            writer.write_record([
                row.rank.to_string(),
                row.team_key.clone(),
                row.team_name.clone(),
                row.state.clone(),
                row.status.to_string(),
                row.games_played.to_string(),
                row.wins.to_string(),
                row.losses.to_string(),
                row.ties.to_string(),
                row.goals_for.to_string(),
                row.goals_against.to_string(),
                format!("{:.4}", row.offense_raw),
                format!("{:.4}", row.defense_raw),
                format!("{:.4}", row.sos_raw),
                format!("{:.4}", row.offense_norm),
                format!("{:.4}", row.defense_norm),
                format!("{:.4}", row.sos_norm),
                format!("{:.4}", row.power_score),
                format!("{:.4}", row.games_penalty),
                format!("{:.4}", row.power_score_adj),
                row.last_game_date.format("%Y-%m-%d").to_string(),
                row.cross_age_games.to_string(),
                format!("{:.1}", row.cross_age_pct),
                row.cross_state_games.to_string(),
                format!("{:.1}", row.cross_state_pct),
                row.record(),
            ])?;
        }
        writer.flush()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}
