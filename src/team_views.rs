//! Directed team views.
//!
//! The gold table is wide (one row per match); everything downstream wants
//! long form: per roster team, the ordered sequence of (opponent, goals
//! for, goals against). The explosion happens exactly once, here, together
//! with the ranking window, the 30-view cap and the tapered weight vector.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::NaiveDate;

use crate::config::{RankConfig, WEIGHT_SEGMENTS};
use crate::match_table::{AgeContext, MatchRow};
use crate::roster_fetch::RosterTeam;

#[derive(Debug, Clone)]
pub struct TeamView {
    pub opponent_key: String,
    pub goals_for: u32,
    pub goals_against: u32,
    pub date: NaiveDate,
    pub age_context: AgeContext,
    pub weight: f64,
}

/// Adjacent-age rosters, used only for opponent lookup.
#[derive(Debug, Default)]
pub struct AdjacentRosters {
    pub older: Vec<RosterTeam>,
    pub younger: Vec<RosterTeam>,
}

/// Opponent lookup across own, older and younger rosters, in that order.
pub struct OpponentIndex {
    own: HashSet<String>,
    older: HashSet<String>,
    younger: HashSet<String>,
    states: HashMap<String, String>,
}

impl OpponentIndex {
    pub fn new(roster: &[RosterTeam], adjacent: &AdjacentRosters) -> Self {
        let keys = |teams: &[RosterTeam]| -> HashSet<String> {
            teams.iter().map(|t| t.team_key.clone()).collect()
        };
        let mut states = HashMap::new();
        for team in roster
            .iter()
            .chain(adjacent.older.iter())
            .chain(adjacent.younger.iter())
        {
            states
                .entry(team.team_key.clone())
                .or_insert_with(|| team.state.clone());
        }
        Self {
            own: keys(roster),
            older: keys(&adjacent.older),
            younger: keys(&adjacent.younger),
            states,
        }
    }

    pub fn contains_own(&self, key: &str) -> bool {
        self.own.contains(key)
    }

    /// Teams carrying a dynamic rating in the solver: anything registered in
    /// the own or an adjacent roster. Everything else is an external with a
    /// fixed prior.
    pub fn is_rated(&self, key: &str) -> bool {
        self.own.contains(key) || self.older.contains(key) || self.younger.contains(key)
    }

    /// Own roster wins over older wins over younger; a key found nowhere is
    /// an unknown opponent and gets no cross-age treatment.
    pub fn age_context(&self, opponent_key: &str) -> AgeContext {
        if self.own.contains(opponent_key) {
            AgeContext::Own
        } else if self.older.contains(opponent_key) {
            AgeContext::Older
        } else if self.younger.contains(opponent_key) {
            AgeContext::Younger
        } else {
            AgeContext::Unknown
        }
    }

    pub fn state_of(&self, team_key: &str) -> Option<&str> {
        self.states.get(team_key).map(String::as_str)
    }
}

/// Window bounds actually applied: `(start, end)` inclusive. The end is the
/// newest match in the input so reruns are reproducible.
pub fn ranking_window(rows: &[MatchRow], cfg: &RankConfig) -> Option<(NaiveDate, NaiveDate)> {
    let end = rows.iter().map(|r| r.date).max()?;
    Some((end - chrono::Duration::days(cfg.window_days), end))
}

/// Explode matches into per-team directed views, newest first, capped and
/// weighted. Matches with no master-roster side at all are discarded;
/// adjacent-roster opponents still get their own view sequence so the
/// solver can rate them from the games it can see.
pub fn explode_views(
    rows: &[MatchRow],
    index: &OpponentIndex,
    cfg: &RankConfig,
) -> BTreeMap<String, Vec<TeamView>> {
    let mut by_team: BTreeMap<String, Vec<TeamView>> = BTreeMap::new();
    let Some((start, end)) = ranking_window(rows, cfg) else {
        return by_team;
    };

    for row in rows {
        if row.date < start || row.date > end {
            continue;
        }
        if !index.contains_own(&row.team_a_key) && !index.contains_own(&row.team_b_key) {
            continue;
        }
        let sides = [
            (&row.team_a_key, &row.team_b_key, row.score_a, row.score_b),
            (&row.team_b_key, &row.team_a_key, row.score_b, row.score_a),
        ];
        for (team, opponent, gf, ga) in sides {
            if !index.is_rated(team) {
                continue;
            }
            by_team.entry(team.clone()).or_default().push(TeamView {
                opponent_key: opponent.clone(),
                goals_for: gf,
                goals_against: ga,
                date: row.date,
                age_context: index.age_context(opponent),
                weight: 0.0,
            });
        }
    }

    for views in by_team.values_mut() {
        views.sort_by(|a, b| {
            b.date
                .cmp(&a.date)
                .then_with(|| a.opponent_key.cmp(&b.opponent_key))
        });
        views.truncate(cfg.max_views);
        let weights = tapered_weights(views.len());
        for (view, w) in views.iter_mut().zip(weights) {
            view.weight = w;
        }
    }
    by_team
}

/// Tapered segment weights, newest view first: the 10 most recent views
/// carry 60% of the mass, ranks 11-25 carry 30%, ranks 26-30 carry 10%,
/// uniform within each segment. Partial segments keep their per-view mass
/// and the vector is renormalized to sum to 1.
pub fn tapered_weights(n: usize) -> Vec<f64> {
    if n == 0 {
        return Vec::new();
    }
    let mut weights = Vec::with_capacity(n);
    for (seg_len, seg_mass) in WEIGHT_SEGMENTS {
        let per_view = seg_mass / seg_len as f64;
        for _ in 0..seg_len {
            if weights.len() == n {
                break;
            }
            weights.push(per_view);
        }
    }
    // Views beyond every segment would have been truncated upstream; guard
    // anyway so the vector always covers n.
    let (last_len, last_mass) = WEIGHT_SEGMENTS[WEIGHT_SEGMENTS.len() - 1];
    while weights.len() < n {
        weights.push(last_mass / last_len as f64);
    }
    let total: f64 = weights.iter().sum();
    for w in &mut weights {
        *w /= total;
    }
    weights
}
