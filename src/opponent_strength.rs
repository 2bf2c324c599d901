//! Iterative opponent strength.
//!
//! An Elo-flavored solver on the [0, 1] rating scale. Teams live in a flat
//! vector indexed by an integer id; directed views reference opponents by
//! id, never by pointer. Each iteration replays every view sequentially
//! (updates are pair-coupled through the mirror view), then the per-team
//! schedule strength is aggregated across cores.

use std::collections::{BTreeMap, HashMap};

use rayon::prelude::*;

use crate::config::RankConfig;
use crate::match_table::AgeContext;
use crate::team_views::TeamView;

#[derive(Debug)]
pub struct SosOutcome {
    /// Weighted mean of clipped opponent ratings, per roster team.
    pub sos_raw: BTreeMap<String, f64>,
    /// Final rating per roster team.
    pub ratings: BTreeMap<String, f64>,
    pub iterations: usize,
    pub converged: bool,
}

struct DirectedView {
    team: usize,
    opponent: usize,
    goals_for: u32,
    goals_against: u32,
    age_context: AgeContext,
    weight: f64,
}

/// Run the solver over the exploded views. Opponents absent from the view
/// map (externals, adjacent-age teams with no own history) hold the fixed
/// default strength and are never updated.
pub fn compute_iterative_sos(
    views_by_team: &BTreeMap<String, Vec<TeamView>>,
    cfg: &RankConfig,
) -> SosOutcome {
    // Flat team table: roster teams first (stable order from the BTreeMap),
    // then every opponent-only key.
    let mut keys: Vec<String> = views_by_team.keys().cloned().collect();
    let roster_len = keys.len();
    let mut id_of: HashMap<String, usize> = keys
        .iter()
        .enumerate()
        .map(|(i, k)| (k.clone(), i))
        .collect();
    for views in views_by_team.values() {
        for view in views {
            if !id_of.contains_key(&view.opponent_key) {
                id_of.insert(view.opponent_key.clone(), keys.len());
                keys.push(view.opponent_key.clone());
            }
        }
    }

    let mut views: Vec<DirectedView> = Vec::new();
    for (team_key, team_views) in views_by_team {
        let team = id_of[team_key];
        for v in team_views {
            views.push(DirectedView {
                team,
                opponent: id_of[&v.opponent_key],
                goals_for: v.goals_for,
                goals_against: v.goals_against,
                age_context: v.age_context,
                weight: v.weight,
            });
        }
    }

    let games_played: Vec<u32> = count_games(&views, keys.len());
    let mut ratings = initial_ratings(&views, &games_played, roster_len, keys.len(), cfg);

    let mut iterations = 0;
    let mut converged = false;
    while iterations < cfg.max_iters {
        let before: Vec<f64> = ratings[..roster_len].to_vec();
        for view in &views {
            apply_update(&mut ratings, view, &games_played, cfg);
        }
        iterations += 1;
        let mean_delta = before
            .iter()
            .zip(&ratings[..roster_len])
            .map(|(a, b)| (a - b).abs())
            .sum::<f64>()
            / roster_len.max(1) as f64;
        if mean_delta < cfg.conv_tol {
            converged = true;
            break;
        }
    }

    // Outlier guard: clip each per-view opponent rating into mean +/- 2.5
    // sigma of the opponent-rating population before averaging.
    let (clip_lo, clip_hi) = clip_bounds(&views, &ratings);

    let sos_raw: BTreeMap<String, f64> = views_by_team
        .par_iter()
        .map(|(team_key, team_views)| {
            let mut acc = 0.0;
            let mut mass = 0.0;
            for v in team_views {
                let r = ratings[id_of[&v.opponent_key]].clamp(clip_lo, clip_hi);
                acc += v.weight * r;
                mass += v.weight;
            }
            let sos = if mass > 0.0 { acc / mass } else { 0.0 };
            (team_key.clone(), sos)
        })
        .collect();

    let ratings_by_key: BTreeMap<String, f64> = keys[..roster_len]
        .iter()
        .map(|k| (k.clone(), ratings[id_of[k]]))
        .collect();

    SosOutcome {
        sos_raw,
        ratings: ratings_by_key,
        iterations,
        converged,
    }
}

fn count_games(views: &[DirectedView], n: usize) -> Vec<u32> {
    let mut games = vec![0u32; n];
    for view in views {
        games[view.team] += 1;
    }
    games
}

/// Win percentage mapped onto [0.2, 0.8], then shifted so the roster
/// population mean is 0.5. Externals take the fixed default strength.
fn initial_ratings(
    views: &[DirectedView],
    games_played: &[u32],
    roster_len: usize,
    n: usize,
    cfg: &RankConfig,
) -> Vec<f64> {
    let mut points = vec![0.0f64; n];
    for view in views {
        points[view.team] += match view.goals_for.cmp(&view.goals_against) {
            std::cmp::Ordering::Greater => 1.0,
            std::cmp::Ordering::Equal => 0.5,
            std::cmp::Ordering::Less => 0.0,
        };
    }

    let mut ratings = vec![cfg.default_opponent_strength; n];
    for id in 0..roster_len {
        let win_pct = if games_played[id] > 0 {
            points[id] / games_played[id] as f64
        } else {
            0.5
        };
        ratings[id] = 0.2 + 0.6 * win_pct;
    }
    if roster_len > 0 {
        let mean = ratings[..roster_len].iter().sum::<f64>() / roster_len as f64;
        let shift = 0.5 - mean;
        for r in &mut ratings[..roster_len] {
            *r = (*r + shift).clamp(0.0, 1.0);
        }
    }
    ratings
}

fn apply_update(
    ratings: &mut [f64],
    view: &DirectedView,
    games_played: &[u32],
    cfg: &RankConfig,
) {
    let r_team = ratings[view.team];
    let r_opp = ratings[view.opponent];

    let expected = 1.0 / (1.0 + (-cfg.k * (r_team - r_opp)).exp());
    let observed = match view.goals_for.cmp(&view.goals_against) {
        std::cmp::Ordering::Greater => 1.0,
        std::cmp::Ordering::Equal => 0.5,
        std::cmp::Ordering::Less => 0.0,
    };

    let cap = cfg.goal_cap as f64;
    let margin = if view.goals_for == view.goals_against {
        1.0
    } else {
        let diff = (view.goals_for as f64 - view.goals_against as f64).clamp(-cap, cap);
        (1.0 + 0.1 * diff).clamp(0.4, 1.6)
    };

    let cross_age = if view.age_context == AgeContext::Older {
        cfg.cross_age_mult
    } else {
        1.0
    };

    let gap = (r_team - r_opp).max(0.0);
    let gap_damp = 1.0 / (1.0 + gap.powf(cfg.alpha));
    let sample_damp = ((games_played[view.team] as f64 / 8.0).powf(cfg.beta)).min(1.0);
    let eta = cfg.eta_base * gap_damp * sample_damp;

    ratings[view.team] = r_team + eta * cross_age * (observed * margin - expected);
}

fn clip_bounds(views: &[DirectedView], ratings: &[f64]) -> (f64, f64) {
    let observed: Vec<f64> = views.iter().map(|v| ratings[v.opponent]).collect();
    if observed.len() < 2 {
        return (f64::NEG_INFINITY, f64::INFINITY);
    }
    let mean = observed.iter().sum::<f64>() / observed.len() as f64;
    let var = observed
        .iter()
        .map(|v| {
            let d = v - mean;
            d * d
        })
        .sum::<f64>()
        / observed.len() as f64;
    let sigma = var.sqrt();
    (mean - 2.5 * sigma, mean + 2.5 * sigma)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RankConfig;
    use crate::match_table::AgeContext;
    use crate::team_views::TeamView;
    use chrono::NaiveDate;

    fn view(opponent: &str, gf: u32, ga: u32, ctx: AgeContext, weight: f64) -> TeamView {
        TeamView {
            opponent_key: opponent.to_string(),
            goals_for: gf,
            goals_against: ga,
            date: NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
            age_context: ctx,
            weight,
        }
    }

    #[test]
    fn external_opponents_hold_the_default_prior() {
        let cfg = RankConfig::default();
        let mut views = BTreeMap::new();
        views.insert(
            "zeta".to_string(),
            vec![
                view("ext::ghost one", 3, 0, AgeContext::Unknown, 0.5),
                view("ext::ghost two", 1, 1, AgeContext::Unknown, 0.5),
            ],
        );
        let out = compute_iterative_sos(&views, &cfg);
        let sos = out.sos_raw["zeta"];
        assert!((sos - cfg.default_opponent_strength).abs() < 1e-9);
        assert!(!out.ratings.contains_key("ext::ghost one"));
    }

    #[test]
    fn cross_age_win_moves_the_rating_five_percent_more() {
        let cfg = RankConfig::default();
        let base = single_win_delta(AgeContext::Own, &cfg);
        let older = single_win_delta(AgeContext::Older, &cfg);
        assert!((older / base - cfg.cross_age_mult).abs() < 1e-9);
    }

    /// One iteration, one win against a fixed-strength opponent of equal
    /// rating; initial shift puts the lone roster team at exactly 0.5 so we
    /// pin the opponent there too via a tweaked default.
    fn single_win_delta(ctx: AgeContext, cfg: &RankConfig) -> f64 {
        let mut cfg = cfg.clone();
        cfg.max_iters = 1;
        cfg.default_opponent_strength = 0.5;
        let mut views = BTreeMap::new();
        views.insert(
            "xray".to_string(),
            vec![view("ext::rival", 2, 1, ctx, 1.0)],
        );
        let out = compute_iterative_sos(&views, &cfg);
        out.ratings["xray"] - 0.5
    }
}
