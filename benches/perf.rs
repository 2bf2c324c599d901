use std::collections::BTreeMap;

use criterion::{criterion_group, criterion_main, Criterion};
use std::hint::black_box;

use chrono::{Duration, NaiveDate};
use divrank::config::RankConfig;
use divrank::match_table::{AgeContext, MatchRow};
use divrank::opponent_strength::compute_iterative_sos;
use divrank::rank_engine::rank_division;
use divrank::roster_fetch::RosterTeam;
use divrank::team_views::{explode_views, AdjacentRosters, OpponentIndex, TeamView};

const TEAMS: usize = 120;
const GAMES_PER_TEAM: usize = 24;

fn synthetic_roster() -> Vec<RosterTeam> {
    (0..TEAMS)
        .map(|i| RosterTeam {
            team_name: format!("TEAM {i:03}"),
            team_key: format!("team {i:03}"),
            external_id: Some(i.to_string()),
            club: String::new(),
            state: "az".to_string(),
        })
        .collect()
}

/// Round-robin-ish schedule with deterministic scores.
fn synthetic_rows() -> Vec<MatchRow> {
    let start = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
    let mut rows = Vec::new();
    for i in 0..TEAMS {
        for g in 0..GAMES_PER_TEAM {
            let opp = (i + g + 1) % TEAMS;
            if opp == i {
                continue;
            }
            let (a, b) = if i < opp { (i, opp) } else { (opp, i) };
            rows.push(MatchRow {
                date: start + Duration::days((g * 7) as i64),
                team_a_key: format!("team {a:03}"),
                team_a_name: format!("TEAM {a:03}"),
                team_b_key: format!("team {b:03}"),
                team_b_name: format!("TEAM {b:03}"),
                score_a: ((a + g) % 5) as u32,
                score_b: ((b + 2 * g) % 4) as u32,
                competition: "league".to_string(),
                source_url: String::new(),
                age_context: AgeContext::Own,
                match_confidence: "exact".to_string(),
            });
        }
    }
    rows
}

fn synthetic_views() -> BTreeMap<String, Vec<TeamView>> {
    let roster = synthetic_roster();
    let rows = synthetic_rows();
    let index = OpponentIndex::new(&roster, &AdjacentRosters::default());
    explode_views(&rows, &index, &RankConfig::default())
}

fn bench_iterative_sos(c: &mut Criterion) {
    let views = synthetic_views();
    let cfg = RankConfig::default();
    c.bench_function("iterative_sos", |b| {
        b.iter(|| {
            let out = compute_iterative_sos(black_box(&views), &cfg);
            black_box(out.iterations);
        })
    });
}

fn bench_rank_division(c: &mut Criterion) {
    let roster = synthetic_roster();
    let rows = synthetic_rows();
    let cfg = RankConfig::default();
    c.bench_function("rank_division", |b| {
        b.iter(|| {
            let (ranked, _) = rank_division(
                black_box(&rows),
                &roster,
                &AdjacentRosters::default(),
                "az",
                &cfg,
            );
            black_box(ranked.len());
        })
    });
}

criterion_group!(benches, bench_iterative_sos, bench_rank_division);
criterion_main!(benches);
