//! Division connectivity report.
//!
//! The opponent graph tells you whether a division's schedule actually
//! links its teams: a vertex per roster team, an edge per distinct roster
//! opponent pair observed in the match set. Teams stuck in tiny components
//! have ratings supported by almost no comparisons.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;

use crate::error::Result;
use crate::match_table::MatchRow;
use crate::roster_fetch::RosterTeam;

#[derive(Debug, Clone)]
pub struct ConnectivityRow {
    pub team_key: String,
    pub component_id: usize,
    pub component_size: usize,
    pub degree: usize,
}

/// Label each roster team with its connected component and degree.
/// Component ids are assigned in order of each component's smallest member
/// key, so output is stable across runs.
pub fn connectivity_report(rows: &[MatchRow], roster: &[RosterTeam]) -> Vec<ConnectivityRow> {
    let mut keys: Vec<&str> = roster.iter().map(|t| t.team_key.as_str()).collect();
    keys.sort_unstable();
    keys.dedup();
    let index: BTreeMap<&str, usize> = keys.iter().enumerate().map(|(i, k)| (*k, i)).collect();

    let mut parent: Vec<usize> = (0..keys.len()).collect();
    let mut edges: HashSet<(usize, usize)> = HashSet::new();
    for row in rows {
        let (Some(&a), Some(&b)) = (
            index.get(row.team_a_key.as_str()),
            index.get(row.team_b_key.as_str()),
        ) else {
            continue;
        };
        if a == b {
            continue;
        }
        edges.insert((a.min(b), a.max(b)));
        union(&mut parent, a, b);
    }

    let mut degree = vec![0usize; keys.len()];
    for (a, b) in &edges {
        degree[*a] += 1;
        degree[*b] += 1;
    }

    let mut component_size: BTreeMap<usize, usize> = BTreeMap::new();
    for id in 0..keys.len() {
        *component_size.entry(find(&mut parent, id)).or_insert(0) += 1;
    }

    // Renumber components by their smallest member (keys are sorted, so the
    // first appearance of a root is its smallest member).
    let mut component_id: BTreeMap<usize, usize> = BTreeMap::new();
    for id in 0..keys.len() {
        let root = find(&mut parent, id);
        let next = component_id.len();
        component_id.entry(root).or_insert(next);
    }

    let out: Vec<ConnectivityRow> = (0..keys.len())
        .map(|id| {
            let root = find(&mut parent, id);
            ConnectivityRow {
                team_key: keys[id].to_string(),
                component_id: component_id[&root],
                component_size: component_size[&root],
                degree: degree[id],
            }
        })
        .collect();

    for row in &out {
        if row.component_size < 3 {
            log::warn!(
                "team '{}' sits in a component of size {}",
                row.team_key,
                row.component_size
            );
        }
    }
    out
}

fn find(parent: &mut Vec<usize>, mut id: usize) -> usize {
    while parent[id] != id {
        parent[id] = parent[parent[id]];
        id = parent[id];
    }
    id
}

fn union(parent: &mut Vec<usize>, a: usize, b: usize) {
    let ra = find(parent, a);
    let rb = find(parent, b);
    if ra != rb {
        // Attach the larger root id under the smaller so roots stay the
        // smallest member of their component.
        let (lo, hi) = if ra < rb { (ra, rb) } else { (rb, ra) };
        parent[hi] = lo;
    }
}

pub fn write_connectivity(path: &Path, rows: &[ConnectivityRow]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("csv.tmp");
    {
        let mut writer = csv::Writer::from_path(&tmp)?;
        writer.write_record(["team_key", "component_id", "component_size", "degree"])?;
        for row in rows {
            writer.write_record([
                row.team_key.clone(),
                row.component_id.to_string(),
                row.component_size.to_string(),
                row.degree.to_string(),
            ])?;
        }
        writer.flush()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::match_table::AgeContext;
    use chrono::NaiveDate;

    fn team(key: &str) -> RosterTeam {
        RosterTeam {
            team_name: key.to_uppercase(),
            team_key: key.to_string(),
            external_id: None,
            club: String::new(),
            state: "az".to_string(),
        }
    }

    fn row(a: &str, b: &str) -> MatchRow {
        MatchRow {
            date: NaiveDate::from_ymd_opt(2025, 4, 1).unwrap(),
            team_a_key: a.to_string(),
            team_a_name: a.to_uppercase(),
            team_b_key: b.to_string(),
            team_b_name: b.to_uppercase(),
            score_a: 1,
            score_b: 0,
            competition: String::new(),
            source_url: String::new(),
            age_context: AgeContext::Own,
            match_confidence: "exact".to_string(),
        }
    }

    #[test]
    fn components_and_degrees() {
        let roster: Vec<RosterTeam> =
            ["alpha", "bravo", "charlie", "delta", "echo"].map(team).to_vec();
        let rows = vec![row("alpha", "bravo"), row("bravo", "charlie"), row("delta", "echo")];
        let report = connectivity_report(&rows, &roster);

        let get = |k: &str| report.iter().find(|r| r.team_key == k).unwrap();
        assert_eq!(get("alpha").component_id, get("charlie").component_id);
        assert_ne!(get("alpha").component_id, get("delta").component_id);
        assert_eq!(get("alpha").component_size, 3);
        assert_eq!(get("delta").component_size, 2);
        assert_eq!(get("bravo").degree, 2);
        assert_eq!(get("echo").degree, 1);
    }

    #[test]
    fn repeated_matches_do_not_inflate_degree() {
        let roster: Vec<RosterTeam> = ["alpha", "bravo"].map(team).to_vec();
        let rows = vec![row("alpha", "bravo"), row("alpha", "bravo")];
        let report = connectivity_report(&rows, &roster);
        assert_eq!(report[0].degree, 1);
    }
}
