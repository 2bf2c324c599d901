//! Gold match table.
//!
//! One row per observed match in canonical form: sides ordered
//! lexicographically by key, `(date, team_a_key, team_b_key)` as primary
//! key, rows sorted before writing so two runs over an unchanged upstream
//! produce byte-identical files.

use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Where the opponent of a row sits relative to the scraped division.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgeContext {
    Own,
    Older,
    Younger,
    Unknown,
}

impl fmt::Display for AgeContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AgeContext::Own => "own",
            AgeContext::Older => "older",
            AgeContext::Younger => "younger",
            AgeContext::Unknown => "unknown",
        };
        write!(f, "{s}")
    }
}

impl FromStr for AgeContext {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, ()> {
        match s {
            "own" => Ok(AgeContext::Own),
            "older" => Ok(AgeContext::Older),
            "younger" => Ok(AgeContext::Younger),
            "unknown" => Ok(AgeContext::Unknown),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchRow {
    pub date: NaiveDate,
    pub team_a_key: String,
    pub team_a_name: String,
    pub team_b_key: String,
    pub team_b_name: String,
    pub score_a: u32,
    pub score_b: u32,
    pub competition: String,
    pub source_url: String,
    pub age_context: AgeContext,
    pub match_confidence: String,
}

impl MatchRow {
    /// Swap sides if needed so `team_a_key <= team_b_key`.
    pub fn into_canonical(mut self) -> Self {
        if self.team_a_key > self.team_b_key {
            std::mem::swap(&mut self.team_a_key, &mut self.team_b_key);
            std::mem::swap(&mut self.team_a_name, &mut self.team_b_name);
            std::mem::swap(&mut self.score_a, &mut self.score_b);
        }
        self
    }
}

/// Sort by `(team_a_key, team_b_key, date)` and collapse duplicate
/// `(date, team_a_key, team_b_key)` rows, first occurrence winning.
pub fn sort_and_dedup(rows: &mut Vec<MatchRow>) {
    rows.sort_by(|a, b| {
        a.team_a_key
            .cmp(&b.team_a_key)
            .then_with(|| a.team_b_key.cmp(&b.team_b_key))
            .then_with(|| a.date.cmp(&b.date))
    });
    rows.dedup_by(|next, kept| {
        next.date == kept.date
            && next.team_a_key == kept.team_a_key
            && next.team_b_key == kept.team_b_key
    });
}

/// Write the gold CSV atomically (temp file, then rename).
pub fn write_gold(path: &Path, rows: &[MatchRow]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("csv.tmp");
    {
        let mut writer = csv::Writer::from_path(&tmp)?;
        writer.write_record([
            "date",
            "team_a_key",
            "team_a_name",
            "team_b_key",
            "team_b_name",
            "score_a",
            "score_b",
            "competition",
            "source_url",
            "age_context",
            "match_confidence",
        ])?;
        for row in rows {
            writer.write_record([
                row.date.format("%Y-%m-%d").to_string(),
                row.team_a_key.clone(),
                row.team_a_name.clone(),
                row.team_b_key.clone(),
                row.team_b_name.clone(),
                row.score_a.to_string(),
                row.score_b.to_string(),
                row.competition.clone(),
                row.source_url.clone(),
                row.age_context.to_string(),
                row.match_confidence.clone(),
            ])?;
        }
        writer.flush()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Read a gold CSV. A wrong header or an unparseable field is a schema
/// error for the whole file; the ranking engine refuses to guess.
pub fn read_gold(path: &Path) -> Result<Vec<MatchRow>> {
    let malformed = |reason: String| Error::MalformedInput {
        path: path.to_path_buf(),
        reason,
    };

    let mut reader = csv::Reader::from_path(path)
        .map_err(|e| malformed(e.to_string()))?;
    {
        let headers = reader.headers().map_err(|e| malformed(e.to_string()))?;
        let expected = [
            "date",
            "team_a_key",
            "team_a_name",
            "team_b_key",
            "team_b_name",
            "score_a",
            "score_b",
            "competition",
            "source_url",
            "age_context",
            "match_confidence",
        ];
        if headers.iter().ne(expected) {
            return Err(malformed(format!("unexpected header: {headers:?}")));
        }
    }

    let mut rows = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record = record.map_err(|e| malformed(e.to_string()))?;
        let field = |idx: usize| record.get(idx).unwrap_or("").to_string();
        let date = NaiveDate::parse_from_str(&field(0), "%Y-%m-%d")
            .map_err(|e| malformed(format!("row {}: bad date: {e}", line + 2)))?;
        let score_a: u32 = field(5)
            .parse()
            .map_err(|_| malformed(format!("row {}: non-numeric score_a", line + 2)))?;
        let score_b: u32 = field(6)
            .parse()
            .map_err(|_| malformed(format!("row {}: non-numeric score_b", line + 2)))?;
        let age_context = field(9)
            .parse::<AgeContext>()
            .map_err(|_| malformed(format!("row {}: bad age_context", line + 2)))?;
        rows.push(MatchRow {
            date,
            team_a_key: field(1),
            team_a_name: field(2),
            team_b_key: field(3),
            team_b_name: field(4),
            score_a,
            score_b,
            competition: field(7),
            source_url: field(8),
            age_context,
            match_confidence: field(10),
        });
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(date: &str, a: &str, b: &str, sa: u32, sb: u32) -> MatchRow {
        MatchRow {
            date: date.parse().unwrap(),
            team_a_key: a.to_string(),
            team_a_name: a.to_uppercase(),
            team_b_key: b.to_string(),
            team_b_name: b.to_uppercase(),
            score_a: sa,
            score_b: sb,
            competition: String::new(),
            source_url: String::new(),
            age_context: AgeContext::Own,
            match_confidence: "exact".to_string(),
        }
    }

    #[test]
    fn canonical_ordering_swaps_sides() {
        let m = row("2025-03-01", "zulu", "alpha", 4, 1).into_canonical();
        assert_eq!(m.team_a_key, "alpha");
        assert_eq!(m.score_a, 1);
        assert_eq!(m.score_b, 4);
    }

    #[test]
    fn duplicate_primary_keys_collapse() {
        let mut rows = vec![
            row("2025-03-01", "alpha", "bravo", 2, 1),
            row("2025-03-01", "alpha", "bravo", 2, 1),
            row("2025-03-08", "alpha", "bravo", 0, 0),
        ];
        sort_and_dedup(&mut rows);
        assert_eq!(rows.len(), 2);
    }
}
