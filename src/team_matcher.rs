//! Tiered opponent resolution.
//!
//! Raw opponent names from scraped match rows are resolved against the
//! canonical registry in three passes: exact key equality, reduced-key
//! equality (age/gender tokens dropped, club abbreviations expanded), then
//! token-set similarity. Anything below the fuzzy floor becomes a
//! synthesized external team that is counted for schedule strength but
//! never ranked.

use std::collections::HashMap;

use crate::config::FUZZY_MATCH_MIN;
use crate::error::{Error, Result};
use crate::match_table::AgeContext;
use crate::team_normalizer::{normalize_team_name, reduce_team_key, token_set_similarity};

/// Which roster an entry came from, relative to the division being scraped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AgeBand {
    Own,
    Older,
    Younger,
}

impl AgeBand {
    pub fn age_context(self) -> AgeContext {
        match self {
            AgeBand::Own => AgeContext::Own,
            AgeBand::Older => AgeContext::Older,
            AgeBand::Younger => AgeContext::Younger,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RegistryEntry {
    pub team_key: String,
    pub display_name: String,
    pub state: Option<String>,
    pub external_id: Option<String>,
    pub band: AgeBand,
}

/// How a name was resolved, in decreasing order of trust.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchTier {
    Exact,
    Normalized,
    Fuzzy(f64),
    External,
}

#[derive(Debug, Clone)]
pub struct Resolution {
    pub team_key: String,
    pub display_name: String,
    pub tier: MatchTier,
    pub confidence: f64,
    pub band: Option<AgeBand>,
}

impl Resolution {
    /// Value for the gold `match_confidence` column.
    pub fn confidence_label(&self, upstream_id: Option<&str>) -> String {
        match &self.tier {
            MatchTier::Exact => "exact".to_string(),
            MatchTier::Normalized => "normalized".to_string(),
            MatchTier::Fuzzy(score) => format!("fuzzy:{score:.2}"),
            MatchTier::External => {
                format!("external:{}", upstream_id.unwrap_or("unresolved"))
            }
        }
    }
}

/// Canonical team registry for one division, optionally unioned with the
/// adjacent-age rosters. Own-roster entries take precedence at every tier.
pub struct TeamRegistry {
    entries: Vec<RegistryEntry>,
    by_key: HashMap<String, usize>,
    by_reduced: HashMap<String, usize>,
}

impl TeamRegistry {
    pub fn new(mut raw: Vec<RegistryEntry>) -> Self {
        // Own before older before younger, so first-wins collision handling
        // below prefers the division's own roster.
        raw.sort_by(|a, b| a.band.cmp(&b.band).then(a.team_key.cmp(&b.team_key)));

        let mut entries: Vec<RegistryEntry> = Vec::with_capacity(raw.len());
        let mut by_key: HashMap<String, usize> = HashMap::new();
        let mut by_reduced: HashMap<String, usize> = HashMap::new();
        for entry in raw {
            if let Some(&prev) = by_key.get(&entry.team_key) {
                log::warn!(
                    "registry collision on '{}': keeping '{}', ignoring '{}'",
                    entry.team_key,
                    entries[prev].display_name,
                    entry.display_name
                );
                continue;
            }
            let idx = entries.len();
            by_key.insert(entry.team_key.clone(), idx);
            by_reduced
                .entry(reduce_team_key(&entry.team_key))
                .or_insert(idx);
            entries.push(entry);
        }
        Self {
            entries,
            by_key,
            by_reduced,
        }
    }

    pub fn entries(&self) -> &[RegistryEntry] {
        &self.entries
    }

    pub fn lookup_key(&self, team_key: &str) -> Option<&RegistryEntry> {
        self.by_key.get(team_key).map(|idx| &self.entries[*idx])
    }

    /// Resolve a raw opponent name. Empty input is a schema error; no match
    /// synthesizes an `ext::` team.
    pub fn resolve(&self, raw_name: &str) -> Result<Resolution> {
        if raw_name.trim().is_empty() {
            return Err(Error::MatchSchemaInvalid(
                "empty opponent name".to_string(),
            ));
        }
        let key = normalize_team_name(raw_name);

        if let Some(&idx) = self.by_key.get(&key) {
            let entry = &self.entries[idx];
            return Ok(Resolution {
                team_key: entry.team_key.clone(),
                display_name: entry.display_name.clone(),
                tier: MatchTier::Exact,
                confidence: 1.0,
                band: Some(entry.band),
            });
        }

        let reduced = reduce_team_key(&key);
        if let Some(&idx) = self.by_reduced.get(&reduced) {
            let entry = &self.entries[idx];
            return Ok(Resolution {
                team_key: entry.team_key.clone(),
                display_name: entry.display_name.clone(),
                tier: MatchTier::Normalized,
                confidence: 0.95,
                band: Some(entry.band),
            });
        }

        if let Some((idx, score)) = self.best_fuzzy(&key) {
            let entry = &self.entries[idx];
            return Ok(Resolution {
                team_key: entry.team_key.clone(),
                display_name: entry.display_name.clone(),
                tier: MatchTier::Fuzzy(score),
                confidence: score,
                band: Some(entry.band),
            });
        }

        Ok(Resolution {
            team_key: format!("ext::{key}"),
            display_name: raw_name.trim().to_string(),
            tier: MatchTier::External,
            confidence: 0.0,
            band: None,
        })
    }

    /// Highest token-set similarity at or above the floor. Ties break toward
    /// the shorter registry name, then lexicographic key for determinism.
    fn best_fuzzy(&self, key: &str) -> Option<(usize, f64)> {
        let mut best: Option<(usize, f64)> = None;
        for (idx, entry) in self.entries.iter().enumerate() {
            let score = token_set_similarity(key, &entry.team_key);
            if score < FUZZY_MATCH_MIN {
                continue;
            }
            let better = match best {
                None => true,
                Some((prev_idx, prev_score)) => {
                    if (score - prev_score).abs() > f64::EPSILON {
                        score > prev_score
                    } else {
                        let prev = &self.entries[prev_idx];
                        let len_cmp = entry.display_name.len().cmp(&prev.display_name.len());
                        len_cmp.is_lt()
                            || (len_cmp.is_eq() && entry.team_key < prev.team_key)
                    }
                }
            };
            if better {
                best = Some((idx, score));
            }
        }
        best
    }
}
