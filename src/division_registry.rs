//! Division registry.
//!
//! Single source of truth mapping a division key like `az_boys_u11` to its
//! upstream roster URL and on-disk artifact paths. Loaded once at process
//! start from `data/divisions.json`; never mutated.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Gender {
    #[serde(rename = "m")]
    Male,
    #[serde(rename = "f")]
    Female,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Division {
    pub display_name: String,
    pub age: u8,
    pub gender: Gender,
    pub state: String,
    pub roster_url: String,
    pub active: bool,
}

/// Artifact locations for one division. `CACHE_DIR` overrides the cache
/// subdirectory.
#[derive(Debug, Clone)]
pub struct DivisionPaths {
    pub bronze_roster: PathBuf,
    pub gold_matches: PathBuf,
    pub profile_cache: PathBuf,
    pub error_log: PathBuf,
    pub scrape_summary: PathBuf,
    pub rankings: PathBuf,
    pub connectivity: PathBuf,
}

pub struct DivisionRegistry {
    divisions: BTreeMap<String, Division>,
    data_root: PathBuf,
}

impl DivisionRegistry {
    /// Load and validate `data/divisions.json` under `data_root`.
    pub fn load(data_root: &Path) -> Result<Self> {
        let path = data_root.join("data").join("divisions.json");
        let raw = fs::read_to_string(&path).map_err(|e| Error::MalformedInput {
            path: path.clone(),
            reason: format!("cannot read registry: {e}"),
        })?;
        let divisions: BTreeMap<String, Division> =
            serde_json::from_str(&raw).map_err(|e| Error::MalformedInput {
                path: path.clone(),
                reason: format!("invalid registry json: {e}"),
            })?;
        for (key, division) in &divisions {
            if !(10..=19).contains(&division.age) {
                return Err(Error::MalformedInput {
                    path: path.clone(),
                    reason: format!("division '{key}': age {} out of range", division.age),
                });
            }
            if division.state.len() != 2 {
                return Err(Error::MalformedInput {
                    path: path.clone(),
                    reason: format!("division '{key}': state must be a two-letter code"),
                });
            }
        }
        Ok(Self {
            divisions,
            data_root: data_root.to_path_buf(),
        })
    }

    pub fn get(&self, key: &str) -> Result<&Division> {
        self.divisions
            .get(key)
            .ok_or_else(|| Error::UnknownDivision(key.to_string()))
    }

    pub fn active_keys(&self) -> Vec<&str> {
        self.divisions
            .iter()
            .filter(|(_, d)| d.active)
            .map(|(k, _)| k.as_str())
            .collect()
    }

    pub fn known_keys(&self) -> Vec<&str> {
        self.divisions.keys().map(|k| k.as_str()).collect()
    }

    /// Key of the same division one age band up/down, if registered.
    /// Keys follow the `{state}_{gender}_u{age}` convention.
    pub fn adjacent_key(&self, key: &str, delta: i8) -> Option<String> {
        let division = self.divisions.get(key)?;
        let age = division.age.checked_add_signed(delta)?;
        let idx = key.rfind("_u")?;
        let candidate = format!("{}_u{}", &key[..idx], age);
        self.divisions.contains_key(&candidate).then_some(candidate)
    }

    pub fn paths(&self, key: &str) -> DivisionPaths {
        let cache_dir = std::env::var("CACHE_DIR")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| self.data_root.join("cache"));
        DivisionPaths {
            bronze_roster: self.data_root.join("bronze").join(format!("{key}_teams.csv")),
            gold_matches: self.data_root.join("gold").join(format!("matches_{key}.csv")),
            profile_cache: cache_dir.join(format!("profiles_{key}.json")),
            error_log: self
                .data_root
                .join("logs")
                .join(format!("scrape_errors_{key}.log")),
            scrape_summary: self
                .data_root
                .join("logs")
                .join(format!("scrape_summary_{key}.json")),
            rankings: self
                .data_root
                .join("outputs")
                .join(format!("rankings_{key}.csv")),
            connectivity: self
                .data_root
                .join("outputs")
                .join(format!("connectivity_{key}.csv")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adjacent_keys_follow_the_age_convention() {
        let mut divisions = BTreeMap::new();
        for age in [10u8, 11, 12] {
            divisions.insert(
                format!("az_boys_u{age}"),
                Division {
                    display_name: format!("AZ Boys U{age}"),
                    age,
                    gender: Gender::Male,
                    state: "az".to_string(),
                    roster_url: String::new(),
                    active: true,
                },
            );
        }
        let registry = DivisionRegistry {
            divisions,
            data_root: PathBuf::from("."),
        };
        assert_eq!(
            registry.adjacent_key("az_boys_u11", 1).as_deref(),
            Some("az_boys_u12")
        );
        assert_eq!(
            registry.adjacent_key("az_boys_u11", -1).as_deref(),
            Some("az_boys_u10")
        );
        assert_eq!(registry.adjacent_key("az_boys_u12", 1), None);
    }
}
