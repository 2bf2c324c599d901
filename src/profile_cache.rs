//! On-disk profile cache.
//!
//! Maps canonical team keys to the upstream profile identifier discovered
//! through search, so reruns skip the search round-trip. A 404 from the
//! history endpoint invalidates the entry. One mutex serializes writers;
//! the snapshot goes to disk via temp-file-then-rename.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileEntry {
    pub external_id: String,
    pub last_verified_at: String,
}

pub struct ProfileCache {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, ProfileEntry>>,
}

impl ProfileCache {
    /// Load the cache file if present; a missing or unreadable file just
    /// starts empty.
    pub fn load(path: &Path) -> Self {
        let entries = fs::read_to_string(path)
            .ok()
            .and_then(|raw| serde_json::from_str::<BTreeMap<String, ProfileEntry>>(&raw).ok())
            .unwrap_or_default();
        Self {
            path: path.to_path_buf(),
            entries: Mutex::new(entries),
        }
    }

    pub fn get(&self, team_key: &str) -> Option<String> {
        let guard = self.entries.lock().expect("profile cache lock poisoned");
        guard.get(team_key).map(|e| e.external_id.clone())
    }

    pub fn insert(&self, team_key: &str, external_id: &str) -> Result<()> {
        let snapshot = {
            let mut guard = self.entries.lock().expect("profile cache lock poisoned");
            guard.insert(
                team_key.to_string(),
                ProfileEntry {
                    external_id: external_id.to_string(),
                    last_verified_at: Utc::now().to_rfc3339(),
                },
            );
            guard.clone()
        };
        self.persist(&snapshot)
    }

    pub fn invalidate(&self, team_key: &str) -> Result<()> {
        let snapshot = {
            let mut guard = self.entries.lock().expect("profile cache lock poisoned");
            if guard.remove(team_key).is_none() {
                return Ok(());
            }
            guard.clone()
        };
        self.persist(&snapshot)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("profile cache lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn persist(&self, snapshot: &BTreeMap<String, ProfileEntry>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(snapshot)?;
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}
