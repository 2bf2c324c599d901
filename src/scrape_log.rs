//! Append-only scrape log.
//!
//! One JSON object per line so the file stays greppable mid-run and
//! parseable after. Per-team faults land here instead of aborting the
//! division.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Serialize;

use crate::error::Result;

#[derive(Debug, Serialize)]
struct LogLine<'a> {
    ts: String,
    division: &'a str,
    team_key: &'a str,
    attempt: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    status_code: Option<u16>,
    reason: &'a str,
}

pub struct ScrapeLog {
    path: PathBuf,
    division: String,
}

impl ScrapeLog {
    pub fn new(path: &Path, division: &str) -> Self {
        Self {
            path: path.to_path_buf(),
            division: division.to_string(),
        }
    }

    pub fn record(
        &self,
        team_key: &str,
        attempt: u32,
        status_code: Option<u16>,
        reason: &str,
    ) -> Result<()> {
        let line = LogLine {
            ts: Utc::now().to_rfc3339(),
            division: &self.division,
            team_key,
            attempt,
            status_code,
            reason,
        };
        self.append(&serde_json::to_string(&line)?)
    }

    /// Run-level events (roster scraped, stage finished) share the file with
    /// per-team errors; `team_key` is empty for them.
    pub fn event(&self, reason: &str) -> Result<()> {
        self.record("", 0, None, reason)
    }

    fn append(&self, line: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{line}")?;
        Ok(())
    }
}
