use std::path::PathBuf;

use thiserror::Error;

/// Crate-wide error type covering the scraping pipeline and the ranking
/// engine. Per-team faults inside a scrape run are deliberately *not*
/// represented here; they are recorded to the division error log and only
/// surface as `ThresholdExceeded` when too many teams fail.
#[derive(Debug, Error)]
pub enum Error {
    #[error("unknown division '{0}'")]
    UnknownDivision(String),

    #[error("upstream returned zero roster rows for '{0}'")]
    EmptyUpstream(String),

    #[error("transient http failure: {0}")]
    TransientHttp(String),

    #[error("rate limited by upstream: {0}")]
    RateLimited(String),

    #[error("no profile candidate found for team '{0}'")]
    ProfileNotFound(String),

    #[error("malformed match row: {0}")]
    MatchSchemaInvalid(String),

    #[error("{failed} of {attempted} teams failed (limit {limit:.0}%)")]
    ThresholdExceeded {
        failed: usize,
        attempted: usize,
        limit: f64,
    },

    #[error("malformed input file {path}: {reason}")]
    MalformedInput { path: PathBuf, reason: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Process exit code for the CLI. 0 is success, 2 is reserved for clap's
    /// own argument errors.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::UnknownDivision(_) => 3,
            Error::ThresholdExceeded { .. } => 4,
            Error::MalformedInput { .. } | Error::MatchSchemaInvalid(_) => 5,
            _ => 1,
        }
    }
}
