use std::time::Duration;

use chrono::NaiveDate;

/// Knobs for the two-stage scraping pipeline.
#[derive(Debug, Clone)]
pub struct ScrapeConfig {
    /// Bounded worker pool size for stage 2.
    pub workers: usize,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Jittered inter-request delay per worker, drawn uniformly.
    pub delay_range: (f64, f64),
    /// Exponential backoff schedule between retries of one team.
    pub backoff_secs: [u64; 3],
    /// Fraction of failed teams above which the run fails.
    pub failure_threshold: f64,
    /// Token-overlap floor when picking a profile-search candidate.
    pub search_overlap_min: f64,
    /// Proceed even when stage 1 yields zero rows.
    pub allow_empty_roster: bool,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            workers: 6,
            timeout: Duration::from_secs(30),
            delay_range: (1.5, 3.5),
            backoff_secs: [2, 4, 8],
            failure_threshold: 0.10,
            search_overlap_min: 0.60,
            allow_empty_roster: false,
        }
    }
}

impl ScrapeConfig {
    /// Apply `MAX_WORKERS` from the environment on top of the defaults.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Ok(raw) = std::env::var("MAX_WORKERS") {
            if let Ok(n) = raw.trim().parse::<usize>() {
                if n > 0 {
                    cfg.workers = n;
                }
            }
        }
        cfg
    }
}

/// Tuning constants for the ranking engine (V5.3E-Enhanced).
#[derive(Debug, Clone)]
pub struct RankConfig {
    /// Ranking window in days, relative to the newest match in the input.
    pub window_days: i64,
    /// Most recent views kept per team.
    pub max_views: usize,
    /// Goals counted per view are capped here, as is the margin multiplier.
    pub goal_cap: u32,
    /// Logistic spread for the expected-score curve.
    pub k: f64,
    /// Base learning rate for rating updates.
    pub eta_base: f64,
    /// Gap-damping exponent in the adaptive learning rate.
    pub alpha: f64,
    /// Small-sample damping exponent in the adaptive learning rate.
    pub beta: f64,
    /// Rating multiplier for wins over an older-age opponent.
    pub cross_age_mult: f64,
    /// Fixed rating for opponents absent from every roster.
    pub default_opponent_strength: f64,
    /// Iteration cap for the SOS solver.
    pub max_iters: usize,
    /// Mean-absolute-delta convergence tolerance.
    pub conv_tol: f64,
    /// Games needed for Active status.
    pub active_min_games: u32,
    /// Days since last game beyond which a team is Inactive.
    pub inactive_after_days: i64,
    /// Reference date for status cutoffs; defaults to the newest match date
    /// in the input so reruns on the same gold file are byte-identical.
    pub as_of: Option<NaiveDate>,
}

impl Default for RankConfig {
    fn default() -> Self {
        Self {
            window_days: 365,
            max_views: 30,
            goal_cap: 6,
            k: 4.0,
            eta_base: 0.05,
            alpha: 0.5,
            beta: 0.6,
            cross_age_mult: 1.05,
            default_opponent_strength: 0.35,
            max_iters: 10,
            conv_tol: 0.01,
            active_min_games: 5,
            inactive_after_days: 180,
            as_of: None,
        }
    }
}

/// Power-score component weights. Offense and defense at 0.20 each, strength
/// of schedule at 0.60.
pub const OFFENSE_WEIGHT: f64 = 0.20;
pub const DEFENSE_WEIGHT: f64 = 0.20;
pub const SOS_WEIGHT: f64 = 0.60;

/// Tapered segment weighting: (views in segment, share of total mass).
pub const WEIGHT_SEGMENTS: [(usize, f64); 3] = [(10, 0.60), (15, 0.30), (5, 0.10)];

/// Token-set similarity floor for roster matching.
pub const FUZZY_MATCH_MIN: f64 = 0.85;

/// Games-played knee of the small-sample penalty.
pub const GAMES_PENALTY_FULL: u32 = 20;
