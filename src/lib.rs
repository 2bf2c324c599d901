//! Schedule-aware rankings for youth soccer divisions.
//!
//! Two subsystems: a two-stage, rate-limited scraping pipeline that turns a
//! division's upstream roster and per-team match histories into bronze and
//! gold CSVs, and a ranking engine that turns the gold table into power
//! scores built on iterative opponent strength.

pub mod config;
pub mod connectivity;
pub mod division_registry;
pub mod error;
pub mod history_fetch;
pub mod http_client;
pub mod match_table;
pub mod opponent_strength;
pub mod profile_cache;
pub mod rank_engine;
pub mod roster_fetch;
pub mod scrape_log;
pub mod team_matcher;
pub mod team_normalizer;
pub mod team_views;

pub use error::{Error, Result};
