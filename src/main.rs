//! Division ranking CLI.
//!
//! Thin shell over the library: pick a division, run the scraping stages
//! and/or the ranking engine, exit with a taxonomy-mapped code.

use std::path::Path;
use std::process::ExitCode;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};

use divrank::config::{RankConfig, ScrapeConfig};
use divrank::connectivity::{connectivity_report, write_connectivity};
use divrank::division_registry::DivisionRegistry;
use divrank::error::{Error, Result};
use divrank::history_fetch::scrape_matches;
use divrank::http_client::init_http_client;
use divrank::match_table::read_gold;
use divrank::rank_engine::{rank_division, write_rankings};
use divrank::roster_fetch::{read_bronze, scrape_roster, RosterTeam};
use divrank::team_views::AdjacentRosters;

#[derive(Parser)]
#[command(name = "divrank")]
#[command(about = "Schedule-aware youth soccer division rankings", long_about = None)]
struct Cli {
    /// Division key, e.g. az_boys_u11
    #[arg(short, long)]
    division: String,

    /// Stage-2 worker pool size
    #[arg(long)]
    workers: Option<usize>,

    /// Per-request timeout
    #[arg(long)]
    timeout_seconds: Option<u64>,

    /// Ranking window in days
    #[arg(long)]
    window_days: Option<i64>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Stage 1: fetch the division roster into the bronze CSV
    ScrapeTeams,
    /// Stage 2: fetch per-team match histories into the gold CSV
    ScrapeMatches,
    /// Run the ranking engine over the gold CSV
    Rank,
    /// All three stages in order
    All,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let registry = DivisionRegistry::load(Path::new("."));
            let log_hint = registry
                .ok()
                .map(|r| r.paths(&cli.division).error_log)
                .map(|p| format!(" (details: {})", p.display()))
                .unwrap_or_default();
            eprintln!("divrank: {err}{log_hint}");
            ExitCode::from(err.exit_code() as u8)
        }
    }
}

fn run(cli: &Cli) -> Result<()> {
    let registry = DivisionRegistry::load(Path::new("."))?;
    let division = registry.get(&cli.division).map_err(|e| {
        if matches!(e, Error::UnknownDivision(_)) {
            log::info!("known divisions: {}", registry.known_keys().join(", "));
        }
        e
    })?;
    log::info!("division: {} ({})", cli.division, division.display_name);

    let mut scrape_cfg = ScrapeConfig::from_env();
    if let Some(workers) = cli.workers {
        scrape_cfg.workers = workers.max(1);
    }
    if let Some(secs) = cli.timeout_seconds {
        scrape_cfg.timeout = Duration::from_secs(secs);
    }
    init_http_client(scrape_cfg.timeout)?;

    let mut rank_cfg = RankConfig::default();
    if let Some(days) = cli.window_days {
        rank_cfg.window_days = days;
    }

    match cli.command {
        Commands::ScrapeTeams => {
            run_scrape_teams(&registry, &cli.division, &scrape_cfg)?;
        }
        Commands::ScrapeMatches => {
            let roster = load_roster(&registry, &cli.division)?;
            run_scrape_matches(&registry, &cli.division, &roster, &scrape_cfg)?;
        }
        Commands::Rank => {
            let roster = load_roster(&registry, &cli.division)?;
            run_rank(&registry, &cli.division, &roster, &rank_cfg)?;
        }
        Commands::All => {
            let roster = run_scrape_teams(&registry, &cli.division, &scrape_cfg)?;
            run_scrape_matches(&registry, &cli.division, &roster, &scrape_cfg)?;
            run_rank(&registry, &cli.division, &roster, &rank_cfg)?;
        }
    }
    Ok(())
}

fn run_scrape_teams(
    registry: &DivisionRegistry,
    division_key: &str,
    cfg: &ScrapeConfig,
) -> Result<Vec<RosterTeam>> {
    let result = scrape_roster(registry, division_key, cfg)?;
    println!(
        "{division_key}: {} roster teams -> {}",
        result.teams.len(),
        result.bronze_path.display()
    );
    Ok(result.teams)
}

fn run_scrape_matches(
    registry: &DivisionRegistry,
    division_key: &str,
    roster: &[RosterTeam],
    cfg: &ScrapeConfig,
) -> Result<()> {
    let cancel = Arc::new(AtomicBool::new(false));
    let result = scrape_matches(registry, division_key, roster, cfg, cancel)?;
    println!(
        "{division_key}: {} match rows ({}/{} teams, {} zero-match, {} failed) -> {}",
        result.rows_written,
        result.summary.succeeded,
        result.summary.attempted,
        result.summary.zero_match,
        result.summary.failed,
        result.gold_path.display()
    );
    Ok(())
}

fn run_rank(
    registry: &DivisionRegistry,
    division_key: &str,
    roster: &[RosterTeam],
    cfg: &RankConfig,
) -> Result<()> {
    let division = registry.get(division_key)?;
    let paths = registry.paths(division_key);
    let rows = read_gold(&paths.gold_matches)?;
    let adjacent = load_adjacent(registry, division_key);

    let (ranked, summary) = rank_division(&rows, roster, &adjacent, &division.state, cfg);
    write_rankings(&paths.rankings, &ranked)?;
    write_connectivity(&paths.connectivity, &connectivity_report(&rows, roster))?;

    println!(
        "{division_key}: ranked {} teams in {} iterations ({}) -> {}",
        summary.teams_ranked,
        summary.iterations,
        if summary.converged {
            "converged"
        } else {
            "iteration cap"
        },
        paths.rankings.display()
    );
    Ok(())
}

fn load_roster(registry: &DivisionRegistry, division_key: &str) -> Result<Vec<RosterTeam>> {
    let path = registry.paths(division_key).bronze_roster;
    if !path.exists() {
        return Err(Error::MalformedInput {
            path,
            reason: "bronze roster missing; run scrape-teams first".to_string(),
        });
    }
    read_bronze(&path)
}

fn load_adjacent(registry: &DivisionRegistry, division_key: &str) -> AdjacentRosters {
    let read = |delta: i8| -> Vec<RosterTeam> {
        registry
            .adjacent_key(division_key, delta)
            .map(|key| registry.paths(&key).bronze_roster)
            .and_then(|path| read_bronze(&path).ok())
            .unwrap_or_default()
    };
    AdjacentRosters {
        older: read(1),
        younger: read(-1),
    }
}
