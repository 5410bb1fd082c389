//! dexquery - PokeAPI query and aggregation CLI
//!
//! Runs one query or the configured catalog and writes a JSON run report.
//!
//! Exit codes:
//!   0   - Every query answered
//!   1   - Runtime error, or at least one query was rejected
//!   130 - Interrupted with Ctrl-C

use anyhow::{Context, Result};
use dexquery::cli::Args;
use dexquery::config::{Config, CONFIG_FILE};
use dexquery::query::QueryEngine;
use dexquery::report::{self, RunReport};
use indicatif::{ProgressBar, ProgressStyle};
use std::future::Future;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

const EXIT_CANCELLED: i32 = 130;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse_args();

    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    if args.init_config {
        return handle_init_config();
    }

    let (mut config, source) = match load_config(&args) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    };
    config.merge_with_args(&args);

    init_logging(args.log_level(&config.general))?;

    info!("dexquery v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);
    match source {
        Some(path) => info!("Loaded config from {}", path.display()),
        None => debug!("No config file found, using defaults"),
    }

    match run(args, config).await {
        Ok(exit_code) => std::process::exit(exit_code),
        Err(e) => {
            error!("Run failed: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .dexquery.toml.
fn handle_init_config() -> Result<()> {
    let path = std::path::Path::new(CONFIG_FILE);

    if path.exists() {
        eprintln!("{} already exists. Remove it first or edit it manually.", CONFIG_FILE);
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content).with_context(|| format!("Failed to write {}", CONFIG_FILE))?;

    eprintln!("Created {} with default settings.", CONFIG_FILE);
    Ok(())
}

/// Logs go to stderr; stdout carries only the report.
fn init_logging(level: tracing::Level) -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")
}

async fn run(args: Args, config: Config) -> Result<i32> {
    let start_time = Instant::now();

    let queries = args.command().queries(&config);
    let deadline = config.scan.deadline_seconds.map(Duration::from_secs);
    let engine = QueryEngine::from_config(&config)?;

    info!(
        "Running {} quer{} against {}",
        queries.len(),
        if queries.len() == 1 { "y" } else { "ies" },
        engine.fetcher().base()
    );

    let spinner = if args.quiet {
        ProgressBar::hidden()
    } else {
        new_spinner(queries.len())?
    };

    let results = tokio::select! {
        results = engine.run_catalog(&queries, deadline) => results,
        _ = wait_for_interrupt(tokio::signal::ctrl_c()) => {
            spinner.abandon_with_message("cancelled");
            warn!("Interrupted; discarding partial results");
            return Ok(EXIT_CANCELLED);
        }
    };
    spinner.finish_and_clear();

    let stats = engine.fetcher().stats();
    info!(
        "Fetch stats: {} network attempts, {} cache hits, {} failures",
        stats.network_attempts, stats.cache_hits, stats.failures
    );

    let report = RunReport::build(
        engine.fetcher().base().as_str(),
        &queries,
        results,
        stats,
        start_time.elapsed().as_secs_f64(),
    );

    match config.general.output {
        Some(ref path) => {
            let path = std::path::Path::new(path);
            report::write_json_report(&report, path)?;
            info!("Report saved to {}", path.display());
        }
        None => println!("{}", report::generate_json_report(&report)?),
    }

    if report.metadata.queries_failed > 0 {
        warn!(
            "{} of {} queries failed",
            report.metadata.queries_failed, report.metadata.queries_run
        );
        return Ok(1);
    }
    Ok(0)
}

fn new_spinner(queries: usize) -> Result<ProgressBar> {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}")?);
    spinner.set_message(format!("running {} queries", queries));
    spinner.enable_steady_tick(Duration::from_millis(120));
    Ok(spinner)
}

/// Resolves once `signal` reports an interrupt. If the listener could not
/// be installed the run carries on uninterruptible instead of ending early.
async fn wait_for_interrupt<F>(signal: F)
where
    F: Future<Output = std::io::Result<()>>,
{
    if let Err(e) = signal.await {
        warn!("Cannot listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}

/// Load configuration from file or use defaults, with the file it came from.
fn load_config(args: &Args) -> Result<(Config, Option<PathBuf>)> {
    if let Some(ref config_path) = args.config {
        return Ok((Config::load(config_path)?, Some(config_path.clone())));
    }

    Ok(match Config::load_default()? {
        Some(config) => (config, Some(PathBuf::from(CONFIG_FILE))),
        None => (Config::default(), None),
    })
}
