//! PriceVault CLI: fetch daily prices into SQLite and inspect the store.
//!
//! Commands:
//! - `run`: walk the catalog, fetch `[start, end)` for each ticker, store
//!   prices and trailing returns
//! - `catalog`: print the built-in catalog as TOML
//! - `status`: per-ticker row counts and date span of a store

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use pricevault_core::{
    Catalog, CsvProvider, Pipeline, PipelineConfig, PriceProvider, RunSummary, Store,
    TickerStatus, YahooProvider,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "pricevault=info,pricevault_core=info";

#[derive(Parser)]
#[command(
    name = "pricevault",
    about = "PriceVault: daily OHLCV acquisition into a local SQLite store"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch every catalog ticker over [start, end) and store prices and returns.
    Run {
        /// Start date (YYYY-MM-DD), inclusive.
        #[arg(long)]
        start: String,

        /// End date (YYYY-MM-DD), exclusive.
        #[arg(long)]
        end: String,

        /// SQLite database file. Overrides the config file.
        #[arg(long)]
        db: Option<PathBuf>,

        /// Path to a TOML config file.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Catalog TOML file. Overrides the config file.
        #[arg(long)]
        catalog: Option<PathBuf>,

        /// Read `<SYMBOL>.csv` files from this directory instead of Yahoo Finance.
        #[arg(long)]
        csv_dir: Option<PathBuf>,

        /// Per-request timeout in seconds.
        #[arg(long)]
        timeout_secs: Option<u64>,

        /// Retries after a failed request (default 0).
        #[arg(long)]
        retries: Option<u32>,

        /// Exit with status 1 if any ticker was skipped or failed to write.
        #[arg(long, default_value_t = false)]
        strict: bool,
    },
    /// Print the built-in catalog as TOML.
    Catalog,
    /// Report per-ticker row counts and date ranges in a store.
    Status {
        /// SQLite database file.
        #[arg(long, default_value = "data/pricevault.db")]
        db: PathBuf,
    },
}

struct RunArgs {
    start: String,
    end: String,
    db: Option<PathBuf>,
    config: Option<PathBuf>,
    catalog: Option<PathBuf>,
    csv_dir: Option<PathBuf>,
    timeout_secs: Option<u64>,
    retries: Option<u32>,
    strict: bool,
}

fn main() -> Result<()> {
    let rust_log = std::env::var("RUST_LOG").ok();
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(rust_log.as_deref()))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            start,
            end,
            db,
            config,
            catalog,
            csv_dir,
            timeout_secs,
            retries,
            strict,
        } => run_pipeline(RunArgs {
            start,
            end,
            db,
            config,
            catalog,
            csv_dir,
            timeout_secs,
            retries,
            strict,
        }),
        Commands::Catalog => print_catalog(),
        Commands::Status { db } => run_status(&db),
    }
}

/// `RUST_LOG` as given, or the default filter when it is unset, blank or invalid.
fn log_filter(rust_log: Option<&str>) -> EnvFilter {
    rust_log
        .filter(|s| !s.trim().is_empty())
        .and_then(|s| EnvFilter::try_new(s).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_LOG_FILTER))
}

fn parse_date(value: &str, flag: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .with_context(|| format!("{flag} must be YYYY-MM-DD, got '{value}'"))
}

/// Config file (or defaults), then CLI overrides on top.
fn resolve_config(args: &RunArgs) -> Result<PipelineConfig> {
    let mut config = match &args.config {
        Some(path) => PipelineConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => PipelineConfig::default(),
    };

    if let Some(db) = &args.db {
        config.database = db.clone();
    }
    if let Some(catalog) = &args.catalog {
        config.catalog = Some(catalog.clone());
    }
    if let Some(secs) = args.timeout_secs {
        config.provider.timeout_secs = secs;
    }
    if let Some(retries) = args.retries {
        config.provider.max_retries = retries;
    }
    config.provider.validate()?;
    Ok(config)
}

fn build_provider(
    config: &PipelineConfig,
    csv_dir: Option<&Path>,
) -> Result<Box<dyn PriceProvider>> {
    if let Some(dir) = csv_dir {
        if !dir.is_dir() {
            bail!("--csv-dir {} is not a directory", dir.display());
        }
        return Ok(Box::new(CsvProvider::new(dir)));
    }

    let circuit_breaker = Arc::new(config.provider.circuit_breaker());
    let provider = YahooProvider::new(&config.provider, circuit_breaker)
        .context("building Yahoo Finance client")?;
    Ok(Box::new(provider))
}

fn run_pipeline(args: RunArgs) -> Result<()> {
    let start = parse_date(&args.start, "--start")?;
    let end = parse_date(&args.end, "--end")?;

    let config = resolve_config(&args)?;
    let catalog = config.load_catalog().context("loading catalog")?;
    info!(
        tickers = catalog.ticker_count(),
        asset_classes = catalog.asset_classes().len(),
        "catalog loaded"
    );
    let provider = build_provider(&config, args.csv_dir.as_deref())?;

    let store = Store::initialize(&config.database)
        .with_context(|| format!("opening store {}", config.database.display()))?;

    let mut pipeline = Pipeline::new(catalog, provider, store);
    let summary = pipeline.run(start, end)?;

    let mut store = pipeline.into_store();
    store.close().context("closing store")?;

    print_summary(
        &summary,
        start,
        end,
        store.path().unwrap_or(&config.database),
    );

    if args.strict && !summary.all_succeeded() {
        std::process::exit(1);
    }
    Ok(())
}

fn print_catalog() -> Result<()> {
    let catalog = Catalog::default_catalog();
    let toml = catalog.to_toml().context("serializing catalog")?;
    println!(
        "# {} tickers across {} asset classes",
        catalog.ticker_count(),
        catalog.asset_classes().len()
    );
    print!("{toml}");
    Ok(())
}

fn run_status(db: &Path) -> Result<()> {
    if !db.exists() {
        println!("Store does not exist: {}", db.display());
        return Ok(());
    }

    let mut store =
        Store::initialize(db).with_context(|| format!("opening store {}", db.display()))?;
    let rows = store.summary().context("reading store summary")?;
    store.close().context("closing store")?;

    if rows.is_empty() {
        println!("Store is empty: {}", db.display());
        return Ok(());
    }

    info!(tickers = rows.len(), "store summary read");
    println!("Store: {}", db.display());
    println!("Tickers: {}", rows.len());
    println!();
    println!(
        "{:<8} {:<13} {:<25} {:>8} {:>8}",
        "Ticker", "Class", "Date Range", "Prices", "Returns"
    );
    println!("{}", "-".repeat(66));
    for row in &rows {
        let range = match (row.first_date, row.last_date) {
            (Some(first), Some(last)) => format!("{first} to {last}"),
            _ => "(no dates)".into(),
        };
        println!(
            "{:<8} {:<13} {:<25} {:>8} {:>8}",
            row.ticker,
            row.asset_class.as_deref().unwrap_or("-"),
            range,
            row.price_rows,
            row.return_rows
        );
    }

    Ok(())
}

fn print_summary(summary: &RunSummary, start: NaiveDate, end: NaiveDate, db: &Path) {
    println!();
    println!("=== Run Summary ===");
    println!("Period:   {start} to {end} (end exclusive)");
    println!("Store:    {}", db.display());
    println!("Tickers:  {}", summary.total);
    println!("Stored:   {}", summary.stored);
    println!("Skipped:  {}", summary.skipped);
    println!("Failed:   {}", summary.failed);

    let problems: Vec<_> = summary
        .outcomes
        .iter()
        .filter(|o| !matches!(o.status, TickerStatus::Stored { .. }))
        .collect();
    if !problems.is_empty() {
        println!();
        for outcome in problems {
            let detail = match &outcome.status {
                TickerStatus::Skipped(reason) => format!("skipped: {reason}"),
                TickerStatus::WriteFailed(err) => format!("write failed: {err}"),
                TickerStatus::Stored { .. } => continue,
            };
            println!(
                "  {:<8} [{}] {detail}",
                outcome.instrument.symbol, outcome.instrument.asset_class
            );
        }
    }
    println!();
}
