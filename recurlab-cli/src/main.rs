//! RecurLab CLI: download, run, and cache inspection commands.
//!
//! Commands:
//! - `download`: fetch daily bars from Yahoo Finance and cache them as Parquet
//! - `run`: backtest a recurring contribution plan over one or more tickers
//! - `cache status`: report cached symbols, date ranges and sizes

use anyhow::{Context, Result};
use chrono::{Months, NaiveDate};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use recurlab_core::data::{
    cache_key, download_symbols, CircuitBreaker, DataProvider, ParquetCache, StdoutProgress, YahooProvider,
    DEFAULT_TICKERS,
};
use recurlab_core::{Frequency, Norm};
use recurlab_runner::{
    format_batch_table, format_summary, run_batch, save_artifacts, BatchReport, RunFile, RunSettings,
};

#[derive(Parser)]
#[command(name = "recurlab", about = "RecurLab CLI: recurring investment backtester")]
struct Cli {
    /// Debug-level logging (RUST_LOG takes precedence).
    #[arg(long, short, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download market data from Yahoo Finance and cache as Parquet.
    Download {
        /// Symbols to download (e.g., VOO QQQ BTC-USD). Defaults to the built-in list.
        symbols: Vec<String>,

        /// Start date (YYYY-MM-DD). Defaults to 10 years before the end date.
        #[arg(long)]
        start: Option<NaiveDate>,

        /// End date (YYYY-MM-DD). Defaults to today.
        #[arg(long)]
        end: Option<NaiveDate>,

        /// Force re-download even if cached.
        #[arg(long, default_value_t = false)]
        force: bool,

        /// Cache directory.
        #[arg(long, default_value = "data")]
        cache_dir: PathBuf,
    },
    /// Backtest a recurring contribution plan.
    Run(RunArgs),
    /// Cache inspection commands.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Report cached symbols, date ranges and sizes.
    Status {
        /// Only report these symbols (cached or not).
        symbols: Vec<String>,

        /// Cache directory.
        #[arg(long, default_value = "data")]
        cache_dir: PathBuf,
    },
}

/// Flags for `run`. Each one overrides the matching run file field.
#[derive(Args, Debug, Default)]
struct RunArgs {
    /// Path to a TOML run file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Comma-separated tickers (e.g., VOO,QQQ,BTC-USD).
    #[arg(long, value_delimiter = ',')]
    tickers: Vec<String>,

    /// Universe name ("default") or path to a universe TOML file.
    #[arg(long)]
    universe: Option<String>,

    /// daily, weekly or monthly.
    #[arg(long)]
    frequency: Option<Frequency>,

    /// Currency amount per contribution.
    #[arg(long)]
    amount: Option<u64>,

    /// Weekday (0 = Monday) for weekly, day of month (1-31) for monthly.
    #[arg(long)]
    day: Option<u32>,

    /// Price scaling factor.
    #[arg(long)]
    norm: Option<f64>,

    /// Start date (YYYY-MM-DD).
    #[arg(long)]
    start: Option<NaiveDate>,

    /// End date (YYYY-MM-DD).
    #[arg(long)]
    end: Option<NaiveDate>,

    /// Offline mode: no network access.
    #[arg(long, default_value_t = false)]
    offline: bool,

    /// Use synthetic data as fallback.
    #[arg(long, default_value_t = false)]
    synthetic: bool,

    /// Re-download even if cached.
    #[arg(long, default_value_t = false)]
    force: bool,

    /// Cache directory.
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Folder of yfinance CSV exports named {ticker}.csv.
    #[arg(long)]
    csv_dir: Option<PathBuf>,

    /// Write result.json, fills.csv and equity.csv per ticker here.
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Worker threads for the batch.
    #[arg(long)]
    threads: Option<usize>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Download {
            symbols,
            start,
            end,
            force,
            cache_dir,
        } => run_download(symbols, start, end, force, cache_dir),
        Commands::Run(args) => run_backtest_cmd(&args),
        Commands::Cache { action } => match action {
            CacheAction::Status { symbols, cache_dir } => run_cache_status(&cache_dir, &symbols),
        },
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

fn yahoo_provider() -> Result<YahooProvider> {
    let circuit_breaker = Arc::new(CircuitBreaker::default_provider());
    YahooProvider::new(circuit_breaker).context("failed to build Yahoo Finance client")
}

fn run_download(
    symbols: Vec<String>,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    force: bool,
    cache_dir: PathBuf,
) -> Result<()> {
    let end_date = end.unwrap_or_else(today);
    let start_date = match start {
        Some(start) => start,
        None => end_date
            .checked_sub_months(Months::new(12 * 10))
            .context("end date too early for a 10-year lookback")?,
    };

    let symbols: Vec<String> = if symbols.is_empty() {
        DEFAULT_TICKERS.iter().map(|s| s.to_string()).collect()
    } else {
        symbols
    };

    let provider = yahoo_provider()?;
    let cache = ParquetCache::new(cache_dir);
    let progress = StdoutProgress;

    let summary = download_symbols(&provider, &cache, &symbols, start_date, end_date, force, &progress);

    if !summary.all_succeeded() {
        for (sym, err) in &summary.errors {
            eprintln!("Error for {sym}: {err}");
        }
        std::process::exit(1);
    }

    Ok(())
}

/// Run file (or defaults) with command-line overrides applied, resolved against `today`.
fn build_settings(args: &RunArgs, today: NaiveDate) -> Result<RunSettings> {
    let mut file = match &args.config {
        Some(path) => RunFile::from_file(path)?,
        None => RunFile::default(),
    };

    if !args.tickers.is_empty() {
        file.tickers = args.tickers.clone();
    } else if let Some(universe) = &args.universe {
        file.tickers.clear();
        file.universe = Some(universe.clone());
    }

    if let Some(frequency) = args.frequency {
        // A day key belongs to the frequency it was written for.
        if frequency != file.contribution.frequency && args.day.is_none() {
            file.contribution.day = None;
        }
        file.contribution.frequency = frequency;
    }
    if let Some(amount) = args.amount {
        file.contribution.amount = amount;
    }
    if args.day.is_some() {
        file.contribution.day = args.day;
    }
    if let Some(norm) = args.norm {
        file.norm = Norm::new(norm).context("invalid --norm")?;
    }

    if args.start.is_some() {
        file.data.start = args.start;
    }
    if args.end.is_some() {
        file.data.end = args.end;
    }
    file.data.offline |= args.offline;
    file.data.synthetic |= args.synthetic;
    file.data.force |= args.force;
    if let Some(dir) = &args.cache_dir {
        file.data.cache_dir = dir.clone();
    }
    if args.csv_dir.is_some() {
        file.data.csv_dir = args.csv_dir.clone();
    }
    if args.output_dir.is_some() {
        file.output.dir = args.output_dir.clone();
    }
    if args.threads.is_some() {
        file.output.threads = args.threads;
    }

    Ok(file.resolve(today)?)
}

fn run_backtest_cmd(args: &RunArgs) -> Result<()> {
    let settings = build_settings(args, today())?;

    // Set up cache + provider
    let cache = ParquetCache::new(&settings.cache_dir);
    let provider = if settings.load.offline {
        None
    } else {
        Some(yahoo_provider()?)
    };
    let provider_ref = provider.as_ref().map(|p| p as &dyn DataProvider);

    let report = run_batch(&settings, &cache, provider_ref);
    let failed = print_report(&report, settings.output_dir.as_deref());

    if failed > 0 {
        std::process::exit(1);
    }
    Ok(())
}

/// Print every ticker's outcome and save its artifacts.
///
/// Returns the number of tickers that failed, counting artifact write
/// failures. One ticker's failure never stops the others from printing.
fn print_report(report: &BatchReport, output_dir: Option<&Path>) -> usize {
    let mut failed = report.failed_count();

    for outcome in &report.outcomes {
        match &outcome.result {
            Ok(result) => {
                println!("{}", format_summary(result));
                if let Some(dir) = output_dir {
                    match save_artifacts(result, dir) {
                        Ok(run_dir) => println!("Artifacts saved to: {}", run_dir.display()),
                        Err(e) => {
                            eprintln!("Saving artifacts for {} failed: {e:#}", outcome.symbol);
                            failed += 1;
                        }
                    }
                }
                println!();
            }
            Err(e) => eprintln!("Backtest for {} failed: {e}", outcome.symbol),
        }
    }

    if report.outcomes.len() > 1 {
        println!("{}", format_batch_table(report));
    }
    failed
}

fn run_cache_status(cache_dir: &Path, symbols: &[String]) -> Result<()> {
    if !cache_dir.exists() {
        println!("Cache directory does not exist: {}", cache_dir.display());
        return Ok(());
    }

    let cache = ParquetCache::new(cache_dir);
    let symbols = if symbols.is_empty() {
        cached_symbols(cache_dir)?
    } else {
        symbols.iter().map(|s| cache_key(s)).collect()
    };

    if symbols.is_empty() {
        println!("Cache is empty: {}", cache_dir.display());
        return Ok(());
    }

    let mut total_size: u64 = 0;
    println!("Cache: {}", cache_dir.display());
    println!();
    println!("{:<10} {:<25} {:<12} {:>10}", "Symbol", "Date Range", "Bars", "Size");
    println!("{}", "-".repeat(60));

    for status in cache.status(&symbols) {
        let (range, bars) = match (status.start_date, status.end_date, status.bar_count) {
            (Some(start), Some(end), Some(count)) => (format!("{start} to {end}"), format!("{count} bars")),
            _ => ("(not cached)".to_string(), "-".to_string()),
        };
        let size = dir_size(&cache_dir.join(format!("symbol={}", status.symbol)));
        total_size += size;
        println!("{:<10} {:<25} {:<12} {:>10}", status.symbol, range, bars, format_size(size));
    }

    println!();
    println!("Symbols: {}", symbols.len());
    println!("Total size: {}", format_size(total_size));
    Ok(())
}

fn cached_symbols(cache_dir: &Path) -> Result<Vec<String>> {
    let mut symbols = Vec::new();
    for entry in std::fs::read_dir(cache_dir)
        .with_context(|| format!("failed to read cache dir: {}", cache_dir.display()))?
    {
        let name = entry?.file_name().to_string_lossy().to_string();
        if let Some(symbol) = name.strip_prefix("symbol=") {
            symbols.push(symbol.to_string());
        }
    }
    symbols.sort();
    Ok(symbols)
}

fn dir_size(path: &Path) -> u64 {
    let mut size = 0u64;
    if let Ok(entries) = std::fs::read_dir(path) {
        for entry in entries.flatten() {
            if let Ok(meta) = entry.metadata() {
                size += meta.len();
            }
        }
    }
    size
}

fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recurlab_core::ContributionConfig;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn parse_run(argv: &[&str]) -> RunArgs {
        let cli = Cli::try_parse_from(argv).unwrap();
        match cli.command {
            Commands::Run(args) => args,
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn defaults_match_builtin_plan() {
        let settings = build_settings(&RunArgs::default(), day(2025, 1, 15)).unwrap();

        assert_eq!(settings.tickers.len(), DEFAULT_TICKERS.len());
        assert_eq!(
            settings.contribution,
            ContributionConfig::new(Frequency::Weekly, 100, Some(2)).unwrap()
        );
        assert_eq!(settings.load.start, day(2015, 1, 15));
        assert_eq!(settings.load.end, day(2025, 1, 15));
        assert_eq!(settings.output_dir, None);
    }

    #[test]
    fn flags_override_defaults() {
        let args = parse_run(&[
            "recurlab",
            "run",
            "--tickers",
            "voo,btc-usd",
            "--frequency",
            "monthly",
            "--day",
            "15",
            "--amount",
            "250",
            "--start",
            "2020-01-01",
            "--end",
            "2020-12-31",
            "--offline",
        ]);

        let settings = build_settings(&args, day(2025, 1, 1)).unwrap();

        assert_eq!(settings.tickers, vec!["VOO", "BTC-USD"]);
        assert_eq!(
            settings.contribution,
            ContributionConfig::new(Frequency::Monthly, 250, Some(15)).unwrap()
        );
        assert_eq!(settings.load.start, day(2020, 1, 1));
        assert!(settings.load.offline);
    }

    #[test]
    fn invalid_day_is_rejected_before_running() {
        let args = parse_run(&["recurlab", "run", "--frequency", "weekly", "--day", "7"]);

        let err = build_settings(&args, day(2025, 1, 1)).unwrap_err();

        assert!(err.to_string().contains("out of range"));
    }

    #[test]
    fn changing_frequency_drops_the_old_day() {
        let args = parse_run(&["recurlab", "run", "--frequency", "monthly"]);

        let err = build_settings(&args, day(2025, 1, 1)).unwrap_err();

        assert!(err.to_string().contains("must be specified for monthly"));
    }

    #[test]
    fn same_frequency_keeps_the_configured_day() {
        let args = parse_run(&["recurlab", "run", "--frequency", "weekly"]);

        let settings = build_settings(&args, day(2025, 1, 1)).unwrap();

        assert_eq!(settings.contribution.day(), Some(2));
    }

    fn result_for(symbol: &str) -> recurlab_runner::BacktestResult {
        use recurlab_core::data::{RawBar, RawDate};
        let bars: Vec<RawBar> = (2..=5)
            .map(|d| RawBar {
                date: RawDate::Day(day(2024, 1, d)),
                open: 10.0,
                high: 10.0,
                low: 10.0,
                close: 10.0,
                volume: 1,
            })
            .collect();
        let config = ContributionConfig::new(Frequency::Daily, 100, None).unwrap();
        recurlab_runner::run_backtest_from_bars(symbol, &bars, &config, Norm::DEFAULT).unwrap()
    }

    #[test]
    fn artifact_failure_is_counted_and_later_tickers_still_saved() {
        let dir = tempfile::tempdir().unwrap();
        // A plain file where AAA's artifact directory should go.
        std::fs::write(dir.path().join("AAA"), b"in the way").unwrap();
        let report = BatchReport {
            outcomes: vec![
                recurlab_runner::TickerOutcome {
                    symbol: "AAA".into(),
                    result: Ok(result_for("AAA")),
                },
                recurlab_runner::TickerOutcome {
                    symbol: "BBB".into(),
                    result: Ok(result_for("BBB")),
                },
            ],
        };

        let failed = print_report(&report, Some(dir.path()));

        assert_eq!(failed, 1);
        assert!(dir.path().join("BBB").join("result.json").exists());
    }

    #[test]
    fn unknown_frequency_fails_to_parse() {
        assert!(Cli::try_parse_from(["recurlab", "run", "--frequency", "hourly"]).is_err());
    }

    #[test]
    fn flags_override_run_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plan.toml");
        std::fs::write(
            &path,
            "tickers = [\"KO\"]\n[contribution]\nfrequency = \"daily\"\namount = 20\n[output]\ndir = \"out\"\n",
        )
        .unwrap();
        let path_arg = path.to_string_lossy().to_string();
        let args = parse_run(&["recurlab", "run", "--config", &path_arg, "--amount", "40"]);

        let settings = build_settings(&args, day(2025, 1, 1)).unwrap();

        assert_eq!(settings.tickers, vec!["KO"]);
        assert_eq!(settings.contribution.amount(), 40);
        assert_eq!(settings.contribution.frequency(), Frequency::Daily);
        assert_eq!(settings.output_dir, Some(PathBuf::from("out")));
    }

    #[test]
    fn format_size_units() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2.0 KB");
        assert_eq!(format_size(3 * 1024 * 1024), "3.0 MB");
    }
}
