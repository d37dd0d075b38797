//! Backtest runner: wires together data loading, normalization, the
//! simulation engine and the statistics aggregator.
//!
//! Three entry points:
//! - `run_backtest_from_bars()`: pre-loaded raw bars, no I/O.
//! - `run_single_backtest()`: loads one ticker through the data loader, then runs.
//! - `run_batch()`: every configured ticker in parallel, failures isolated per ticker.

use chrono::NaiveDate;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use recurlab_core::data::{DataProvider, DataSource, ParquetCache, RawBar};
use recurlab_core::{
    normalize, summarize, ConfigError, ContributionConfig, Norm, NormalizeError, RunSummary, SimulationEngine,
    SimulationError, TradeLedger,
};

use crate::config::RunSettings;
use crate::data_loader::{compute_dataset_hash, load_bars, LoadError, LoadedData};

#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error("invalid price data: {0}")]
    Normalize(#[from] NormalizeError),
    #[error("simulation failed: {0}")]
    Simulation(#[from] SimulationError),
}

/// Current schema version for persisted artifacts.
pub const SCHEMA_VERSION: u32 = 1;

/// Complete result of one ticker's backtest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestResult {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub symbol: String,
    pub contribution: ContributionConfig,
    pub norm: Norm,
    /// First and last bar dates; `None` for an empty series.
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub bar_count: usize,
    pub ledger: TradeLedger,
    pub summary: RunSummary,
    /// Where the bars came from; `None` when bars were passed in directly.
    pub source: Option<DataSource>,
    pub dataset_hash: String,
    pub synthetic: bool,
}

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

impl BacktestResult {
    pub fn with_provenance(mut self, loaded: &LoadedData) -> Self {
        self.source = Some(loaded.source);
        self.dataset_hash = loaded.dataset_hash.clone();
        self.synthetic = loaded.synthetic;
        self
    }
}

/// Run a backtest over pre-loaded raw bars: normalize, simulate, aggregate.
pub fn run_backtest_from_bars(
    symbol: &str,
    raw: &[RawBar],
    contribution: &ContributionConfig,
    norm: Norm,
) -> Result<BacktestResult, RunError> {
    let series = normalize(raw, norm)?;
    let ledger = SimulationEngine::new(*contribution).run(&series)?;
    let summary = summarize(&ledger, &series);

    Ok(BacktestResult {
        schema_version: SCHEMA_VERSION,
        symbol: symbol.to_string(),
        contribution: *contribution,
        norm,
        start_date: series.first_date(),
        end_date: series.last_date(),
        bar_count: series.len(),
        ledger,
        summary,
        source: None,
        dataset_hash: compute_dataset_hash(symbol, raw),
        synthetic: false,
    })
}

/// Load one ticker and run it with the given settings.
pub fn run_single_backtest(
    symbol: &str,
    settings: &RunSettings,
    cache: &ParquetCache,
    provider: Option<&dyn DataProvider>,
) -> Result<BacktestResult, RunError> {
    tracing::info!(symbol, schedule = %settings.contribution.schedule(), "backtest starting");

    let loaded = load_bars(symbol, cache, provider, &settings.load)?;
    let result = run_backtest_from_bars(&loaded.symbol, &loaded.bars, &settings.contribution, settings.norm)?
        .with_provenance(&loaded);

    tracing::info!(
        symbol = %result.symbol,
        bars = result.bar_count,
        trades = result.summary.num_trades(),
        source = %loaded.source,
        "backtest finished"
    );
    Ok(result)
}

/// One ticker's outcome within a batch.
#[derive(Debug)]
pub struct TickerOutcome {
    pub symbol: String,
    pub result: Result<BacktestResult, RunError>,
}

/// Outcomes for every ticker, in configured order.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub outcomes: Vec<TickerOutcome>,
}

impl BatchReport {
    pub fn succeeded(&self) -> impl Iterator<Item = &BacktestResult> {
        self.outcomes.iter().filter_map(|o| o.result.as_ref().ok())
    }

    pub fn failures(&self) -> impl Iterator<Item = (&str, &RunError)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().err().map(|e| (o.symbol.as_str(), e)))
    }

    pub fn failed_count(&self) -> usize {
        self.failures().count()
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed_count() == 0
    }
}

/// Run every configured ticker as an independent job.
///
/// Jobs share only the read-mostly cache and the provider. A failing ticker
/// is recorded in its outcome and never stops its siblings.
pub fn run_batch(
    settings: &RunSettings,
    cache: &ParquetCache,
    provider: Option<&dyn DataProvider>,
) -> BatchReport {
    let run_all = || -> Vec<TickerOutcome> {
        settings
            .tickers
            .par_iter()
            .map(|symbol| TickerOutcome {
                symbol: symbol.clone(),
                result: run_single_backtest(symbol, settings, cache, provider),
            })
            .collect()
    };

    let outcomes = match settings.threads.filter(|&n| n > 0) {
        Some(threads) => match rayon::ThreadPoolBuilder::new().num_threads(threads).build() {
            Ok(pool) => pool.install(run_all),
            Err(e) => {
                tracing::warn!(threads, error = %e, "failed to build thread pool, using the global pool");
                run_all()
            }
        },
        None => run_all(),
    };

    let report = BatchReport { outcomes };
    tracing::info!(
        tickers = report.outcomes.len(),
        failed = report.failed_count(),
        "batch complete"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use recurlab_core::data::RawDate;
    use recurlab_core::Frequency;

    fn bars() -> Vec<RawBar> {
        (2..=5)
            .map(|d| RawBar {
                date: RawDate::Day(NaiveDate::from_ymd_opt(2024, 1, d).unwrap()),
                open: 100.0,
                high: 100.0,
                low: 100.0,
                close: 100.0,
                volume: 1,
            })
            .collect()
    }

    #[test]
    fn from_bars_fills_every_field() {
        let config = ContributionConfig::new(Frequency::Daily, 100, None).unwrap();

        let result = run_backtest_from_bars("SPY", &bars(), &config, Norm::DEFAULT).unwrap();

        assert_eq!(result.schema_version, SCHEMA_VERSION);
        assert_eq!(result.bar_count, 4);
        assert_eq!(result.ledger.len(), 4);
        assert_eq!(result.summary.num_trades(), 4);
        assert_eq!(result.start_date, NaiveDate::from_ymd_opt(2024, 1, 2));
        assert_eq!(result.end_date, NaiveDate::from_ymd_opt(2024, 1, 5));
        assert_eq!(result.source, None);
        assert_eq!(result.dataset_hash, compute_dataset_hash("SPY", &bars()));
    }

    #[test]
    fn from_bars_propagates_normalize_errors() {
        let mut raw = bars();
        raw.swap(0, 1);
        let config = ContributionConfig::new(Frequency::Daily, 100, None).unwrap();

        assert!(matches!(
            run_backtest_from_bars("SPY", &raw, &config, Norm::DEFAULT),
            Err(RunError::Normalize(NormalizeError::NotAscending { .. }))
        ));
    }

    #[test]
    fn oversized_orders_surface_as_run_errors() {
        let raw: Vec<RawBar> = bars().into_iter().map(|b| RawBar { close: 1e-8, ..b }).collect();
        let config = ContributionConfig::new(Frequency::Daily, 1_000_000, None).unwrap();

        assert!(matches!(
            run_backtest_from_bars("DUST", &raw, &config, Norm::DEFAULT),
            Err(RunError::Simulation(SimulationError::SizeOverflow { .. }))
        ));
    }

    #[test]
    fn empty_bars_give_no_trades() {
        let config = ContributionConfig::new(Frequency::Daily, 100, None).unwrap();
        let result = run_backtest_from_bars("SPY", &[], &config, Norm::DEFAULT).unwrap();

        assert_eq!(
            result.summary,
            RunSummary::NoTrades {
                skipped_contributions: 0,
                current_price: None
            }
        );
        assert_eq!(result.start_date, None);
    }
}
