//! RecurLab Runner: run configuration, data loading, batch orchestration, reporting.
//!
//! This crate builds on `recurlab-core` to provide:
//! - TOML run files resolved into validated settings
//! - Data loading with cache/CSV/download/synthetic fallback
//! - Single-ticker and parallel batch runners
//! - Text summaries and JSON/CSV artifacts

pub mod config;
pub mod data_loader;
pub mod report;
pub mod runner;

pub use config::{DataSection, OutputSection, RunConfigError, RunFile, RunSettings};
pub use data_loader::{compute_dataset_hash, load_bars, LoadError, LoadOptions, LoadedData};
pub use report::{
    equity_curve, export_equity_csv, export_fills_csv, export_json, format_batch_table, format_summary,
    import_json, load_artifacts, save_artifacts, EquityPoint,
};
pub use runner::{
    run_backtest_from_bars, run_batch, run_single_backtest, BacktestResult, BatchReport, RunError,
    TickerOutcome, SCHEMA_VERSION,
};
