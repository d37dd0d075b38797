//! RecurLab Core: recurring-investment backtest engine and price data layer.
//!
//! This crate contains:
//! - Domain types (bars, price series, fills, trade ledger, normalization factor)
//! - The price series normalizer
//! - Contribution schedules (daily, weekly on a weekday, monthly on a day)
//! - The simulation engine, a bar-by-bar walk that buys on close
//! - The statistics aggregator
//! - Price data providers, the Parquet cache and CSV import

pub mod data;
pub mod domain;
pub mod engine;
pub mod normalize;
pub mod schedule;
pub mod stats;

pub use domain::{Bar, Fill, Norm, PriceSeries, TradeLedger};
pub use engine::{SimulationEngine, SimulationError};
pub use normalize::{normalize, NormalizeError};
pub use schedule::{is_contribution_day, ConfigError, ContributionConfig, ContributionSchedule, Frequency};
pub use stats::{aggregate, summarize, RunSummary, SummaryStatistics};
