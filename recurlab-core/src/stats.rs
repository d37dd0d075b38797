//! Statistics aggregator: pure functions from a trade ledger to a summary.
//!
//! Sizes are in scaled units and entry prices are scaled prices, so
//! `size × entry_price` is already a raw currency amount. Only per-share
//! quantities (prices, share counts) pass through the [`Norm`] factor.

use serde::{Deserialize, Serialize};

use crate::domain::{Norm, PriceSeries, TradeLedger};

/// Aggregate statistics for a run that bought at least one unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryStatistics {
    pub num_trades: usize,
    /// Average price paid per real share.
    pub avg_entry_price: f64,
    /// Last close, per real share.
    pub current_price: f64,
    pub total_invested: f64,
    pub current_equity: f64,
    /// Shares held, in real shares.
    pub current_shares: f64,
    pub total_return: f64,
    pub total_return_pct: f64,
}

/// Result of aggregating a ledger.
///
/// A run that never bought anything has no average price and no return
/// percentage; it is reported as `NoTrades` instead of carrying NaN or
/// infinity into a report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunSummary {
    Invested(SummaryStatistics),
    NoTrades {
        /// Contribution days that truncated to a zero-size order.
        skipped_contributions: usize,
        /// Last close per real share, when the series had any bars.
        current_price: Option<f64>,
    },
}

impl RunSummary {
    pub fn statistics(&self) -> Option<&SummaryStatistics> {
        match self {
            RunSummary::Invested(stats) => Some(stats),
            RunSummary::NoTrades { .. } => None,
        }
    }

    pub fn num_trades(&self) -> usize {
        self.statistics().map_or(0, |s| s.num_trades)
    }

    pub fn has_trades(&self) -> bool {
        matches!(self, RunSummary::Invested(_))
    }
}

/// Aggregate a ledger against the final bar's scaled close.
pub fn aggregate(ledger: &TradeLedger, last_close: f64, norm: Norm) -> RunSummary {
    let shares_scaled = ledger.total_size();
    let total_invested = ledger.total_invested();

    if shares_scaled == 0 || total_invested <= 0.0 {
        return RunSummary::NoTrades {
            skipped_contributions: ledger.skipped_contributions(),
            current_price: Some(norm.unscale(last_close)),
        };
    }

    let shares_scaled = shares_scaled as f64;
    let current_equity = shares_scaled * last_close;
    let total_return = current_equity - total_invested;

    RunSummary::Invested(SummaryStatistics {
        num_trades: ledger.len(),
        avg_entry_price: norm.unscale(total_invested / shares_scaled),
        current_price: norm.unscale(last_close),
        total_invested,
        current_equity,
        current_shares: shares_scaled / norm.factor(),
        total_return,
        total_return_pct: total_return / total_invested * 100.0,
    })
}

/// Aggregate a ledger against the series it was produced from.
///
/// An empty series has no last close and always yields `NoTrades`.
pub fn summarize(ledger: &TradeLedger, series: &PriceSeries) -> RunSummary {
    match series.last_close() {
        Some(last_close) => aggregate(ledger, last_close, series.norm()),
        None => RunSummary::NoTrades {
            skipped_contributions: ledger.skipped_contributions(),
            current_price: None,
        },
    }
}
