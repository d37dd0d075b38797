//! Reporting and export: text summaries, equity curve, JSON and CSV artifacts.
//!
//! All persisted artifacts include a `schema_version` field. Newer versions
//! are rejected on load.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use recurlab_core::{Norm, RunSummary, TradeLedger};

use crate::runner::{BacktestResult, BatchReport, SCHEMA_VERSION};

const RULE: &str = "---------------------------------------------";

// ─── Text summary ───────────────────────────────────────────────────

/// Human-readable summary block for one ticker.
pub fn format_summary(result: &BacktestResult) -> String {
    let mut out = String::with_capacity(512);

    let _ = writeln!(out, "Recurring Investment Backtest for {}", result.symbol);
    match (result.start_date, result.end_date) {
        (Some(start), Some(end)) => {
            let _ = writeln!(out, "Date Range: {start} - {end}");
        }
        _ => {
            let _ = writeln!(out, "Date Range: (no bars)");
        }
    }
    let _ = writeln!(out, "Schedule: {}, {} per contribution", result.contribution.schedule(), result.contribution.amount());
    if result.synthetic {
        let _ = writeln!(out, "Data: SYNTHETIC");
    }

    match &result.summary {
        RunSummary::Invested(stats) => {
            let _ = writeln!(out, "Number of Trades: {}", stats.num_trades);
            let _ = writeln!(out, "Average Price: {:.4}", stats.avg_entry_price);
            let _ = writeln!(out, "Current Price: {:.4}", stats.current_price);
            let _ = writeln!(out, "Total Invested: {:.2}", stats.total_invested);
            let _ = writeln!(out, "Current Value: {:.2}", stats.current_equity);
            let _ = writeln!(out, "Current Shares: {:.6}", stats.current_shares);
            let _ = writeln!(out, "Total Return: {:.2}", stats.total_return);
            let _ = writeln!(out, "Total Return %: {:.2}", stats.total_return_pct);
        }
        RunSummary::NoTrades {
            skipped_contributions,
            current_price,
        } => {
            let _ = writeln!(out, "Number of Trades: 0 (no trades)");
            if let Some(price) = current_price {
                let _ = writeln!(out, "Current Price: {price:.4}");
            }
            if *skipped_contributions > 0 {
                let _ = writeln!(
                    out,
                    "Skipped Contributions: {skipped_contributions} (amount below one unit)"
                );
            }
        }
    }

    out.push_str(RULE);
    out
}

/// One line per ticker; failures carry their error.
pub fn format_batch_table(report: &BatchReport) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<10} {:>7} {:>14} {:>14} {:>10}  {}",
        "Ticker", "Trades", "Invested", "Value", "Return %", "Source"
    );

    for outcome in &report.outcomes {
        match &outcome.result {
            Ok(result) => {
                let source = match (result.synthetic, result.source) {
                    (true, _) => "synthetic".to_string(),
                    (false, Some(source)) => source.to_string(),
                    (false, None) => "-".to_string(),
                };
                match result.summary.statistics() {
                    Some(stats) => {
                        let _ = writeln!(
                            out,
                            "{:<10} {:>7} {:>14.2} {:>14.2} {:>10.2}  {}",
                            outcome.symbol,
                            stats.num_trades,
                            stats.total_invested,
                            stats.current_equity,
                            stats.total_return_pct,
                            source
                        );
                    }
                    None => {
                        let _ = writeln!(
                            out,
                            "{:<10} {:>7} {:>14} {:>14} {:>10}  {}",
                            outcome.symbol, 0, "-", "-", "-", source
                        );
                    }
                }
            }
            Err(e) => {
                let _ = writeln!(out, "{:<10} FAILED: {e}", outcome.symbol);
            }
        }
    }

    let failed = report.failed_count();
    let _ = write!(
        out,
        "{} tickers, {} succeeded, {} failed",
        report.outcomes.len(),
        report.outcomes.len() - failed,
        failed
    );
    out
}

// ─── Equity curve ───────────────────────────────────────────────────

/// Position after one fill.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub date: NaiveDate,
    /// Units held after this fill, in scaled units.
    pub cumulative_size: u128,
    /// Running sum of `size × entry_price`.
    pub invested: f64,
    /// Cumulative units valued at this fill's price.
    pub value: f64,
}

/// Cumulative invested capital and position value at each fill.
pub fn equity_curve(ledger: &TradeLedger) -> Vec<EquityPoint> {
    let mut cumulative_size = 0u128;
    let mut invested = 0.0;

    ledger
        .iter()
        .map(|fill| {
            cumulative_size += u128::from(fill.size);
            invested += fill.cost();
            EquityPoint {
                date: fill.entry_date,
                cumulative_size,
                invested,
                value: cumulative_size as f64 * fill.entry_price,
            }
        })
        .collect()
}

// ─── JSON export ────────────────────────────────────────────────────

pub fn export_json(result: &BacktestResult) -> Result<String> {
    serde_json::to_string_pretty(result).context("failed to serialize BacktestResult to JSON")
}

/// Deserialize a `BacktestResult`, rejecting unknown schema versions.
pub fn import_json(json: &str) -> Result<BacktestResult> {
    let result: BacktestResult =
        serde_json::from_str(json).context("failed to deserialize BacktestResult from JSON")?;
    if result.schema_version > SCHEMA_VERSION {
        bail!(
            "unsupported schema version {} (max supported: {})",
            result.schema_version,
            SCHEMA_VERSION
        );
    }
    Ok(result)
}

// ─── CSV export ─────────────────────────────────────────────────────

/// Fill tape with prices and share counts in real units.
///
/// Columns: entry_date, entry_price, shares, size, cost
pub fn export_fills_csv(ledger: &TradeLedger, norm: Norm) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["entry_date", "entry_price", "shares", "size", "cost"])?;

    for fill in ledger {
        wtr.write_record([
            fill.entry_date.to_string(),
            format!("{:.6}", norm.unscale(fill.entry_price)),
            format!("{:.6}", fill.size as f64 / norm.factor()),
            fill.size.to_string(),
            format!("{:.2}", fill.cost()),
        ])?;
    }

    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

/// Columns: date, cumulative_size, invested, value
pub fn export_equity_csv(curve: &[EquityPoint]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["date", "cumulative_size", "invested", "value"])?;
    for point in curve {
        wtr.write_record([
            point.date.to_string(),
            point.cumulative_size.to_string(),
            format!("{:.2}", point.invested),
            format!("{:.2}", point.value),
        ])?;
    }
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

// ─── Artifact bundle ────────────────────────────────────────────────

/// Write `result.json`, `fills.csv` and `equity.csv` under `{output_dir}/{SYMBOL}/`.
///
/// Existing artifacts for the symbol are overwritten. Returns the directory.
pub fn save_artifacts(result: &BacktestResult, output_dir: &Path) -> Result<PathBuf> {
    let run_dir = output_dir.join(&result.symbol);
    std::fs::create_dir_all(&run_dir)
        .with_context(|| format!("failed to create artifact dir: {}", run_dir.display()))?;

    let json = export_json(result)?;
    std::fs::write(run_dir.join("result.json"), json).context("failed to write result.json")?;

    let fills = export_fills_csv(&result.ledger, result.norm)?;
    std::fs::write(run_dir.join("fills.csv"), fills).context("failed to write fills.csv")?;

    let equity = export_equity_csv(&equity_curve(&result.ledger))?;
    std::fs::write(run_dir.join("equity.csv"), equity).context("failed to write equity.csv")?;

    tracing::debug!(symbol = %result.symbol, dir = %run_dir.display(), "artifacts saved");
    Ok(run_dir)
}

/// Load a `BacktestResult` from an artifact directory's `result.json`.
pub fn load_artifacts(dir: &Path) -> Result<BacktestResult> {
    let path = dir.join("result.json");
    let json = std::fs::read_to_string(&path).with_context(|| format!("failed to read {}", path.display()))?;
    import_json(&json)
}
