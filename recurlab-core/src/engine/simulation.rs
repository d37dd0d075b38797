use chrono::NaiveDate;
use thiserror::Error;

use crate::domain::{Fill, PriceSeries, TradeLedger};
use crate::schedule::ContributionConfig;

use super::sizing::order_size;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimulationError {
    #[error(
        "{date}: contribution of {amount} at scaled price {price} buys more units than a u64 holds (lower the normalization factor)"
    )]
    SizeOverflow { date: NaiveDate, amount: u64, price: f64 },
}

/// Recurring-investment simulation engine.
///
/// Holds only the validated contribution configuration, so one engine can be
/// reused across any number of series without leaking state between runs.
#[derive(Debug, Clone)]
pub struct SimulationEngine {
    config: ContributionConfig,
}

impl SimulationEngine {
    pub fn new(config: ContributionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ContributionConfig {
        &self.config
    }

    /// Walk the series in date order and build the trade ledger.
    ///
    /// Orders execute at the triggering bar's close with unlimited buying
    /// power, so every contribution day either fills or truncates to a
    /// zero-size skip. An empty series yields an empty ledger.
    ///
    /// Fails if a single order's unit count overflows `u64`.
    pub fn run(&self, series: &PriceSeries) -> Result<TradeLedger, SimulationError> {
        let schedule = self.config.schedule();
        let amount = self.config.amount();
        let mut ledger = TradeLedger::new();

        for bar in series {
            if !schedule.is_contribution_day(bar.date) {
                continue;
            }

            let size = order_size(amount, bar.close).ok_or(SimulationError::SizeOverflow {
                date: bar.date,
                amount,
                price: bar.close,
            })?;
            if size == 0 {
                tracing::debug!(
                    date = %bar.date,
                    close = bar.close,
                    amount,
                    "contribution too small for one unit, skipping"
                );
                ledger.record_skip();
                continue;
            }

            ledger.push(Fill {
                entry_date: bar.date,
                entry_price: bar.close,
                size,
            });
        }

        tracing::debug!(
            bars = series.len(),
            fills = ledger.len(),
            skipped = ledger.skipped_contributions(),
            schedule = %schedule,
            "simulation complete"
        );

        Ok(ledger)
    }
}
