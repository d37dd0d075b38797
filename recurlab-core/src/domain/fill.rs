//! Fill and TradeLedger: the output of a simulation run.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One executed buy at the triggering bar's close.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub entry_date: NaiveDate,
    /// Scaled close of the bar the order was placed on.
    pub entry_price: f64,
    /// Whole scaled units bought: `floor(amount / entry_price)`.
    pub size: u64,
}

impl Fill {
    /// Cash spent on this fill, in raw currency units.
    pub fn cost(&self) -> f64 {
        self.size as f64 * self.entry_price
    }
}

/// Append-only, chronological record of the fills produced by one run.
///
/// Contribution days whose order size truncated to zero are counted in
/// `skipped_contributions` rather than recorded as fills.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TradeLedger {
    fills: Vec<Fill>,
    skipped_contributions: usize,
}

impl TradeLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a fill. Fills must arrive in strictly increasing date order.
    pub fn push(&mut self, fill: Fill) {
        debug_assert!(
            self.fills.last().map_or(true, |f| f.entry_date < fill.entry_date),
            "fills must be appended in chronological order"
        );
        self.fills.push(fill);
    }

    /// Record a contribution day that bought nothing.
    pub fn record_skip(&mut self) {
        self.skipped_contributions += 1;
    }

    pub fn fills(&self) -> &[Fill] {
        &self.fills
    }

    pub fn len(&self) -> usize {
        self.fills.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fills.is_empty()
    }

    pub fn skipped_contributions(&self) -> usize {
        self.skipped_contributions
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Fill> {
        self.fills.iter()
    }

    /// Σ size, in scaled units. Widened so that many large fills cannot overflow.
    pub fn total_size(&self) -> u128 {
        self.fills.iter().map(|f| u128::from(f.size)).sum()
    }

    /// Σ size × entry price.
    pub fn total_invested(&self) -> f64 {
        self.fills.iter().map(Fill::cost).sum()
    }
}

impl<'a> IntoIterator for &'a TradeLedger {
    type Item = &'a Fill;
    type IntoIter = std::slice::Iter<'a, Fill>;

    fn into_iter(self) -> Self::IntoIter {
        self.fills.iter()
    }
}

impl FromIterator<Fill> for TradeLedger {
    fn from_iter<I: IntoIterator<Item = Fill>>(iter: I) -> Self {
        let mut ledger = TradeLedger::new();
        for fill in iter {
            ledger.push(fill);
        }
        ledger
    }
}
