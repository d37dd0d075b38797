//! PriceSeries, the canonical, immutable input to a simulation run.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::{Bar, Norm};
use crate::normalize::NormalizeError;

/// Ordered daily bars for one symbol, ascending by date with no duplicates.
///
/// Calendar gaps (weekends, holidays) are allowed. Once built the series
/// cannot be modified; the only ways in are [`crate::normalize::normalize`]
/// for raw vendor data and [`PriceSeries::from_scaled`] for bars that are
/// already in the scaled unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSeries {
    bars: Vec<Bar>,
    norm: Norm,
}

impl PriceSeries {
    /// Build a series from bars already divided by `norm`.
    ///
    /// Checks the ordering and close-price invariants; the bars themselves
    /// are taken as given.
    pub fn from_scaled(bars: Vec<Bar>, norm: Norm) -> Result<Self, NormalizeError> {
        for (row, bar) in bars.iter().enumerate() {
            if bar.close.is_nan() || bar.close <= 0.0 {
                return Err(NormalizeError::NonPositiveClose {
                    row,
                    date: bar.date,
                    close: bar.close,
                });
            }
            if row > 0 {
                let previous = bars[row - 1].date;
                if bar.date <= previous {
                    return Err(NormalizeError::NotAscending {
                        row,
                        previous,
                        date: bar.date,
                    });
                }
            }
        }
        Ok(Self { bars, norm })
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn norm(&self) -> Norm {
        self.norm
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Bar> {
        self.bars.iter()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.bars.first().map(|b| b.date)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.bars.last().map(|b| b.date)
    }

    /// Scaled close of the final bar.
    pub fn last_close(&self) -> Option<f64> {
        self.bars.last().map(|b| b.close)
    }
}

impl<'a> IntoIterator for &'a PriceSeries {
    type Item = &'a Bar;
    type IntoIter = std::slice::Iter<'a, Bar>;

    fn into_iter(self) -> Self::IntoIter {
        self.bars.iter()
    }
}
