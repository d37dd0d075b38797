//! Bar: one normalized trading day.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// OHLC bar for a single symbol on a single day.
///
/// Prices are in the scaled unit: raw price divided by the [`Norm`] of the
/// series the bar belongs to. The date is a UTC calendar day.
///
/// [`Norm`]: super::Norm
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}
