//! Price series normalizer.
//!
//! Turns raw vendor bars into a [`PriceSeries`]: every date resolved to a
//! UTC calendar day, every price divided by the [`Norm`] factor, order
//! checked (never re-sorted). A row whose date cannot be parsed fails the
//! whole series; rows are never dropped silently.
//!
//! `normalize` takes `&[RawBar]` and returns a different type, so a series
//! cannot be normalized twice and the input is never touched.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use thiserror::Error;

use crate::data::provider::RawBar;
use crate::domain::{Bar, Norm, PriceSeries};

/// Errors raised while building a [`PriceSeries`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum NormalizeError {
    #[error("row {row}: cannot parse date '{value}'")]
    InvalidDate { row: usize, value: String },

    #[error("row {row}: date {date} is not after previous date {previous}")]
    NotAscending {
        row: usize,
        previous: NaiveDate,
        date: NaiveDate,
    },

    #[error("row {row} ({date}): close must be positive, got {close}")]
    NonPositiveClose {
        row: usize,
        date: NaiveDate,
        close: f64,
    },

    #[error("normalization factor must be finite and positive, got {0}")]
    InvalidNorm(f64),
}

/// Normalize raw bars into a scaled, validated series.
pub fn normalize(raw: &[RawBar], norm: Norm) -> Result<PriceSeries, NormalizeError> {
    let mut bars = Vec::with_capacity(raw.len());

    for (row, raw_bar) in raw.iter().enumerate() {
        let date = raw_bar
            .date
            .utc_date()
            .ok_or_else(|| NormalizeError::InvalidDate {
                row,
                value: raw_bar.date.to_string(),
            })?;

        bars.push(Bar {
            date,
            open: norm.scale(raw_bar.open),
            high: norm.scale(raw_bar.high),
            low: norm.scale(raw_bar.low),
            close: norm.scale(raw_bar.close),
        });
    }

    PriceSeries::from_scaled(bars, norm)
}

/// Parse a vendor date string to the UTC calendar day it falls on.
///
/// Accepted forms:
/// - `2024-01-02`
/// - `2024-01-02 09:30:00` (taken as UTC)
/// - `2024-01-02 00:00:00-05:00` (yfinance CSV export)
/// - RFC 3339, e.g. `2024-01-02T00:00:00Z`
pub fn parse_utc_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();

    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return Some(date);
    }
    if let Ok(dt) = DateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%:z") {
        return Some(dt.with_timezone(&Utc).date_naive());
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc).date_naive());
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, fmt) {
            return Some(naive.and_utc().date_naive());
        }
    }
    None
}
