//! Price normalization factor.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::normalize::NormalizeError;

/// Fixed factor that raw prices are divided by before simulation.
///
/// Share sizes are computed against scaled prices, so one scaled "share"
/// is `1 / factor` of a real share. The factor is carried explicitly by
/// every [`PriceSeries`](super::PriceSeries) and passed to the aggregator;
/// there is no module-level default hidden in the arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct Norm(f64);

impl Norm {
    /// 1,000,000: the factor used by every production run.
    pub const DEFAULT: Norm = Norm(1_000_000.0);

    /// No scaling. Prices and sizes are used as-is.
    pub const IDENTITY: Norm = Norm(1.0);

    /// Create a normalization factor. Must be finite and strictly positive.
    pub fn new(factor: f64) -> Result<Self, NormalizeError> {
        if !factor.is_finite() || factor <= 0.0 {
            return Err(NormalizeError::InvalidNorm(factor));
        }
        Ok(Self(factor))
    }

    pub fn factor(self) -> f64 {
        self.0
    }

    /// Raw price → scaled price.
    pub fn scale(self, raw: f64) -> f64 {
        raw / self.0
    }

    /// Scaled value → raw unit.
    pub fn unscale(self, scaled: f64) -> f64 {
        scaled * self.0
    }
}

impl Default for Norm {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl TryFrom<f64> for Norm {
    type Error = NormalizeError;

    fn try_from(factor: f64) -> Result<Self, Self::Error> {
        Self::new(factor)
    }
}

impl From<Norm> for f64 {
    fn from(norm: Norm) -> f64 {
        norm.0
    }
}

impl fmt::Display for Norm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
