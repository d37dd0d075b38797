//! Ticker universe: named groups of symbols to backtest together.
//!
//! Stored as TOML:
//!
//! ```toml
//! [groups]
//! "Broad Market" = ["VOO", "SPY"]
//! Crypto = ["BTC-USD"]
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum UniverseError {
    #[error("read universe file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("parse universe TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("serialize universe: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("unknown universe '{0}' (expected 'default' or a path to a TOML file)")]
    Unknown(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Universe {
    pub groups: BTreeMap<String, Vec<String>>,
}

impl Universe {
    pub fn from_file(path: &Path) -> Result<Self, UniverseError> {
        let content = std::fs::read_to_string(path).map_err(|source| UniverseError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, UniverseError> {
        Ok(toml::from_str(content)?)
    }

    pub fn to_toml(&self) -> Result<String, UniverseError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Resolve `"default"` to the built-in universe, anything else as a file path.
    pub fn resolve(name: &str) -> Result<Self, UniverseError> {
        if name.eq_ignore_ascii_case("default") {
            return Ok(Self::default_recurring());
        }
        let path = Path::new(name);
        if path.is_file() {
            Self::from_file(path)
        } else {
            Err(UniverseError::Unknown(name.to_string()))
        }
    }

    /// All tickers, upper-cased, first occurrence wins.
    pub fn all_tickers(&self) -> Vec<String> {
        let mut seen = Vec::new();
        for ticker in self.groups.values().flatten() {
            let ticker = ticker.trim().to_uppercase();
            if !seen.contains(&ticker) {
                seen.push(ticker);
            }
        }
        seen
    }

    pub fn group_tickers(&self, group: &str) -> Option<&[String]> {
        self.groups.get(group).map(|v| v.as_slice())
    }

    pub fn group_names(&self) -> Vec<&str> {
        self.groups.keys().map(|s| s.as_str()).collect()
    }

    pub fn ticker_count(&self) -> usize {
        self.all_tickers().len()
    }

    /// Broad index funds, a blue chip, gold, a leveraged ETF and bitcoin.
    pub fn default_recurring() -> Self {
        let group = |tickers: &[&str]| tickers.iter().map(|t| t.to_string()).collect::<Vec<_>>();

        let mut groups = BTreeMap::new();
        groups.insert("Broad Market".into(), group(&["VOO", "QQQ", "SPY"]));
        groups.insert("Blue Chips".into(), group(&["BRK-B", "KO"]));
        groups.insert("Commodities".into(), group(&["GLD"]));
        groups.insert("Leveraged".into(), group(&["UPRO"]));
        groups.insert("Crypto".into(), group(&["BTC-USD"]));

        Self { groups }
    }
}

/// Default ticker list in display order.
pub const DEFAULT_TICKERS: [&str; 8] = ["VOO", "QQQ", "SPY", "BRK-B", "KO", "GLD", "UPRO", "BTC-USD"];
