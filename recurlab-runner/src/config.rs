//! Run configuration: the TOML run file and the validated settings derived from it.
//!
//! ```toml
//! tickers = ["VOO", "QQQ"]          # or: universe = "default"
//!
//! [contribution]
//! frequency = "weekly"
//! amount = 100
//! day = 2
//!
//! [data]
//! cache_dir = "data"
//! lookback_years = 10
//! csv_dir = "csv"
//!
//! [output]
//! dir = "results"
//! ```
//!
//! Every field has a default, so an empty file (or no file at all) runs the
//! default universe weekly on Wednesdays with 100 per contribution.

use chrono::{Months, NaiveDate};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use recurlab_core::data::{cache_key, Universe, UniverseError, DEFAULT_TICKERS};
use recurlab_core::schedule::{ConfigError, ContributionConfig, ContributionSpec, Frequency};
use recurlab_core::Norm;

use crate::data_loader::LoadOptions;

#[derive(Debug, Error)]
pub enum RunConfigError {
    #[error("read run file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("parse run file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid contribution: {0}")]
    Contribution(#[from] ConfigError),

    #[error(transparent)]
    Universe(#[from] UniverseError),

    #[error("no tickers to run")]
    NoTickers,

    #[error("start date {start} is after end date {end}")]
    InvalidDateRange { start: NaiveDate, end: NaiveDate },

    #[error("lookback of {0} years is out of range")]
    InvalidLookback(u32),
}

/// Run file as written by the user. Everything is optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunFile {
    /// Explicit ticker list. Takes precedence over `universe`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tickers: Vec<String>,

    /// `"default"` or a path to a universe TOML file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub universe: Option<String>,

    #[serde(default = "default_contribution")]
    pub contribution: ContributionSpec,

    /// Price scaling factor applied before simulation.
    #[serde(default)]
    pub norm: Norm,

    #[serde(default)]
    pub data: DataSection,

    #[serde(default)]
    pub output: OutputSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DataSection {
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,

    /// Years of history ending at `end` (or today).
    #[serde(default = "default_lookback_years")]
    pub lookback_years: u32,

    /// Folder of yfinance CSV exports named `{ticker}.csv`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub csv_dir: Option<PathBuf>,

    /// Overrides the lookback window when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<NaiveDate>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<NaiveDate>,

    #[serde(default)]
    pub offline: bool,

    #[serde(default)]
    pub synthetic: bool,

    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputSection {
    /// Artifact directory; nothing is written when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,

    /// Worker threads for batch runs; rayon's default when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threads: Option<usize>,
}

fn default_contribution() -> ContributionSpec {
    ContributionSpec {
        frequency: Frequency::Weekly,
        amount: 100,
        day: Some(2),
    }
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_lookback_years() -> u32 {
    10
}

impl Default for DataSection {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_dir(),
            lookback_years: default_lookback_years(),
            csv_dir: None,
            start: None,
            end: None,
            offline: false,
            synthetic: false,
            force: false,
        }
    }
}

impl Default for RunFile {
    fn default() -> Self {
        Self {
            tickers: Vec::new(),
            universe: None,
            contribution: default_contribution(),
            norm: Norm::DEFAULT,
            data: DataSection::default(),
            output: OutputSection::default(),
        }
    }
}

impl RunFile {
    pub fn from_file(path: &Path) -> Result<Self, RunConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| RunConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, RunConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Tickers to run, upper-cased and de-duplicated in first-seen order.
    pub fn resolve_tickers(&self) -> Result<Vec<String>, RunConfigError> {
        let raw: Vec<String> = if !self.tickers.is_empty() {
            self.tickers.clone()
        } else if let Some(name) = &self.universe {
            Universe::resolve(name)?.all_tickers()
        } else {
            DEFAULT_TICKERS.iter().map(|t| t.to_string()).collect()
        };

        let mut tickers: Vec<String> = Vec::with_capacity(raw.len());
        for ticker in raw.iter().map(|t| cache_key(t)).filter(|t| !t.is_empty()) {
            if !tickers.contains(&ticker) {
                tickers.push(ticker);
            }
        }

        if tickers.is_empty() {
            return Err(RunConfigError::NoTickers);
        }
        Ok(tickers)
    }

    /// Validate everything and fix the date window, counting back from `today`
    /// when no explicit end date is given.
    pub fn resolve(&self, today: NaiveDate) -> Result<RunSettings, RunConfigError> {
        let tickers = self.resolve_tickers()?;
        let contribution = ContributionConfig::try_from(self.contribution)?;

        let end = self.data.end.unwrap_or(today);
        let start = match self.data.start {
            Some(start) => start,
            None => self
                .data
                .lookback_years
                .checked_mul(12)
                .and_then(|months| end.checked_sub_months(Months::new(months)))
                .ok_or(RunConfigError::InvalidLookback(self.data.lookback_years))?,
        };
        if start > end {
            return Err(RunConfigError::InvalidDateRange { start, end });
        }

        Ok(RunSettings {
            tickers,
            contribution,
            norm: self.norm,
            cache_dir: self.data.cache_dir.clone(),
            load: LoadOptions {
                start,
                end,
                offline: self.data.offline,
                synthetic: self.data.synthetic,
                force: self.data.force,
                csv_dir: self.data.csv_dir.clone(),
            },
            output_dir: self.output.dir.clone(),
            threads: self.output.threads,
        })
    }
}

/// Validated settings for one invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSettings {
    pub tickers: Vec<String>,
    pub contribution: ContributionConfig,
    pub norm: Norm,
    pub cache_dir: PathBuf,
    pub load: LoadOptions,
    pub output_dir: Option<PathBuf>,
    pub threads: Option<usize>,
}
