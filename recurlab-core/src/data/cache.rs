//! Parquet price cache with Hive-style partitioning.
//!
//! Layout: `{cache_dir}/symbol={SYMBOL}/{year}.parquet` plus a `meta.json`
//! sidecar per symbol. Symbols are upper-cased, so `brk-b` and `BRK-B`
//! share one entry.
//!
//! - Writes go to `.tmp` and are renamed into place.
//! - A write replaces the symbol's whole history; partitions for years no
//!   longer present are removed.
//! - Partitions that fail to read or validate are renamed to
//!   `{year}.parquet.quarantined` and skipped.

use super::provider::{DataError, DataSource, RawBar, RawDate};
use chrono::{Datelike, NaiveDate, NaiveDateTime};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// `NaiveDate::num_days_from_ce` of 1970-01-01; Polars dates count from there.
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

const COLUMNS: [&str; 6] = ["date", "open", "high", "low", "close", "volume"];

/// Metadata sidecar for a cached symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheMeta {
    pub symbol: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub bar_count: usize,
    pub data_hash: String,
    pub source: DataSource,
    pub cached_at: NaiveDateTime,
}

pub struct ParquetCache {
    cache_dir: PathBuf,
}

impl ParquetCache {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    fn symbol_dir(&self, symbol: &str) -> PathBuf {
        self.cache_dir.join(format!("symbol={}", cache_key(symbol)))
    }

    fn year_path(&self, symbol: &str, year: i32) -> PathBuf {
        self.symbol_dir(symbol).join(format!("{year}.parquet"))
    }

    fn meta_path(&self, symbol: &str) -> PathBuf {
        self.symbol_dir(symbol).join("meta.json")
    }

    /// Write a symbol's bars, one Parquet file per calendar year.
    ///
    /// Every bar date must resolve to a UTC day; text dates that do not
    /// parse are rejected before anything is written.
    pub fn write(&self, symbol: &str, bars: &[RawBar], source: DataSource) -> Result<(), DataError> {
        if bars.is_empty() {
            return Err(DataError::CacheError("no bars to cache".into()));
        }

        let mut dated = Vec::with_capacity(bars.len());
        for (row, bar) in bars.iter().enumerate() {
            let date = bar.date.utc_date().ok_or_else(|| {
                DataError::ValidationError(format!("row {row}: cannot parse date '{}'", bar.date))
            })?;
            dated.push((date, bar));
        }

        let sym_dir = self.symbol_dir(symbol);
        fs::create_dir_all(&sym_dir)
            .map_err(|e| DataError::CacheError(format!("failed to create dir: {e}")))?;

        let mut by_year: BTreeMap<i32, Vec<(NaiveDate, &RawBar)>> = BTreeMap::new();
        for &(date, bar) in &dated {
            by_year.entry(date.year()).or_default().push((date, bar));
        }

        for (year, year_bars) in &by_year {
            let mut df = bars_to_dataframe(year_bars)?;
            let path = self.year_path(symbol, *year);
            let tmp_path = path.with_extension("parquet.tmp");

            write_parquet(&mut df, &tmp_path)?;

            fs::rename(&tmp_path, &path).map_err(|e| {
                let _ = fs::remove_file(&tmp_path);
                DataError::CacheError(format!("atomic rename failed: {e}"))
            })?;
        }

        self.remove_stale_partitions(symbol, &by_year)?;

        let (start_date, end_date) = dated
            .iter()
            .fold((dated[0].0, dated[0].0), |(lo, hi), (d, _)| (lo.min(*d), hi.max(*d)));

        let meta = CacheMeta {
            symbol: cache_key(symbol),
            start_date,
            end_date,
            bar_count: bars.len(),
            data_hash: hash_bars(bars)?,
            source,
            cached_at: chrono::Local::now().naive_local(),
        };
        let meta_json = serde_json::to_string_pretty(&meta)
            .map_err(|e| DataError::CacheError(format!("meta serialization: {e}")))?;
        fs::write(self.meta_path(symbol), meta_json)
            .map_err(|e| DataError::CacheError(format!("meta write: {e}")))?;

        tracing::debug!(symbol = %meta.symbol, bars = meta.bar_count, %source, "cache written");
        Ok(())
    }

    fn remove_stale_partitions<T>(&self, symbol: &str, keep: &BTreeMap<i32, T>) -> Result<(), DataError> {
        let entries = fs::read_dir(self.symbol_dir(symbol))
            .map_err(|e| DataError::CacheError(format!("read dir: {e}")))?;
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("parquet") {
                continue;
            }
            let year = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse::<i32>().ok());
            if matches!(year, Some(y) if !keep.contains_key(&y)) {
                let _ = fs::remove_file(&path);
            }
        }
        Ok(())
    }

    /// Load all cached bars for a symbol, ascending by date.
    ///
    /// The loaded rows must match `meta.json` exactly (count and date range).
    /// A quarantined partition or a missing meta file makes the entry
    /// incomplete: its meta is removed so coverage checks report it as not
    /// cached, and `IncompleteCache` is returned instead of partial history.
    pub fn load(&self, symbol: &str) -> Result<Vec<RawBar>, DataError> {
        let sym_dir = self.symbol_dir(symbol);
        if !sym_dir.exists() {
            return Err(DataError::NoCachedData {
                symbol: cache_key(symbol),
            });
        }

        let entries =
            fs::read_dir(&sym_dir).map_err(|e| DataError::CacheError(format!("read dir: {e}")))?;

        let mut dated: Vec<(NaiveDate, RawBar)> = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| DataError::CacheError(format!("dir entry: {e}")))?;
            let path = entry.path();

            // meta.json, .tmp leftovers, quarantined partitions
            if path.extension().and_then(|e| e.to_str()) != Some("parquet") {
                continue;
            }

            match load_and_validate_parquet(&path) {
                Ok(bars) => dated.extend(bars),
                Err(e) => {
                    let quarantine = path.with_extension("parquet.quarantined");
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "quarantining corrupt cache file"
                    );
                    let _ = fs::rename(&path, &quarantine);
                }
            }
        }

        let meta = self.get_meta(symbol);
        if dated.is_empty() && meta.is_none() {
            return Err(DataError::NoCachedData {
                symbol: cache_key(symbol),
            });
        }

        dated.sort_by_key(|(date, _)| *date);

        if let Err(reason) = verify_against_meta(meta.as_ref(), &dated) {
            tracing::warn!(symbol = %cache_key(symbol), %reason, "cache entry incomplete, invalidating");
            let _ = fs::remove_file(self.meta_path(symbol));
            return Err(DataError::IncompleteCache {
                symbol: cache_key(symbol),
                reason,
            });
        }

        Ok(dated.into_iter().map(|(_, bar)| bar).collect())
    }

    pub fn get_meta(&self, symbol: &str) -> Option<CacheMeta> {
        let content = fs::read_to_string(self.meta_path(symbol)).ok()?;
        serde_json::from_str(&content).ok()
    }

    /// Cache status for each requested symbol, in request order.
    pub fn status<S: AsRef<str>>(&self, symbols: &[S]) -> Vec<CacheStatus> {
        symbols
            .iter()
            .map(|sym| {
                let meta = self.get_meta(sym.as_ref());
                CacheStatus {
                    symbol: cache_key(sym.as_ref()),
                    cached: meta.is_some(),
                    start_date: meta.as_ref().map(|m| m.start_date),
                    end_date: meta.as_ref().map(|m| m.end_date),
                    bar_count: meta.as_ref().map(|m| m.bar_count),
                }
            })
            .collect()
    }

    pub fn covers_range(&self, symbol: &str, start: NaiveDate, end: NaiveDate) -> CoverageResult {
        match self.get_meta(symbol) {
            None => CoverageResult::NotCached,
            Some(meta) if meta.start_date <= start && meta.end_date >= end => CoverageResult::FullyCovered,
            Some(meta) => CoverageResult::PartiallyCovered {
                cached_start: meta.start_date,
                cached_end: meta.end_date,
            },
        }
    }
}

/// Cache key for a ticker symbol.
pub fn cache_key(symbol: &str) -> String {
    symbol.trim().to_uppercase()
}

/// blake3 over the JSON encoding of the bars.
pub fn hash_bars(bars: &[RawBar]) -> Result<String, DataError> {
    let bytes = serde_json::to_vec(bars)
        .map_err(|e| DataError::CacheError(format!("hash serialization: {e}")))?;
    Ok(blake3::hash(&bytes).to_hex().to_string())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStatus {
    pub symbol: String,
    pub cached: bool,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub bar_count: Option<usize>,
}

/// How well the cache covers a requested date range.
#[derive(Debug, Clone, PartialEq)]
pub enum CoverageResult {
    NotCached,
    FullyCovered,
    PartiallyCovered {
        cached_start: NaiveDate,
        cached_end: NaiveDate,
    },
}

// ── Parquet I/O helpers ─────────────────────────────────────────────

fn bars_to_dataframe(bars: &[(NaiveDate, &RawBar)]) -> Result<DataFrame, DataError> {
    let dates: Vec<i32> = bars
        .iter()
        .map(|(d, _)| d.num_days_from_ce() - UNIX_EPOCH_DAYS_FROM_CE)
        .collect();
    let opens: Vec<f64> = bars.iter().map(|(_, b)| b.open).collect();
    let highs: Vec<f64> = bars.iter().map(|(_, b)| b.high).collect();
    let lows: Vec<f64> = bars.iter().map(|(_, b)| b.low).collect();
    let closes: Vec<f64> = bars.iter().map(|(_, b)| b.close).collect();
    let volumes: Vec<u64> = bars.iter().map(|(_, b)| b.volume).collect();

    DataFrame::new(vec![
        Column::new("date".into(), dates)
            .cast(&DataType::Date)
            .map_err(|e| DataError::ParquetError(format!("date cast: {e}")))?,
        Column::new("open".into(), opens),
        Column::new("high".into(), highs),
        Column::new("low".into(), lows),
        Column::new("close".into(), closes),
        Column::new("volume".into(), volumes),
    ])
    .map_err(|e| DataError::ParquetError(format!("dataframe creation: {e}")))
}

fn write_parquet(df: &mut DataFrame, path: &Path) -> Result<(), DataError> {
    let file =
        fs::File::create(path).map_err(|e| DataError::ParquetError(format!("create file: {e}")))?;
    ParquetWriter::new(file)
        .finish(df)
        .map_err(|e| DataError::ParquetError(format!("write parquet: {e}")))?;
    Ok(())
}

fn verify_against_meta(meta: Option<&CacheMeta>, dated: &[(NaiveDate, RawBar)]) -> Result<(), String> {
    let meta = meta.ok_or_else(|| "meta.json missing or unreadable".to_string())?;
    let (Some((first, _)), Some((last, _))) = (dated.first(), dated.last()) else {
        return Err(format!("expected {} bars, found none", meta.bar_count));
    };
    if dated.len() != meta.bar_count || *first != meta.start_date || *last != meta.end_date {
        return Err(format!(
            "expected {} bars {} to {}, found {} bars {} to {}",
            meta.bar_count,
            meta.start_date,
            meta.end_date,
            dated.len(),
            first,
            last
        ));
    }
    Ok(())
}

fn load_and_validate_parquet(path: &Path) -> Result<Vec<(NaiveDate, RawBar)>, DataError> {
    let file = fs::File::open(path).map_err(|e| DataError::ParquetError(format!("open: {e}")))?;
    let df = ParquetReader::new(file)
        .finish()
        .map_err(|e| DataError::ParquetError(format!("read: {e}")))?;

    if df.height() == 0 {
        return Err(DataError::ValidationError("empty parquet file".into()));
    }

    for col_name in COLUMNS {
        if df.column(col_name).is_err() {
            return Err(DataError::ValidationError(format!("missing column '{col_name}'")));
        }
    }

    dataframe_to_bars(&df)
}

fn dataframe_to_bars(df: &DataFrame) -> Result<Vec<(NaiveDate, RawBar)>, DataError> {
    let column = |name: &str| {
        df.column(name)
            .map_err(|e| DataError::ParquetError(format!("column read: {e}")))
    };
    let type_err = |name: &str, e: PolarsError| DataError::ParquetError(format!("{name} column type: {e}"));

    let dates = column("date")?;
    let opens = column("open")?;
    let highs = column("high")?;
    let lows = column("low")?;
    let closes = column("close")?;
    let volumes = column("volume")?;

    let date_ca = dates.date().map_err(|e| type_err("date", e))?;
    let open_ca = opens.f64().map_err(|e| type_err("open", e))?;
    let high_ca = highs.f64().map_err(|e| type_err("high", e))?;
    let low_ca = lows.f64().map_err(|e| type_err("low", e))?;
    let close_ca = closes.f64().map_err(|e| type_err("close", e))?;
    let vol_ca = volumes.u64().map_err(|e| type_err("volume", e))?;

    let n = df.height();
    let mut bars = Vec::with_capacity(n);

    for i in 0..n {
        let days = date_ca
            .get(i)
            .ok_or_else(|| DataError::ParquetError(format!("null date at row {i}")))?;
        let date = NaiveDate::from_num_days_from_ce_opt(days + UNIX_EPOCH_DAYS_FROM_CE)
            .ok_or_else(|| DataError::ValidationError(format!("date out of range at row {i}")))?;
        let close = close_ca
            .get(i)
            .ok_or_else(|| DataError::ValidationError(format!("null close at row {i}")))?;

        bars.push((
            date,
            RawBar {
                date: RawDate::Day(date),
                open: open_ca.get(i).unwrap_or(close),
                high: high_ca.get(i).unwrap_or(close),
                low: low_ca.get(i).unwrap_or(close),
                close,
                volume: vol_ca.get(i).unwrap_or(0),
            },
        ));
    }

    Ok(bars)
}
