//! Bar loading and data resolution for the runner.
//!
//! Resolves one symbol's raw bars with this fallback order:
//! 1. Parquet cache (skipped with `force`; an incomplete entry is a miss)
//! 2. CSV drop folder of yfinance exports (imported into the cache)
//! 3. Provider download, cached on success (skipped with `offline`)
//! 4. Synthetic random walk if `synthetic` is set (tagged)
//! 5. Otherwise a [`LoadError`] naming the symbol
//!
//! Bars are clipped to the requested window. Synthetic data is a
//! developer-only mode; results produced from it carry the flag through to
//! every report and artifact.

use chrono::{Datelike, NaiveDate};
use std::path::PathBuf;
use thiserror::Error;

use recurlab_core::data::{
    cache_key, find_symbol_csv, read_yahoo_csv, DataError, DataProvider, DataSource, ParquetCache, RawBar,
    RawDate,
};

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("no cached data for '{symbol}' and no network access (use --synthetic for synthetic data)")]
    NoCachedDataOffline { symbol: String },

    #[error("no cached data for '{symbol}' and download failed: {reason}")]
    DownloadFailed { symbol: String, reason: String },

    #[error("no bars for '{symbol}' between {start} and {end}")]
    EmptyWindow {
        symbol: String,
        start: NaiveDate,
        end: NaiveDate,
    },

    #[error("data error: {0}")]
    Data(#[from] DataError),
}

/// Options controlling how bars are loaded.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadOptions {
    /// First day to keep, inclusive.
    pub start: NaiveDate,
    /// Last day to keep, inclusive.
    pub end: NaiveDate,
    /// Never make network requests.
    pub offline: bool,
    /// Generate synthetic bars when real data is unavailable.
    pub synthetic: bool,
    /// Bypass the cache and re-fetch.
    pub force: bool,
    pub csv_dir: Option<PathBuf>,
}

/// Raw bars for one symbol plus their provenance.
#[derive(Debug, Clone)]
pub struct LoadedData {
    pub symbol: String,
    pub bars: Vec<RawBar>,
    pub source: DataSource,
    /// BLAKE3 over the clipped bars.
    pub dataset_hash: String,
    pub synthetic: bool,
}

/// Load one symbol's bars, falling back through cache, CSV, download and synthetic.
pub fn load_bars(
    symbol: &str,
    cache: &ParquetCache,
    provider: Option<&dyn DataProvider>,
    opts: &LoadOptions,
) -> Result<LoadedData, LoadError> {
    let symbol = cache_key(symbol);
    let mut last_failure: Option<String> = None;
    let mut cache_failure: Option<DataError> = None;

    // Step 1: cache
    if !opts.force {
        match cache.load(&symbol) {
            Ok(bars) => {
                let bars = clip_to_window(bars, opts.start, opts.end);
                if !bars.is_empty() {
                    tracing::debug!(%symbol, bars = bars.len(), "cache hit");
                    return Ok(loaded(symbol, bars, DataSource::Cache));
                }
                tracing::debug!(%symbol, "cached bars fall outside the window");
            }
            Err(DataError::NoCachedData { .. }) => tracing::debug!(%symbol, "cache miss"),
            Err(e) => {
                tracing::warn!(%symbol, error = %e, "cache unusable, falling back");
                cache_failure = Some(e);
            }
        }
    }

    // Step 2: CSV drop folder
    if let Some(path) = opts.csv_dir.as_deref().and_then(|dir| find_symbol_csv(dir, &symbol)) {
        let bars = read_yahoo_csv(&path)?;
        if let Err(e) = cache.write(&symbol, &bars, DataSource::CsvImport) {
            tracing::warn!(%symbol, error = %e, "failed to cache imported CSV");
        }
        let bars = clip_to_window(bars, opts.start, opts.end);
        if !bars.is_empty() {
            tracing::info!(%symbol, path = %path.display(), bars = bars.len(), "imported CSV");
            return Ok(loaded(symbol, bars, DataSource::CsvImport));
        }
    }

    // Step 3: download
    if !opts.offline {
        match provider {
            Some(prov) if prov.is_available() => match prov.fetch(&symbol, opts.start, opts.end) {
                Ok(fetched) => {
                    if let Err(e) = cache.write(&symbol, &fetched.bars, fetched.source) {
                        tracing::warn!(%symbol, error = %e, "failed to cache download");
                    }
                    let bars = clip_to_window(fetched.bars, opts.start, opts.end);
                    if !bars.is_empty() {
                        tracing::info!(%symbol, provider = prov.name(), bars = bars.len(), "downloaded");
                        return Ok(loaded(symbol, bars, fetched.source));
                    }
                    last_failure = Some("provider returned no bars in the window".into());
                }
                Err(e) => last_failure = Some(e.to_string()),
            },
            Some(prov) => last_failure = Some(format!("{} is unavailable", prov.name())),
            None => {}
        }
    }

    // Step 4: synthetic
    if opts.synthetic {
        tracing::warn!(%symbol, "generating synthetic data, results will be tagged as synthetic");
        let bars = generate_synthetic_bars(&symbol, opts.start, opts.end);
        if bars.is_empty() {
            return Err(LoadError::EmptyWindow {
                symbol,
                start: opts.start,
                end: opts.end,
            });
        }
        return Ok(loaded(symbol, bars, DataSource::Synthetic));
    }

    // Step 5: fail
    if opts.offline || provider.is_none() {
        return Err(match cache_failure {
            Some(e) => LoadError::Data(e),
            None => LoadError::NoCachedDataOffline { symbol },
        });
    }
    Err(LoadError::DownloadFailed {
        symbol,
        reason: last_failure.unwrap_or_else(|| "data not cached and download failed".into()),
    })
}

fn loaded(symbol: String, bars: Vec<RawBar>, source: DataSource) -> LoadedData {
    let dataset_hash = compute_dataset_hash(&symbol, &bars);
    LoadedData {
        symbol,
        bars,
        source,
        dataset_hash,
        synthetic: source == DataSource::Synthetic,
    }
}

/// Keep bars dated within `[start, end]`.
///
/// Bars whose date does not parse are kept so the normalizer reports them
/// instead of them disappearing here.
fn clip_to_window(bars: Vec<RawBar>, start: NaiveDate, end: NaiveDate) -> Vec<RawBar> {
    bars.into_iter()
        .filter(|bar| bar.date.utc_date().map_or(true, |d| d >= start && d <= end))
        .collect()
}

/// Deterministic BLAKE3 hash over a symbol's bars.
pub fn compute_dataset_hash(symbol: &str, bars: &[RawBar]) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(symbol.as_bytes());
    for bar in bars {
        hasher.update(bar.date.to_string().as_bytes());
        hasher.update(&bar.open.to_le_bytes());
        hasher.update(&bar.high.to_le_bytes());
        hasher.update(&bar.low.to_le_bytes());
        hasher.update(&bar.close.to_le_bytes());
        hasher.update(&bar.volume.to_le_bytes());
    }
    hasher.finalize().to_hex().to_string()
}

/// Weekday random walk from 100.0, seeded from the symbol name.
fn generate_synthetic_bars(symbol: &str, start: NaiveDate, end: NaiveDate) -> Vec<RawBar> {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    let seed: [u8; 32] = *blake3::hash(symbol.as_bytes()).as_bytes();
    let mut rng = StdRng::from_seed(seed);

    let mut bars = Vec::new();
    let mut price = 100.0_f64;

    for current in start.iter_days().take_while(|d| *d <= end) {
        if matches!(current.weekday(), chrono::Weekday::Sat | chrono::Weekday::Sun) {
            continue;
        }

        // Slight upward drift so long synthetic runs look like an index.
        let daily_return: f64 = rng.gen_range(-0.02..0.0215);
        let open = price;
        let close = price * (1.0 + daily_return);
        let high = open.max(close) * (1.0 + rng.gen_range(0.0..0.01));
        let low = open.min(close) * (1.0 - rng.gen_range(0.0..0.01));
        let volume = rng.gen_range(500_000..5_000_000u64);

        bars.push(RawBar {
            date: RawDate::Day(current),
            open,
            high,
            low,
            close,
            volume,
        });

        price = close;
    }

    bars
}

#[cfg(test)]
mod tests {
    use super::*;
    use recurlab_core::data::FetchResult;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn opts() -> LoadOptions {
        LoadOptions {
            start: day(2024, 1, 1),
            end: day(2024, 12, 31),
            offline: false,
            synthetic: false,
            force: false,
            csv_dir: None,
        }
    }

    fn sample_bars() -> Vec<RawBar> {
        vec![
            RawBar {
                date: RawDate::Day(day(2023, 12, 29)),
                open: 99.0,
                high: 100.0,
                low: 98.0,
                close: 99.5,
                volume: 900,
            },
            RawBar {
                date: RawDate::Day(day(2024, 1, 2)),
                open: 100.0,
                high: 102.0,
                low: 99.0,
                close: 101.0,
                volume: 1000,
            },
            RawBar {
                date: RawDate::Day(day(2024, 1, 3)),
                open: 101.0,
                high: 103.0,
                low: 100.0,
                close: 102.0,
                volume: 1100,
            },
        ]
    }

    struct CountingProvider {
        calls: AtomicUsize,
        fail: bool,
    }

    impl DataProvider for CountingProvider {
        fn name(&self) -> &str {
            "counting"
        }

        fn fetch(&self, symbol: &str, _start: NaiveDate, _end: NaiveDate) -> Result<FetchResult, DataError> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            if self.fail {
                return Err(DataError::NetworkUnreachable("offline in tests".into()));
            }
            Ok(FetchResult {
                symbol: symbol.to_string(),
                bars: sample_bars(),
                source: DataSource::YahooFinance,
            })
        }

        fn is_available(&self) -> bool {
            true
        }
    }

    #[test]
    fn load_from_cache_clips_to_window() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ParquetCache::new(dir.path());
        cache.write("SPY", &sample_bars(), DataSource::YahooFinance).unwrap();

        let loaded = load_bars("spy", &cache, None, &opts()).unwrap();

        assert_eq!(loaded.symbol, "SPY");
        assert_eq!(loaded.bars.len(), 2);
        assert_eq!(loaded.source, DataSource::Cache);
        assert!(!loaded.synthetic);
        assert!(!loaded.dataset_hash.is_empty());
    }

    #[test]
    fn cache_miss_downloads_and_caches() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ParquetCache::new(dir.path());
        let provider = CountingProvider {
            calls: AtomicUsize::new(0),
            fail: false,
        };

        let first = load_bars("VOO", &cache, Some(&provider), &opts()).unwrap();
        let second = load_bars("VOO", &cache, Some(&provider), &opts()).unwrap();

        assert_eq!(first.source, DataSource::YahooFinance);
        assert_eq!(second.source, DataSource::Cache);
        assert_eq!(provider.calls.load(Ordering::Relaxed), 1);
        assert_eq!(first.dataset_hash, second.dataset_hash);
    }

    #[test]
    fn force_bypasses_cache() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ParquetCache::new(dir.path());
        cache.write("VOO", &sample_bars(), DataSource::YahooFinance).unwrap();
        let provider = CountingProvider {
            calls: AtomicUsize::new(0),
            fail: false,
        };

        let loaded = load_bars("VOO", &cache, Some(&provider), &LoadOptions { force: true, ..opts() }).unwrap();

        assert_eq!(loaded.source, DataSource::YahooFinance);
        assert_eq!(provider.calls.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn csv_drop_folder_is_used_before_download() {
        let dir = tempfile::tempdir().unwrap();
        let csv_dir = dir.path().join("csv");
        std::fs::create_dir_all(&csv_dir).unwrap();
        std::fs::write(
            csv_dir.join("ko.csv"),
            "Date,Open,High,Low,Close,Volume\n2024-01-02 00:00:00-05:00,59,60,58,59.5,100\n",
        )
        .unwrap();
        let cache = ParquetCache::new(dir.path().join("cache"));
        let provider = CountingProvider {
            calls: AtomicUsize::new(0),
            fail: false,
        };
        let opts = LoadOptions {
            csv_dir: Some(csv_dir),
            ..opts()
        };

        let loaded = load_bars("KO", &cache, Some(&provider), &opts).unwrap();

        assert_eq!(loaded.source, DataSource::CsvImport);
        assert_eq!(loaded.bars.len(), 1);
        assert_eq!(provider.calls.load(Ordering::Relaxed), 0);
        assert!(cache.get_meta("KO").is_some());
    }

    #[test]
    fn offline_no_cache_fails_without_synthetic() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ParquetCache::new(dir.path());

        let err = load_bars("SPY", &cache, None, &LoadOptions { offline: true, ..opts() }).unwrap_err();

        assert!(matches!(err, LoadError::NoCachedDataOffline { ref symbol } if symbol == "SPY"));
        assert!(err.to_string().contains("no cached data"));
    }

    fn bars_across_three_years() -> Vec<RawBar> {
        [day(2022, 6, 1), day(2023, 6, 1), day(2024, 6, 3)]
            .into_iter()
            .map(|d| RawBar {
                date: RawDate::Day(d),
                ..sample_bars()[1].clone()
            })
            .collect()
    }

    fn wide_opts() -> LoadOptions {
        LoadOptions {
            start: day(2022, 1, 1),
            ..opts()
        }
    }

    #[test]
    fn corrupt_year_offline_is_an_error_not_a_short_series() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ParquetCache::new(dir.path());
        cache.write("SPY", &bars_across_three_years(), DataSource::YahooFinance).unwrap();
        std::fs::write(dir.path().join("symbol=SPY").join("2023.parquet"), b"junk").unwrap();

        let err = load_bars("SPY", &cache, None, &LoadOptions { offline: true, ..wide_opts() }).unwrap_err();

        assert!(matches!(err, LoadError::Data(DataError::IncompleteCache { ref symbol, .. }) if symbol == "SPY"));
    }

    #[test]
    fn corrupt_year_falls_through_to_download() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ParquetCache::new(dir.path());
        cache.write("SPY", &bars_across_three_years(), DataSource::YahooFinance).unwrap();
        std::fs::write(dir.path().join("symbol=SPY").join("2023.parquet"), b"junk").unwrap();
        let provider = CountingProvider {
            calls: AtomicUsize::new(0),
            fail: false,
        };

        let loaded = load_bars("SPY", &cache, Some(&provider), &wide_opts()).unwrap();

        assert_eq!(loaded.source, DataSource::YahooFinance);
        assert_eq!(provider.calls.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn failed_download_reports_reason() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ParquetCache::new(dir.path());
        let provider = CountingProvider {
            calls: AtomicUsize::new(0),
            fail: true,
        };

        let err = load_bars("SPY", &cache, Some(&provider), &opts()).unwrap_err();

        assert!(matches!(err, LoadError::DownloadFailed { ref reason, .. } if reason.contains("offline in tests")));
    }

    #[test]
    fn synthetic_fallback_produces_tagged_data() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ParquetCache::new(dir.path());
        let opts = LoadOptions {
            end: day(2024, 3, 31),
            offline: true,
            synthetic: true,
            ..opts()
        };

        let loaded = load_bars("FAKE", &cache, None, &opts).unwrap();

        assert!(loaded.synthetic);
        assert_eq!(loaded.source, DataSource::Synthetic);
        assert!(!loaded.bars.is_empty());
        assert!(cache.get_meta("FAKE").is_none());
    }

    #[test]
    fn synthetic_data_is_deterministic_per_symbol() {
        let a = generate_synthetic_bars("SPY", day(2024, 1, 1), day(2024, 1, 31));
        let b = generate_synthetic_bars("SPY", day(2024, 1, 1), day(2024, 1, 31));
        let q = generate_synthetic_bars("QQQ", day(2024, 1, 1), day(2024, 1, 31));

        assert_eq!(a, b);
        assert_eq!(a.len(), 23);
        assert_eq!(a.len(), q.len());
        assert_ne!(a[0].close, q[0].close);
    }

    #[test]
    fn clip_keeps_unparseable_dates() {
        let mut bars = sample_bars();
        bars.push(RawBar {
            date: RawDate::from("garbage"),
            ..bars[0].clone()
        });

        let clipped = clip_to_window(bars, day(2024, 1, 1), day(2024, 1, 2));

        assert_eq!(clipped.len(), 2);
        assert_eq!(clipped[1].date, RawDate::from("garbage"));
    }
}
