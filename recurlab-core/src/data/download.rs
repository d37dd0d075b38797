//! Download orchestrator: multi-symbol fetch into the cache with progress reporting.

use super::cache::{cache_key, CoverageResult, ParquetCache};
use super::provider::{DataError, DataProvider, DownloadProgress};
use crate::domain::Norm;
use crate::normalize::normalize;
use chrono::NaiveDate;

/// Download symbols one after another, validating and caching each.
///
/// Symbols already covered by the cache are skipped unless `force` is set.
/// Once the provider's circuit breaker trips, the remaining symbols are
/// failed without further requests.
pub fn download_symbols<S: AsRef<str>>(
    provider: &dyn DataProvider,
    cache: &ParquetCache,
    symbols: &[S],
    start: NaiveDate,
    end: NaiveDate,
    force: bool,
    progress: &dyn DownloadProgress,
) -> DownloadSummary {
    let total = symbols.len();
    let mut succeeded = 0;
    let mut errors: Vec<(String, DataError)> = Vec::new();

    for (i, symbol) in symbols.iter().enumerate() {
        let symbol = cache_key(symbol.as_ref());
        progress.on_start(&symbol, i, total);

        if !force && cache.covers_range(&symbol, start, end) == CoverageResult::FullyCovered {
            tracing::debug!(%symbol, "cache already covers range, skipping download");
            progress.on_complete(&symbol, i, total, &Ok(()));
            succeeded += 1;
            continue;
        }

        let result = download_single(provider, cache, &symbol, start, end);
        progress.on_complete(&symbol, i, total, &result);

        match result {
            Ok(()) => succeeded += 1,
            Err(e) => errors.push((symbol, e)),
        }

        if !provider.is_available() {
            for rest in &symbols[(i + 1)..] {
                errors.push((cache_key(rest.as_ref()), DataError::CircuitBreakerTripped));
            }
            break;
        }
    }

    let failed = errors.len();
    progress.on_batch_complete(succeeded, failed, total);
    tracing::info!(total, succeeded, failed, "download batch complete");

    DownloadSummary {
        total,
        succeeded,
        failed,
        errors,
    }
}

/// Fetch, validate, cache.
///
/// Validation is a trial normalization, so bars that could not be
/// backtested never reach the cache.
fn download_single(
    provider: &dyn DataProvider,
    cache: &ParquetCache,
    symbol: &str,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<(), DataError> {
    let fetched = provider.fetch(symbol, start, end)?;
    normalize(&fetched.bars, Norm::DEFAULT).map_err(|e| DataError::ValidationError(e.to_string()))?;
    cache.write(symbol, &fetched.bars, fetched.source)
}

#[derive(Debug)]
pub struct DownloadSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub errors: Vec<(String, DataError)>,
}

impl DownloadSummary {
    pub fn all_succeeded(&self) -> bool {
        self.failed == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::provider::{DataSource, FetchResult, RawBar, RawDate};
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

    static TEST_COUNTER: AtomicU64 = AtomicU64::new(0);

    fn temp_cache_dir() -> PathBuf {
        let id = TEST_COUNTER.fetch_add(1, Ordering::Relaxed);
        let dir = std::env::temp_dir().join(format!("recurlab_download_test_{}_{id}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    struct FakeProvider {
        calls: AtomicUsize,
        fail_symbol: &'static str,
        block_after_failure: bool,
        blocked: AtomicBool,
    }

    impl FakeProvider {
        fn new(fail_symbol: &'static str, block_after_failure: bool) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail_symbol,
                block_after_failure,
                blocked: AtomicBool::new(false),
            }
        }
    }

    impl DataProvider for FakeProvider {
        fn name(&self) -> &str {
            "fake"
        }

        fn fetch(&self, symbol: &str, start: NaiveDate, _end: NaiveDate) -> Result<FetchResult, DataError> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            if symbol == self.fail_symbol {
                if self.block_after_failure {
                    self.blocked.store(true, Ordering::Relaxed);
                }
                return Err(DataError::SymbolNotFound {
                    symbol: symbol.to_string(),
                });
            }
            Ok(FetchResult {
                symbol: symbol.to_string(),
                bars: vec![RawBar {
                    date: RawDate::Day(start),
                    open: 10.0,
                    high: 11.0,
                    low: 9.0,
                    close: 10.5,
                    volume: 100,
                }],
                source: DataSource::YahooFinance,
            })
        }

        fn is_available(&self) -> bool {
            !self.blocked.load(Ordering::Relaxed)
        }
    }

    struct Silent;

    impl DownloadProgress for Silent {
        fn on_start(&self, _: &str, _: usize, _: usize) {}
        fn on_complete(&self, _: &str, _: usize, _: usize, _: &Result<(), DataError>) {}
        fn on_batch_complete(&self, _: usize, _: usize, _: usize) {}
    }

    fn range() -> (NaiveDate, NaiveDate) {
        (
            NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
        )
    }

    #[test]
    fn failures_are_isolated() {
        let dir = temp_cache_dir();
        let cache = ParquetCache::new(&dir);
        let provider = FakeProvider::new("BAD", false);
        let (start, end) = range();

        let summary = download_symbols(&provider, &cache, &["voo", "bad", "qqq"], start, end, false, &Silent);

        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.errors[0].0, "BAD");
        assert!(cache.get_meta("VOO").is_some());
        assert!(cache.get_meta("QQQ").is_some());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn covered_symbols_are_not_refetched() {
        let dir = temp_cache_dir();
        let cache = ParquetCache::new(&dir);
        let provider = FakeProvider::new("", false);
        let (start, end) = range();

        download_symbols(&provider, &cache, &["VOO"], start, end, false, &Silent);
        download_symbols(&provider, &cache, &["VOO"], start, end, false, &Silent);
        assert_eq!(provider.calls.load(Ordering::Relaxed), 1);

        download_symbols(&provider, &cache, &["VOO"], start, end, true, &Silent);
        assert_eq!(provider.calls.load(Ordering::Relaxed), 2);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn tripped_breaker_fails_remaining_symbols() {
        let dir = temp_cache_dir();
        let cache = ParquetCache::new(&dir);
        let provider = FakeProvider::new("BAD", true);
        let (start, end) = range();

        let summary = download_symbols(&provider, &cache, &["BAD", "VOO", "QQQ"], start, end, false, &Silent);

        assert_eq!(provider.calls.load(Ordering::Relaxed), 1);
        assert_eq!(summary.failed, 3);
        assert!(matches!(summary.errors[2].1, DataError::CircuitBreakerTripped));
        assert!(!summary.all_succeeded());

        let _ = std::fs::remove_dir_all(&dir);
    }
}
