//! Price data: providers, caching, CSV import and ticker universes.

pub mod cache;
pub mod circuit_breaker;
pub mod csv_import;
pub mod download;
pub mod provider;
pub mod universe;
pub mod yahoo;

pub use cache::{cache_key, hash_bars, CacheMeta, CacheStatus, CoverageResult, ParquetCache};
pub use circuit_breaker::{BreakerState, CircuitBreaker};
pub use csv_import::{find_symbol_csv, parse_yahoo_csv, read_yahoo_csv};
pub use download::{download_symbols, DownloadSummary};
pub use provider::{
    DataError, DataProvider, DataSource, DownloadProgress, FetchResult, RawBar, RawDate, StdoutProgress,
};
pub use universe::{Universe, UniverseError, DEFAULT_TICKERS};
pub use yahoo::YahooProvider;
