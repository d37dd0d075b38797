//! Integration tests for the data pipeline: CSV import → cache → normalize.
//!
//! No network access; the Yahoo provider is exercised only through its
//! response parser in unit tests.

use chrono::NaiveDate;
use recurlab_core::data::{
    find_symbol_csv, read_yahoo_csv, DataSource, ParquetCache, RawDate,
};
use recurlab_core::{normalize, Norm, NormalizeError};
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

static TEST_COUNTER: AtomicU64 = AtomicU64::new(0);

fn temp_dir() -> PathBuf {
    let id = TEST_COUNTER.fetch_add(1, Ordering::Relaxed);
    let dir = std::env::temp_dir().join(format!("recurlab_data_it_{}_{id}", std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();
    dir
}

const KO_CSV: &str = "\
Date,Open,High,Low,Close,Volume,Dividends,Stock Splits
2024-03-13 00:00:00-04:00,59.10,59.60,59.00,59.50,11000000,0.0,0.0
2024-03-14 00:00:00-04:00,59.40,59.70,59.10,59.20,12000000,0.485,0.0
2024-03-15 00:00:00-04:00,59.30,59.90,59.20,59.80,25000000,0.0,0.0
";

#[test]
fn csv_import_then_cache_then_normalize() {
    let dir = temp_dir();
    let csv_dir = dir.join("csv");
    fs::create_dir_all(&csv_dir).unwrap();
    fs::write(csv_dir.join("ko.csv"), KO_CSV).unwrap();

    let path = find_symbol_csv(&csv_dir, "KO").expect("lower-case export is found");
    let raw = read_yahoo_csv(&path).unwrap();
    assert_eq!(raw.len(), 3);

    let cache = ParquetCache::new(dir.join("cache"));
    cache.write("KO", &raw, DataSource::CsvImport).unwrap();
    let cached = cache.load("ko").unwrap();

    assert_eq!(
        cached[0].date,
        RawDate::Day(NaiveDate::from_ymd_opt(2024, 3, 13).unwrap())
    );

    let from_csv = normalize(&raw, Norm::DEFAULT).unwrap();
    let from_cache = normalize(&cached, Norm::DEFAULT).unwrap();
    assert_eq!(from_csv, from_cache);
    assert_eq!(from_cache.len(), 3);
    assert_eq!(from_cache.last_close(), Some(59.80 / 1_000_000.0));

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn garbled_csv_date_fails_normalization_with_row() {
    let dir = temp_dir();
    let path = dir.join("bad.csv");
    fs::write(
        &path,
        "Date,Open,High,Low,Close,Volume\n2024-01-02,1,1,1,1,1\n02/01/2024,1,1,1,1,1\n",
    )
    .unwrap();

    let raw = read_yahoo_csv(&path).unwrap();
    let err = normalize(&raw, Norm::DEFAULT).unwrap_err();

    assert!(matches!(err, NormalizeError::InvalidDate { row: 1, .. }));

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn missing_csv_is_not_found() {
    let dir = temp_dir();
    assert!(find_symbol_csv(&dir, "VOO").is_none());
    assert!(read_yahoo_csv(&dir.join("VOO.csv")).is_err());
    let _ = fs::remove_dir_all(&dir);
}
