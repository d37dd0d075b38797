//! Artifact persistence: save/load round trip and schema version checks.

use chrono::{Duration, NaiveDate};
use recurlab_core::data::{RawBar, RawDate};
use recurlab_core::{ContributionConfig, Frequency, Norm};
use recurlab_runner::{
    equity_curve, export_json, format_summary, import_json, load_artifacts, run_backtest_from_bars,
    save_artifacts, BacktestResult,
};

fn result() -> BacktestResult {
    let bars: Vec<RawBar> = (0..20)
        .map(|i| {
            let close = 50.0 + i as f64;
            RawBar {
                date: RawDate::Day(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap() + Duration::days(i)),
                open: close,
                high: close,
                low: close,
                close,
                volume: 10,
            }
        })
        .collect();
    let config = ContributionConfig::new(Frequency::Daily, 100, None).unwrap();
    run_backtest_from_bars("KO", &bars, &config, Norm::DEFAULT).unwrap()
}

#[test]
fn save_then_load_returns_identical_result() {
    let dir = tempfile::tempdir().unwrap();
    let original = result();

    let run_dir = save_artifacts(&original, dir.path()).unwrap();

    assert_eq!(run_dir, dir.path().join("KO"));
    assert!(run_dir.join("fills.csv").exists());
    assert!(run_dir.join("equity.csv").exists());
    assert_eq!(load_artifacts(&run_dir).unwrap(), original);
}

#[test]
fn fills_csv_has_one_row_per_fill() {
    let dir = tempfile::tempdir().unwrap();
    let original = result();

    let run_dir = save_artifacts(&original, dir.path()).unwrap();
    let fills = std::fs::read_to_string(run_dir.join("fills.csv")).unwrap();
    let equity = std::fs::read_to_string(run_dir.join("equity.csv")).unwrap();

    assert_eq!(fills.lines().count(), original.ledger.len() + 1);
    assert_eq!(equity.lines().count(), equity_curve(&original.ledger).len() + 1);
    assert!(fills.starts_with("entry_date,entry_price,shares,size,cost"));
}

#[test]
fn newer_schema_is_rejected() {
    let mut value: serde_json::Value = serde_json::from_str(&export_json(&result()).unwrap()).unwrap();
    value["schema_version"] = serde_json::json!(99);

    let err = import_json(&value.to_string()).unwrap_err();

    assert!(err.to_string().contains("unsupported schema version 99"));
}

#[test]
fn missing_schema_version_defaults_to_current() {
    let mut value: serde_json::Value = serde_json::from_str(&export_json(&result()).unwrap()).unwrap();
    value.as_object_mut().unwrap().remove("schema_version");

    let back = import_json(&value.to_string()).unwrap();

    assert_eq!(back, result());
}

#[test]
fn summary_lists_every_statistic() {
    let text = format_summary(&result());

    for label in [
        "Recurring Investment Backtest for KO",
        "Date Range: 2024-03-01 - 2024-03-20",
        "Number of Trades: 20",
        "Average Price:",
        "Current Price: 69.0000",
        "Total Invested:",
        "Current Value:",
        "Current Shares:",
        "Total Return:",
        "Total Return %:",
    ] {
        assert!(text.contains(label), "missing {label:?} in:\n{text}");
    }
}
