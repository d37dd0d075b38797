//! Import of yfinance `history()` CSV exports.
//!
//! Expected header: `Date,Open,High,Low,Close,Volume` with optional trailing
//! `Dividends`, `Stock Splits` and `Capital Gains` columns, which are
//! ignored. Dates such as `2010-09-09 00:00:00-04:00` are kept as text and
//! resolved to a UTC day by the normalizer.

use super::provider::{DataError, RawBar, RawDate};
use serde::Deserialize;
use std::io::Read;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize)]
struct CsvRow {
    #[serde(rename = "Date", alias = "Datetime", alias = "date")]
    date: String,
    #[serde(rename = "Open", alias = "open")]
    open: f64,
    #[serde(rename = "High", alias = "high")]
    high: f64,
    #[serde(rename = "Low", alias = "low")]
    low: f64,
    #[serde(rename = "Close", alias = "close")]
    close: f64,
    // pandas writes integer columns as floats once a NaN has appeared
    #[serde(rename = "Volume", alias = "volume", default)]
    volume: Option<f64>,
}

/// Read a yfinance CSV export from disk.
pub fn read_yahoo_csv(path: &Path) -> Result<Vec<RawBar>, DataError> {
    let file = std::fs::File::open(path)
        .map_err(|e| DataError::CsvError(format!("open {}: {e}", path.display())))?;
    parse_yahoo_csv(file).map_err(|e| match e {
        DataError::CsvError(msg) => DataError::CsvError(format!("{}: {msg}", path.display())),
        other => other,
    })
}

/// Parse yfinance CSV content from any reader.
pub fn parse_yahoo_csv<R: Read>(reader: R) -> Result<Vec<RawBar>, DataError> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut bars = Vec::new();
    for (row, record) in rdr.deserialize::<CsvRow>().enumerate() {
        let record = record.map_err(|e| DataError::CsvError(format!("row {row}: {e}")))?;
        bars.push(RawBar {
            date: RawDate::Text(record.date),
            open: record.open,
            high: record.high,
            low: record.low,
            close: record.close,
            volume: record
                .volume
                .filter(|v| v.is_finite() && *v >= 0.0)
                .map_or(0, |v| v as u64),
        });
    }

    if bars.is_empty() {
        return Err(DataError::CsvError("no rows".into()));
    }
    Ok(bars)
}

/// Location of a symbol's export inside a CSV drop folder.
///
/// Both `{dir}/{symbol}.csv` (as the exporter writes it, lower case) and
/// the upper-cased name are tried.
pub fn find_symbol_csv(dir: &Path, symbol: &str) -> Option<PathBuf> {
    [symbol.to_string(), symbol.to_lowercase(), symbol.to_uppercase()]
        .into_iter()
        .map(|name| dir.join(format!("{name}.csv")))
        .find(|path| path.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    const SAMPLE: &str = "\
Date,Open,High,Low,Close,Volume,Dividends,Stock Splits
2010-09-09 00:00:00-04:00,84.20,84.50,83.90,84.30,26500,0.0,0.0
2010-09-10 00:00:00-04:00,84.40,84.80,84.10,84.70,8600.0,0.0,0.0
";

    #[test]
    fn parses_yfinance_export() {
        let bars = parse_yahoo_csv(SAMPLE.as_bytes()).unwrap();

        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].date, RawDate::Text("2010-09-09 00:00:00-04:00".into()));
        assert_eq!(bars[0].date.utc_date(), NaiveDate::from_ymd_opt(2010, 9, 9));
        assert_eq!(bars[0].close, 84.30);
        assert_eq!(bars[0].volume, 26_500);
        assert_eq!(bars[1].volume, 8_600);
    }

    #[test]
    fn missing_volume_column_is_zero() {
        let bars = parse_yahoo_csv("Date,Open,High,Low,Close\n2024-01-02,1,2,0.5,1.5\n".as_bytes()).unwrap();
        assert_eq!(bars[0].volume, 0);
        assert_eq!(bars[0].close, 1.5);
    }

    #[test]
    fn bad_price_reports_row() {
        let err = parse_yahoo_csv("Date,Open,High,Low,Close,Volume\n2024-01-02,1,2,0.5,abc,10\n".as_bytes())
            .unwrap_err();
        assert!(matches!(err, DataError::CsvError(msg) if msg.starts_with("row 0")));
    }

    #[test]
    fn header_only_is_an_error() {
        assert!(parse_yahoo_csv("Date,Open,High,Low,Close,Volume\n".as_bytes()).is_err());
    }
}
