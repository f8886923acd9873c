//! CSV file market data adapter.
//!
//! One file per symbol, `<dir>/<SYMBOL>.csv`, with the header
//! `timestamp,open,high,low,close,volume`. Timestamps are RFC 3339 or a bare
//! `YYYY-MM-DD` date (midnight UTC). The file is re-read on every call, so a
//! process appending rows is picked up by the next poll.

use crate::domain::bar::{Bar, BarInterval};
use crate::domain::error::TradeloopError;
use crate::ports::market_data_port::MarketDataPort;
use crate::ports::quote_port::QuotePort;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

const COLLABORATOR: &str = "csv market data";

pub struct CsvAdapter {
    base_path: PathBuf,
}

impl CsvAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn csv_path(&self, symbol: &str) -> PathBuf {
        self.base_path.join(format!("{}.csv", symbol))
    }

    /// All bars in the symbol's file, oldest first.
    pub fn load_bars(&self, symbol: &str) -> Result<Vec<Bar>, String> {
        let path = self.csv_path(symbol);
        let content = fs::read_to_string(&path)
            .map_err(|e| format!("failed to read {}: {}", path.display(), e))?;

        let mut rdr = csv::Reader::from_reader(content.as_bytes());
        let mut bars = Vec::new();
        for (line, result) in rdr.records().enumerate() {
            let record = result.map_err(|e| format!("CSV parse error: {}", e))?;
            let row = line + 2;
            let field = |idx: usize, name: &str| {
                record
                    .get(idx)
                    .map(str::trim)
                    .ok_or_else(|| format!("row {row}: missing {name} column"))
            };
            let number = |idx: usize, name: &str| -> Result<f64, String> {
                field(idx, name)?
                    .parse()
                    .map_err(|e| format!("row {row}: invalid {name} value: {e}"))
            };

            bars.push(Bar {
                symbol: symbol.to_string(),
                timestamp: parse_timestamp(field(0, "timestamp")?)
                    .map_err(|e| format!("row {row}: {e}"))?,
                open: number(1, "open")?,
                high: number(2, "high")?,
                low: number(3, "low")?,
                close: number(4, "close")?,
                volume: field(5, "volume")?
                    .parse()
                    .map_err(|e| format!("row {row}: invalid volume value: {e}"))?,
            });
        }

        bars.sort_by_key(|b| b.timestamp);
        Ok(bars)
    }
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .ok_or_else(|| format!("invalid timestamp '{value}'"))
}

impl MarketDataPort for CsvAdapter {
    fn latest_bar(&self, symbol: &str, _interval: BarInterval) -> Result<Bar, TradeloopError> {
        let fetch_error = |reason: String| TradeloopError::TransientFetch {
            symbol: symbol.to_string(),
            collaborator: COLLABORATOR.into(),
            reason,
        };
        self.load_bars(symbol)
            .map_err(fetch_error)?
            .pop()
            .ok_or_else(|| fetch_error("no rows".into()))
    }

    fn historical_bars(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        _interval: BarInterval,
    ) -> Result<Vec<Bar>, TradeloopError> {
        let bars = self
            .load_bars(symbol)
            .map_err(|reason| TradeloopError::DataSource { reason })?;
        Ok(bars
            .into_iter()
            .filter(|b| b.timestamp >= start && b.timestamp <= end)
            .collect())
    }
}

impl QuotePort for CsvAdapter {
    /// Last close in each symbol's file.
    fn quotes(&self, symbols: &[String]) -> Result<HashMap<String, f64>, TradeloopError> {
        let mut quotes = HashMap::with_capacity(symbols.len());
        for symbol in symbols {
            let last = self
                .load_bars(symbol)
                .ok()
                .and_then(|mut bars| bars.pop())
                .ok_or_else(|| TradeloopError::MissingQuote {
                    symbol: symbol.clone(),
                })?;
            quotes.insert(symbol.clone(), last.close);
        }
        Ok(quotes)
    }
}
