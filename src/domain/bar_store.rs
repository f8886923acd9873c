//! Multi-symbol bar table with sparse indicator columns.
//!
//! Rows are keyed by (symbol, timestamp) and kept in a `BTreeMap`, so a
//! per-symbol view is a single range scan. Indicator columns are independent
//! maps over the same key; a column has no entry for rows it has not computed.

use crate::domain::bar::{Bar, BarKey};
use crate::domain::error::TradeloopError;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::ops::Bound;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BarStore {
    bars: BTreeMap<BarKey, Bar>,
    columns: HashMap<String, BTreeMap<BarKey, f64>>,
}

impl BarStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_bars(bars: impl IntoIterator<Item = Bar>) -> Self {
        let mut store = Self::new();
        store.upsert_batch(bars);
        store
    }

    /// Insert or replace the row at the bar's key.
    ///
    /// Returns the previous bar when the key already existed. Replacing a
    /// row leaves its indicator values in place; the next indicator refresh
    /// overwrites them.
    pub fn upsert(&mut self, bar: Bar) -> Option<Bar> {
        self.bars.insert(bar.key(), bar)
    }

    pub fn upsert_batch(&mut self, bars: impl IntoIterator<Item = Bar>) {
        for bar in bars {
            self.bars.insert(bar.key(), bar);
        }
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn get(&self, key: &BarKey) -> Option<&Bar> {
        self.bars.get(key)
    }

    /// All rows in key order.
    pub fn rows(&self) -> impl Iterator<Item = &Bar> {
        self.bars.values()
    }

    /// Rows for one symbol in chronological order.
    pub fn symbol_rows<'a>(
        &'a self,
        symbol: &str,
    ) -> impl DoubleEndedIterator<Item = &'a Bar> + use<'a> {
        let start = BarKey::new(symbol, DateTime::<Utc>::MIN_UTC);
        let end = BarKey::new(symbol, DateTime::<Utc>::MAX_UTC);
        self.bars.range(start..=end).map(|(_, bar)| bar)
    }

    pub fn latest_row(&self, symbol: &str) -> Result<&Bar, TradeloopError> {
        self.symbol_rows(symbol)
            .next_back()
            .ok_or_else(|| TradeloopError::SymbolNotFound {
                symbol: symbol.to_string(),
            })
    }

    pub fn symbols(&self) -> Vec<String> {
        self.grouped_by_symbol()
            .map(|(symbol, _)| symbol.to_string())
            .collect()
    }

    /// Lazily walks the store one symbol at a time.
    ///
    /// Each call starts a fresh walk, so the sequence can be restarted.
    pub fn grouped_by_symbol(&self) -> SymbolGroups<'_> {
        SymbolGroups {
            store: self,
            cursor: Bound::Unbounded,
        }
    }

    /// Most recent timestamp across all symbols.
    pub fn last_timestamp(&self) -> Option<DateTime<Utc>> {
        self.grouped_by_symbol()
            .filter_map(|(_, rows)| rows.last().map(|bar| bar.timestamp))
            .max()
    }

    pub fn column_names(&self) -> BTreeSet<&str> {
        self.columns.keys().map(String::as_str).collect()
    }

    /// Fails with `MissingColumns` naming exactly the absent columns.
    pub fn has_columns<S: AsRef<str>>(&self, names: &[S]) -> Result<(), TradeloopError> {
        let missing: BTreeSet<String> = names
            .iter()
            .map(|n| n.as_ref())
            .filter(|n| !self.columns.contains_key(*n))
            .map(str::to_string)
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(TradeloopError::MissingColumns {
                columns: missing.into_iter().collect(),
            })
        }
    }

    /// Declare a column without any values yet.
    pub fn ensure_column(&mut self, name: &str) {
        self.columns.entry(name.to_string()).or_default();
    }

    /// Write a derived value. Keys with no base row are ignored.
    pub fn set_value(&mut self, column: &str, key: &BarKey, value: f64) -> bool {
        if !self.bars.contains_key(key) {
            return false;
        }
        self.columns
            .entry(column.to_string())
            .or_default()
            .insert(key.clone(), value);
        true
    }

    pub fn value(&self, column: &str, key: &BarKey) -> Option<f64> {
        self.columns.get(column)?.get(key).copied()
    }

    pub fn column(&self, name: &str) -> Option<&BTreeMap<BarKey, f64>> {
        self.columns.get(name)
    }
}

/// Iterator returned by [`BarStore::grouped_by_symbol`].
pub struct SymbolGroups<'a> {
    store: &'a BarStore,
    cursor: Bound<BarKey>,
}

impl<'a> Iterator for SymbolGroups<'a> {
    type Item = (&'a str, Vec<&'a Bar>);

    fn next(&mut self) -> Option<Self::Item> {
        let (first_key, _) = self
            .store
            .bars
            .range((self.cursor.clone(), Bound::Unbounded))
            .next()?;
        let symbol = first_key.symbol.as_str();
        let rows: Vec<&Bar> = self.store.symbol_rows(symbol).collect();
        self.cursor = Bound::Excluded(BarKey::new(symbol, DateTime::<Utc>::MAX_UTC));
        Some((symbol, rows))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t(minute: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 15, 14, 0, 0).unwrap() + Duration::minutes(minute)
    }

    fn make_bar(symbol: &str, minute: i64, close: f64) -> Bar {
        Bar {
            symbol: symbol.to_string(),
            timestamp: t(minute),
            open: close - 1.0,
            high: close + 1.0,
            low: close - 2.0,
            close,
            volume: 1000,
        }
    }

    #[test]
    fn upsert_replaces_existing_key() {
        let mut store = BarStore::new();
        assert!(store.upsert(make_bar("AAPL", 0, 100.0)).is_none());
        let previous = store.upsert(make_bar("AAPL", 0, 101.5));

        assert_eq!(previous.map(|b| b.close), Some(100.0));
        assert_eq!(store.len(), 1);
        let row = store.latest_row("AAPL").unwrap();
        assert_eq!(row.close, 101.5);
    }

    #[test]
    fn batch_matches_individual_upserts() {
        let bars = vec![
            make_bar("MSFT", 1, 10.0),
            make_bar("AAPL", 0, 150.0),
            make_bar("MSFT", 1, 11.0),
            make_bar("AAPL", 1, 151.0),
        ];
        let batch = BarStore::from_bars(bars.clone());

        let mut single = BarStore::new();
        for bar in bars {
            single.upsert(bar);
        }
        assert_eq!(batch, single);
        assert_eq!(batch.len(), 3);
    }

    #[test]
    fn rows_are_sorted_by_symbol_then_time() {
        let store = BarStore::from_bars(vec![
            make_bar("MSFT", 0, 10.0),
            make_bar("AAPL", 2, 152.0),
            make_bar("AAPL", 0, 150.0),
        ]);
        let keys: Vec<(String, DateTime<Utc>)> = store
            .rows()
            .map(|b| (b.symbol.clone(), b.timestamp))
            .collect();
        assert_eq!(
            keys,
            vec![
                ("AAPL".to_string(), t(0)),
                ("AAPL".to_string(), t(2)),
                ("MSFT".to_string(), t(0)),
            ]
        );
    }

    #[test]
    fn latest_row_missing_symbol() {
        let store = BarStore::from_bars(vec![make_bar("AAPL", 0, 150.0)]);
        let err = store.latest_row("TSLA").unwrap_err();
        assert!(matches!(err, TradeloopError::SymbolNotFound { symbol } if symbol == "TSLA"));
    }

    #[test]
    fn symbol_rows_do_not_leak_neighbours() {
        let store = BarStore::from_bars(vec![
            make_bar("AAP", 5, 1.0),
            make_bar("AAPL", 0, 150.0),
            make_bar("AAPL", 1, 151.0),
            make_bar("AAPLX", 0, 2.0),
        ]);
        let closes: Vec<f64> = store.symbol_rows("AAPL").map(|b| b.close).collect();
        assert_eq!(closes, vec![150.0, 151.0]);
    }

    #[test]
    fn grouped_by_symbol_is_restartable() {
        let store = BarStore::from_bars(vec![
            make_bar("MSFT", 0, 10.0),
            make_bar("AAPL", 0, 150.0),
            make_bar("AAPL", 1, 151.0),
        ]);

        let first: Vec<(String, usize)> = store
            .grouped_by_symbol()
            .map(|(s, rows)| (s.to_string(), rows.len()))
            .collect();
        let second: Vec<(String, usize)> = store
            .grouped_by_symbol()
            .map(|(s, rows)| (s.to_string(), rows.len()))
            .collect();

        assert_eq!(first, vec![("AAPL".to_string(), 2), ("MSFT".to_string(), 1)]);
        assert_eq!(first, second);
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn grouped_by_symbol_empty_store() {
        let store = BarStore::new();
        assert_eq!(store.grouped_by_symbol().count(), 0);
        assert!(store.last_timestamp().is_none());
    }

    #[test]
    fn last_timestamp_is_max_across_symbols() {
        let store = BarStore::from_bars(vec![
            make_bar("AAPL", 3, 150.0),
            make_bar("MSFT", 7, 10.0),
            make_bar("TSLA", 1, 200.0),
        ]);
        assert_eq!(store.last_timestamp(), Some(t(7)));
    }

    #[test]
    fn has_columns_reports_exactly_the_missing_ones() {
        let mut store = BarStore::from_bars(vec![make_bar("AAPL", 0, 150.0)]);
        store.ensure_column("SMA(20)");

        assert!(store.has_columns(&["SMA(20)"]).is_ok());
        let err = store
            .has_columns(&["SMA(20)", "RSI(14)", "EMA(50)"])
            .unwrap_err();
        match err {
            TradeloopError::MissingColumns { columns } => {
                assert_eq!(columns, vec!["EMA(50)".to_string(), "RSI(14)".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn columns_are_sparse() {
        let mut store = BarStore::from_bars(vec![
            make_bar("AAPL", 0, 150.0),
            make_bar("AAPL", 1, 151.0),
        ]);
        let key1 = BarKey::new("AAPL", t(1));
        assert!(store.set_value("RSI(14)", &key1, 55.0));

        assert_eq!(store.value("RSI(14)", &key1), Some(55.0));
        assert_eq!(store.value("RSI(14)", &BarKey::new("AAPL", t(0))), None);
        assert_eq!(store.column("RSI(14)").map(|c| c.len()), Some(1));
    }

    #[test]
    fn set_value_without_row_is_ignored() {
        let mut store = BarStore::from_bars(vec![make_bar("AAPL", 0, 150.0)]);
        assert!(!store.set_value("RSI(14)", &BarKey::new("MSFT", t(0)), 1.0));
        assert!(store.column("RSI(14)").is_none());
    }
}
