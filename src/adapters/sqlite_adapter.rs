//! SQLite market data adapter.
//!
//! Bars live in one `bars` table keyed by (symbol, bar_interval, ts). `ts`
//! is RFC 3339 with a `Z` suffix and whole seconds, so text order is time order.

use crate::domain::bar::{Bar, BarInterval};
use crate::domain::error::TradeloopError;
use crate::ports::config_port::ConfigPort;
use crate::ports::market_data_port::MarketDataPort;
use crate::ports::quote_port::QuotePort;
use chrono::{DateTime, SecondsFormat, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{OptionalExtension, params};
use std::collections::HashMap;

const COLLABORATOR: &str = "sqlite market data";

pub struct SqliteAdapter {
    pool: Pool<SqliteConnectionManager>,
}

fn db_error(e: impl std::fmt::Display) -> TradeloopError {
    TradeloopError::DataSource {
        reason: e.to_string(),
    }
}

fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn row_to_bar(row: &rusqlite::Row<'_>) -> rusqlite::Result<Bar> {
    let ts: String = row.get(1)?;
    let timestamp = DateTime::parse_from_rfc3339(&ts)
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, Box::new(e))
        })?
        .with_timezone(&Utc);
    Ok(Bar {
        symbol: row.get(0)?,
        timestamp,
        open: row.get(2)?,
        high: row.get(3)?,
        low: row.get(4)?,
        close: row.get(5)?,
        volume: row.get(6)?,
    })
}

impl SqliteAdapter {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, TradeloopError> {
        let db_path = config
            .get_string("data", "path")
            .ok_or_else(|| TradeloopError::ConfigMissing {
                section: "data".into(),
                key: "path".into(),
            })?;

        let raw_pool_size = config.get_int("data", "pool_size", 4);
        let pool_size = u32::try_from(raw_pool_size)
            .ok()
            .filter(|size| *size >= 1)
            .ok_or_else(|| TradeloopError::ConfigInvalid {
                section: "data".into(),
                key: "pool_size".into(),
                reason: format!("pool_size must be between 1 and {}, got {raw_pool_size}", u32::MAX),
            })?;

        let manager = SqliteConnectionManager::file(&db_path);
        let pool = Pool::builder()
            .max_size(pool_size)
            .build(manager)
            .map_err(db_error)?;

        let adapter = Self { pool };
        adapter.initialize_schema()?;
        Ok(adapter)
    }

    pub fn in_memory() -> Result<Self, TradeloopError> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(db_error)?;

        let adapter = Self { pool };
        adapter.initialize_schema()?;
        Ok(adapter)
    }

    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>, TradeloopError> {
        self.pool.get().map_err(db_error)
    }

    pub fn initialize_schema(&self) -> Result<(), TradeloopError> {
        self.conn()?
            .execute_batch(
                "CREATE TABLE IF NOT EXISTS bars (
                    symbol TEXT NOT NULL,
                    bar_interval TEXT NOT NULL,
                    ts TEXT NOT NULL,
                    open REAL NOT NULL,
                    high REAL NOT NULL,
                    low REAL NOT NULL,
                    close REAL NOT NULL,
                    volume INTEGER NOT NULL,
                    PRIMARY KEY (symbol, bar_interval, ts)
                );",
            )
            .map_err(db_error)
    }

    /// Upserts bars in one transaction; a repeated key replaces the row.
    pub fn upsert_bars(&self, bars: &[Bar], interval: BarInterval) -> Result<(), TradeloopError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(db_error)?;
        let interval = interval.to_string();
        for bar in bars {
            tx.execute(
                "INSERT OR REPLACE INTO bars (symbol, bar_interval, ts, open, high, low, close, volume)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    bar.symbol,
                    interval,
                    format_ts(bar.timestamp),
                    bar.open,
                    bar.high,
                    bar.low,
                    bar.close,
                    bar.volume
                ],
            )
            .map_err(db_error)?;
        }
        tx.commit().map_err(db_error)
    }

    fn latest_close(&self, symbol: &str) -> Result<Option<f64>, TradeloopError> {
        self.conn()?
            .query_row(
                "SELECT close FROM bars WHERE symbol = ?1 ORDER BY ts DESC LIMIT 1",
                params![symbol],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_error)
    }
}

impl MarketDataPort for SqliteAdapter {
    fn latest_bar(&self, symbol: &str, interval: BarInterval) -> Result<Bar, TradeloopError> {
        let fetch_error = |reason: String| TradeloopError::TransientFetch {
            symbol: symbol.to_string(),
            collaborator: COLLABORATOR.into(),
            reason,
        };
        let conn = self.conn().map_err(|e| fetch_error(e.to_string()))?;
        conn.query_row(
            "SELECT symbol, ts, open, high, low, close, volume FROM bars
             WHERE symbol = ?1 AND bar_interval = ?2
             ORDER BY ts DESC LIMIT 1",
            params![symbol, interval.to_string()],
            row_to_bar,
        )
        .optional()
        .map_err(|e| fetch_error(e.to_string()))?
        .ok_or_else(|| fetch_error(format!("no {interval} bars stored")))
    }

    fn historical_bars(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        interval: BarInterval,
    ) -> Result<Vec<Bar>, TradeloopError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT symbol, ts, open, high, low, close, volume FROM bars
                 WHERE symbol = ?1 AND bar_interval = ?2 AND ts >= ?3 AND ts <= ?4
                 ORDER BY ts ASC",
            )
            .map_err(db_error)?;
        let rows = stmt
            .query_map(
                params![symbol, interval.to_string(), format_ts(start), format_ts(end)],
                row_to_bar,
            )
            .map_err(db_error)?;
        rows.collect::<rusqlite::Result<Vec<Bar>>>().map_err(db_error)
    }
}

impl QuotePort for SqliteAdapter {
    fn quotes(&self, symbols: &[String]) -> Result<HashMap<String, f64>, TradeloopError> {
        let mut quotes = HashMap::with_capacity(symbols.len());
        for symbol in symbols {
            let close = self
                .latest_close(symbol)?
                .ok_or_else(|| TradeloopError::MissingQuote {
                    symbol: symbol.clone(),
                })?;
            quotes.insert(symbol.clone(), close);
        }
        Ok(quotes)
    }
}
