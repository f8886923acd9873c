//! Technical indicators written into [`BarStore`] columns.
//!
//! - `IndicatorKind`: indicator identity + period; its `Display` form is the column name
//! - `IndicatorEngine`: recomputes every configured column per symbol

pub mod ema;
pub mod rsi;
pub mod sma;

use std::fmt;
use std::str::FromStr;

use tracing::debug;

use crate::domain::bar_store::BarStore;
use crate::domain::error::TradeloopError;
use crate::ports::indicator_port::IndicatorPort;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IndicatorKind {
    Sma(usize),
    Ema(usize),
    Rsi(usize),
}

impl IndicatorKind {
    pub fn period(&self) -> usize {
        match self {
            IndicatorKind::Sma(p) | IndicatorKind::Ema(p) | IndicatorKind::Rsi(p) => *p,
        }
    }

    pub fn calculate(&self, closes: &[f64]) -> Vec<Option<f64>> {
        match self {
            IndicatorKind::Sma(p) => sma::calculate_sma(closes, *p),
            IndicatorKind::Ema(p) => ema::calculate_ema(closes, *p),
            IndicatorKind::Rsi(p) => rsi::calculate_rsi(closes, *p),
        }
    }
}

impl fmt::Display for IndicatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndicatorKind::Sma(period) => write!(f, "SMA({})", period),
            IndicatorKind::Ema(period) => write!(f, "EMA({})", period),
            IndicatorKind::Rsi(period) => write!(f, "RSI({})", period),
        }
    }
}

impl FromStr for IndicatorKind {
    type Err = String;

    /// Accepts `SMA(20)`, `ema(50)`, `RSI(14)`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (name, rest) = s
            .split_once('(')
            .ok_or_else(|| format!("expected NAME(period), got '{s}'"))?;
        let period: usize = rest
            .strip_suffix(')')
            .and_then(|p| p.trim().parse().ok())
            .filter(|p| *p > 0)
            .ok_or_else(|| format!("invalid period in '{s}'"))?;
        match name.trim().to_uppercase().as_str() {
            "SMA" => Ok(IndicatorKind::Sma(period)),
            "EMA" => Ok(IndicatorKind::Ema(period)),
            "RSI" => Ok(IndicatorKind::Rsi(period)),
            other => Err(format!("unknown indicator '{other}'")),
        }
    }
}

/// Default [`IndicatorPort`]: recomputes each column over every symbol's full history.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndicatorEngine {
    indicators: Vec<IndicatorKind>,
}

impl IndicatorEngine {
    pub fn new(mut indicators: Vec<IndicatorKind>) -> Self {
        indicators.sort();
        indicators.dedup();
        IndicatorEngine { indicators }
    }

    pub fn indicators(&self) -> &[IndicatorKind] {
        &self.indicators
    }
}

impl IndicatorPort for IndicatorEngine {
    fn refresh(&self, store: &mut BarStore) -> Result<(), TradeloopError> {
        let mut updates = Vec::new();
        for (symbol, rows) in store.grouped_by_symbol() {
            let closes: Vec<f64> = rows.iter().map(|bar| bar.close).collect();
            for kind in &self.indicators {
                let column = kind.to_string();
                let values = kind.calculate(&closes);
                let written = values.iter().filter(|v| v.is_some()).count();
                debug!(symbol = %symbol, column = %column, rows = rows.len(), written, "indicator refreshed");
                for (bar, value) in rows.iter().zip(values) {
                    if let Some(value) = value {
                        updates.push((column.clone(), bar.key(), value));
                    }
                }
            }
        }

        for kind in &self.indicators {
            store.ensure_column(&kind.to_string());
        }
        for (column, key, value) in updates {
            store.set_value(&column, &key, value);
        }
        Ok(())
    }

    fn columns(&self) -> Vec<String> {
        self.indicators.iter().map(ToString::to_string).collect()
    }
}
