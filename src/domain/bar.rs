//! OHLCV bar representation and bar intervals.

use chrono::{DateTime, Duration, Utc};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq)]
pub struct Bar {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
}

/// Store key: ordered by symbol, then timestamp.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BarKey {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
}

impl BarKey {
    pub fn new(symbol: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            symbol: symbol.into(),
            timestamp,
        }
    }
}

impl Bar {
    pub fn key(&self) -> BarKey {
        BarKey::new(self.symbol.clone(), self.timestamp)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BarUnit {
    Minute,
    Hour,
    Day,
}

/// Bar width, e.g. `1m`, `5m`, `1h`, `1d`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BarInterval {
    pub size: u32,
    pub unit: BarUnit,
}

impl BarInterval {
    pub const ONE_MINUTE: BarInterval = BarInterval {
        size: 1,
        unit: BarUnit::Minute,
    };
    pub const ONE_DAY: BarInterval = BarInterval {
        size: 1,
        unit: BarUnit::Day,
    };

    pub fn duration(&self) -> Duration {
        let size = i64::from(self.size);
        match self.unit {
            BarUnit::Minute => Duration::minutes(size),
            BarUnit::Hour => Duration::hours(size),
            BarUnit::Day => Duration::days(size),
        }
    }
}

impl fmt::Display for BarInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let unit = match self.unit {
            BarUnit::Minute => "m",
            BarUnit::Hour => "h",
            BarUnit::Day => "d",
        };
        write!(f, "{}{}", self.size, unit)
    }
}

impl FromStr for BarInterval {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();
        let split = s
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(|| format!("missing unit in interval '{s}'"))?;
        let (digits, unit) = s.split_at(split);
        let size: u32 = digits
            .parse()
            .map_err(|_| format!("invalid interval size in '{s}'"))?;
        if size == 0 {
            return Err("interval size must be positive".to_string());
        }
        let unit = match unit {
            "m" | "min" | "minute" => BarUnit::Minute,
            "h" | "hour" => BarUnit::Hour,
            "d" | "day" => BarUnit::Day,
            other => return Err(format!("unknown interval unit '{other}'")),
        };
        Ok(BarInterval { size, unit })
    }
}
