//! Market data port trait.

use crate::domain::bar::{Bar, BarInterval};
use crate::domain::error::TradeloopError;
use chrono::{DateTime, Utc};

pub trait MarketDataPort {
    /// Most recent bar for a symbol. May fail transiently.
    fn latest_bar(&self, symbol: &str, interval: BarInterval) -> Result<Bar, TradeloopError>;

    /// Bars in `[start, end]`, oldest first. Used for the initial backfill.
    fn historical_bars(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        interval: BarInterval,
    ) -> Result<Vec<Bar>, TradeloopError>;
}
