//! Indicator refresh port trait.

use crate::domain::bar_store::BarStore;
use crate::domain::error::TradeloopError;

pub trait IndicatorPort {
    /// Recompute derived columns in place.
    fn refresh(&self, store: &mut BarStore) -> Result<(), TradeloopError>;

    /// Column names this indicator set writes.
    fn columns(&self) -> Vec<String>;
}
