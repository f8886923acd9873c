//! Signal evaluation port trait.

use crate::domain::bar_store::BarStore;
use crate::domain::error::TradeloopError;
use crate::domain::signal::Signals;

pub trait SignalPort {
    fn evaluate(&self, store: &BarStore) -> Result<Signals, TradeloopError>;
}
