//! Live quote port trait.

use crate::domain::error::TradeloopError;
use std::collections::HashMap;

pub trait QuotePort {
    /// Last price per symbol. Returns every requested symbol or fails.
    fn quotes(&self, symbols: &[String]) -> Result<HashMap<String, f64>, TradeloopError>;
}
