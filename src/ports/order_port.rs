//! Order placement port trait.

use crate::domain::error::TradeloopError;
use crate::domain::order::{OrderRequest, Placement};

pub trait OrderPort {
    /// Submit an order for `account`.
    ///
    /// `InvalidSession` means the brokerage session is unusable; any other
    /// error is treated as a transient failure of this one order.
    fn place(&self, account: &str, order: &OrderRequest) -> Result<Placement, TradeloopError>;
}
