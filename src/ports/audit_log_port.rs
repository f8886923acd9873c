//! Order audit log port trait.

use crate::domain::error::TradeloopError;
use crate::domain::order::OrderReceipt;

pub trait AuditLogPort {
    /// Append receipts in one write. Receipts whose order id is already
    /// recorded are skipped.
    fn append_batch(&self, receipts: &[OrderReceipt]) -> Result<(), TradeloopError>;
}
