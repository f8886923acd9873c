//! Port traits for the collaborators the trading loop depends on.

pub mod audit_log_port;
pub mod clock_port;
pub mod config_port;
pub mod indicator_port;
pub mod market_data_port;
pub mod order_port;
pub mod quote_port;
pub mod signal_port;
