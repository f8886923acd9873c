//! Core domain types and logic.

pub mod bar;
pub mod bar_store;
pub mod config_validation;
pub mod dispatcher;
pub mod error;
pub mod indicator;
pub mod market_hours;
pub mod order;
pub mod portfolio;
pub mod position;
pub mod risk;
pub mod scheduler;
pub mod session;
pub mod signal;
