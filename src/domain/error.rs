//! Domain error types.

use crate::domain::order::Direction;

/// Top-level error type for tradeloop.
#[derive(Debug, thiserror::Error)]
pub enum TradeloopError {
    #[error("{collaborator} failed to fetch {symbol}: {reason}")]
    TransientFetch {
        symbol: String,
        collaborator: String,
        reason: String,
    },

    #[error("missing columns: {}", columns.join(", "))]
    MissingColumns { columns: Vec<String> },

    #[error("no quote for held symbol {symbol}")]
    MissingQuote { symbol: String },

    #[error("no daily return history for held symbol {symbol}")]
    MissingReturns { symbol: String },

    #[error("no rows for symbol {symbol}")]
    SymbolNotFound { symbol: String },

    #[error("covariance matrix does not match weights: {reason}")]
    CovarianceMismatch { reason: String },

    #[error("invalid portfolio: {reason}")]
    InvalidPortfolio { reason: String },

    #[error("invalid session reported by {collaborator}: {reason}")]
    InvalidSession { collaborator: String, reason: String },

    #[error("dispatch of {direction} {symbol} failed: {reason}")]
    Dispatch {
        symbol: String,
        direction: Direction,
        reason: String,
    },

    #[error("invalid trade request {trade_id}: {reason}")]
    InvalidTradeRequest { trade_id: String, reason: String },

    #[error("data source error: {reason}")]
    DataSource { reason: String },

    #[error("audit log {path}: {reason}")]
    AuditLog { path: String, reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl TradeloopError {
    /// Errors that mean the brokerage session is unusable. The scheduler halts on these.
    pub fn is_fatal(&self) -> bool {
        matches!(self, TradeloopError::InvalidSession { .. })
    }

    pub fn missing_data(&self) -> bool {
        matches!(
            self,
            TradeloopError::MissingColumns { .. }
                | TradeloopError::MissingQuote { .. }
                | TradeloopError::MissingReturns { .. }
                | TradeloopError::SymbolNotFound { .. }
                | TradeloopError::CovarianceMismatch { .. }
        )
    }
}

impl From<&TradeloopError> for std::process::ExitCode {
    fn from(err: &TradeloopError) -> Self {
        let code: u8 = match err {
            TradeloopError::Io(_) => 1,
            TradeloopError::ConfigParse { .. }
            | TradeloopError::ConfigMissing { .. }
            | TradeloopError::ConfigInvalid { .. }
            | TradeloopError::InvalidTradeRequest { .. } => 2,
            TradeloopError::DataSource { .. }
            | TradeloopError::AuditLog { .. }
            | TradeloopError::TransientFetch { .. } => 3,
            TradeloopError::InvalidSession { .. } | TradeloopError::Dispatch { .. } => 4,
            TradeloopError::MissingColumns { .. }
            | TradeloopError::MissingQuote { .. }
            | TradeloopError::MissingReturns { .. }
            | TradeloopError::SymbolNotFound { .. }
            | TradeloopError::CovarianceMismatch { .. }
            | TradeloopError::InvalidPortfolio { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}
