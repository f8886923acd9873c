//! Trade dispatch with at-most-once execution per bar.
//!
//! The paper/live split is a type parameter: [`SimulatedSink`] synthesizes
//! receipts locally, [`LiveSink`] forwards to an [`OrderPort`]. Either way the
//! dispatcher marks the (symbol, direction) pair before anything is placed.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rand::Rng;
use tracing::{debug, info, warn};

use super::error::TradeloopError;
use super::order::{Direction, OrderReceipt, OrderRequest, Placement};
use super::session::TradingSession;
use crate::ports::order_port::OrderPort;

/// When a held position's ownership flag follows a dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OwnershipPolicy {
    /// As soon as the signal is acted on, before placement.
    #[default]
    OnSignal,
    /// Only after the order was accepted.
    OnConfirmedPlacement,
}

impl fmt::Display for OwnershipPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OwnershipPolicy::OnSignal => f.write_str("on_signal"),
            OwnershipPolicy::OnConfirmedPlacement => f.write_str("on_confirmed_placement"),
        }
    }
}

impl FromStr for OwnershipPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "on_signal" => Ok(OwnershipPolicy::OnSignal),
            "on_confirmed_placement" => Ok(OwnershipPolicy::OnConfirmedPlacement),
            other => Err(format!("unknown ownership policy '{other}'")),
        }
    }
}

pub trait OrderSink {
    fn submit(
        &self,
        symbol: &str,
        direction: Direction,
        order: &OrderRequest,
    ) -> Result<Placement, TradeloopError>;

    fn is_live(&self) -> bool;
}

/// Paper trading: no order leaves the process.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimulatedSink;

impl SimulatedSink {
    /// Random 10-digit id, the same shape the broker hands out.
    pub fn generate_order_id() -> String {
        rand::thread_rng()
            .gen_range(1_000_000_000u64..10_000_000_000u64)
            .to_string()
    }
}

impl OrderSink for SimulatedSink {
    fn submit(
        &self,
        symbol: &str,
        direction: Direction,
        order: &OrderRequest,
    ) -> Result<Placement, TradeloopError> {
        let request_body =
            serde_json::to_value(order).map_err(|e| TradeloopError::Dispatch {
                symbol: symbol.to_string(),
                direction,
                reason: format!("failed to encode order: {e}"),
            })?;
        Ok(Placement {
            order_id: Self::generate_order_id(),
            request_body,
        })
    }

    fn is_live(&self) -> bool {
        false
    }
}

/// Live trading through the order-placement collaborator.
pub struct LiveSink<P: OrderPort> {
    port: P,
    account: String,
}

impl<P: OrderPort> LiveSink<P> {
    pub fn new(port: P, account: impl Into<String>) -> Self {
        LiveSink {
            port,
            account: account.into(),
        }
    }

    pub fn port(&self) -> &P {
        &self.port
    }
}

impl<P: OrderPort> OrderSink for LiveSink<P> {
    fn submit(
        &self,
        symbol: &str,
        direction: Direction,
        order: &OrderRequest,
    ) -> Result<Placement, TradeloopError> {
        match self.port.place(&self.account, order) {
            Ok(placement) => Ok(placement),
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => Err(TradeloopError::Dispatch {
                symbol: symbol.to_string(),
                direction,
                reason: e.to_string(),
            }),
        }
    }

    fn is_live(&self) -> bool {
        true
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    Placed(OrderReceipt),
    /// The pair already executed on this bar; nothing was placed.
    DuplicatePrevented,
    /// No trade request is configured for this symbol and direction.
    NoTradePlan,
}

pub struct TradeDispatcher<S: OrderSink> {
    sink: S,
    policy: OwnershipPolicy,
}

impl<S: OrderSink> TradeDispatcher<S> {
    pub fn new(sink: S, policy: OwnershipPolicy) -> Self {
        TradeDispatcher { sink, policy }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn policy(&self) -> OwnershipPolicy {
        self.policy
    }

    pub fn dispatch(
        &self,
        session: &mut TradingSession,
        symbol: &str,
        direction: Direction,
        now: DateTime<Utc>,
    ) -> Result<DispatchOutcome, TradeloopError> {
        if session.executions.has_executed(symbol, direction) {
            info!(symbol = %symbol, %direction, "already executed on this bar, skipping");
            return Ok(DispatchOutcome::DuplicatePrevented);
        }

        let Some(request) = session
            .trade_plans
            .get_mut(symbol)
            .and_then(|plan| plan.request_mut(direction))
        else {
            debug!(symbol = %symbol, %direction, "no trade request configured");
            return Ok(DispatchOutcome::NoTradePlan);
        };

        session.executions.mark_executed(symbol, direction);
        let owned = direction == Direction::Buy;
        if self.policy == OwnershipPolicy::OnSignal {
            session.ledger.set_ownership(symbol, owned);
        }

        let order = match request.to_order_request() {
            Ok(order) => order,
            Err(e) => {
                request.record_rejection(e.to_string());
                return Err(TradeloopError::Dispatch {
                    symbol: symbol.to_string(),
                    direction,
                    reason: e.to_string(),
                });
            }
        };

        let placement = match self.sink.submit(symbol, direction, &order) {
            Ok(placement) => placement,
            Err(e) => {
                warn!(symbol = %symbol, %direction, error = %e, "order placement failed");
                request.record_rejection(e.to_string());
                return Err(e);
            }
        };

        request.record_placement(&placement);
        if self.policy == OwnershipPolicy::OnConfirmedPlacement {
            session.ledger.set_ownership(symbol, owned);
        }
        info!(
            symbol = %symbol,
            %direction,
            order_id = %placement.order_id,
            live = self.sink.is_live(),
            "order dispatched"
        );
        Ok(DispatchOutcome::Placed(OrderReceipt::from_placement(
            placement, now,
        )))
    }
}
