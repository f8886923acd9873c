//! Order model: trade requests, the serializable order body, and receipts.
//!
//! A [`TradeRequest`] is the configured intent for one symbol and direction.
//! [`TradeRequest::to_order_request`] validates it and renders the body sent
//! to the order-placement collaborator (or embedded in a paper receipt).

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::error::TradeloopError;
use super::position::AssetType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Buy,
    Sell,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Buy => f.write_str("buy"),
            Direction::Sell => f.write_str("sell"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnterOrExit {
    Enter,
    Exit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Long,
    Short,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Instruction {
    Buy,
    Sell,
    SellShort,
    BuyToCover,
}

impl Instruction {
    pub fn direction(self) -> Direction {
        match self {
            Instruction::Buy | Instruction::BuyToCover => Direction::Buy,
            Instruction::Sell | Instruction::SellShort => Direction::Sell,
        }
    }

    fn opposite(self) -> Instruction {
        match self {
            Instruction::Buy => Instruction::Sell,
            Instruction::Sell => Instruction::Buy,
            Instruction::SellShort => Instruction::BuyToCover,
            Instruction::BuyToCover => Instruction::SellShort,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderType {
    Market,
    Limit,
    Stop,
    StopLimit,
}

impl FromStr for OrderType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "mkt" | "market" => Ok(OrderType::Market),
            "lmt" | "limit" => Ok(OrderType::Limit),
            "stop" => Ok(OrderType::Stop),
            "stop_lmt" | "stop_limit" | "stop-limit" => Ok(OrderType::StopLimit),
            other => Err(format!("unknown order type '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Session {
    #[default]
    Normal,
    Am,
    Pm,
    Seamless,
}

impl FromStr for Session {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "normal" => Ok(Session::Normal),
            "am" => Ok(Session::Am),
            "pm" => Ok(Session::Pm),
            "seamless" => Ok(Session::Seamless),
            other => Err(format!("unknown session '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderDuration {
    #[default]
    Day,
    GoodTillCancel,
}

impl FromStr for OrderDuration {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "day" => Ok(OrderDuration::Day),
            "gtc" | "good_till_cancel" => Ok(OrderDuration::GoodTillCancel),
            other => Err(format!("unknown duration '{other}'")),
        }
    }
}

/// Protective stop attached to an entry order as a child order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StopLoss {
    /// Stop at this absolute price.
    Absolute(f64),
    /// Stop this many percent away from the entry price.
    Percentage(f64),
}

#[derive(Debug, Clone, PartialEq)]
pub struct InstrumentLeg {
    pub symbol: String,
    pub quantity: i64,
    pub asset_type: AssetType,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum TradeState {
    #[default]
    Pending,
    Placed {
        order_id: String,
    },
    Rejected {
        reason: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStrategyType {
    Single,
    Trigger,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Instrument {
    pub symbol: String,
    pub asset_type: AssetType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLeg {
    pub instruction: Instruction,
    pub quantity: i64,
    pub instrument: Instrument,
}

/// Order body handed to the placement collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRequest {
    pub order_strategy_type: OrderStrategyType,
    pub order_type: OrderType,
    pub session: Session,
    pub duration: OrderDuration,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancel_time: Option<NaiveDate>,
    pub order_leg_collection: Vec<OrderLeg>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub child_order_strategies: Vec<OrderRequest>,
}

impl OrderRequest {
    pub fn symbol(&self) -> Option<&str> {
        self.order_leg_collection
            .first()
            .map(|leg| leg.instrument.symbol.as_str())
    }
}

/// What the placement collaborator reports back for one accepted order.
#[derive(Debug, Clone, PartialEq)]
pub struct Placement {
    pub order_id: String,
    pub request_body: serde_json::Value,
}

/// Audit record of one dispatched order, paper or live.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderReceipt {
    pub order_id: String,
    pub request_body: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl OrderReceipt {
    pub fn from_placement(placement: Placement, timestamp: DateTime<Utc>) -> Self {
        OrderReceipt {
            order_id: placement.order_id,
            request_body: placement.request_body,
            timestamp,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TradeRequest {
    pub trade_id: String,
    pub enter_or_exit: EnterOrExit,
    pub side: Side,
    pub order_type: OrderType,
    pub price: Option<f64>,
    pub stop_limit_price: Option<f64>,
    pub session: Session,
    pub duration: OrderDuration,
    pub cancel_time: Option<NaiveDate>,
    pub leg: Option<InstrumentLeg>,
    pub stop_loss: Option<StopLoss>,
    pub state: TradeState,
}

impl TradeRequest {
    pub fn new(
        trade_id: impl Into<String>,
        enter_or_exit: EnterOrExit,
        side: Side,
        order_type: OrderType,
    ) -> Self {
        TradeRequest {
            trade_id: trade_id.into(),
            enter_or_exit,
            side,
            order_type,
            price: None,
            stop_limit_price: None,
            session: Session::default(),
            duration: OrderDuration::default(),
            cancel_time: None,
            leg: None,
            stop_loss: None,
            state: TradeState::Pending,
        }
    }

    /// Long entry for a buy plan, long exit for a sell plan.
    pub fn for_direction(
        trade_id: impl Into<String>,
        direction: Direction,
        order_type: OrderType,
    ) -> Self {
        let enter_or_exit = match direction {
            Direction::Buy => EnterOrExit::Enter,
            Direction::Sell => EnterOrExit::Exit,
        };
        Self::new(trade_id, enter_or_exit, Side::Long, order_type)
    }

    pub fn with_price(mut self, price: f64) -> Self {
        self.price = Some(price);
        self
    }

    pub fn with_stop_limit_price(mut self, price: f64) -> Self {
        self.stop_limit_price = Some(price);
        self
    }

    pub fn with_session(mut self, session: Session) -> Self {
        self.session = session;
        self
    }

    pub fn with_duration(mut self, duration: OrderDuration, cancel_time: Option<NaiveDate>) -> Self {
        self.duration = duration;
        self.cancel_time = cancel_time;
        self
    }

    pub fn with_instrument(
        mut self,
        symbol: impl Into<String>,
        quantity: i64,
        asset_type: AssetType,
    ) -> Self {
        self.leg = Some(InstrumentLeg {
            symbol: symbol.into(),
            quantity,
            asset_type,
        });
        self
    }

    pub fn with_stop_loss(mut self, stop_loss: StopLoss) -> Self {
        self.stop_loss = Some(stop_loss);
        self
    }

    pub fn instruction(&self) -> Instruction {
        match (self.enter_or_exit, self.side) {
            (EnterOrExit::Enter, Side::Long) => Instruction::Buy,
            (EnterOrExit::Exit, Side::Long) => Instruction::Sell,
            (EnterOrExit::Enter, Side::Short) => Instruction::SellShort,
            (EnterOrExit::Exit, Side::Short) => Instruction::BuyToCover,
        }
    }

    pub fn direction(&self) -> Direction {
        self.instruction().direction()
    }

    pub fn symbol(&self) -> Option<&str> {
        self.leg.as_ref().map(|leg| leg.symbol.as_str())
    }

    pub fn record_placement(&mut self, placement: &Placement) {
        self.state = TradeState::Placed {
            order_id: placement.order_id.clone(),
        };
    }

    pub fn record_rejection(&mut self, reason: impl Into<String>) {
        self.state = TradeState::Rejected {
            reason: reason.into(),
        };
    }

    fn invalid(&self, reason: impl Into<String>) -> TradeloopError {
        TradeloopError::InvalidTradeRequest {
            trade_id: self.trade_id.clone(),
            reason: reason.into(),
        }
    }

    /// Validates the request and renders the order body.
    pub fn to_order_request(&self) -> Result<OrderRequest, TradeloopError> {
        let leg = self
            .leg
            .as_ref()
            .ok_or_else(|| self.invalid("no instrument leg"))?;
        if leg.quantity <= 0 {
            return Err(self.invalid("quantity must be positive"));
        }

        let (price, stop_price) = match self.order_type {
            OrderType::Market => (None, None),
            OrderType::Limit => (Some(self.require_price()?), None),
            OrderType::Stop => (None, Some(self.require_price()?)),
            OrderType::StopLimit => {
                let stop_limit = self
                    .stop_limit_price
                    .ok_or_else(|| self.invalid("stop-limit order requires stop_limit_price"))?;
                (Some(stop_limit), Some(self.require_price()?))
            }
        };

        let instruction = self.instruction();
        let order_leg = OrderLeg {
            instruction,
            quantity: leg.quantity,
            instrument: Instrument {
                symbol: leg.symbol.clone(),
                asset_type: leg.asset_type,
            },
        };

        let child_order_strategies = match self.stop_loss {
            None => Vec::new(),
            Some(stop_loss) => {
                if self.enter_or_exit == EnterOrExit::Exit {
                    return Err(self.invalid("stop-loss only applies to entry orders"));
                }
                let stop = self.stop_loss_price(stop_loss)?;
                vec![OrderRequest {
                    order_strategy_type: OrderStrategyType::Single,
                    order_type: OrderType::Stop,
                    session: self.session,
                    duration: self.duration,
                    price: None,
                    stop_price: Some(stop),
                    cancel_time: self.cancel_time,
                    order_leg_collection: vec![OrderLeg {
                        instruction: instruction.opposite(),
                        ..order_leg.clone()
                    }],
                    child_order_strategies: Vec::new(),
                }]
            }
        };

        Ok(OrderRequest {
            order_strategy_type: if child_order_strategies.is_empty() {
                OrderStrategyType::Single
            } else {
                OrderStrategyType::Trigger
            },
            order_type: self.order_type,
            session: self.session,
            duration: self.duration,
            price,
            stop_price,
            cancel_time: match self.duration {
                OrderDuration::GoodTillCancel => self.cancel_time,
                OrderDuration::Day => None,
            },
            order_leg_collection: vec![order_leg],
            child_order_strategies,
        })
    }

    fn require_price(&self) -> Result<f64, TradeloopError> {
        match self.price {
            Some(p) if p > 0.0 => Ok(p),
            Some(_) => Err(self.invalid("price must be positive")),
            None => Err(self.invalid(format!("{:?} order requires a price", self.order_type))),
        }
    }

    fn stop_loss_price(&self, stop_loss: StopLoss) -> Result<f64, TradeloopError> {
        match stop_loss {
            StopLoss::Absolute(p) if p > 0.0 => Ok(p),
            StopLoss::Absolute(_) => Err(self.invalid("stop-loss price must be positive")),
            StopLoss::Percentage(pct) => {
                if !(pct > 0.0 && pct < 100.0) {
                    return Err(self.invalid("stop-loss percentage must be in (0, 100)"));
                }
                let base = self
                    .price
                    .ok_or_else(|| self.invalid("percentage stop-loss requires an entry price"))?;
                let offset = base * pct / 100.0;
                Ok(match self.side {
                    Side::Long => base - offset,
                    Side::Short => base + offset,
                })
            }
        }
    }
}

/// Configured buy and sell requests for one symbol.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TradePlan {
    pub buy: Option<TradeRequest>,
    pub sell: Option<TradeRequest>,
}

impl TradePlan {
    pub fn request(&self, direction: Direction) -> Option<&TradeRequest> {
        match direction {
            Direction::Buy => self.buy.as_ref(),
            Direction::Sell => self.sell.as_ref(),
        }
    }

    pub fn request_mut(&mut self, direction: Direction) -> Option<&mut TradeRequest> {
        match direction {
            Direction::Buy => self.buy.as_mut(),
            Direction::Sell => self.sell.as_mut(),
        }
    }
}
