#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap, VecDeque};
use tradeloop::domain::bar::{Bar, BarInterval};
use tradeloop::domain::bar_store::BarStore;
use tradeloop::domain::error::TradeloopError;
use tradeloop::domain::order::{
    Direction, OrderReceipt, OrderRequest, OrderType, Placement, TradePlan, TradeRequest,
};
use tradeloop::domain::portfolio::PortfolioLedger;
use tradeloop::domain::position::{AssetType, Position};
use tradeloop::domain::session::TradingSession;
use tradeloop::domain::signal::Signals;
use tradeloop::ports::audit_log_port::AuditLogPort;
use tradeloop::ports::clock_port::ClockPort;
use tradeloop::ports::indicator_port::IndicatorPort;
use tradeloop::ports::market_data_port::MarketDataPort;
use tradeloop::ports::order_port::OrderPort;
use tradeloop::ports::quote_port::QuotePort;
use tradeloop::ports::signal_port::SignalPort;

/// What the next `latest_bar` call for a symbol returns.
#[derive(Debug, Clone)]
pub enum Fetch {
    Bar(Bar),
    Transient(String),
    InvalidSession,
}

/// Scripted market data. Each symbol has a queue of fetch outcomes; an
/// exhausted queue is a transient failure.
pub struct MockMarketData {
    pub latest: RefCell<HashMap<String, VecDeque<Fetch>>>,
    pub history: HashMap<String, Vec<Bar>>,
    pub calls: RefCell<Vec<String>>,
}

impl MockMarketData {
    pub fn new() -> Self {
        Self {
            latest: RefCell::new(HashMap::new()),
            history: HashMap::new(),
            calls: RefCell::new(Vec::new()),
        }
    }

    pub fn with_fetches(self, symbol: &str, fetches: Vec<Fetch>) -> Self {
        self.latest
            .borrow_mut()
            .entry(symbol.to_string())
            .or_default()
            .extend(fetches);
        self
    }

    pub fn with_bars(self, symbol: &str, bars: Vec<Bar>) -> Self {
        self.with_fetches(symbol, bars.into_iter().map(Fetch::Bar).collect())
    }

    pub fn with_history(mut self, symbol: &str, bars: Vec<Bar>) -> Self {
        self.history.insert(symbol.to_string(), bars);
        self
    }

    pub fn call_count(&self, symbol: &str) -> usize {
        self.calls.borrow().iter().filter(|s| *s == symbol).count()
    }
}

impl MarketDataPort for MockMarketData {
    fn latest_bar(&self, symbol: &str, _interval: BarInterval) -> Result<Bar, TradeloopError> {
        self.calls.borrow_mut().push(symbol.to_string());
        let next = self
            .latest
            .borrow_mut()
            .get_mut(symbol)
            .and_then(|queue| queue.pop_front());
        match next {
            Some(Fetch::Bar(bar)) => Ok(bar),
            Some(Fetch::Transient(reason)) => Err(TradeloopError::TransientFetch {
                symbol: symbol.to_string(),
                collaborator: "mock market data".into(),
                reason,
            }),
            Some(Fetch::InvalidSession) => Err(TradeloopError::InvalidSession {
                collaborator: "mock market data".into(),
                reason: "session expired".into(),
            }),
            None => Err(TradeloopError::TransientFetch {
                symbol: symbol.to_string(),
                collaborator: "mock market data".into(),
                reason: "no bar scripted".into(),
            }),
        }
    }

    fn historical_bars(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        _interval: BarInterval,
    ) -> Result<Vec<Bar>, TradeloopError> {
        match self.history.get(symbol) {
            Some(bars) => Ok(bars
                .iter()
                .filter(|b| b.timestamp >= start && b.timestamp <= end)
                .cloned()
                .collect()),
            None => Err(TradeloopError::DataSource {
                reason: format!("no history for {symbol}"),
            }),
        }
    }
}

pub struct MockQuotes {
    pub prices: HashMap<String, f64>,
}

impl MockQuotes {
    pub fn new(pairs: &[(&str, f64)]) -> Self {
        Self {
            prices: pairs.iter().map(|(s, p)| (s.to_string(), *p)).collect(),
        }
    }
}

impl QuotePort for MockQuotes {
    fn quotes(&self, symbols: &[String]) -> Result<HashMap<String, f64>, TradeloopError> {
        symbols
            .iter()
            .map(|s| {
                self.prices
                    .get(s)
                    .map(|p| (s.clone(), *p))
                    .ok_or_else(|| TradeloopError::MissingQuote { symbol: s.clone() })
            })
            .collect()
    }
}

/// Indicator port that leaves the store alone.
pub struct NoIndicators;

impl IndicatorPort for NoIndicators {
    fn refresh(&self, _store: &mut BarStore) -> Result<(), TradeloopError> {
        Ok(())
    }

    fn columns(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Returns one scripted `Signals` per evaluation, then empty signals.
pub struct ScriptedSignals {
    pub script: RefCell<VecDeque<Signals>>,
}

impl ScriptedSignals {
    pub fn new(script: Vec<Signals>) -> Self {
        Self {
            script: RefCell::new(script.into()),
        }
    }
}

impl SignalPort for ScriptedSignals {
    fn evaluate(&self, _store: &BarStore) -> Result<Signals, TradeloopError> {
        Ok(self.script.borrow_mut().pop_front().unwrap_or_default())
    }
}

pub fn signals(buys: &[&str], sells: &[&str]) -> Signals {
    Signals {
        buys: buys.iter().map(|s| s.to_string()).collect(),
        sells: sells.iter().map(|s| s.to_string()).collect(),
    }
}

/// Order port that records every placement. Symbols in `fatal` report an
/// invalid session; symbols in `failing` fail transiently.
pub struct MockOrderPort {
    pub placed: RefCell<Vec<(String, OrderRequest)>>,
    pub fatal: Vec<String>,
    pub failing: Vec<String>,
    next_id: Cell<u64>,
}

impl MockOrderPort {
    pub fn new() -> Self {
        Self {
            placed: RefCell::new(Vec::new()),
            fatal: Vec::new(),
            failing: Vec::new(),
            next_id: Cell::new(1),
        }
    }

    pub fn with_fatal(mut self, symbol: &str) -> Self {
        self.fatal.push(symbol.to_string());
        self
    }

    pub fn with_failing(mut self, symbol: &str) -> Self {
        self.failing.push(symbol.to_string());
        self
    }

    pub fn placed_symbols(&self) -> Vec<String> {
        self.placed
            .borrow()
            .iter()
            .filter_map(|(_, order)| order.symbol().map(str::to_string))
            .collect()
    }
}

impl OrderPort for MockOrderPort {
    fn place(&self, account: &str, order: &OrderRequest) -> Result<Placement, TradeloopError> {
        let symbol = order.symbol().unwrap_or_default().to_string();
        if self.fatal.contains(&symbol) {
            return Err(TradeloopError::InvalidSession {
                collaborator: "mock order port".into(),
                reason: "token expired".into(),
            });
        }
        if self.failing.contains(&symbol) {
            return Err(TradeloopError::DataSource {
                reason: "connection reset".into(),
            });
        }
        self.placed
            .borrow_mut()
            .push((account.to_string(), order.clone()));
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        Ok(Placement {
            order_id: format!("ORD-{id}"),
            request_body: serde_json::to_value(order).unwrap(),
        })
    }
}

/// Audit log that keeps every batch in memory.
pub struct InMemoryAuditLog {
    pub batches: RefCell<Vec<Vec<OrderReceipt>>>,
    pub fail: Cell<bool>,
}

impl InMemoryAuditLog {
    pub fn new() -> Self {
        Self {
            batches: RefCell::new(Vec::new()),
            fail: Cell::new(false),
        }
    }

    pub fn all_receipts(&self) -> Vec<OrderReceipt> {
        self.batches.borrow().iter().flatten().cloned().collect()
    }
}

impl AuditLogPort for InMemoryAuditLog {
    fn append_batch(&self, receipts: &[OrderReceipt]) -> Result<(), TradeloopError> {
        if self.fail.get() {
            return Err(TradeloopError::AuditLog {
                path: "<memory>".into(),
                reason: "disk full".into(),
            });
        }
        self.batches.borrow_mut().push(receipts.to_vec());
        Ok(())
    }
}

/// Clock that only moves when slept on.
pub struct ManualClock {
    pub now: Cell<DateTime<Utc>>,
    pub sleeps: RefCell<Vec<std::time::Duration>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Cell::new(start),
            sleeps: RefCell::new(Vec::new()),
        }
    }
}

impl ClockPort for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.get()
    }

    fn sleep(&self, duration: std::time::Duration) {
        self.sleeps.borrow_mut().push(duration);
        if let Ok(step) = Duration::from_std(duration) {
            self.now.set(self.now.get() + step);
        }
    }
}

/// 2024-05-15 14:`minute`:00 UTC.
pub fn t(minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 15, 14, minute, 0).unwrap()
}

pub fn make_bar(symbol: &str, timestamp: DateTime<Utc>, close: f64) -> Bar {
    Bar {
        symbol: symbol.to_string(),
        timestamp,
        open: close,
        high: close + 0.5,
        low: close - 0.5,
        close,
        volume: 1000,
    }
}

/// Daily bars at 21:00 UTC starting 2024-01-01, one per close.
pub fn daily_bars(symbol: &str, closes: &[f64]) -> Vec<Bar> {
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 21, 0, 0).unwrap();
    closes
        .iter()
        .enumerate()
        .map(|(i, c)| make_bar(symbol, start + Duration::days(i as i64), *c))
        .collect()
}

/// Market buy and sell of `quantity` shares.
pub fn market_plan(symbol: &str, quantity: i64) -> TradePlan {
    TradePlan {
        buy: Some(
            TradeRequest::for_direction(format!("{symbol}-buy"), Direction::Buy, OrderType::Market)
                .with_instrument(symbol, quantity, AssetType::Equity),
        ),
        sell: Some(
            TradeRequest::for_direction(format!("{symbol}-sell"), Direction::Sell, OrderType::Market)
                .with_instrument(symbol, quantity, AssetType::Equity),
        ),
    }
}

/// Session holding each symbol with a market trade plan.
pub fn make_session(symbols: &[&str]) -> TradingSession {
    let mut ledger = PortfolioLedger::new(Some("123456789".into()));
    let mut plans = BTreeMap::new();
    for symbol in symbols {
        ledger.add_position(Position::new(*symbol, AssetType::Equity, 10));
        plans.insert(symbol.to_string(), market_plan(symbol, 10));
    }
    TradingSession::new(ledger, plans)
}
