//! Mutable state of one trading session, threaded through every cycle.

use std::collections::{BTreeMap, BTreeSet};

use super::bar_store::BarStore;
use super::order::{Direction, TradePlan};
use super::portfolio::PortfolioLedger;

/// Per (symbol, direction) execution flags for the current bar.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionRecord {
    executed: BTreeSet<(String, Direction)>,
}

impl ExecutionRecord {
    pub fn has_executed(&self, symbol: &str, direction: Direction) -> bool {
        self.executed.contains(&(symbol.to_string(), direction))
    }

    /// Returns false if the pair was already marked.
    pub fn mark_executed(&mut self, symbol: &str, direction: Direction) -> bool {
        self.executed.insert((symbol.to_string(), direction))
    }

    /// Clears both directions for a symbol. Called only when the symbol's
    /// latest bar timestamp moves forward.
    pub fn reset_symbol(&mut self, symbol: &str) {
        for direction in [Direction::Buy, Direction::Sell] {
            self.executed.remove(&(symbol.to_string(), direction));
        }
    }

    pub fn executed_count(&self) -> usize {
        self.executed.len()
    }
}

#[derive(Debug, Clone, Default)]
pub struct TradingSession {
    pub store: BarStore,
    pub ledger: PortfolioLedger,
    pub executions: ExecutionRecord,
    pub trade_plans: BTreeMap<String, TradePlan>,
}

impl TradingSession {
    pub fn new(ledger: PortfolioLedger, trade_plans: BTreeMap<String, TradePlan>) -> Self {
        TradingSession {
            store: BarStore::new(),
            ledger,
            executions: ExecutionRecord::default(),
            trade_plans,
        }
    }
}
