//! Portfolio ledger: held positions, ownership flags and allocation weights.

use std::collections::{BTreeMap, HashMap};

use super::error::TradeloopError;
use super::position::{AssetType, Position};
use crate::ports::quote_port::QuotePort;

/// Result of [`PortfolioLedger::remove_position`]. Removing an unknown symbol is not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Removal {
    pub removed: bool,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MarketValue {
    pub quantity: i64,
    pub price: f64,
    pub market_value: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PortfolioLedger {
    pub account: Option<String>,
    positions: BTreeMap<String, Position>,
}

impl PortfolioLedger {
    pub fn new(account: Option<String>) -> Self {
        PortfolioLedger {
            account,
            positions: BTreeMap::new(),
        }
    }

    /// Adds or replaces the position for its symbol.
    pub fn add_position(&mut self, position: Position) {
        self.positions.insert(position.symbol.clone(), position);
    }

    pub fn add_positions(&mut self, positions: impl IntoIterator<Item = Position>) {
        for position in positions {
            self.add_position(position);
        }
    }

    pub fn remove_position(&mut self, symbol: &str) -> Removal {
        match self.positions.remove(symbol) {
            Some(_) => Removal {
                removed: true,
                message: format!("{symbol} was successfully removed"),
            },
            None => Removal {
                removed: false,
                message: format!("{symbol} did not exist in the portfolio"),
            },
        }
    }

    pub fn is_held(&self, symbol: &str) -> bool {
        self.positions.contains_key(symbol)
    }

    pub fn get_position(&self, symbol: &str) -> Option<&Position> {
        self.positions.get(symbol)
    }

    /// Explicit quantity/price edit. Returns false when the symbol is not held.
    pub fn update_position(&mut self, symbol: &str, quantity: i64, purchase_price: f64) -> bool {
        match self.positions.get_mut(symbol) {
            Some(pos) => {
                pos.quantity = quantity;
                pos.purchase_price = purchase_price;
                true
            }
            None => false,
        }
    }

    /// Returns false when the symbol is not held.
    pub fn set_ownership(&mut self, symbol: &str, owned: bool) -> bool {
        match self.positions.get_mut(symbol) {
            Some(pos) => {
                pos.is_owned = owned;
                true
            }
            None => false,
        }
    }

    pub fn is_profitable(&self, symbol: &str, current_price: f64) -> Option<bool> {
        self.positions
            .get(symbol)
            .map(|pos| pos.is_profitable(current_price))
    }

    /// Held symbols in sorted order.
    pub fn symbols(&self) -> Vec<String> {
        self.positions.keys().cloned().collect()
    }

    pub fn positions(&self) -> impl Iterator<Item = &Position> {
        self.positions.values()
    }

    pub fn position_count(&self) -> usize {
        self.positions.len()
    }

    pub fn allocation_by_asset_type(&self) -> BTreeMap<AssetType, Vec<&Position>> {
        let mut allocation: BTreeMap<AssetType, Vec<&Position>> =
            AssetType::ALL.iter().map(|a| (*a, Vec::new())).collect();
        for pos in self.positions.values() {
            allocation.entry(pos.asset_type).or_default().push(pos);
        }
        allocation
    }

    /// Market value per held symbol. Fails if any held symbol lacks a price.
    pub fn projected_market_values(
        &self,
        quotes: &HashMap<String, f64>,
    ) -> Result<BTreeMap<String, MarketValue>, TradeloopError> {
        self.positions
            .values()
            .map(|pos| -> Result<(String, MarketValue), TradeloopError> {
                let price =
                    quotes
                        .get(&pos.symbol)
                        .copied()
                        .ok_or_else(|| TradeloopError::MissingQuote {
                            symbol: pos.symbol.clone(),
                        })?;
                Ok((
                    pos.symbol.clone(),
                    MarketValue {
                        quantity: pos.quantity,
                        price,
                        market_value: pos.market_value(price),
                    },
                ))
            })
            .collect()
    }

    /// Market-value weight per held symbol from the given prices.
    pub fn weights_from_quotes(
        &self,
        quotes: &HashMap<String, f64>,
    ) -> Result<BTreeMap<String, f64>, TradeloopError> {
        let values = self.projected_market_values(quotes)?;
        let total: f64 = values.values().map(|v| v.market_value).sum();
        if values.is_empty() {
            return Ok(BTreeMap::new());
        }
        if total == 0.0 || !total.is_finite() {
            return Err(TradeloopError::InvalidPortfolio {
                reason: format!("total market value is {total}, weights are undefined"),
            });
        }
        Ok(values
            .into_iter()
            .map(|(symbol, v)| (symbol, v.market_value / total))
            .collect())
    }

    /// Fetches live quotes for every held symbol and computes weights.
    pub fn allocation_weights(
        &self,
        quote_port: &dyn QuotePort,
    ) -> Result<BTreeMap<String, f64>, TradeloopError> {
        if self.positions.is_empty() {
            return Ok(BTreeMap::new());
        }
        let quotes = quote_port.quotes(&self.symbols())?;
        self.weights_from_quotes(&quotes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn sample_position(symbol: &str, quantity: i64) -> Position {
        Position {
            purchase_price: 100.0,
            ..Position::new(symbol, AssetType::Equity, quantity)
        }
    }

    fn quotes(pairs: &[(&str, f64)]) -> HashMap<String, f64> {
        pairs.iter().map(|(s, p)| (s.to_string(), *p)).collect()
    }

    #[test]
    fn new_ledger_is_empty() {
        let ledger = PortfolioLedger::new(Some("ACCT".into()));
        assert_eq!(ledger.position_count(), 0);
        assert_eq!(ledger.account.as_deref(), Some("ACCT"));
    }

    #[test]
    fn add_and_query_positions() {
        let mut ledger = PortfolioLedger::new(None);
        ledger.add_positions(vec![sample_position("TSLA", 2), sample_position("SQ", 2)]);
        ledger.add_position(sample_position("MSFT", 10));

        assert!(ledger.is_held("MSFT"));
        assert!(!ledger.is_held("AAPL"));
        assert_eq!(ledger.symbols(), vec!["MSFT", "SQ", "TSLA"]);
        assert_eq!(ledger.get_position("MSFT").unwrap().quantity, 10);
    }

    #[test]
    fn remove_position_reports_outcome() {
        let mut ledger = PortfolioLedger::new(None);
        ledger.add_position(sample_position("MSFT", 10));

        let removed = ledger.remove_position("MSFT");
        assert!(removed.removed);
        assert_eq!(removed.message, "MSFT was successfully removed");

        let missing = ledger.remove_position("MSFT");
        assert!(!missing.removed);
        assert_eq!(missing.message, "MSFT did not exist in the portfolio");
    }

    #[test]
    fn set_ownership_only_for_held_symbols() {
        let mut ledger = PortfolioLedger::new(None);
        ledger.add_position(sample_position("MSFT", 10));

        assert!(ledger.set_ownership("MSFT", true));
        assert!(ledger.get_position("MSFT").unwrap().is_owned);
        assert!(!ledger.set_ownership("AAPL", true));
    }

    #[test]
    fn update_position_edits_quantity_and_price() {
        let mut ledger = PortfolioLedger::new(None);
        ledger.add_position(sample_position("MSFT", 10));
        assert!(ledger.update_position("MSFT", 12, 11.5));
        let pos = ledger.get_position("MSFT").unwrap();
        assert_eq!(pos.quantity, 12);
        assert_relative_eq!(pos.purchase_price, 11.5);
        assert!(!ledger.update_position("AAPL", 1, 1.0));
    }

    #[test]
    fn is_profitable_unknown_symbol() {
        let ledger = PortfolioLedger::new(None);
        assert_eq!(ledger.is_profitable("MSFT", 10.0), None);
    }

    #[test]
    fn allocation_groups_by_asset_type() {
        let mut ledger = PortfolioLedger::new(None);
        ledger.add_position(sample_position("MSFT", 10));
        ledger.add_position(Position::new("ES", AssetType::Future, 1));

        let allocation = ledger.allocation_by_asset_type();
        assert_eq!(allocation.len(), 5);
        assert_eq!(allocation[&AssetType::Equity].len(), 1);
        assert_eq!(allocation[&AssetType::Future][0].symbol, "ES");
        assert!(allocation[&AssetType::Forex].is_empty());
    }

    #[test]
    fn weights_scenario() {
        let mut ledger = PortfolioLedger::new(None);
        ledger.add_position(sample_position("AAPL", 2));
        ledger.add_position(sample_position("MSFT", 10));

        let weights = ledger
            .weights_from_quotes(&quotes(&[("AAPL", 150.0), ("MSFT", 10.0)]))
            .unwrap();
        assert_relative_eq!(weights["AAPL"], 0.75);
        assert_relative_eq!(weights["MSFT"], 0.25);
    }

    #[test]
    fn weights_fail_closed_on_missing_quote() {
        let mut ledger = PortfolioLedger::new(None);
        ledger.add_position(sample_position("AAPL", 2));
        ledger.add_position(sample_position("MSFT", 10));

        let err = ledger
            .weights_from_quotes(&quotes(&[("AAPL", 150.0)]))
            .unwrap_err();
        assert!(matches!(err, TradeloopError::MissingQuote { symbol } if symbol == "MSFT"));
    }

    #[test]
    fn weights_zero_total_is_an_error() {
        let mut ledger = PortfolioLedger::new(None);
        ledger.add_position(sample_position("AAPL", 0));
        assert!(ledger.weights_from_quotes(&quotes(&[("AAPL", 150.0)])).is_err());
    }

    #[test]
    fn projected_market_values() {
        let mut ledger = PortfolioLedger::new(None);
        ledger.add_position(sample_position("AAPL", 2));
        let values = ledger
            .projected_market_values(&quotes(&[("AAPL", 150.0), ("MSFT", 10.0)]))
            .unwrap();
        assert_eq!(values.len(), 1);
        assert_relative_eq!(values["AAPL"].market_value, 300.0);
    }
}
