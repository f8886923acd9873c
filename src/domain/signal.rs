//! Buy/sell signal sets and the threshold signal engine.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use tracing::debug;

use super::bar_store::BarStore;
use super::error::TradeloopError;
use super::order::Direction;
use crate::ports::signal_port::SignalPort;

/// Symbols flagged for buying and selling on the latest bar.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Signals {
    pub buys: BTreeSet<String>,
    pub sells: BTreeSet<String>,
}

impl Signals {
    pub fn is_empty(&self) -> bool {
        self.buys.is_empty() && self.sells.is_empty()
    }

    /// The one direction acted on this cycle.
    ///
    /// Buys take precedence: when `buys` is non-empty, `sells` is ignored
    /// entirely, even for symbols that appear in both sets.
    pub fn decision(&self) -> Option<(Direction, &BTreeSet<String>)> {
        if !self.buys.is_empty() {
            Some((Direction::Buy, &self.buys))
        } else if !self.sells.is_empty() {
            Some((Direction::Sell, &self.sells))
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Greater,
    GreaterOrEqual,
    Less,
    LessOrEqual,
    Equal,
}

impl Comparison {
    pub fn holds(self, value: f64, threshold: f64) -> bool {
        match self {
            Comparison::Greater => value > threshold,
            Comparison::GreaterOrEqual => value >= threshold,
            Comparison::Less => value < threshold,
            Comparison::LessOrEqual => value <= threshold,
            Comparison::Equal => value == threshold,
        }
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = match self {
            Comparison::Greater => ">",
            Comparison::GreaterOrEqual => ">=",
            Comparison::Less => "<",
            Comparison::LessOrEqual => "<=",
            Comparison::Equal => "==",
        };
        f.write_str(op)
    }
}

impl FromStr for Comparison {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            ">" => Ok(Comparison::Greater),
            ">=" => Ok(Comparison::GreaterOrEqual),
            "<" => Ok(Comparison::Less),
            "<=" => Ok(Comparison::LessOrEqual),
            "==" | "=" => Ok(Comparison::Equal),
            other => Err(format!("unknown comparison operator '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Condition {
    pub comparison: Comparison,
    pub threshold: f64,
}

impl Condition {
    pub fn new(comparison: Comparison, threshold: f64) -> Self {
        Condition {
            comparison,
            threshold,
        }
    }

    pub fn holds(&self, value: f64) -> bool {
        self.comparison.holds(value, self.threshold)
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.comparison, self.threshold)
    }
}

/// Buy and sell conditions for one indicator column.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalRule {
    pub column: String,
    pub buy: Option<Condition>,
    pub sell: Option<Condition>,
}

impl SignalRule {
    /// Parses a rule body such as `buy >= 40, sell <= 20`.
    pub fn parse(column: &str, body: &str) -> Result<SignalRule, String> {
        let mut rule = SignalRule {
            column: column.to_string(),
            buy: None,
            sell: None,
        };
        for part in body.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (side, rest) = part
                .split_once(char::is_whitespace)
                .ok_or_else(|| format!("expected '<buy|sell> <op> <value>', got '{part}'"))?;
            let condition = parse_condition(rest.trim())?;
            match side.to_lowercase().as_str() {
                "buy" => rule.buy = Some(condition),
                "sell" => rule.sell = Some(condition),
                other => return Err(format!("unknown signal side '{other}'")),
            }
        }
        if rule.buy.is_none() && rule.sell.is_none() {
            return Err(format!("rule for {column} has no conditions"));
        }
        Ok(rule)
    }
}

fn parse_condition(text: &str) -> Result<Condition, String> {
    let split = text
        .find(|c: char| !matches!(c, '<' | '>' | '='))
        .ok_or_else(|| format!("missing threshold in '{text}'"))?;
    let (op, value) = text.split_at(split);
    let comparison: Comparison = op.parse()?;
    let threshold: f64 = value
        .trim()
        .parse()
        .map_err(|_| format!("invalid threshold '{}'", value.trim()))?;
    Ok(Condition::new(comparison, threshold))
}

/// Compares each symbol's latest indicator values with fixed thresholds.
///
/// A symbol is a buy when every rule with a buy condition holds, and a sell
/// when every rule with a sell condition holds. Symbols whose latest row has
/// no value yet for a referenced column are skipped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ThresholdSignals {
    rules: Vec<SignalRule>,
}

impl ThresholdSignals {
    pub fn new(rules: Vec<SignalRule>) -> Self {
        ThresholdSignals { rules }
    }

    pub fn rules(&self) -> &[SignalRule] {
        &self.rules
    }

    pub fn columns(&self) -> Vec<String> {
        let names: BTreeSet<&str> = self.rules.iter().map(|r| r.column.as_str()).collect();
        names.into_iter().map(str::to_string).collect()
    }

    fn side_holds(
        &self,
        values: &[(usize, f64)],
        pick: impl Fn(&SignalRule) -> Option<Condition>,
    ) -> bool {
        let mut any = false;
        for (idx, value) in values {
            if let Some(condition) = pick(&self.rules[*idx]) {
                any = true;
                if !condition.holds(*value) {
                    return false;
                }
            }
        }
        any
    }
}

impl SignalPort for ThresholdSignals {
    fn evaluate(&self, store: &BarStore) -> Result<Signals, TradeloopError> {
        store.has_columns(&self.columns())?;

        let mut signals = Signals::default();
        for (symbol, rows) in store.grouped_by_symbol() {
            let Some(latest) = rows.last() else {
                continue;
            };
            let key = latest.key();
            let values: Option<Vec<(usize, f64)>> = self
                .rules
                .iter()
                .enumerate()
                .map(|(idx, rule)| store.value(&rule.column, &key).map(|v| (idx, v)))
                .collect();
            let Some(values) = values else {
                debug!(symbol = %symbol, "indicator values not ready, skipping");
                continue;
            };

            if self.side_holds(&values, |r| r.buy) {
                signals.buys.insert(symbol.to_string());
            }
            if self.side_holds(&values, |r| r.sell) {
                signals.sells.insert(symbol.to_string());
            }
        }
        Ok(signals)
    }
}
