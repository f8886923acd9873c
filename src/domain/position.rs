//! Held positions.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssetType {
    Equity,
    FixedIncome,
    Option,
    Future,
    Forex,
}

impl AssetType {
    pub const ALL: [AssetType; 5] = [
        AssetType::Equity,
        AssetType::FixedIncome,
        AssetType::Option,
        AssetType::Future,
        AssetType::Forex,
    ];
}

impl fmt::Display for AssetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AssetType::Equity => "equity",
            AssetType::FixedIncome => "fixed_income",
            AssetType::Option => "option",
            AssetType::Future => "future",
            AssetType::Forex => "forex",
        };
        f.write_str(name)
    }
}

impl FromStr for AssetType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "equity" | "stock" => Ok(AssetType::Equity),
            "fixed_income" | "bond" => Ok(AssetType::FixedIncome),
            "option" => Ok(AssetType::Option),
            "future" => Ok(AssetType::Future),
            "forex" => Ok(AssetType::Forex),
            other => Err(format!("unknown asset type '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub symbol: String,
    pub asset_type: AssetType,
    pub purchase_date: Option<NaiveDate>,
    pub purchase_price: f64,
    pub quantity: i64,
    pub is_owned: bool,
}

impl Position {
    pub fn new(symbol: impl Into<String>, asset_type: AssetType, quantity: i64) -> Self {
        Position {
            symbol: symbol.into(),
            asset_type,
            purchase_date: None,
            purchase_price: 0.0,
            quantity,
            is_owned: false,
        }
    }

    pub fn market_value(&self, price: f64) -> f64 {
        self.quantity as f64 * price
    }

    /// A position at or above its purchase price counts as profitable.
    pub fn is_profitable(&self, current_price: f64) -> bool {
        self.purchase_price <= current_price
    }
}
