//! Configuration validation.
//!
//! Validates every section before a run starts, naming the section and key
//! of the first problem found.

use crate::domain::bar::BarInterval;
use crate::domain::dispatcher::OwnershipPolicy;
use crate::domain::error::TradeloopError;
use crate::domain::indicator::IndicatorKind;
use crate::domain::order::{OrderDuration, OrderType, Session};
use crate::domain::position::AssetType;
use crate::domain::signal::SignalRule;
use crate::ports::config_port::ConfigPort;
use chrono::NaiveDate;
use std::str::FromStr;

pub fn validate_config(config: &dyn ConfigPort) -> Result<(), TradeloopError> {
    validate_session_config(config)?;
    validate_data_config(config)?;
    validate_portfolio_config(config)?;
    validate_strategy_config(config)?;
    validate_trade_config(config)?;
    Ok(())
}

/// Comma-separated list with blanks dropped.
pub fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn position_section(symbol: &str) -> String {
    format!("position.{symbol}")
}

pub fn trade_section(symbol: &str) -> String {
    format!("trade.{symbol}")
}

fn invalid(section: &str, key: &str, reason: impl Into<String>) -> TradeloopError {
    TradeloopError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.into(),
    }
}

fn missing(section: &str, key: &str) -> TradeloopError {
    TradeloopError::ConfigMissing {
        section: section.to_string(),
        key: key.to_string(),
    }
}

/// Reads and parses an optional key. A present but unparseable value is an error.
pub fn parse_optional<T>(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<Option<T>, TradeloopError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match config.get_string(section, key) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| invalid(section, key, e.to_string())),
    }
}

pub fn parse_required<T>(config: &dyn ConfigPort, section: &str, key: &str) -> Result<T, TradeloopError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    parse_optional(config, section, key)?.ok_or_else(|| missing(section, key))
}

pub fn parse_date(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<Option<NaiveDate>, TradeloopError> {
    match config.get_string(section, key) {
        None => Ok(None),
        Some(s) if s.trim().is_empty() => Ok(None),
        Some(s) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
            .map(Some)
            .map_err(|_| invalid(section, key, format!("invalid {key} format, expected YYYY-MM-DD"))),
    }
}

fn non_negative(section: &str, key: &str, value: Option<f64>) -> Result<(), TradeloopError> {
    match value {
        Some(v) if v < 0.0 || !v.is_finite() => {
            Err(invalid(section, key, format!("{key} must be non-negative")))
        }
        _ => Ok(()),
    }
}

pub fn validate_session_config(config: &dyn ConfigPort) -> Result<(), TradeloopError> {
    let paper = config.get_bool("session", "paper_trading", true);
    if !paper {
        match config.get_string("session", "account") {
            Some(a) if !a.trim().is_empty() => {}
            _ => return Err(missing("session", "account")),
        }
    }
    parse_optional::<BarInterval>(config, "session", "bar_interval")?;
    parse_optional::<OwnershipPolicy>(config, "session", "ownership_policy")?;
    let retry = parse_optional::<f64>(config, "session", "fetch_retry_delay_secs")?;
    non_negative("session", "fetch_retry_delay_secs", retry)?;
    let backfill = parse_optional::<i64>(config, "session", "backfill_days")?;
    if backfill.is_some_and(|d| d < 0) {
        return Err(invalid(
            "session",
            "backfill_days",
            "backfill_days must be non-negative",
        ));
    }
    Ok(())
}

pub fn validate_data_config(config: &dyn ConfigPort) -> Result<(), TradeloopError> {
    let source = config
        .get_string("data", "source")
        .ok_or_else(|| missing("data", "source"))?;
    match source.trim().to_lowercase().as_str() {
        "csv" => match config.get_string("data", "csv_dir") {
            Some(dir) if !dir.trim().is_empty() => Ok(()),
            _ => Err(missing("data", "csv_dir")),
        },
        "sqlite" => {
            match config.get_string("data", "path") {
                Some(p) if !p.trim().is_empty() => {}
                _ => return Err(missing("data", "path")),
            }
            let pool = parse_optional::<i64>(config, "data", "pool_size")?;
            if pool.is_some_and(|p| p < 1 || u32::try_from(p).is_err()) {
                return Err(invalid(
                    "data",
                    "pool_size",
                    format!("pool_size must be between 1 and {}", u32::MAX),
                ));
            }
            Ok(())
        }
        other => Err(invalid(
            "data",
            "source",
            format!("unknown data source '{other}', expected csv or sqlite"),
        )),
    }
}

pub fn validate_portfolio_config(config: &dyn ConfigPort) -> Result<(), TradeloopError> {
    let symbols = split_list(&config.get_string("portfolio", "positions").unwrap_or_default());
    if symbols.is_empty() {
        return Err(missing("portfolio", "positions"));
    }
    for symbol in &symbols {
        let section = position_section(symbol);
        parse_optional::<AssetType>(config, &section, "asset_type")?;
        let quantity = parse_optional::<i64>(config, &section, "quantity")?;
        if quantity.is_some_and(|q| q < 0) {
            return Err(invalid(&section, "quantity", "quantity must be non-negative"));
        }
        let price = parse_optional::<f64>(config, &section, "purchase_price")?;
        non_negative(&section, "purchase_price", price)?;
        parse_date(config, &section, "purchase_date")?;
    }
    Ok(())
}

/// Indicator columns and the signal rules keyed by them.
pub fn validate_strategy_config(config: &dyn ConfigPort) -> Result<(), TradeloopError> {
    let columns = split_list(&config.get_string("indicators", "columns").unwrap_or_default());
    if columns.is_empty() {
        return Err(missing("indicators", "columns"));
    }
    let mut rules = 0;
    for column in &columns {
        let kind: IndicatorKind = column
            .parse()
            .map_err(|e: String| invalid("indicators", "columns", e))?;
        let name = kind.to_string();
        if let Some(body) = config.get_string("signals", &name) {
            SignalRule::parse(&name, &body).map_err(|e| invalid("signals", &name, e))?;
            rules += 1;
        }
    }
    if rules == 0 {
        return Err(invalid(
            "signals",
            "*",
            "no signal rule references a configured indicator",
        ));
    }
    Ok(())
}

pub fn validate_trade_config(config: &dyn ConfigPort) -> Result<(), TradeloopError> {
    let symbols = split_list(&config.get_string("portfolio", "positions").unwrap_or_default());
    for symbol in &symbols {
        let section = trade_section(symbol);
        let Some(directions) = config.get_string(&section, "directions") else {
            if config.get_string(&section, "quantity").is_some() {
                return Err(missing(&section, "directions"));
            }
            continue;
        };
        for direction in split_list(&directions) {
            if !matches!(direction.to_lowercase().as_str(), "buy" | "sell") {
                return Err(invalid(
                    &section,
                    "directions",
                    format!("unknown direction '{direction}'"),
                ));
            }
        }
        let quantity: i64 = parse_required(config, &section, "quantity")?;
        if quantity <= 0 {
            return Err(invalid(&section, "quantity", "quantity must be positive"));
        }
        let order_type =
            parse_optional::<OrderType>(config, &section, "order_type")?.unwrap_or(OrderType::Market);
        let price = parse_optional::<f64>(config, &section, "price")?;
        if order_type != OrderType::Market && price.is_none() {
            return Err(missing(&section, "price"));
        }
        if order_type == OrderType::StopLimit
            && parse_optional::<f64>(config, &section, "stop_limit_price")?.is_none()
        {
            return Err(missing(&section, "stop_limit_price"));
        }
        parse_optional::<Session>(config, &section, "session")?;
        parse_optional::<OrderDuration>(config, &section, "duration")?;
        parse_date(config, &section, "cancel_time")?;
        let stop = parse_optional::<f64>(config, &section, "stop_loss")?;
        non_negative(&section, "stop_loss", stop)?;
        if let Some(pct) = parse_optional::<f64>(config, &section, "stop_loss_percentage")? {
            if !(pct > 0.0 && pct < 100.0) {
                return Err(invalid(
                    &section,
                    "stop_loss_percentage",
                    "stop_loss_percentage must be between 0 and 100",
                ));
            }
            if price.is_none() {
                return Err(missing(&section, "price"));
            }
        }
    }
    Ok(())
}
