//! CLI definition and dispatch.

use chrono::{Duration, Utc};
use clap::{Parser, Subcommand};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::atomic::AtomicBool;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::adapters::csv_adapter::CsvAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::json_audit_log::JsonAuditLog;
use crate::adapters::system_clock::SystemClock;
use crate::domain::bar::BarInterval;
use crate::domain::bar_store::BarStore;
use crate::domain::config_validation::{
    parse_date, parse_optional, position_section, split_list, trade_section, validate_config,
};
use crate::domain::dispatcher::{OwnershipPolicy, SimulatedSink, TradeDispatcher};
use crate::domain::error::TradeloopError;
use crate::domain::indicator::{IndicatorEngine, IndicatorKind};
use crate::domain::market_hours::MarketHours;
use crate::domain::order::{
    Direction, OrderDuration, OrderType, Session, StopLoss, TradePlan, TradeRequest,
};
use crate::domain::portfolio::PortfolioLedger;
use crate::domain::position::{AssetType, Position};
use crate::domain::risk::portfolio_metrics;
use crate::domain::scheduler::{ExecutionScheduler, SchedulerConfig, SchedulerPorts};
use crate::domain::session::TradingSession;
use crate::domain::signal::{SignalRule, ThresholdSignals};
use crate::ports::config_port::ConfigPort;
use crate::ports::market_data_port::MarketDataPort;
use crate::ports::quote_port::QuotePort;

const DEFAULT_AUDIT_LOG: &str = "data/orders.json";
const DEFAULT_BACKFILL_DAYS: i64 = 30;
const DEFAULT_LOOKBACK_DAYS: i64 = 365;

#[derive(Parser, Debug)]
#[command(name = "tradeloop", about = "Bar-driven trading loop")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the trading loop
    Run {
        #[arg(short, long)]
        config: PathBuf,
        /// Stop after this many cycles
        #[arg(long)]
        max_cycles: Option<usize>,
    },
    /// Validate a configuration file
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Print allocation weights and portfolio variance
    Metrics {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Print the current market phase
    Hours,
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Run { config, max_cycles } => run_trading(&config, max_cycles),
        Command::Validate { config } => run_validate(&config),
        Command::Metrics { config } => run_metrics(&config),
        Command::Hours => run_hours(),
    }
}

/// Installs the stderr log subscriber. `RUST_LOG` overrides the `info` default.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, ExitCode> {
    FileConfigAdapter::from_file(path).map_err(|e| {
        eprintln!("error: {e}");
        ExitCode::from(&e)
    })
}

fn fail(e: TradeloopError) -> ExitCode {
    eprintln!("error: {e}");
    (&e).into()
}

pub fn build_scheduler_config(config: &dyn ConfigPort) -> Result<SchedulerConfig, TradeloopError> {
    let defaults = SchedulerConfig::default();
    let bar_interval = parse_optional::<BarInterval>(config, "session", "bar_interval")?
        .unwrap_or(defaults.bar_interval);
    let fetch_retry_delay =
        match parse_optional::<f64>(config, "session", "fetch_retry_delay_secs")? {
            Some(secs) => std::time::Duration::try_from_secs_f64(secs).map_err(|e| {
                TradeloopError::ConfigInvalid {
                    section: "session".into(),
                    key: "fetch_retry_delay_secs".into(),
                    reason: e.to_string(),
                }
            })?,
            None => defaults.fetch_retry_delay,
        };
    Ok(SchedulerConfig {
        bar_interval,
        fetch_retry_delay,
    })
}

pub fn build_ownership_policy(config: &dyn ConfigPort) -> Result<OwnershipPolicy, TradeloopError> {
    Ok(parse_optional(config, "session", "ownership_policy")?.unwrap_or_default())
}

/// Positions from `[portfolio] positions` and their `[position.<SYMBOL>]` sections.
///
/// A position with a positive quantity starts out owned.
pub fn build_ledger(config: &dyn ConfigPort) -> Result<PortfolioLedger, TradeloopError> {
    let account = config
        .get_string("session", "account")
        .filter(|a| !a.trim().is_empty());
    let mut ledger = PortfolioLedger::new(account);

    for symbol in split_list(&config.get_string("portfolio", "positions").unwrap_or_default()) {
        let section = position_section(&symbol);
        let asset_type =
            parse_optional::<AssetType>(config, &section, "asset_type")?.unwrap_or(AssetType::Equity);
        let quantity = parse_optional::<i64>(config, &section, "quantity")?.unwrap_or(0);
        let position = Position {
            purchase_price: parse_optional::<f64>(config, &section, "purchase_price")?
                .unwrap_or(0.0),
            purchase_date: parse_date(config, &section, "purchase_date")?,
            is_owned: quantity > 0,
            ..Position::new(symbol.clone(), asset_type, quantity)
        };
        ledger.add_position(position);
    }
    Ok(ledger)
}

/// One trade request per direction listed in each `[trade.<SYMBOL>]` section.
pub fn build_trade_plans(
    config: &dyn ConfigPort,
    ledger: &PortfolioLedger,
) -> Result<BTreeMap<String, TradePlan>, TradeloopError> {
    let mut plans = BTreeMap::new();
    for position in ledger.positions() {
        let section = trade_section(&position.symbol);
        let Some(directions) = config.get_string(&section, "directions") else {
            continue;
        };

        let quantity = parse_optional::<i64>(config, &section, "quantity")?.unwrap_or(0);
        let order_type =
            parse_optional::<OrderType>(config, &section, "order_type")?.unwrap_or(OrderType::Market);
        let price = parse_optional::<f64>(config, &section, "price")?;
        let stop_limit_price = parse_optional::<f64>(config, &section, "stop_limit_price")?;
        let session = parse_optional::<Session>(config, &section, "session")?.unwrap_or_default();
        let duration =
            parse_optional::<OrderDuration>(config, &section, "duration")?.unwrap_or_default();
        let cancel_time = parse_date(config, &section, "cancel_time")?;
        let stop_loss = match parse_optional::<f64>(config, &section, "stop_loss")? {
            Some(stop_price) => Some(StopLoss::Absolute(stop_price)),
            None => parse_optional::<f64>(config, &section, "stop_loss_percentage")?
                .map(StopLoss::Percentage),
        };

        let mut plan = TradePlan::default();
        for name in split_list(&directions) {
            let direction = match name.to_lowercase().as_str() {
                "buy" => Direction::Buy,
                "sell" => Direction::Sell,
                other => {
                    return Err(TradeloopError::ConfigInvalid {
                        section: section.clone(),
                        key: "directions".into(),
                        reason: format!("unknown direction '{other}'"),
                    });
                }
            };

            let mut request = TradeRequest::for_direction(
                format!("{}-{}", position.symbol, direction),
                direction,
                order_type,
            )
            .with_instrument(position.symbol.clone(), quantity, position.asset_type)
            .with_session(session)
            .with_duration(duration, cancel_time);
            if let Some(p) = price {
                request = request.with_price(p);
            }
            if let Some(p) = stop_limit_price {
                request = request.with_stop_limit_price(p);
            }

            match direction {
                Direction::Buy => {
                    if let Some(stop) = stop_loss {
                        request = request.with_stop_loss(stop);
                    }
                    plan.buy = Some(request);
                }
                Direction::Sell => plan.sell = Some(request),
            }
        }
        plans.insert(position.symbol.clone(), plan);
    }
    Ok(plans)
}

pub fn build_indicators(config: &dyn ConfigPort) -> Result<IndicatorEngine, TradeloopError> {
    let kinds = split_list(&config.get_string("indicators", "columns").unwrap_or_default())
        .iter()
        .map(|c| {
            c.parse::<IndicatorKind>()
                .map_err(|reason| TradeloopError::ConfigInvalid {
                    section: "indicators".into(),
                    key: "columns".into(),
                    reason,
                })
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(IndicatorEngine::new(kinds))
}

/// Signal rules for the configured indicator columns, keyed by column name.
pub fn build_signals(
    config: &dyn ConfigPort,
    indicators: &IndicatorEngine,
) -> Result<ThresholdSignals, TradeloopError> {
    let mut rules = Vec::new();
    for kind in indicators.indicators() {
        let column = kind.to_string();
        if let Some(body) = config.get_string("signals", &column) {
            let rule = SignalRule::parse(&column, &body).map_err(|reason| {
                TradeloopError::ConfigInvalid {
                    section: "signals".into(),
                    key: column.clone(),
                    reason,
                }
            })?;
            rules.push(rule);
        }
    }
    Ok(ThresholdSignals::new(rules))
}

/// A market data source that also serves quotes.
pub trait DataSource {
    fn market_data(&self) -> &dyn MarketDataPort;
    fn quote_source(&self) -> &dyn QuotePort;
}

impl<T: MarketDataPort + QuotePort> DataSource for T {
    fn market_data(&self) -> &dyn MarketDataPort {
        self
    }

    fn quote_source(&self) -> &dyn QuotePort {
        self
    }
}

pub fn build_data_source(config: &dyn ConfigPort) -> Result<Box<dyn DataSource>, TradeloopError> {
    let source = config
        .get_string("data", "source")
        .unwrap_or_default()
        .trim()
        .to_lowercase();
    match source.as_str() {
        "csv" => {
            let dir = config
                .get_string("data", "csv_dir")
                .ok_or_else(|| TradeloopError::ConfigMissing {
                    section: "data".into(),
                    key: "csv_dir".into(),
                })?;
            Ok(Box::new(CsvAdapter::new(PathBuf::from(dir))))
        }
        #[cfg(feature = "sqlite")]
        "sqlite" => {
            let adapter = crate::adapters::sqlite_adapter::SqliteAdapter::from_config(config)?;
            Ok(Box::new(adapter))
        }
        other => Err(TradeloopError::ConfigInvalid {
            section: "data".into(),
            key: "source".into(),
            reason: format!("data source '{other}' is not available in this build"),
        }),
    }
}

fn days_setting(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: i64,
) -> Result<i64, TradeloopError> {
    Ok(parse_optional::<i64>(config, section, key)?.unwrap_or(default))
}

fn run_trading(config_path: &Path, max_cycles: Option<usize>) -> ExitCode {
    init_tracing();
    eprintln!("Loading config from {}", config_path.display());
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };
    if let Err(e) = validate_config(&config) {
        return fail(e);
    }
    if !config.get_bool("session", "paper_trading", true) {
        return fail(TradeloopError::ConfigInvalid {
            section: "session".into(),
            key: "paper_trading".into(),
            reason: "no brokerage adapter is available, only paper trading is supported".into(),
        });
    }

    let setup = (|| -> Result<_, TradeloopError> {
        let scheduler_config = build_scheduler_config(&config)?;
        let policy = build_ownership_policy(&config)?;
        let ledger = build_ledger(&config)?;
        let plans = build_trade_plans(&config, &ledger)?;
        let indicators = build_indicators(&config)?;
        let signals = build_signals(&config, &indicators)?;
        let data = build_data_source(&config)?;
        let backfill_days = days_setting(&config, "session", "backfill_days", DEFAULT_BACKFILL_DAYS)?;
        Ok((scheduler_config, policy, ledger, plans, indicators, signals, data, backfill_days))
    })();
    let (scheduler_config, policy, ledger, plans, indicators, signals, data, backfill_days) =
        match setup {
            Ok(parts) => parts,
            Err(e) => return fail(e),
        };

    let audit_path = config
        .get_string("session", "audit_log")
        .unwrap_or_else(|| DEFAULT_AUDIT_LOG.to_string());
    let audit_log = JsonAuditLog::new(audit_path);
    let clock = SystemClock;

    let ports = SchedulerPorts {
        market_data: data.market_data(),
        indicators: &indicators,
        signals: &signals,
        audit_log: &audit_log,
        clock: &clock,
    };
    eprintln!(
        "Paper trading {} symbols on {} bars, audit log {}",
        ledger.position_count(),
        scheduler_config.bar_interval,
        audit_log.path().display()
    );

    let dispatcher = TradeDispatcher::new(SimulatedSink, policy);
    let mut scheduler = ExecutionScheduler::new(scheduler_config, ports, dispatcher);
    let mut session = TradingSession::new(ledger, plans);

    if backfill_days > 0 {
        let end = Utc::now();
        let start = end - Duration::days(backfill_days);
        if let Err(e) = scheduler.backfill(&mut session, start, end) {
            return fail(e);
        }
    }

    let stop = AtomicBool::new(false);
    match scheduler.run(&mut session, &stop, max_cycles) {
        Ok(summary) => {
            eprintln!(
                "Stopped after {} cycles, {} orders recorded",
                summary.cycles, summary.receipts
            );
            ExitCode::SUCCESS
        }
        Err(e) => fail(e),
    }
}

fn run_validate(config_path: &Path) -> ExitCode {
    eprintln!("Validating config: {}", config_path.display());
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };
    if let Err(e) = validate_config(&config) {
        return fail(e);
    }

    let summary = (|| -> Result<_, TradeloopError> {
        let ledger = build_ledger(&config)?;
        let plans = build_trade_plans(&config, &ledger)?;
        let indicators = build_indicators(&config)?;
        let signals = build_signals(&config, &indicators)?;
        Ok((ledger, plans, indicators, signals))
    })();
    let (ledger, plans, indicators, signals) = match summary {
        Ok(parts) => parts,
        Err(e) => return fail(e),
    };

    eprintln!("\nPositions:");
    for position in ledger.positions() {
        eprintln!(
            "  {}: {} x {} ({})",
            position.symbol, position.quantity, position.purchase_price, position.asset_type
        );
    }

    eprintln!("\nIndicators:");
    for kind in indicators.indicators() {
        eprintln!("  {}", kind);
    }

    eprintln!("\nSignal rules:");
    for rule in signals.rules() {
        let buy = rule.buy.map(|c| format!("buy {c}")).unwrap_or_default();
        let sell = rule.sell.map(|c| format!("sell {c}")).unwrap_or_default();
        eprintln!("  {}: {} {}", rule.column, buy, sell);
    }

    eprintln!("\nTrade plans:");
    for (symbol, plan) in &plans {
        for request in [&plan.buy, &plan.sell].into_iter().flatten() {
            match request.to_order_request() {
                Ok(order) => eprintln!(
                    "  {}: {} {:?}, {} legs",
                    symbol,
                    request.direction(),
                    order.order_type,
                    order.order_leg_collection.len()
                ),
                Err(e) => return fail(e),
            }
        }
    }

    eprintln!("\nConfiguration is valid.");
    ExitCode::SUCCESS
}

fn run_metrics(config_path: &Path) -> ExitCode {
    init_tracing();
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };
    if let Err(e) = validate_config(&config) {
        return fail(e);
    }

    let result = (|| -> Result<_, TradeloopError> {
        let ledger = build_ledger(&config)?;
        let data = build_data_source(&config)?;
        let lookback = days_setting(&config, "metrics", "lookback_days", DEFAULT_LOOKBACK_DAYS)?;

        let weights = ledger.allocation_weights(data.quote_source())?;
        let end = Utc::now();
        let start = end - Duration::days(lookback);
        let mut daily = BarStore::new();
        for symbol in weights.keys() {
            let bars =
                data.market_data()
                    .historical_bars(symbol, start, end, BarInterval::ONE_DAY)?;
            daily.upsert_batch(bars);
        }
        portfolio_metrics(&weights, &daily)
    })();
    let metrics = match result {
        Ok(m) => m,
        Err(e) => return fail(e),
    };

    println!(
        "{:<8} {:>8} {:>12} {:>12} {:>12}",
        "symbol", "weight", "avg return", "weighted", "std dev"
    );
    for (symbol, m) in &metrics.symbols {
        println!(
            "{:<8} {:>8.4} {:>12.6} {:>12.6} {:>12.6}",
            symbol, m.weight, m.average_return, m.weighted_return, m.standard_deviation
        );
    }
    println!("\nPortfolio variance: {:.8}", metrics.variance);
    println!("Portfolio std dev:  {:.8}", metrics.variance.sqrt());
    ExitCode::SUCCESS
}

fn run_hours() -> ExitCode {
    let now = Utc::now();
    let hours = MarketHours::default();
    println!("{}: {}", now.format("%Y-%m-%d %H:%M:%S UTC"), hours.phase(now));
    ExitCode::SUCCESS
}
