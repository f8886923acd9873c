//! The polling trading loop.
//!
//! One cycle: fetch the latest bar per ledger symbol, upsert into the store,
//! refresh indicators, evaluate signals, dispatch, write the cycle's receipts
//! to the audit log. Between cycles the scheduler sleeps until the next bar.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use super::bar::{Bar, BarInterval};
use super::dispatcher::{DispatchOutcome, OrderSink, TradeDispatcher};
use super::error::TradeloopError;
use super::order::{Direction, OrderReceipt};
use super::session::TradingSession;
use super::signal::Signals;
use crate::ports::audit_log_port::AuditLogPort;
use crate::ports::clock_port::ClockPort;
use crate::ports::indicator_port::IndicatorPort;
use crate::ports::market_data_port::MarketDataPort;
use crate::ports::signal_port::SignalPort;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerPhase {
    Idle,
    Fetching,
    Ingesting,
    Evaluating,
    Dispatching,
    Waiting,
    Stopped,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerConfig {
    pub bar_interval: BarInterval,
    pub fetch_retry_delay: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        SchedulerConfig {
            bar_interval: BarInterval::ONE_MINUTE,
            fetch_retry_delay: Duration::from_secs(2),
        }
    }
}

/// Collaborators the scheduler drives.
#[derive(Clone, Copy)]
pub struct SchedulerPorts<'a> {
    pub market_data: &'a dyn MarketDataPort,
    pub indicators: &'a dyn IndicatorPort,
    pub signals: &'a dyn SignalPort,
    pub audit_log: &'a dyn AuditLogPort,
    pub clock: &'a dyn ClockPort,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleReport {
    pub fetched: Vec<String>,
    pub skipped: Vec<String>,
    pub signals: Signals,
    pub direction: Option<Direction>,
    pub receipts: Vec<OrderReceipt>,
    pub duplicates: Vec<String>,
    pub failures: Vec<(String, String)>,
    pub evaluation_error: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub cycles: usize,
    pub receipts: usize,
}

/// Time to sleep until the bar after `last_bar`.
///
/// Clamped at zero, so an overrun cycle fetches again immediately. With no
/// bars at all the scheduler waits one full interval.
pub fn compute_wait(
    last_bar: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    interval: BarInterval,
) -> Duration {
    let wait = match last_bar {
        Some(last) => last + interval.duration() - now,
        None => interval.duration(),
    };
    wait.to_std().unwrap_or(Duration::ZERO)
}

pub struct ExecutionScheduler<'a, S: OrderSink> {
    config: SchedulerConfig,
    ports: SchedulerPorts<'a>,
    dispatcher: TradeDispatcher<S>,
    phase: SchedulerPhase,
}

impl<'a, S: OrderSink> ExecutionScheduler<'a, S> {
    pub fn new(
        config: SchedulerConfig,
        ports: SchedulerPorts<'a>,
        dispatcher: TradeDispatcher<S>,
    ) -> Self {
        ExecutionScheduler {
            config,
            ports,
            dispatcher,
            phase: SchedulerPhase::Idle,
        }
    }

    pub fn phase(&self) -> SchedulerPhase {
        self.phase
    }

    pub fn dispatcher(&self) -> &TradeDispatcher<S> {
        &self.dispatcher
    }

    /// Loads history for every ledger symbol. Per-symbol failures are logged
    /// and skipped; returns the number of bars ingested.
    pub fn backfill(
        &mut self,
        session: &mut TradingSession,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<usize, TradeloopError> {
        let mut ingested = 0;
        for symbol in session.ledger.symbols() {
            match self.ports.market_data.historical_bars(
                &symbol,
                start,
                end,
                self.config.bar_interval,
            ) {
                Ok(bars) => {
                    ingested += bars.len();
                    session.store.upsert_batch(bars);
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => warn!(symbol = %symbol, error = %e, "backfill failed, skipping"),
            }
        }
        info!(bars = ingested, rows = session.store.len(), "backfill complete");
        Ok(ingested)
    }

    fn fetch_latest(&self, symbol: &str) -> Result<Bar, TradeloopError> {
        let interval = self.config.bar_interval;
        match self.ports.market_data.latest_bar(symbol, interval) {
            Ok(bar) => Ok(bar),
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                warn!(symbol = %symbol, error = %e, "fetch failed, retrying once");
                self.ports.clock.sleep(self.config.fetch_retry_delay);
                self.ports.market_data.latest_bar(symbol, interval)
            }
        }
    }

    /// Runs one full cycle.
    ///
    /// Returns an error only for a fatal session failure or a failed audit
    /// write; everything symbol-specific is isolated into the report.
    pub fn run_cycle(
        &mut self,
        session: &mut TradingSession,
    ) -> Result<CycleReport, TradeloopError> {
        let mut report = CycleReport::default();

        self.phase = SchedulerPhase::Fetching;
        let mut bars = Vec::new();
        for symbol in session.ledger.symbols() {
            match self.fetch_latest(&symbol) {
                Ok(bar) => {
                    bars.push(bar);
                    report.fetched.push(symbol);
                }
                Err(e) if e.is_fatal() => return Err(self.halt(e)),
                Err(e) => {
                    warn!(symbol = %symbol, error = %e, "fetch failed twice, skipping symbol this cycle");
                    report.skipped.push(symbol);
                }
            }
        }
        // Flags belong to a bar: a re-fetched trailing bar keeps them.
        for bar in &bars {
            let advanced = session
                .store
                .latest_row(&bar.symbol)
                .ok()
                .is_none_or(|previous| bar.timestamp > previous.timestamp);
            if advanced {
                session.executions.reset_symbol(&bar.symbol);
            }
        }

        self.phase = SchedulerPhase::Ingesting;
        session.store.upsert_batch(bars);

        self.phase = SchedulerPhase::Evaluating;
        let evaluated = self
            .ports
            .indicators
            .refresh(&mut session.store)
            .and_then(|_| self.ports.signals.evaluate(&session.store));
        match evaluated {
            Ok(signals) => report.signals = signals,
            Err(e) if e.is_fatal() => return Err(self.halt(e)),
            Err(e) => {
                error!(error = %e, "signal evaluation failed, nothing dispatched this cycle");
                report.evaluation_error = Some(e.to_string());
            }
        }

        self.phase = SchedulerPhase::Dispatching;
        let mut receipts = Vec::new();
        let mut fatal = None;
        if let Some((direction, symbols)) = report.signals.decision() {
            report.direction = Some(direction);
            for symbol in symbols {
                let now = self.ports.clock.now();
                match self.dispatcher.dispatch(session, symbol, direction, now) {
                    Ok(DispatchOutcome::Placed(receipt)) => receipts.push(receipt),
                    Ok(DispatchOutcome::DuplicatePrevented) => {
                        report.duplicates.push(symbol.clone())
                    }
                    Ok(DispatchOutcome::NoTradePlan) => {}
                    Err(e) if e.is_fatal() => {
                        fatal = Some(e);
                        break;
                    }
                    Err(e) => {
                        warn!(symbol = %symbol, %direction, error = %e, "dispatch failed");
                        report.failures.push((symbol.clone(), e.to_string()));
                    }
                }
            }
        }

        if !receipts.is_empty() {
            if let Err(audit_err) = self.ports.audit_log.append_batch(&receipts) {
                return match fatal {
                    Some(e) => {
                        error!(error = %audit_err, orders = receipts.len(), "audit write failed while halting");
                        Err(self.halt(e))
                    }
                    None => Err(audit_err),
                };
            }
        }
        report.receipts = receipts;

        if let Some(e) = fatal {
            return Err(self.halt(e));
        }

        info!(
            fetched = report.fetched.len(),
            skipped = report.skipped.len(),
            buys = report.signals.buys.len(),
            sells = report.signals.sells.len(),
            orders = report.receipts.len(),
            "cycle complete"
        );
        Ok(report)
    }

    fn halt(&mut self, e: TradeloopError) -> TradeloopError {
        error!(error = %e, "fatal error, stopping scheduler");
        self.phase = SchedulerPhase::Stopped;
        e
    }

    /// Cycles until `stop` is set, `max_cycles` is reached, or a cycle fails.
    pub fn run(
        &mut self,
        session: &mut TradingSession,
        stop: &AtomicBool,
        max_cycles: Option<usize>,
    ) -> Result<RunSummary, TradeloopError> {
        let mut summary = RunSummary::default();
        loop {
            if stop.load(Ordering::SeqCst) {
                info!(cycles = summary.cycles, "stop requested");
                break;
            }
            if max_cycles.is_some_and(|max| summary.cycles >= max) {
                break;
            }

            let report = match self.run_cycle(session) {
                Ok(report) => report,
                Err(e) => {
                    self.phase = SchedulerPhase::Stopped;
                    return Err(e);
                }
            };
            summary.cycles += 1;
            summary.receipts += report.receipts.len();

            if max_cycles.is_some_and(|max| summary.cycles >= max) {
                break;
            }

            self.phase = SchedulerPhase::Waiting;
            let now = self.ports.clock.now();
            let wait = compute_wait(session.store.last_timestamp(), now, self.config.bar_interval);
            info!(wait_secs = wait.as_secs_f64(), "pausing for the next bar");
            self.ports.clock.sleep(wait);
            self.phase = SchedulerPhase::Idle;
        }
        self.phase = SchedulerPhase::Stopped;
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(hour: u32, minute: u32, second: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 15, hour, minute, second).unwrap()
    }

    #[test]
    fn wait_until_next_bar() {
        let wait = compute_wait(Some(t(14, 0, 0)), t(14, 0, 20), BarInterval::ONE_MINUTE);
        assert_eq!(wait, Duration::from_secs(40));
    }

    #[test]
    fn overrun_waits_zero() {
        let wait = compute_wait(Some(t(14, 0, 0)), t(14, 3, 0), BarInterval::ONE_MINUTE);
        assert_eq!(wait, Duration::ZERO);
    }

    #[test]
    fn empty_store_waits_full_interval() {
        let wait = compute_wait(None, t(14, 0, 0), BarInterval::ONE_MINUTE);
        assert_eq!(wait, Duration::from_secs(60));
    }

    #[test]
    fn default_config() {
        let config = SchedulerConfig::default();
        assert_eq!(config.fetch_retry_delay, Duration::from_secs(2));
        assert_eq!(config.bar_interval, BarInterval::ONE_MINUTE);
    }
}
