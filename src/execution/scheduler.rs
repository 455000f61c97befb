use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval_at, Duration, Instant, MissedTickBehavior};

use super::candle_buffer::CandleStore;
use super::executor::{buy_notional, sell_quantity, OrderExecutor};
use super::position_manager::{ClosedTrade, PositionManager};
use crate::discovery::SymbolRegistry;
use crate::error::{Error, Result};
use crate::models::{ExitReason, SymbolInfo};
use crate::notify::{Notifier, StatusReport, TradeEvent, TradeReport};
use crate::risk::{CircuitBreaker, TradingStats};
use crate::settings::{Settings, SharedSettings};
use crate::strategy::{CrossoverStrategy, MarketContext, Signal, Strategy};

/// Global trading on/off flag, observed at the next tick
#[derive(Debug, Clone)]
pub struct TradingSwitch(Arc<AtomicBool>);

impl TradingSwitch {
    pub fn new(enabled: bool) -> Self {
        Self(Arc::new(AtomicBool::new(enabled)))
    }

    pub fn is_enabled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn enable(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn disable(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl Default for TradingSwitch {
    fn default() -> Self {
        Self::new(true)
    }
}

/// Commands handled between ticks
#[derive(Debug)]
pub enum ControlCommand {
    Start,
    /// Disable trading and close any open position
    Stop,
    Status(oneshot::Sender<StatusReport>),
    DailyReport,
    /// `key value` settings update, answered with the confirmation text
    Configure {
        command: String,
        reply: oneshot::Sender<Result<String>>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickAction {
    Entered(String),
    Exited(String, ExitReason),
}

/// Outcome of one scheduler tick
#[derive(Debug, Default)]
pub struct TickReport {
    /// Trading was off and nothing was evaluated
    pub disabled: bool,
    pub evaluated: Vec<String>,
    /// (symbol, error) for symbols that failed this tick
    pub failures: Vec<(String, String)>,
    pub action: Option<TickAction>,
}

/// Drives evaluation and owns the position state
///
/// The scheduler task is the only writer of [`PositionManager`]; manual
/// stops reach it as [`ControlCommand`]s.
pub struct Scheduler {
    store: CandleStore,
    settings: SharedSettings,
    executor: Arc<dyn OrderExecutor>,
    notifier: Arc<dyn Notifier>,
    registry: SymbolRegistry,
    positions: PositionManager,
    /// Metadata of the held symbol, kept in case discovery drops it
    held_info: Option<SymbolInfo>,
    stats: TradingStats,
    switch: TradingSwitch,
}

impl Scheduler {
    pub fn new(
        store: CandleStore,
        settings: SharedSettings,
        executor: Arc<dyn OrderExecutor>,
        notifier: Arc<dyn Notifier>,
        registry: SymbolRegistry,
    ) -> Self {
        Self {
            store,
            settings,
            executor,
            notifier,
            registry,
            positions: PositionManager::new(),
            held_info: None,
            stats: TradingStats::new(),
            switch: TradingSwitch::default(),
        }
    }

    pub fn switch(&self) -> TradingSwitch {
        self.switch.clone()
    }

    pub fn positions(&self) -> &PositionManager {
        &self.positions
    }

    pub fn stats(&self) -> &TradingStats {
        &self.stats
    }

    /// One evaluation pass over the warmed-up symbols, or the held one
    pub async fn tick(&mut self) -> TickReport {
        let mut report = TickReport::default();

        if !self.switch.is_enabled() {
            tracing::debug!("Trading disabled, skipping tick");
            report.disabled = true;
            return report;
        }

        let settings = match self.settings.current() {
            Ok(settings) => settings,
            Err(e) => {
                tracing::error!("Failed to read settings: {}", e);
                report.failures.push(("*".to_string(), e.to_string()));
                return report;
            }
        };
        self.store
            .set_monitor_window(chrono::Duration::minutes(settings.scheduler.monitor_minutes));

        let strategy = CrossoverStrategy::from_settings(&settings);
        // the held symbol is evaluated even when it no longer meets warm-up
        let symbols = match self.positions.active_symbol() {
            Some(active) => Ok(vec![active.to_string()]),
            None => self.store.warmed_up_symbols(strategy.min_candles_required()),
        };
        let symbols = match symbols {
            Ok(symbols) => symbols,
            Err(e) => {
                tracing::error!("Failed to list symbols: {}", e);
                report.failures.push(("*".to_string(), e.to_string()));
                return report;
            }
        };

        for symbol in symbols {
            report.evaluated.push(symbol.clone());
            match self.evaluate_symbol(&symbol, &strategy, &settings).await {
                Ok(Some(action)) => {
                    report.action = Some(action);
                    break;
                }
                Ok(None) => {}
                Err(Error::InsufficientData(msg)) => {
                    tracing::debug!(symbol = %symbol, "Skipping: {}", msg);
                }
                Err(e) => {
                    tracing::warn!(symbol = %symbol, "⚠️ Evaluation failed: {}", e);
                    report.failures.push((symbol.clone(), e.to_string()));
                }
            }
        }

        tracing::debug!(
            evaluated = report.evaluated.len(),
            failures = report.failures.len(),
            action = ?report.action,
            "Tick complete"
        );
        report
    }

    async fn evaluate_symbol(
        &mut self,
        symbol: &str,
        strategy: &dyn Strategy,
        settings: &Settings,
    ) -> Result<Option<TickAction>> {
        let market = MarketContext {
            snapshot: self.store.snapshot(symbol)?,
            price_change_pct: self.store.price_change_pct(symbol)?,
            live_price: self.store.live_price(symbol)?,
        };

        match strategy.evaluate(&market, self.positions.active())? {
            Signal::Hold => Ok(None),
            Signal::Buy { reasons } => self.open_position(symbol, reasons, settings).await,
            Signal::Sell { reason, reasons } => {
                tracing::info!(symbol = %symbol, reasons = ?reasons, "🔔 Exit signal");
                self.close_position(symbol, reason, market.live_price, settings)
                    .await
                    .map(Some)
            }
        }
    }

    async fn open_position(
        &mut self,
        symbol: &str,
        reasons: Vec<String>,
        settings: &Settings,
    ) -> Result<Option<TickAction>> {
        let balance = self.executor.quote_balance().await?;
        let Some(notional) = buy_notional(balance, &settings.trading) else {
            tracing::info!(
                symbol = %symbol,
                balance = %balance,
                "💤 Buy signal ignored, balance too low"
            );
            return Ok(None);
        };

        let fill = match self.executor.execute_buy(symbol, notional).await {
            Ok(fill) => fill,
            Err(e) => {
                tracing::error!(symbol = %symbol, "❌ Buy failed: {}", e);
                self.notifier.notify(TradeEvent::Error {
                    context: format!("Buy {}", symbol),
                    message: e.to_string(),
                });
                return Err(e);
            }
        };

        let position = self
            .positions
            .enter(symbol, &fill, balance, reasons, Utc::now())?
            .clone();
        self.held_info = self.registry.get(symbol).ok();
        self.notifier.notify(TradeEvent::Opened(position));
        Ok(Some(TickAction::Entered(symbol.to_string())))
    }

    async fn close_position(
        &mut self,
        symbol: &str,
        reason: ExitReason,
        live_price: Option<Decimal>,
        settings: &Settings,
    ) -> Result<TickAction> {
        let position = self.positions.active().cloned().ok_or_else(|| {
            Error::InvariantViolation(format!("sell signal for {} while flat", symbol))
        })?;
        let info = self.held_symbol_info(symbol)?;

        let (exit_price, proceeds, reason) = match sell_quantity(position.quantity, &info) {
            None => {
                // below min quantity: nothing can be sold, release the position
                let price = live_price.unwrap_or(position.entry_price);
                tracing::warn!(
                    symbol = %symbol,
                    quantity = %position.quantity,
                    "🧹 Position is dust, closing without an order"
                );
                (price, price * position.quantity, ExitReason::Dust)
            }
            Some(quantity) => match self.executor.execute_sell(symbol, quantity).await {
                Ok(fill) => (fill.avg_fill_price, fill.proceeds, reason),
                Err(e) => {
                    tracing::error!(symbol = %symbol, "❌ Sell failed, will retry: {}", e);
                    self.notifier.notify(TradeEvent::Error {
                        context: format!("Sell {}", symbol),
                        message: e.to_string(),
                    });
                    return Err(e);
                }
            },
        };

        let trade = self
            .positions
            .exit(symbol, exit_price, proceeds, reason, Utc::now())?;
        self.held_info = None;
        self.finish_trade(trade, settings).await;
        Ok(TickAction::Exited(symbol.to_string(), reason))
    }

    /// Registry metadata for the held symbol, or the copy taken at entry
    fn held_symbol_info(&mut self, symbol: &str) -> Result<SymbolInfo> {
        match self.registry.get(symbol) {
            Ok(info) => {
                self.held_info = Some(info.clone());
                Ok(info)
            }
            Err(Error::UnknownSymbol(_)) => match &self.held_info {
                Some(info) if info.symbol == symbol => {
                    tracing::warn!(
                        symbol = %symbol,
                        "Symbol left the registry, using metadata from entry"
                    );
                    Ok(info.clone())
                }
                _ => Err(Error::UnknownSymbol(symbol.to_string())),
            },
            Err(e) => Err(e),
        }
    }

    async fn finish_trade(&mut self, trade: ClosedTrade, settings: &Settings) {
        self.stats.record(&trade);

        let balance_after = match self.executor.quote_balance().await {
            Ok(balance) => balance,
            Err(e) => {
                tracing::warn!("Could not read balance after sell: {}", e);
                trade.position.balance_before + trade.pnl_quote
            }
        };
        self.notifier
            .notify(TradeEvent::Closed(TradeReport { trade, balance_after }));

        let breaker = CircuitBreaker::new(settings.risk.max_loss_per_hour_pct);
        if let Err(trip) = breaker.check(&self.stats, Utc::now()) {
            self.switch.disable();
            tracing::warn!("🛑 Circuit breaker tripped: {}", trip);
            self.notifier.notify(TradeEvent::TradingHalted {
                reason: trip.to_string(),
            });
        }
    }

    pub fn status(&self) -> StatusReport {
        let position = self.positions.active().cloned();
        let live_price = position
            .as_ref()
            .and_then(|p| self.store.live_price(&p.symbol).ok().flatten());
        let unrealized = match (&position, live_price) {
            (Some(p), Some(price)) => Some(p.unrealized(price)),
            _ => None,
        };

        StatusReport {
            trading_enabled: self.switch.is_enabled(),
            position,
            live_price,
            unrealized_pnl: unrealized.map(|(pnl, _)| pnl),
            unrealized_pct: unrealized.map(|(_, pct)| pct),
            at: Utc::now(),
        }
    }

    pub async fn handle_command(&mut self, command: ControlCommand) {
        match command {
            ControlCommand::Start => {
                self.switch.enable();
                tracing::info!("▶️ Trading started");
            }
            ControlCommand::Stop => {
                self.switch.disable();
                tracing::info!("⏹️ Trading stopped");
                if let Err(e) = self.manual_close().await {
                    tracing::error!("Manual close failed: {}", e);
                }
            }
            ControlCommand::Status(reply) => {
                let status = self.status();
                self.notifier.notify(TradeEvent::Status(status.clone()));
                if reply.send(status).is_err() {
                    tracing::debug!("Status requester went away");
                }
            }
            ControlCommand::DailyReport => {
                let summary = self.stats.daily_summary(Utc::now());
                self.notifier.notify(TradeEvent::DailyReport(summary));
                self.stats.reset_daily();
            }
            ControlCommand::Configure { command, reply } => {
                let result = self.settings.apply(&command);
                if let Err(e) = &result {
                    tracing::warn!(command = %command, "Settings update rejected: {}", e);
                }
                if reply.send(result).is_err() {
                    tracing::debug!("Configure requester went away");
                }
            }
        }
    }

    async fn manual_close(&mut self) -> Result<()> {
        let Some(symbol) = self.positions.active_symbol().map(str::to_string) else {
            return Ok(());
        };
        let settings = self.settings.current()?;
        let live_price = self.store.live_price(&symbol)?;
        self.close_position(&symbol, ExitReason::Manual, live_price, &settings)
            .await?;
        Ok(())
    }

    fn trade_interval(&self) -> Duration {
        let secs = self
            .settings
            .current()
            .map(|s| s.scheduler.trade_interval_secs)
            .unwrap_or(6);
        Duration::from_secs(secs.max(1))
    }

    /// Tick on the configured interval until the command channel closes
    pub async fn run(mut self, mut commands: mpsc::Receiver<ControlCommand>) {
        let mut period = self.trade_interval();
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tracing::info!("🚀 Scheduler running every {}s", period.as_secs());

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let report = self.tick().await;
                    if let Some(action) = &report.action {
                        tracing::info!("Tick ended after {:?}", action);
                    }

                    let next = self.trade_interval();
                    if next != period {
                        tracing::info!("⏱️ Trade interval changed to {}s", next.as_secs());
                        period = next;
                        ticker = interval_at(Instant::now() + period, period);
                        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                    }
                }
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => {
                        tracing::info!("Command channel closed, scheduler stopping");
                        break;
                    }
                }
            }
        }
    }
}
