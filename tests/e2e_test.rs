use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use spotbot::discovery::SymbolRegistry;
use spotbot::execution::{CandleStore, ControlCommand, OrderExecutor, Scheduler, TickAction};
use spotbot::notify::{ChannelNotifier, TradeEvent};
use spotbot::settings::{Settings, SharedSettings};
use spotbot::strategy::{EntryCondition, ExitCondition, FeatureToggles};
use spotbot::{BuyFill, Candle, Error, ExitReason, SellFill, SymbolInfo};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Executor filling at the store's live price, with switchable failures
struct MockExecutor {
    store: CandleStore,
    balance: Mutex<Decimal>,
    fail_buys: AtomicBool,
    fail_sells: AtomicBool,
    calls: Mutex<Vec<String>>,
}

impl MockExecutor {
    fn new(store: CandleStore, balance: Decimal) -> Self {
        Self {
            store,
            balance: Mutex::new(balance),
            fail_buys: AtomicBool::new(false),
            fail_sells: AtomicBool::new(false),
            calls: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn price(&self, symbol: &str) -> spotbot::Result<Decimal> {
        self.store
            .live_price(symbol)?
            .ok_or_else(|| Error::Execution(format!("no price for {}", symbol)))
    }
}

#[async_trait]
impl OrderExecutor for MockExecutor {
    async fn quote_balance(&self) -> spotbot::Result<Decimal> {
        Ok(*self.balance.lock().unwrap())
    }

    async fn execute_buy(&self, symbol: &str, notional: Decimal) -> spotbot::Result<BuyFill> {
        self.calls.lock().unwrap().push(format!("buy {}", symbol));
        if self.fail_buys.load(Ordering::SeqCst) {
            return Err(Error::Execution("exchange rejected buy".to_string()));
        }
        let price = self.price(symbol)?;
        let quantity = (notional / price).round_dp_with_strategy(6, RoundingStrategy::ToZero);
        *self.balance.lock().unwrap() -= quantity * price;
        Ok(BuyFill {
            avg_fill_price: price,
            filled_quantity: quantity,
        })
    }

    async fn execute_sell(&self, symbol: &str, quantity: Decimal) -> spotbot::Result<SellFill> {
        self.calls.lock().unwrap().push(format!("sell {}", symbol));
        if self.fail_sells.load(Ordering::SeqCst) {
            return Err(Error::Execution("exchange rejected sell".to_string()));
        }
        let price = self.price(symbol)?;
        let proceeds = quantity * price;
        *self.balance.lock().unwrap() += proceeds;
        Ok(SellFill {
            avg_fill_price: price,
            proceeds,
        })
    }
}

struct Harness {
    scheduler: Scheduler,
    store: CandleStore,
    settings: SharedSettings,
    executor: Arc<MockExecutor>,
    registry: SymbolRegistry,
    events: mpsc::UnboundedReceiver<TradeEvent>,
}

impl Harness {
    fn new(settings: Settings) -> Self {
        let store = CandleStore::new(120, Duration::minutes(1440));
        let settings = SharedSettings::new(settings);
        let executor = Arc::new(MockExecutor::new(store.clone(), dec!(1000)));
        let registry = SymbolRegistry::new();
        let (notifier, events) = ChannelNotifier::new();
        let scheduler = Scheduler::new(
            store.clone(),
            settings.clone(),
            executor.clone(),
            Arc::new(notifier),
            registry.clone(),
        );
        Self {
            scheduler,
            store,
            settings,
            executor,
            registry,
            events,
        }
    }

    fn add_symbol(&self, symbol: &str) {
        self.registry
            .insert(SymbolInfo {
                symbol: symbol.to_string(),
                base_asset: symbol.trim_end_matches("USDT").to_string(),
                quote_asset: "USDT".to_string(),
                price_precision: 2,
                quantity_precision: 6,
                min_qty: dec!(0.000001),
                step_size: dec!(0.000001),
            })
            .unwrap();
    }

    /// 39 flat bars at 90 then a jump to 100: price ends well above ZLSMA
    fn seed_rally(&self, symbol: &str) {
        self.add_symbol(symbol);
        let mut closes = vec![dec!(90); 39];
        closes.push(dec!(100));
        for (i, close) in closes.into_iter().enumerate() {
            self.store
                .append_closed_bar(symbol, Candle::ohlc(bar_time(i), close, close, close, close))
                .unwrap();
        }
    }

    /// 60 bars climbing 1 per bar from 100 (last close 159)
    fn seed_uptrend(&self, symbol: &str) {
        self.add_symbol(symbol);
        for i in 0..60 {
            let close = dec!(100) + Decimal::from(i);
            self.store
                .append_closed_bar(
                    symbol,
                    Candle::ohlc(bar_time(i), close, close + dec!(1), close - dec!(1), close),
                )
                .unwrap();
        }
    }

    /// Closed bar at 20: below the Chandelier level, MACD under signal, under ZLSMA
    fn append_crash(&self, symbol: &str) {
        self.store
            .append_closed_bar(
                symbol,
                Candle::ohlc(bar_time(60), dec!(20), dec!(21), dec!(19), dec!(20)),
            )
            .unwrap();
    }

    fn drain_events(&mut self) -> Vec<TradeEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }
}

fn bar_time(i: usize) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap() + Duration::minutes(15 * i as i64)
}

/// Only the price-above-ZLSMA entry rule, no secondary exit rules
fn zlsma_entry_settings() -> Settings {
    let mut settings = Settings::default();
    settings.toggles = FeatureToggles::all_disabled();
    settings
        .toggles
        .set_entry(EntryCondition::PriceAboveZlsma, true);
    settings
}

/// EMA-slope entry, every exit rule on, TP/SL far enough away to stay quiet
fn secondary_exit_settings() -> Settings {
    let mut settings = Settings::default();
    settings.toggles = FeatureToggles::all_disabled();
    settings.toggles.set_entry(EntryCondition::EmaSlope, true);
    for condition in ExitCondition::ALL {
        settings.toggles.set_exit(condition, true);
    }
    settings.risk.take_profit_pct = dec!(1000);
    settings.risk.stop_loss_pct = dec!(-99);
    settings
}

#[tokio::test]
async fn test_e2e_take_profit_round_trip() {
    let _ = tracing_subscriber::fmt::try_init();

    let mut harness = Harness::new(zlsma_entry_settings());
    harness.seed_rally("SOLUSDT");

    // 1. Entry at 100
    let report = harness.scheduler.tick().await;
    assert_eq!(report.action, Some(TickAction::Entered("SOLUSDT".to_string())));
    let position = harness.scheduler.positions().active().unwrap().clone();
    assert_eq!(position.entry_price, dec!(100));
    assert_eq!(position.quantity, dec!(9.99));
    assert_eq!(position.balance_before, dec!(1000));

    // 2. Everything disabled: take profit still fires at +1.5%
    let mut settings = harness.settings.current().unwrap();
    settings.toggles = FeatureToggles::all_disabled();
    harness.settings.replace(settings).unwrap();

    harness.store.update_live_price("SOLUSDT", dec!(101.5)).unwrap();
    let report = harness.scheduler.tick().await;
    assert_eq!(
        report.action,
        Some(TickAction::Exited("SOLUSDT".to_string(), ExitReason::TakeProfit))
    );
    assert!(harness.scheduler.positions().is_flat());

    let trade = harness.scheduler.positions().closed_trades()[0].clone();
    assert_eq!(trade.exit_price, dec!(101.5));
    assert_eq!(trade.pnl_pct, dec!(1.5));
    assert_eq!(harness.scheduler.stats().successful_trades, 1);

    let events = harness.drain_events();
    assert!(matches!(events[0], TradeEvent::Opened(_)));
    match &events[1] {
        TradeEvent::Closed(report) => {
            assert_eq!(report.balance_after, dec!(1000) + trade.pnl_quote);
            assert!(report.to_string().contains("Take Profit"));
        }
        other => panic!("expected close report, got {:?}", other),
    }
    assert_eq!(harness.executor.calls(), vec!["buy SOLUSDT", "sell SOLUSDT"]);
}

#[tokio::test]
async fn test_no_buy_with_all_entry_toggles_disabled() {
    let mut settings = Settings::default();
    settings.toggles = FeatureToggles::all_disabled();
    let mut harness = Harness::new(settings);
    harness.seed_rally("SOLUSDT");

    for _ in 0..3 {
        let report = harness.scheduler.tick().await;
        assert_eq!(report.evaluated, vec!["SOLUSDT"]);
        assert!(report.action.is_none());
    }
    assert!(harness.scheduler.positions().is_flat());
    assert!(harness.executor.calls().is_empty());
}

#[tokio::test]
async fn test_computation_error_does_not_stop_other_symbols() {
    let mut harness = Harness::new(zlsma_entry_settings());
    harness
        .store
        .register_symbols(&["BADUSDT", "SOLUSDT"])
        .unwrap();

    // close-only history: no highs or lows for the Chandelier exit
    harness.add_symbol("BADUSDT");
    for i in 0..40 {
        harness
            .store
            .append_closed_bar("BADUSDT", Candle::close_only(bar_time(i), dec!(5)))
            .unwrap();
    }
    harness.seed_rally("SOLUSDT");

    let report = harness.scheduler.tick().await;

    assert_eq!(report.evaluated, vec!["BADUSDT", "SOLUSDT"]);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].0, "BADUSDT");
    assert!(report.failures[0].1.contains("computation"));
    assert_eq!(report.action, Some(TickAction::Entered("SOLUSDT".to_string())));
}

#[tokio::test]
async fn test_only_first_qualifying_symbol_is_entered() {
    let mut harness = Harness::new(zlsma_entry_settings());
    harness.store.register_symbols(&["AAAUSDT", "BBBUSDT"]).unwrap();
    harness.seed_rally("AAAUSDT");
    harness.seed_rally("BBBUSDT");

    let report = harness.scheduler.tick().await;
    assert_eq!(report.action, Some(TickAction::Entered("AAAUSDT".to_string())));
    assert_eq!(report.evaluated, vec!["AAAUSDT"]);

    // while in position only the active symbol is looked at
    let report = harness.scheduler.tick().await;
    assert_eq!(report.evaluated, vec!["AAAUSDT"]);
    assert_eq!(harness.scheduler.positions().active_symbol(), Some("AAAUSDT"));
}

#[tokio::test]
async fn test_buy_failure_stays_flat() {
    let mut harness = Harness::new(zlsma_entry_settings());
    harness.seed_rally("SOLUSDT");
    harness.executor.fail_buys.store(true, Ordering::SeqCst);

    let report = harness.scheduler.tick().await;
    assert!(report.action.is_none());
    assert_eq!(report.failures.len(), 1);
    assert!(harness.scheduler.positions().is_flat());
    assert!(harness
        .drain_events()
        .iter()
        .any(|e| matches!(e, TradeEvent::Error { .. })));

    harness.executor.fail_buys.store(false, Ordering::SeqCst);
    let report = harness.scheduler.tick().await;
    assert_eq!(report.action, Some(TickAction::Entered("SOLUSDT".to_string())));
}

#[tokio::test]
async fn test_sell_failure_keeps_position_and_retries() {
    let mut harness = Harness::new(zlsma_entry_settings());
    harness.seed_rally("SOLUSDT");
    harness.scheduler.tick().await;

    harness.executor.fail_sells.store(true, Ordering::SeqCst);
    harness.store.update_live_price("SOLUSDT", dec!(96)).unwrap();

    let report = harness.scheduler.tick().await;
    assert!(report.action.is_none());
    assert_eq!(harness.scheduler.positions().active_symbol(), Some("SOLUSDT"));

    harness.executor.fail_sells.store(false, Ordering::SeqCst);
    let report = harness.scheduler.tick().await;
    assert_eq!(
        report.action,
        Some(TickAction::Exited("SOLUSDT".to_string(), ExitReason::StopLoss))
    );
    assert_eq!(
        harness.executor.calls(),
        vec!["buy SOLUSDT", "sell SOLUSDT", "sell SOLUSDT"]
    );
}

#[tokio::test]
async fn test_dust_position_closes_without_order() {
    let mut harness = Harness::new(zlsma_entry_settings());
    harness.seed_rally("SOLUSDT");
    harness.scheduler.tick().await;

    // metadata refresh raises the minimum above what we hold
    let mut info = harness.registry.get("SOLUSDT").unwrap();
    info.min_qty = dec!(100);
    harness.registry.insert(info).unwrap();

    harness.store.update_live_price("SOLUSDT", dec!(102)).unwrap();
    let report = harness.scheduler.tick().await;

    assert_eq!(
        report.action,
        Some(TickAction::Exited("SOLUSDT".to_string(), ExitReason::Dust))
    );
    assert_eq!(harness.executor.calls(), vec!["buy SOLUSDT"]);
}

#[tokio::test]
async fn test_circuit_breaker_halts_trading() {
    let mut settings = zlsma_entry_settings();
    settings.risk.max_loss_per_hour_pct = dec!(2);
    let mut harness = Harness::new(settings);
    harness.seed_rally("SOLUSDT");
    harness.scheduler.tick().await;

    harness.store.update_live_price("SOLUSDT", dec!(96)).unwrap();
    let report = harness.scheduler.tick().await;
    assert_eq!(
        report.action,
        Some(TickAction::Exited("SOLUSDT".to_string(), ExitReason::StopLoss))
    );

    assert!(!harness.scheduler.switch().is_enabled());
    assert!(harness
        .drain_events()
        .iter()
        .any(|e| matches!(e, TradeEvent::TradingHalted { .. })));

    let report = harness.scheduler.tick().await;
    assert!(report.disabled);

    harness.scheduler.handle_command(ControlCommand::Start).await;
    assert!(harness.scheduler.switch().is_enabled());
}

#[tokio::test]
async fn test_run_loop_processes_commands() {
    let harness = Harness::new(zlsma_entry_settings());
    let switch = harness.scheduler.switch();
    let (tx, rx) = mpsc::channel(8);
    let task = tokio::spawn(harness.scheduler.run(rx));

    tx.send(ControlCommand::Stop).await.unwrap();
    let (status_tx, status_rx) = tokio::sync::oneshot::channel();
    tx.send(ControlCommand::Status(status_tx)).await.unwrap();
    let status = status_rx.await.unwrap();

    assert!(!status.trading_enabled);
    assert!(!switch.is_enabled());

    drop(tx);
    task.await.unwrap();
}

#[tokio::test]
async fn test_stop_loss_after_warm_up_raised_in_position() {
    let mut harness = Harness::new(zlsma_entry_settings());
    harness.seed_rally("SOLUSDT");
    let report = harness.scheduler.tick().await;
    assert_eq!(report.action, Some(TickAction::Entered("SOLUSDT".to_string())));

    // 40 bars held, warm-up now needs 60
    harness.settings.apply("ema_long 60").unwrap();
    harness.store.update_live_price("SOLUSDT", dec!(50)).unwrap();

    let report = harness.scheduler.tick().await;
    assert_eq!(report.evaluated, vec!["SOLUSDT"]);
    assert_eq!(
        report.action,
        Some(TickAction::Exited("SOLUSDT".to_string(), ExitReason::StopLoss))
    );
    assert!(harness.scheduler.positions().is_flat());
}

#[tokio::test]
async fn test_stop_loss_despite_indicator_failure_in_position() {
    let mut harness = Harness::new(zlsma_entry_settings());
    harness.seed_rally("SOLUSDT");
    harness.scheduler.tick().await;

    // a close-only bar breaks the high/low series
    harness
        .store
        .append_closed_bar("SOLUSDT", Candle::close_only(bar_time(40), dec!(100)))
        .unwrap();

    harness.store.update_live_price("SOLUSDT", dec!(100.2)).unwrap();
    let report = harness.scheduler.tick().await;
    assert!(report.action.is_none());
    assert_eq!(report.failures.len(), 1);
    assert!(report.failures[0].1.contains("have no high/low"));
    assert_eq!(harness.scheduler.positions().active_symbol(), Some("SOLUSDT"));

    harness.store.update_live_price("SOLUSDT", dec!(96)).unwrap();
    let report = harness.scheduler.tick().await;
    assert_eq!(
        report.action,
        Some(TickAction::Exited("SOLUSDT".to_string(), ExitReason::StopLoss))
    );
}

#[tokio::test]
async fn test_secondary_exit_sells_on_signal() {
    let mut harness = Harness::new(secondary_exit_settings());
    harness.seed_uptrend("SOLUSDT");

    let report = harness.scheduler.tick().await;
    assert_eq!(report.action, Some(TickAction::Entered("SOLUSDT".to_string())));
    assert_eq!(
        harness.scheduler.positions().active().unwrap().entry_price,
        dec!(159)
    );

    harness.append_crash("SOLUSDT");
    let report = harness.scheduler.tick().await;
    assert_eq!(
        report.action,
        Some(TickAction::Exited("SOLUSDT".to_string(), ExitReason::Signal))
    );

    let trade = harness.scheduler.positions().closed_trades()[0].clone();
    assert_eq!(trade.reason, ExitReason::Signal);
    assert_eq!(trade.exit_price, dec!(20));
    assert_eq!(harness.executor.calls(), vec!["buy SOLUSDT", "sell SOLUSDT"]);
}

#[tokio::test]
async fn test_secondary_exit_needs_every_toggle() {
    for disabled in ExitCondition::ALL {
        let mut settings = secondary_exit_settings();
        settings.toggles.set_exit(disabled, false);
        let mut harness = Harness::new(settings);
        harness.seed_uptrend("SOLUSDT");
        harness.scheduler.tick().await;

        harness.append_crash("SOLUSDT");
        let report = harness.scheduler.tick().await;
        assert!(report.action.is_none(), "{} disabled", disabled);
        assert!(report.failures.is_empty());
        assert_eq!(harness.scheduler.positions().active_symbol(), Some("SOLUSDT"));
        assert_eq!(harness.executor.calls(), vec!["buy SOLUSDT"]);
    }
}

#[tokio::test]
async fn test_exit_after_symbol_dropped_from_discovery() {
    let mut harness = Harness::new(zlsma_entry_settings());
    harness.seed_rally("SOLUSDT");
    harness.scheduler.tick().await;

    harness.registry.replace(Vec::new()).unwrap();
    harness.store.update_live_price("SOLUSDT", dec!(96)).unwrap();

    let report = harness.scheduler.tick().await;
    assert_eq!(
        report.action,
        Some(TickAction::Exited("SOLUSDT".to_string(), ExitReason::StopLoss))
    );
    assert_eq!(harness.executor.calls(), vec!["buy SOLUSDT", "sell SOLUSDT"]);
}
