use anyhow::{Context, Result};
use chrono::{DateTime, NaiveTime, Utc};
use clap::Parser;
use rust_decimal::Decimal;
use spotbot::api::BinanceClient;
use spotbot::discovery::SymbolRegistry;
use spotbot::execution::{
    chunk_symbols, CandleStore, ControlCommand, IngestionHandler, KlinePoller, PaperExecutor,
    Scheduler,
};
use spotbot::notify::LogNotifier;
use spotbot::{Settings, SharedSettings};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Duration;
use tracing_subscriber::EnvFilter;

const DISCOVERY_INTERVAL_MINUTES: u64 = 30;
const KLINE_CHANNEL_SIZE: usize = 1024;

#[derive(Parser, Debug)]
#[command(name = "spotbot", about = "Single-position spot trading bot (paper fills)")]
struct Args {
    /// TOML settings file
    #[arg(short, long)]
    config: Option<String>,

    /// Only track the first N discovered symbols
    #[arg(long)]
    max_symbols: Option<usize>,

    /// Starting quote balance of the paper account
    #[arg(long, default_value = "1000")]
    paper_balance: Decimal,

    /// Random fill slippage in basis points
    #[arg(long, default_value = "5")]
    slippage_bps: Decimal,

    /// Override the exchange REST endpoint
    #[arg(long)]
    base_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    setup_logging();
    let args = Args::parse();

    tracing::info!("🚀 spotbot starting");

    let settings = Settings::load(args.config.as_deref()).context("Failed to load settings")?;
    log_configuration(&settings);
    let shared_settings = SharedSettings::new(settings.clone());
    let scheduler_settings = &settings.scheduler;

    let client = match &args.base_url {
        Some(url) => BinanceClient::with_base_url(url)?,
        None => BinanceClient::new()?,
    };

    // Initial symbol discovery
    tracing::info!("🔍 Performing initial symbol discovery...");
    let mut symbols = client
        .exchange_info(&settings.trading.quote_asset)
        .await
        .context("Symbol discovery failed")?;
    if let Some(max) = args.max_symbols {
        symbols.truncate(max);
    }
    if symbols.is_empty() {
        anyhow::bail!("No tradable symbols found! Cannot start bot.");
    }
    let names: Vec<String> = symbols.iter().map(|s| s.symbol.clone()).collect();

    let registry = SymbolRegistry::new();
    registry.replace(symbols)?;

    let store = CandleStore::new(
        scheduler_settings.candle_capacity,
        chrono::Duration::minutes(scheduler_settings.monitor_minutes),
    );
    store.register_symbols(&names)?;
    let ingestion = IngestionHandler::new(store.clone());

    // Seed history
    tracing::info!("📚 Bootstrapping {} symbols...", names.len());
    let mut last_closed = HashMap::new();
    for symbol in &names {
        let limit = scheduler_settings.bootstrap_bars as u32;
        match client
            .klines(symbol, &scheduler_settings.kline_interval, limit)
            .await
        {
            Ok(klines) => {
                if let Some(last) = klines.iter().filter(|k| k.is_final).last() {
                    last_closed.insert(symbol.clone(), last.open_time);
                }
                if let Err(e) = ingestion.bootstrap(symbol, klines) {
                    tracing::warn!("Bootstrap failed for {}: {}", symbol, e);
                }
            }
            Err(e) => tracing::warn!("Bootstrap fetch failed for {}: {}", symbol, e),
        }
    }

    tracing::info!("\n🔄 Spawning independent loops...");

    // Kline feeds, one poller per symbol group
    let (kline_tx, kline_rx) = mpsc::channel(KLINE_CHANNEL_SIZE);
    let groups = chunk_symbols(&names, scheduler_settings.symbols_per_group);
    let group_count = groups.len();
    for group in groups {
        let mut poller = KlinePoller::new(client.clone(), group.clone(), &scheduler_settings.kline_interval);
        for symbol in &group {
            if let Some(open_time) = last_closed.get(symbol) {
                poller.seed(symbol, *open_time);
            }
        }
        let tx = kline_tx.clone();
        let period = Duration::from_secs(scheduler_settings.poll_interval_secs);
        tokio::spawn(poller.run(tx, period));
    }
    drop(kline_tx);

    let ingestion_task = tokio::spawn(ingestion.run(kline_rx));

    // Trading loop
    let executor = Arc::new(PaperExecutor::new(
        store.clone(),
        args.paper_balance,
        args.slippage_bps,
    ));
    let scheduler = Scheduler::new(
        store,
        shared_settings.clone(),
        executor,
        Arc::new(LogNotifier),
        registry.clone(),
    );
    let (command_tx, command_rx) = mpsc::channel(32);
    let scheduler_task = tokio::spawn(scheduler.run(command_rx));

    let report_task = {
        let settings = shared_settings.clone();
        let commands = command_tx.clone();
        tokio::spawn(async move {
            daily_report_loop(settings, commands).await;
        })
    };

    let discovery_task = {
        let client = client.clone();
        let quote = settings.trading.quote_asset.clone();
        tokio::spawn(async move {
            symbol_discovery_loop(client, registry, quote).await;
        })
    };

    tracing::info!("✅ All loops spawned successfully");
    tracing::info!(
        "  📡 Klines: {} group(s), polled every {}s",
        group_count,
        scheduler_settings.poll_interval_secs
    );
    tracing::info!("  💹 Trading: every {}s", scheduler_settings.trade_interval_secs);
    tracing::info!("  📊 Daily report: {} UTC", scheduler_settings.daily_report_time);
    tracing::info!("  🔍 Discovery: every {} min", DISCOVERY_INTERVAL_MINUTES);
    tracing::info!("\nPress Ctrl+C to stop...\n");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("\n⚠️  Received Ctrl+C, shutting down...");
            log_final_status(&command_tx).await;
        }
        result = ingestion_task => {
            tracing::error!("Ingestion loop exited: {:?}", result);
        }
        result = scheduler_task => {
            tracing::error!("Scheduler exited: {:?}", result);
        }
        result = report_task => {
            tracing::error!("Daily report loop exited: {:?}", result);
        }
        result = discovery_task => {
            tracing::error!("Discovery loop exited: {:?}", result);
        }
    }

    tracing::info!("👋 spotbot stopped");
    Ok(())
}

fn setup_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("spotbot=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn log_configuration(settings: &Settings) {
    let s = &settings.strategy;
    tracing::info!("\n📊 Configuration:");
    tracing::info!("  EMA: {}/{}", s.ema_short, s.ema_long);
    tracing::info!(
        "  RSI: {} ({}..{})",
        s.rsi_period,
        s.rsi_oversold,
        s.rsi_overbought
    );
    tracing::info!(
        "  Take Profit: {}% / Stop Loss: {}%",
        settings.risk.take_profit_pct,
        settings.risk.stop_loss_pct
    );
    tracing::info!(
        "  Trade Size: {}-{} {}",
        settings.trading.min_trade_usdt,
        settings.trading.max_trade_usdt,
        settings.trading.quote_asset
    );
    tracing::info!("  Warm-up: {} bars", s.warm_up_bars());
}

/// Time until the next `at` (UTC), at least one second away
fn until_next(now: DateTime<Utc>, at: NaiveTime) -> Duration {
    let today = now.date_naive().and_time(at).and_utc();
    let next = if today - now > chrono::Duration::seconds(1) {
        today
    } else {
        today + chrono::Duration::days(1)
    };
    (next - now).to_std().unwrap_or(Duration::from_secs(1))
}

async fn daily_report_loop(settings: SharedSettings, commands: mpsc::Sender<ControlCommand>) {
    loop {
        let at = match settings.current().and_then(|s| s.scheduler.daily_report_at()) {
            Ok(at) => at,
            Err(e) => {
                tracing::error!("Daily report time unavailable: {}", e);
                tokio::time::sleep(Duration::from_secs(3600)).await;
                continue;
            }
        };

        tokio::time::sleep(until_next(Utc::now(), at)).await;

        if commands.send(ControlCommand::DailyReport).await.is_err() {
            tracing::info!("Scheduler gone, daily report loop stopping");
            break;
        }
    }
}

async fn symbol_discovery_loop(client: BinanceClient, registry: SymbolRegistry, quote: String) {
    let period = Duration::from_secs(DISCOVERY_INTERVAL_MINUTES * 60);
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);

    loop {
        ticker.tick().await;
        match client.exchange_info(&quote).await {
            Ok(symbols) => {
                if let Err(e) = registry.replace(symbols) {
                    tracing::error!("Failed to refresh symbol registry: {}", e);
                }
            }
            Err(e) => tracing::warn!("Symbol discovery failed, keeping previous metadata: {}", e),
        }
    }
}

async fn log_final_status(commands: &mpsc::Sender<ControlCommand>) {
    let (tx, rx) = oneshot::channel();
    if commands.send(ControlCommand::Status(tx)).await.is_err() {
        return;
    }
    match tokio::time::timeout(Duration::from_secs(5), rx).await {
        Ok(Ok(status)) => tracing::info!("Final status:\n{}", status),
        _ => tracing::warn!("No final status from scheduler"),
    }
}
