use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::mpsc;

use super::candle_buffer::CandleStore;
use crate::api::binance::{decimal_field, millis_to_datetime};
use crate::api::BinanceClient;
use crate::error::{Error, Result};
use crate::models::KlineEvent;

/// Feeds kline events into the candle store
///
/// Closed bars are appended; updates to the still-open bar only move the
/// live price. The scheduler never sees a partial bar.
#[derive(Clone)]
pub struct IngestionHandler {
    store: CandleStore,
}

impl IngestionHandler {
    pub fn new(store: CandleStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &CandleStore {
        &self.store
    }

    pub fn handle_event(&self, event: &KlineEvent) -> Result<()> {
        if event.is_final {
            self.store.append_closed_bar(&event.symbol, event.to_candle())?;
            tracing::debug!(symbol = %event.symbol, close = %event.close, "Kline closed");
        }
        self.store.update_live_price(&event.symbol, event.close)
    }

    /// Parse and apply a raw stream payload; non-kline payloads are ignored
    pub fn handle_message(&self, raw: &str) -> Result<()> {
        match parse_stream_message(raw)? {
            Some(event) => self.handle_event(&event),
            None => Ok(()),
        }
    }

    /// Seed a symbol from history; unfinished bars are skipped
    pub fn bootstrap(&self, symbol: &str, klines: Vec<KlineEvent>) -> Result<usize> {
        let candles = klines
            .iter()
            .filter(|k| k.is_final)
            .map(KlineEvent::to_candle)
            .collect();
        let count = self.store.bootstrap(symbol, candles)?;
        if let Some(last) = klines.last() {
            self.store.update_live_price(symbol, last.close)?;
        }
        tracing::info!("📚 Bootstrapped {}: {} bars", symbol, count);
        Ok(count)
    }

    /// Drain events until every sender is gone
    pub async fn run(self, mut rx: mpsc::Receiver<KlineEvent>) {
        tracing::info!("📡 Ingestion started");
        while let Some(event) = rx.recv().await {
            if let Err(e) = self.handle_event(&event) {
                tracing::warn!(symbol = %event.symbol, "Failed to ingest kline: {}", e);
            }
        }
        tracing::info!("📡 Ingestion stopped");
    }
}

/// Parse a kline stream payload
///
/// Accepts both the raw event and the combined-stream wrapper
/// `{"stream": ..., "data": {...}}`. Returns `None` for other event types.
pub fn parse_stream_message(raw: &str) -> Result<Option<KlineEvent>> {
    let msg: Value = serde_json::from_str(raw)?;
    let data = msg.get("data").unwrap_or(&msg);

    match data.get("e").and_then(Value::as_str) {
        Some("kline") => {}
        _ => return Ok(None),
    }

    let symbol = data
        .get("s")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::Ingestion("kline event without symbol".to_string()))?;
    let k = data
        .get("k")
        .ok_or_else(|| Error::Ingestion(format!("kline event for {} without payload", symbol)))?;

    let field = |name: &str| kline_field(k, symbol, name);
    let ingest = |e: anyhow::Error| Error::Ingestion(format!("{}: {}", symbol, e));

    let open_ms = field("t")?
        .as_i64()
        .ok_or_else(|| Error::Ingestion(format!("kline for {} has bad open time", symbol)))?;

    Ok(Some(KlineEvent {
        symbol: symbol.to_string(),
        open_time: millis_to_datetime(open_ms).map_err(ingest)?,
        open: decimal_field(field("o")?).map_err(ingest)?,
        high: decimal_field(field("h")?).map_err(ingest)?,
        low: decimal_field(field("l")?).map_err(ingest)?,
        close: decimal_field(field("c")?).map_err(ingest)?,
        is_final: field("x")?.as_bool().unwrap_or(false),
    }))
}

fn kline_field<'a>(k: &'a Value, symbol: &str, name: &str) -> Result<&'a Value> {
    k.get(name)
        .ok_or_else(|| Error::Ingestion(format!("kline for {} missing '{}'", symbol, name)))
}

/// Split symbols into groups of at most `group_size` for separate feeds
pub fn chunk_symbols(symbols: &[String], group_size: usize) -> Vec<Vec<String>> {
    symbols
        .chunks(group_size.max(1))
        .map(<[String]>::to_vec)
        .collect()
}

/// REST polling feed for one symbol group
///
/// Emits each closed bar once; the open bar is re-sent on every poll so the
/// live price keeps moving.
pub struct KlinePoller {
    client: BinanceClient,
    symbols: Vec<String>,
    interval: String,
    last_closed: HashMap<String, DateTime<Utc>>,
}

impl KlinePoller {
    pub fn new(client: BinanceClient, symbols: Vec<String>, interval: &str) -> Self {
        Self {
            client,
            symbols,
            interval: interval.to_string(),
            last_closed: HashMap::new(),
        }
    }

    /// Mark bars up to `open_time` as already delivered
    pub fn seed(&mut self, symbol: &str, open_time: DateTime<Utc>) {
        self.last_closed.insert(symbol.to_string(), open_time);
    }

    /// Fetch the latest bars for every symbol and forward new ones
    ///
    /// A failing symbol is logged and skipped. Fails only when the receiver
    /// has gone away.
    pub async fn poll_once(&mut self, tx: &mpsc::Sender<KlineEvent>) -> Result<usize> {
        let mut sent = 0;

        for symbol in &self.symbols {
            let klines = match self.client.klines(symbol, &self.interval, 2).await {
                Ok(klines) => klines,
                Err(e) => {
                    tracing::warn!("Kline poll failed for {}: {}", symbol, e);
                    continue;
                }
            };

            for event in klines {
                if event.is_final {
                    if let Some(seen) = self.last_closed.get(symbol) {
                        if event.open_time <= *seen {
                            continue;
                        }
                    }
                    self.last_closed.insert(symbol.clone(), event.open_time);
                }
                tx.send(event)
                    .await
                    .map_err(|_| Error::Ingestion("kline receiver closed".to_string()))?;
                sent += 1;
            }
        }

        Ok(sent)
    }

    pub async fn run(mut self, tx: mpsc::Sender<KlineEvent>, period: std::time::Duration) {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        tracing::info!(
            "🔌 Polling {} symbols every {}s",
            self.symbols.len(),
            period.as_secs()
        );

        loop {
            ticker.tick().await;
            if let Err(e) = self.poll_once(&tx).await {
                tracing::info!("Poller stopping: {}", e);
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use mockito::{Matcher, Server};
    use rust_decimal_macros::dec;

    fn create_test_event(minutes: i64, close: rust_decimal::Decimal, is_final: bool) -> KlineEvent {
        let base = DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap();
        KlineEvent {
            symbol: "SOLUSDT".to_string(),
            open_time: base + Duration::minutes(minutes),
            open: close,
            high: close,
            low: close,
            close,
            is_final,
        }
    }

    fn handler() -> IngestionHandler {
        IngestionHandler::new(CandleStore::new(120, Duration::minutes(1440)))
    }

    #[test]
    fn test_open_bar_only_moves_live_price() {
        let handler = handler();
        handler
            .handle_event(&create_test_event(0, dec!(100), true))
            .unwrap();
        handler
            .handle_event(&create_test_event(15, dec!(105), false))
            .unwrap();

        let store = handler.store();
        assert_eq!(store.candle_count("SOLUSDT").unwrap(), 1);
        assert_eq!(store.snapshot("SOLUSDT").unwrap().last_close(), Some(dec!(100)));
        assert_eq!(store.live_price("SOLUSDT").unwrap(), Some(dec!(105)));
    }

    #[test]
    fn test_bootstrap_skips_open_bar() {
        let handler = handler();
        let klines = vec![
            create_test_event(0, dec!(1), true),
            create_test_event(15, dec!(2), true),
            create_test_event(30, dec!(3), false),
        ];
        assert_eq!(handler.bootstrap("SOLUSDT", klines).unwrap(), 2);
        assert_eq!(handler.store().live_price("SOLUSDT").unwrap(), Some(dec!(3)));
    }

    #[test]
    fn test_parse_combined_stream_message() {
        let raw = r#"{"stream":"solusdt@kline_15m","data":{"e":"kline","E":1700000901000,"s":"SOLUSDT",
            "k":{"t":1700000000000,"T":1700000899999,"s":"SOLUSDT","i":"15m","o":"100.0","c":"101.5","h":"102.0","l":"99.0","x":true}}}"#;
        let event = parse_stream_message(raw).unwrap().unwrap();
        assert_eq!(event.symbol, "SOLUSDT");
        assert_eq!(event.close, dec!(101.5));
        assert!(event.is_final);
    }

    #[test]
    fn test_parse_raw_message_and_ignore_other_events() {
        let raw = r#"{"e":"kline","s":"ADAUSDT","k":{"t":1700000000000,"o":"1","c":"1.1","h":"1.2","l":"0.9","x":false}}"#;
        let event = parse_stream_message(raw).unwrap().unwrap();
        assert!(!event.is_final);

        let trade = r#"{"e":"trade","s":"ADAUSDT","p":"1.0"}"#;
        assert!(parse_stream_message(trade).unwrap().is_none());
    }

    #[test]
    fn test_handle_message_appends_closed_bar() {
        let handler = handler();
        let raw = r#"{"e":"kline","s":"SOLUSDT","k":{"t":1700000000000,"o":"1","c":"1.5","h":"2","l":"0.5","x":true}}"#;
        handler.handle_message(raw).unwrap();
        handler.handle_message(r#"{"result":null,"id":1}"#).unwrap();

        let snapshot = handler.store().snapshot("SOLUSDT").unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.highs(), Some(vec![dec!(2)]));
    }

    #[test]
    fn test_malformed_message_is_an_error() {
        assert!(parse_stream_message("not json").is_err());
        let missing = r#"{"e":"kline","s":"ADAUSDT","k":{"t":1700000000000,"o":"1"}}"#;
        assert!(matches!(parse_stream_message(missing), Err(Error::Ingestion(_))));
    }

    #[test]
    fn test_chunk_symbols() {
        let symbols: Vec<String> = (0..85).map(|i| format!("S{}USDT", i)).collect();
        let groups = chunk_symbols(&symbols, 40);
        assert_eq!(groups.len(), 3);
        assert_eq!(groups[2].len(), 5);
        assert_eq!(chunk_symbols(&symbols, 0).len(), 85);
    }

    #[tokio::test]
    async fn test_run_drains_channel() {
        let handler = handler();
        let store = handler.store().clone();
        let (tx, rx) = mpsc::channel(8);
        let task = tokio::spawn(handler.run(rx));

        tx.send(create_test_event(0, dec!(10), true)).await.unwrap();
        tx.send(create_test_event(15, dec!(11), true)).await.unwrap();
        drop(tx);
        task.await.unwrap();

        assert_eq!(store.candle_count("SOLUSDT").unwrap(), 2);
    }

    #[tokio::test]
    async fn test_poller_sends_closed_bar_once() {
        let mut server = Server::new_async().await;
        let body = r#"[
            [1700000000000, "100.0", "101.0", "99.0", "100.5", "1", 1700000899999, "0", 1, "0", "0", "0"],
            [1700000900000, "100.5", "102.0", "100.0", "101.0", "1", 4102444800000, "0", 1, "0", "0", "0"]
        ]"#;
        let _mock = server
            .mock("GET", "/api/v3/klines")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(body)
            .expect(2)
            .create_async()
            .await;

        let client = BinanceClient::with_base_url(&server.url()).unwrap();
        let mut poller = KlinePoller::new(client, vec!["SOLUSDT".to_string()], "15m");
        let (tx, mut rx) = mpsc::channel(16);

        assert_eq!(poller.poll_once(&tx).await.unwrap(), 2);
        assert_eq!(poller.poll_once(&tx).await.unwrap(), 1);

        let mut finals = 0;
        while let Ok(event) = rx.try_recv() {
            if event.is_final {
                finals += 1;
            }
        }
        assert_eq!(finals, 1);
    }
}
