use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use governor::{Quota, RateLimiter};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use std::num::NonZeroU32;
use std::str::FromStr;
use std::sync::Arc;

use crate::discovery::{is_tradable_symbol, symbol_info};
use crate::models::{KlineEvent, SymbolInfo};

const BINANCE_API_BASE: &str = "https://api.binance.com";
const RATE_LIMIT_RPM: u32 = 600; // well under the 1200 weight/min spot limit
const MAX_RETRIES: u32 = 3;

type BinanceRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Public market-data client for the Binance spot REST API
///
/// Cloneable; all clones share the same rate limiter.
#[derive(Clone)]
pub struct BinanceClient {
    client: Client,
    base_url: String,
    rate_limiter: Arc<BinanceRateLimiter>,
}

/// Response from /api/v3/exchangeInfo
#[derive(Debug, Deserialize)]
pub struct ExchangeInfo {
    pub symbols: Vec<ExchangeSymbol>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeSymbol {
    pub symbol: String,
    pub status: String,
    pub base_asset: String,
    pub quote_asset: String,
    #[serde(default)]
    pub filters: Vec<SymbolFilter>,
}

/// The symbol filters we care about; everything else is `Other`
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "filterType")]
pub enum SymbolFilter {
    #[serde(rename = "PRICE_FILTER")]
    PriceFilter {
        #[serde(rename = "tickSize")]
        tick_size: Decimal,
    },
    #[serde(rename = "LOT_SIZE")]
    LotSize {
        #[serde(rename = "minQty")]
        min_qty: Decimal,
        #[serde(rename = "stepSize")]
        step_size: Decimal,
    },
    #[serde(other)]
    Other,
}

impl BinanceClient {
    pub fn new() -> Result<Self> {
        Self::with_base_url(BINANCE_API_BASE)
    }

    /// Client against a different host (testnet, mock server)
    pub fn with_base_url(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to build HTTP client")?;

        let quota = Quota::per_minute(
            NonZeroU32::new(RATE_LIMIT_RPM).context("Rate limit must be non-zero")?,
        );
        let rate_limiter = Arc::new(RateLimiter::direct(quota));

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            rate_limiter,
        })
    }

    /// Make a rate-limited API request with retry logic
    async fn make_request(&self, url: &str) -> Result<reqwest::Response> {
        for attempt in 1..=MAX_RETRIES {
            self.rate_limiter.until_ready().await;

            match self.client.get(url).send().await {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        return Ok(response);
                    }

                    // 429 is a rate limit, 418 an IP ban for ignoring one
                    if status.as_u16() == 429 || status.as_u16() == 418 {
                        let backoff_secs = 2u64.pow(attempt);
                        tracing::warn!(
                            "Rate limited by Binance ({}), backing off for {}s (attempt {}/{})",
                            status,
                            backoff_secs,
                            attempt,
                            MAX_RETRIES
                        );
                        tokio::time::sleep(std::time::Duration::from_secs(backoff_secs)).await;
                        continue;
                    }

                    if status.is_server_error() {
                        let backoff_secs = 2u64.pow(attempt);
                        tracing::warn!(
                            "Server error {} from Binance, retrying in {}s (attempt {}/{})",
                            status,
                            backoff_secs,
                            attempt,
                            MAX_RETRIES
                        );
                        tokio::time::sleep(std::time::Duration::from_secs(backoff_secs)).await;
                        continue;
                    }

                    let error_text = response
                        .text()
                        .await
                        .unwrap_or_else(|_| "Unknown error".to_string());
                    anyhow::bail!("Binance API error ({}): {}", status, error_text);
                }
                Err(e) if attempt < MAX_RETRIES => {
                    let backoff_secs = 2u64.pow(attempt);
                    tracing::warn!(
                        "Network error: {}, retrying in {}s (attempt {}/{})",
                        e,
                        backoff_secs,
                        attempt,
                        MAX_RETRIES
                    );
                    tokio::time::sleep(std::time::Duration::from_secs(backoff_secs)).await;
                }
                Err(e) => anyhow::bail!("Network error after {} retries: {}", MAX_RETRIES, e),
            }
        }

        anyhow::bail!("Failed after {} retries", MAX_RETRIES)
    }

    /// Tradable symbols quoted in `quote_asset`
    pub async fn exchange_info(&self, quote_asset: &str) -> Result<Vec<SymbolInfo>> {
        let url = format!("{}/api/v3/exchangeInfo", self.base_url);
        let response = self.make_request(&url).await?;
        let info: ExchangeInfo = response
            .json()
            .await
            .context("Failed to parse exchange info")?;

        let total = info.symbols.len();
        let symbols: Vec<SymbolInfo> = info
            .symbols
            .iter()
            .filter(|s| {
                let (ok, reason) = is_tradable_symbol(s, quote_asset);
                if !ok {
                    tracing::trace!("Skipping {}: {}", s.symbol, reason);
                }
                ok
            })
            .map(symbol_info)
            .collect();

        tracing::info!(
            "🔍 Discovered {} tradable {} symbols out of {}",
            symbols.len(),
            quote_asset,
            total
        );
        Ok(symbols)
    }

    /// Most recent `limit` klines, oldest first
    ///
    /// The last row is usually the still-open bar and comes back with
    /// `is_final == false`.
    pub async fn klines(&self, symbol: &str, interval: &str, limit: u32) -> Result<Vec<KlineEvent>> {
        let url = format!(
            "{}/api/v3/klines?symbol={}&interval={}&limit={}",
            self.base_url, symbol, interval, limit
        );
        let response = self.make_request(&url).await?;
        let rows: Vec<Vec<Value>> = response
            .json()
            .await
            .with_context(|| format!("Failed to parse klines for {}", symbol))?;

        let now_ms = Utc::now().timestamp_millis();
        rows.iter()
            .map(|row| parse_kline_row(symbol, row, now_ms))
            .collect()
    }
}

/// [open_time, open, high, low, close, volume, close_time, ...]
fn parse_kline_row(symbol: &str, row: &[Value], now_ms: i64) -> Result<KlineEvent> {
    if row.len() < 7 {
        anyhow::bail!("Kline row for {} has {} fields", symbol, row.len());
    }

    let open_ms = row[0].as_i64().context("Kline open time is not an integer")?;
    let close_ms = row[6].as_i64().context("Kline close time is not an integer")?;

    Ok(KlineEvent {
        symbol: symbol.to_string(),
        open_time: millis_to_datetime(open_ms)?,
        open: decimal_field(&row[1])?,
        high: decimal_field(&row[2])?,
        low: decimal_field(&row[3])?,
        close: decimal_field(&row[4])?,
        is_final: close_ms <= now_ms,
    })
}

pub(crate) fn millis_to_datetime(ms: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms).with_context(|| format!("Timestamp {} out of range", ms))
}

/// Binance sends prices as strings
pub(crate) fn decimal_field(value: &Value) -> Result<Decimal> {
    match value {
        Value::String(s) => Decimal::from_str(s).with_context(|| format!("Bad decimal '{}'", s)),
        Value::Number(n) => {
            Decimal::from_str(&n.to_string()).with_context(|| format!("Bad decimal {}", n))
        }
        other => anyhow::bail!("Expected decimal, got {}", other),
    }
}
