use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Trading metadata for an exchange symbol
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SymbolInfo {
    pub symbol: String,
    pub base_asset: String,
    pub quote_asset: String,
    pub price_precision: u32,
    pub quantity_precision: u32,
    pub min_qty: Decimal,
    pub step_size: Decimal,
}

/// Closed price bar
///
/// Only `close` is guaranteed; exchange feeds fill in the rest, seeded
/// close-only history leaves them empty.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: Option<Decimal>,
    pub high: Option<Decimal>,
    pub low: Option<Decimal>,
    pub close: Decimal,
}

impl Candle {
    pub fn ohlc(
        timestamp: DateTime<Utc>,
        open: Decimal,
        high: Decimal,
        low: Decimal,
        close: Decimal,
    ) -> Self {
        Self {
            timestamp,
            open: Some(open),
            high: Some(high),
            low: Some(low),
            close,
        }
    }

    pub fn close_only(timestamp: DateTime<Utc>, close: Decimal) -> Self {
        Self {
            timestamp,
            open: None,
            high: None,
            low: None,
            close,
        }
    }
}

/// (timestamp, price) sample kept for the recent-move check
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PriceHistoryEntry {
    pub timestamp: DateTime<Utc>,
    pub price: Decimal,
}

/// One kline update from the ingestion feed
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KlineEvent {
    pub symbol: String,
    pub open_time: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    /// True once the bar has closed
    pub is_final: bool,
}

impl KlineEvent {
    pub fn to_candle(&self) -> Candle {
        Candle::ohlc(self.open_time, self.open, self.high, self.low, self.close)
    }
}

/// Result of a filled market buy
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct BuyFill {
    pub avg_fill_price: Decimal,
    pub filled_quantity: Decimal,
}

impl BuyFill {
    pub fn cost(&self) -> Decimal {
        self.avg_fill_price * self.filled_quantity
    }
}

/// Result of a filled market sell
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct SellFill {
    pub avg_fill_price: Decimal,
    pub proceeds: Decimal,
}

/// Why a position was closed
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ExitReason {
    TakeProfit,
    StopLoss,
    /// Chandelier + MACD + ZLSMA exit
    Signal,
    /// Stop command
    Manual,
    /// Remaining quantity below the exchange minimum, closed without an order
    Dust,
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ExitReason::TakeProfit => "Take Profit",
            ExitReason::StopLoss => "Stop Loss",
            ExitReason::Signal => "Signal Exit",
            ExitReason::Manual => "Manual Stop",
            ExitReason::Dust => "Dust",
        };
        f.write_str(label)
    }
}
