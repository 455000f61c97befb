// Trading strategy module
pub mod conditions;
pub mod crossover;
pub mod signals;

pub use conditions::{EntryCondition, ExitCondition, FeatureToggles};
pub use crossover::CrossoverStrategy;

use crate::execution::candle_buffer::CandleSnapshot;
use crate::execution::position_manager::ActivePosition;
use crate::models::ExitReason;
use crate::Result;
use rust_decimal::Decimal;

/// Decision for one symbol on one tick
#[derive(Debug, Clone, PartialEq)]
pub enum Signal {
    Buy { reasons: Vec<String> },
    Sell { reason: ExitReason, reasons: Vec<String> },
    Hold,
}

/// Market view of one symbol handed to a strategy
#[derive(Debug, Clone)]
pub struct MarketContext {
    pub snapshot: CandleSnapshot,
    /// Change across the price history window
    pub price_change_pct: Option<Decimal>,
    /// Latest traded price, falls back to the last close
    pub live_price: Option<Decimal>,
}

/// Base trait for all trading strategies
pub trait Strategy: Send + Sync {
    /// Decide for one symbol
    ///
    /// `position` is the open position on this symbol, `None` when flat.
    /// Entry rules run only when flat, exit rules only with a position.
    fn evaluate(&self, market: &MarketContext, position: Option<&ActivePosition>) -> Result<Signal>;

    /// Get strategy name
    fn name(&self) -> &str;

    /// Minimum candles required for this strategy
    fn min_candles_required(&self) -> usize;
}
