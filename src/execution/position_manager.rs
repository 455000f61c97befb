use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::{BuyFill, ExitReason};

/// The single open position
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActivePosition {
    pub id: Uuid,
    pub symbol: String,
    pub entry_price: Decimal,
    pub quantity: Decimal,
    /// Quote balance before the buy, used for the trade report
    pub balance_before: Decimal,
    pub entry_time: DateTime<Utc>,
    pub reasons: Vec<String>,
}

impl ActivePosition {
    pub fn cost(&self) -> Decimal {
        self.entry_price * self.quantity
    }

    /// Unrealised P/L in quote and percent at `price`
    pub fn unrealized(&self, price: Decimal) -> (Decimal, Decimal) {
        let pnl = (price - self.entry_price) * self.quantity;
        let pct = if self.entry_price.is_zero() {
            Decimal::ZERO
        } else {
            (price - self.entry_price) / self.entry_price * Decimal::ONE_HUNDRED
        };
        (pnl, pct)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub enum PositionState {
    #[default]
    Flat,
    InPosition(ActivePosition),
}

/// Record of a finished round trip
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClosedTrade {
    pub position: ActivePosition,
    pub exit_price: Decimal,
    pub proceeds: Decimal,
    pub exit_time: DateTime<Utc>,
    pub reason: ExitReason,
    pub pnl_quote: Decimal,
    pub pnl_pct: Decimal,
}

impl ClosedTrade {
    pub fn is_win(&self) -> bool {
        self.exit_price > self.position.entry_price
    }
}

/// Owns the position state; at most one symbol is ever in position
///
/// Invalid transitions are logged and rejected with
/// [`Error::InvariantViolation`], leaving the state untouched.
#[derive(Debug, Default)]
pub struct PositionManager {
    state: PositionState,
    closed: Vec<ClosedTrade>,
}

impl PositionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &PositionState {
        &self.state
    }

    pub fn is_flat(&self) -> bool {
        matches!(self.state, PositionState::Flat)
    }

    pub fn active(&self) -> Option<&ActivePosition> {
        match &self.state {
            PositionState::InPosition(position) => Some(position),
            PositionState::Flat => None,
        }
    }

    pub fn active_symbol(&self) -> Option<&str> {
        self.active().map(|p| p.symbol.as_str())
    }

    /// All trades closed since startup
    pub fn closed_trades(&self) -> &[ClosedTrade] {
        &self.closed
    }

    /// FLAT -> IN_POSITION after a confirmed buy
    pub fn enter(
        &mut self,
        symbol: &str,
        fill: &BuyFill,
        balance_before: Decimal,
        reasons: Vec<String>,
        timestamp: DateTime<Utc>,
    ) -> Result<&ActivePosition> {
        if let PositionState::InPosition(active) = &self.state {
            let msg = format!(
                "cannot enter {} while in position on {}",
                symbol, active.symbol
            );
            tracing::warn!("🚫 {}", msg);
            return Err(Error::InvariantViolation(msg));
        }
        if fill.filled_quantity <= Decimal::ZERO || fill.avg_fill_price <= Decimal::ZERO {
            return Err(Error::Execution(format!(
                "buy fill for {} is empty (price {}, qty {})",
                symbol, fill.avg_fill_price, fill.filled_quantity
            )));
        }

        let position = ActivePosition {
            id: Uuid::new_v4(),
            symbol: symbol.to_string(),
            entry_price: fill.avg_fill_price,
            quantity: fill.filled_quantity,
            balance_before,
            entry_time: timestamp,
            reasons,
        };

        tracing::info!(
            symbol = %position.symbol,
            entry_price = %position.entry_price,
            quantity = %position.quantity,
            "📥 Entered position"
        );

        self.state = PositionState::InPosition(position);
        match &self.state {
            PositionState::InPosition(position) => Ok(position),
            PositionState::Flat => Err(Error::InvariantViolation(
                "position vanished after entry".to_string(),
            )),
        }
    }

    /// IN_POSITION -> FLAT after a confirmed sell, a dust close or a stop
    pub fn exit(
        &mut self,
        symbol: &str,
        exit_price: Decimal,
        proceeds: Decimal,
        reason: ExitReason,
        timestamp: DateTime<Utc>,
    ) -> Result<ClosedTrade> {
        let position = match &self.state {
            PositionState::InPosition(active) if active.symbol == symbol => active.clone(),
            PositionState::InPosition(active) => {
                let msg = format!(
                    "cannot exit {} while in position on {}",
                    symbol, active.symbol
                );
                tracing::warn!("🚫 {}", msg);
                return Err(Error::InvariantViolation(msg));
            }
            PositionState::Flat => {
                let msg = format!("cannot exit {} while flat", symbol);
                tracing::warn!("🚫 {}", msg);
                return Err(Error::InvariantViolation(msg));
            }
        };

        let pnl_pct = if position.entry_price.is_zero() {
            Decimal::ZERO
        } else {
            (exit_price - position.entry_price) / position.entry_price * Decimal::ONE_HUNDRED
        };
        let trade = ClosedTrade {
            pnl_quote: proceeds - position.cost(),
            pnl_pct,
            position,
            exit_price,
            proceeds,
            exit_time: timestamp,
            reason,
        };

        tracing::info!(
            symbol = %trade.position.symbol,
            exit_price = %trade.exit_price,
            pnl = %trade.pnl_quote,
            pnl_pct = %trade.pnl_pct.round_dp(2),
            reason = %trade.reason,
            "📤 Exited position"
        );

        self.state = PositionState::Flat;
        self.closed.push(trade.clone());
        Ok(trade)
    }
}
