use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::execution::position_manager::ClosedTrade;

/// Halts trading when recent losses pile up
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreaker {
    /// Summed percent of losing trades within one hour that trips the breaker
    pub max_loss_per_hour_pct: Decimal,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self {
            max_loss_per_hour_pct: Decimal::TEN,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CircuitBreakerTrip {
    HourlyLoss {
        loss_pct: Decimal,
        limit_pct: Decimal,
    },
}

impl std::fmt::Display for CircuitBreakerTrip {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitBreakerTrip::HourlyLoss {
                loss_pct,
                limit_pct,
            } => write!(
                f,
                "losses of {:.2}% in the past hour exceed the {}% limit",
                loss_pct, limit_pct
            ),
        }
    }
}

impl CircuitBreaker {
    pub fn new(max_loss_per_hour_pct: Decimal) -> Self {
        Self {
            max_loss_per_hour_pct,
        }
    }

    pub fn check(&self, stats: &TradingStats, now: DateTime<Utc>) -> Result<(), CircuitBreakerTrip> {
        let loss_pct = stats.hourly_loss_pct(now);
        if loss_pct >= self.max_loss_per_hour_pct {
            return Err(CircuitBreakerTrip::HourlyLoss {
                loss_pct,
                limit_pct: self.max_loss_per_hour_pct,
            });
        }
        Ok(())
    }
}

/// Counters for the daily report
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailySummary {
    pub total_trades: u32,
    pub winning_trades: u32,
    pub losing_trades: u32,
    pub daily_pnl: Decimal,
    pub total_pnl: Decimal,
    pub date: DateTime<Utc>,
}

/// Running trade statistics
#[derive(Debug, Clone, Default)]
pub struct TradingStats {
    pub successful_trades: u32,
    pub failed_trades: u32,
    pub total_trades_today: u32,
    pub daily_pnl: Decimal,
    pub total_pnl: Decimal,
    /// (exit time, loss in percent) of losing trades, pruned to one hour
    recent_losses: VecDeque<(DateTime<Utc>, Decimal)>,
}

impl TradingStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, trade: &ClosedTrade) {
        self.total_trades_today += 1;
        self.daily_pnl += trade.pnl_quote;
        self.total_pnl += trade.pnl_quote;

        if trade.is_win() {
            self.successful_trades += 1;
        } else {
            self.failed_trades += 1;
            self.recent_losses
                .push_back((trade.exit_time, trade.pnl_pct.abs()));
        }
        self.prune_losses(trade.exit_time);
    }

    fn prune_losses(&mut self, now: DateTime<Utc>) {
        let cutoff = now - Duration::hours(1);
        self.recent_losses.retain(|(at, _)| *at >= cutoff);
    }

    /// Summed losing-trade percent within the hour before `now`
    pub fn hourly_loss_pct(&self, now: DateTime<Utc>) -> Decimal {
        let cutoff = now - Duration::hours(1);
        self.recent_losses
            .iter()
            .filter(|(at, _)| *at >= cutoff)
            .map(|(_, loss)| *loss)
            .sum()
    }

    pub fn daily_summary(&self, now: DateTime<Utc>) -> DailySummary {
        DailySummary {
            total_trades: self.total_trades_today,
            winning_trades: self.successful_trades,
            losing_trades: self.failed_trades,
            daily_pnl: self.daily_pnl,
            total_pnl: self.total_pnl,
            date: now,
        }
    }

    /// Start a new day; cumulative P/L is kept
    pub fn reset_daily(&mut self) {
        self.successful_trades = 0;
        self.failed_trades = 0;
        self.total_trades_today = 0;
        self.daily_pnl = Decimal::ZERO;
    }
}
