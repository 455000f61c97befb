//! Outbound trade notifications
//!
//! The scheduler emits [`TradeEvent`]s and never waits on delivery. A chat
//! front end would consume them from a [`ChannelNotifier`].

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::fmt;
use tokio::sync::mpsc;

use crate::execution::position_manager::{ActivePosition, ClosedTrade};
use crate::risk::DailySummary;

/// Sell-side report sent when a position closes
#[derive(Debug, Clone, PartialEq)]
pub struct TradeReport {
    pub trade: ClosedTrade,
    pub balance_after: Decimal,
}

/// Snapshot answered to a status request
#[derive(Debug, Clone, PartialEq)]
pub struct StatusReport {
    pub trading_enabled: bool,
    pub position: Option<ActivePosition>,
    pub live_price: Option<Decimal>,
    pub unrealized_pnl: Option<Decimal>,
    pub unrealized_pct: Option<Decimal>,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TradeEvent {
    Opened(ActivePosition),
    Closed(TradeReport),
    TradingHalted { reason: String },
    Error { context: String, message: String },
    DailyReport(DailySummary),
    Status(StatusReport),
}

/// Fire-and-forget event sink
pub trait Notifier: Send + Sync {
    fn notify(&self, event: TradeEvent);
}

/// Writes events to the log
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, event: TradeEvent) {
        match &event {
            TradeEvent::Error { .. } | TradeEvent::TradingHalted { .. } => {
                tracing::warn!("{}", event)
            }
            _ => tracing::info!("{}", event),
        }
    }
}

/// Pushes events into an unbounded channel; a closed receiver is ignored
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<TradeEvent>,
}

impl ChannelNotifier {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TradeEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, event: TradeEvent) {
        if self.tx.send(event).is_err() {
            tracing::debug!("Notification receiver dropped");
        }
    }
}

impl fmt::Display for TradeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let trade = &self.trade;
        writeln!(f, "⚡️ New Sell Trade")?;
        writeln!(f, "🔹 Symbol: {}", trade.position.symbol)?;
        writeln!(f, "💸 Entry Price: {}", trade.position.entry_price)?;
        writeln!(f, "💰 Exit Price: {}", trade.exit_price)?;
        writeln!(f, "📈 Change: {:.2}%", trade.pnl_pct)?;
        writeln!(f, "💵 Profit / Loss: {:.2} USDT", trade.pnl_quote)?;
        writeln!(f, "💼 Balance Before Trade: {:.2} USDT", trade.position.balance_before)?;
        writeln!(f, "💼 Balance After Trade: {:.2} USDT", self.balance_after)?;
        writeln!(f, "🕒 Exit Time: {}", trade.exit_time.format("%Y-%m-%d %H:%M:%S"))?;
        writeln!(f, "🔖 Exit Reason: {}", trade.reason)?;
        if trade.is_win() {
            write!(f, "✅ Winning Trade")
        } else {
            write!(f, "❌ Losing Trade")
        }
    }
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "🤖 Trading: {}",
            if self.trading_enabled { "active" } else { "stopped" }
        )?;
        let Some(position) = &self.position else {
            return write!(f, "🚫 No open trades currently.");
        };
        writeln!(f, "🔹 Symbol: {}", position.symbol)?;
        writeln!(f, "💸 Entry Price: {}", position.entry_price)?;
        writeln!(f, "📦 Quantity: {}", position.quantity)?;
        if let Some(price) = self.live_price {
            writeln!(f, "💰 Current Price: {}", price)?;
        }
        if let (Some(pnl), Some(pct)) = (self.unrealized_pnl, self.unrealized_pct) {
            writeln!(f, "📈 Unrealised: {:.2} USDT ({:.2}%)", pnl, pct)?;
        }
        write!(f, "🕒 Entry Time: {}", position.entry_time.format("%Y-%m-%d %H:%M:%S"))
    }
}

impl fmt::Display for TradeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeEvent::Opened(position) => {
                writeln!(f, "✅ Buy Signal for {}", position.symbol)?;
                writeln!(f, "💸 Entry Price: {}", position.entry_price)?;
                writeln!(f, "📦 Quantity: {}", position.quantity)?;
                write!(f, "Reasons:")?;
                for reason in &position.reasons {
                    write!(f, "\n{}", reason)?;
                }
                Ok(())
            }
            TradeEvent::Closed(report) => write!(f, "{}", report),
            TradeEvent::TradingHalted { reason } => {
                write!(f, "⚠️ Trading stopped automatically: {}", reason)
            }
            TradeEvent::Error { context, message } => write!(f, "❌ {}: {}", context, message),
            TradeEvent::DailyReport(summary) => {
                writeln!(f, "📊 Daily Report:")?;
                writeln!(f, "✅ Total Trades: {}", summary.total_trades)?;
                writeln!(f, "✔️ Winning Trades: {}", summary.winning_trades)?;
                writeln!(f, "❌ Losing Trades: {}", summary.losing_trades)?;
                writeln!(f, "💰 Daily Profit / Loss: {:.2} USDT", summary.daily_pnl)?;
                writeln!(f, "💰 Total Profit / Loss: {:.2} USDT", summary.total_pnl)?;
                write!(f, "📅 Report Date: {}", summary.date.format("%Y-%m-%d %H:%M:%S"))
            }
            TradeEvent::Status(status) => write!(f, "{}", status),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ExitReason;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn create_test_report(exit: Decimal) -> TradeReport {
        let position = ActivePosition {
            id: Uuid::new_v4(),
            symbol: "BTCUSDT".to_string(),
            entry_price: dec!(100),
            quantity: dec!(2),
            balance_before: dec!(1000),
            entry_time: Utc::now(),
            reasons: vec!["📈 Bullish Cross".to_string()],
        };
        TradeReport {
            trade: ClosedTrade {
                pnl_quote: (exit - dec!(100)) * dec!(2),
                pnl_pct: exit - dec!(100),
                position,
                exit_price: exit,
                proceeds: exit * dec!(2),
                exit_time: Utc::now(),
                reason: ExitReason::TakeProfit,
            },
            balance_after: dec!(1000) + (exit - dec!(100)) * dec!(2),
        }
    }

    #[test]
    fn test_trade_report_format() {
        let text = create_test_report(dec!(101.5)).to_string();
        assert!(text.contains("Symbol: BTCUSDT"));
        assert!(text.contains("Change: 1.50%"));
        assert!(text.contains("Profit / Loss: 3.00 USDT"));
        assert!(text.contains("Exit Reason: Take Profit"));
        assert!(text.contains("Winning Trade"));
    }

    #[test]
    fn test_status_without_position() {
        let status = StatusReport {
            trading_enabled: false,
            position: None,
            live_price: None,
            unrealized_pnl: None,
            unrealized_pct: None,
            at: Utc::now(),
        };
        let text = status.to_string();
        assert!(text.contains("stopped"));
        assert!(text.contains("No open trades"));
    }

    #[tokio::test]
    async fn test_channel_notifier_delivers_and_ignores_closed_receiver() {
        let (notifier, mut rx) = ChannelNotifier::new();
        notifier.notify(TradeEvent::TradingHalted {
            reason: "test".to_string(),
        });
        assert!(matches!(rx.recv().await, Some(TradeEvent::TradingHalted { .. })));

        drop(rx);
        notifier.notify(TradeEvent::Error {
            context: "tick".to_string(),
            message: "boom".to_string(),
        });
    }
}
