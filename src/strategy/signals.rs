use super::conditions::{EntryCondition, ExitCondition, FeatureToggles};
use crate::error::{Error, IndicatorResult, Result};
use crate::execution::candle_buffer::CandleSnapshot;
use crate::indicators::{
    calculate_chandelier_exit, calculate_ema, calculate_macd, calculate_rsi, calculate_zlsma,
    detect_bearish_divergence, detect_breakout, detect_bullish_divergence, Breakout, Macd,
};
use crate::models::ExitReason;
use crate::settings::{RiskSettings, StrategyParams};
use rust_decimal::Decimal;

/// Every indicator the rules look at, computed fresh from one snapshot
///
/// Indicators without enough bars are `None`; they simply never satisfy a
/// predicate.
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorSet {
    pub closes: Vec<Decimal>,
    pub ema_short: Vec<Decimal>,
    pub ema_long: Vec<Decimal>,
    pub rsi: Option<Vec<Decimal>>,
    pub macd: Option<Macd>,
    pub zlsma: Option<Vec<Decimal>>,
    pub chandelier: Option<Vec<Decimal>>,
    pub breakout: Option<Breakout>,
    pub rsi_bullish_divergence: Option<bool>,
    pub macd_bullish_divergence: Option<bool>,
    pub rsi_bearish_divergence: Option<bool>,
    pub macd_bearish_divergence: Option<bool>,
}

/// Turn "not enough data" into `None` and let real failures through
fn optional<T>(result: IndicatorResult<T>) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_insufficient_data() => Ok(None),
        Err(e) => Err(e.into()),
    }
}

impl IndicatorSet {
    pub fn compute(snapshot: &CandleSnapshot, params: &StrategyParams) -> Result<Self> {
        if snapshot.is_empty() {
            return Err(Error::InsufficientData(format!(
                "{} has no candles",
                snapshot.symbol
            )));
        }

        let closes = snapshot.closes();
        let (Some(highs), Some(lows)) = (snapshot.highs(), snapshot.lows()) else {
            return Err(Error::Computation(format!(
                "{}: {} of {} bars have no high/low",
                snapshot.symbol,
                snapshot.bars_without_range(),
                snapshot.len()
            )));
        };

        let ema_short = calculate_ema(&closes, params.ema_short)?;
        let ema_long = calculate_ema(&closes, params.ema_long)?;
        let rsi = optional(calculate_rsi(&closes, params.rsi_period))?;
        let macd = optional(calculate_macd(
            &closes,
            params.macd_short,
            params.macd_long,
            params.macd_signal,
        ))?;
        let zlsma = optional(calculate_zlsma(&closes, params.zlsma_period))?;
        let chandelier = optional(calculate_chandelier_exit(
            &highs,
            &lows,
            &closes,
            params.chandelier_period,
            params.chandelier_multiplier,
        ))?;
        let breakout = optional(detect_breakout(
            &closes,
            params.breakout_lookback,
            params.breakout_threshold_pct,
        ))?;

        let lookback = params.divergence_lookback;
        let (rsi_bullish_divergence, rsi_bearish_divergence) = match &rsi {
            Some(rsi) => (
                optional(detect_bullish_divergence(&closes, rsi, lookback))?,
                optional(detect_bearish_divergence(&closes, rsi, lookback))?,
            ),
            None => (None, None),
        };
        let (macd_bullish_divergence, macd_bearish_divergence) = match &macd {
            Some(macd) => (
                optional(detect_bullish_divergence(&closes, &macd.macd_line, lookback))?,
                optional(detect_bearish_divergence(&closes, &macd.macd_line, lookback))?,
            ),
            None => (None, None),
        };

        Ok(Self {
            closes,
            ema_short,
            ema_long,
            rsi,
            macd,
            zlsma,
            chandelier,
            breakout,
            rsi_bullish_divergence,
            macd_bullish_divergence,
            rsi_bearish_divergence,
            macd_bearish_divergence,
        })
    }

    pub fn last_close(&self) -> Option<Decimal> {
        self.closes.last().copied()
    }

    pub fn last_zlsma(&self) -> Option<Decimal> {
        self.zlsma.as_ref().and_then(|z| z.last().copied())
    }

    pub fn last_rsi(&self) -> Option<Decimal> {
        self.rsi.as_ref().and_then(|r| r.last().copied())
    }
}

/// What the condition evaluators read
#[derive(Debug, Clone, Copy)]
pub struct SignalInputs<'a> {
    pub indicators: &'a IndicatorSet,
    pub params: &'a StrategyParams,
    /// Change across the symbol's price history window
    pub price_change_pct: Option<Decimal>,
}

/// Enabled entry predicates that hold right now
///
/// A buy fires when this is non-empty.
pub fn evaluate_entry(inputs: &SignalInputs<'_>, toggles: &FeatureToggles) -> Vec<EntryCondition> {
    EntryCondition::ALL
        .into_iter()
        .filter(|c| toggles.entry_enabled(*c))
        .filter(|c| c.evaluate(inputs))
        .collect()
}

/// Percent move from entry to the current price
pub fn change_pct(entry_price: Decimal, current_price: Decimal) -> Option<Decimal> {
    if entry_price.is_zero() {
        return None;
    }
    Some((current_price - entry_price) / entry_price * Decimal::ONE_HUNDRED)
}

/// Take-profit / stop-loss check against the entry price
///
/// Always active, independent of the toggles.
pub fn tp_sl_exit(
    entry_price: Decimal,
    current_price: Decimal,
    risk: &RiskSettings,
) -> Option<(ExitReason, Decimal)> {
    let change = change_pct(entry_price, current_price)?;
    if change >= risk.take_profit_pct {
        Some((ExitReason::TakeProfit, change))
    } else if change <= risk.stop_loss_pct {
        Some((ExitReason::StopLoss, change))
    } else {
        None
    }
}

/// Secondary exit: every exit predicate must be enabled and hold
///
/// Returns the satisfied conditions when the exit fires.
pub fn evaluate_exit(
    inputs: &SignalInputs<'_>,
    toggles: &FeatureToggles,
) -> Option<Vec<ExitCondition>> {
    let fired = ExitCondition::ALL
        .iter()
        .all(|c| toggles.exit_enabled(*c) && c.evaluate(inputs));

    fired.then(|| ExitCondition::ALL.to_vec())
}
