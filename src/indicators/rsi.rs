//! Relative Strength Index (RSI)
//!
//! RSI measures the magnitude of recent price changes to evaluate
//! overbought or oversold conditions.
//!
//! Values:
//! - RSI > overbought (default 75): Overbought
//! - RSI < oversold (default 25): Oversold
//!
//! Seeded with the plain mean of the first `period` gains/losses, then
//! Wilder-smoothed.

use rust_decimal::Decimal;

use crate::error::{IndicatorError, IndicatorResult};

/// Calculate the RSI series
///
/// The result is tail-aligned: `rsi[0]` belongs to `prices[period]` and the
/// last value belongs to the last price.
pub fn calculate_rsi(prices: &[Decimal], period: usize) -> IndicatorResult<Vec<Decimal>> {
    if period == 0 {
        return Err(IndicatorError::InvalidPeriod { indicator: "RSI" });
    }
    if prices.is_empty() {
        return Err(IndicatorError::EmptyInput { indicator: "RSI" });
    }
    if prices.len() < period + 1 {
        return Err(IndicatorError::InsufficientData {
            indicator: "RSI",
            needed: period + 1,
            available: prices.len(),
        });
    }

    let mut gains = Vec::with_capacity(prices.len() - 1);
    let mut losses = Vec::with_capacity(prices.len() - 1);
    for window in prices.windows(2) {
        let change = window[1] - window[0];
        if change > Decimal::ZERO {
            gains.push(change);
            losses.push(Decimal::ZERO);
        } else {
            gains.push(Decimal::ZERO);
            losses.push(change.abs());
        }
    }

    let n = Decimal::from(period);
    let n_minus_one = Decimal::from(period - 1);

    let mut avg_gain: Decimal = gains[..period].iter().sum::<Decimal>() / n;
    let mut avg_loss: Decimal = losses[..period].iter().sum::<Decimal>() / n;

    let mut rsi = Vec::with_capacity(prices.len() - period);
    rsi.push(rsi_value(avg_gain, avg_loss));

    for i in period..gains.len() {
        avg_gain = (avg_gain * n_minus_one + gains[i]) / n;
        avg_loss = (avg_loss * n_minus_one + losses[i]) / n;
        rsi.push(rsi_value(avg_gain, avg_loss));
    }

    Ok(rsi)
}

/// Latest RSI value
pub fn latest_rsi(prices: &[Decimal], period: usize) -> IndicatorResult<Decimal> {
    let series = calculate_rsi(prices, period)?;
    series.last().copied().ok_or(IndicatorError::EmptyInput { indicator: "RSI" })
}

fn rsi_value(avg_gain: Decimal, avg_loss: Decimal) -> Decimal {
    if avg_loss.is_zero() {
        return Decimal::ONE_HUNDRED;
    }

    let rs = avg_gain / avg_loss;
    Decimal::ONE_HUNDRED - Decimal::ONE_HUNDRED / (Decimal::ONE + rs)
}
