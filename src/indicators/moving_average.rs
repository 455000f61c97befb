use rust_decimal::Decimal;

use crate::error::{IndicatorError, IndicatorResult};

/// Calculate Simple Moving Average (SMA) over the last `period` values
pub fn calculate_sma(prices: &[Decimal], period: usize) -> IndicatorResult<Decimal> {
    if period == 0 {
        return Err(IndicatorError::InvalidPeriod { indicator: "SMA" });
    }
    if prices.len() < period {
        return Err(IndicatorError::InsufficientData {
            indicator: "SMA",
            needed: period,
            available: prices.len(),
        });
    }

    let sum: Decimal = prices.iter().rev().take(period).sum();
    Ok(sum / Decimal::from(period))
}

/// Calculate Exponential Moving Average (EMA) series
///
/// The first `period` entries are the running mean of the prefix, after that
/// `E[i] = P[i]·α + E[i-1]·(1-α)` with `α = 2/(period+1)`.
/// The output is index-aligned with `prices`.
pub fn calculate_ema(prices: &[Decimal], period: usize) -> IndicatorResult<Vec<Decimal>> {
    if period == 0 {
        return Err(IndicatorError::InvalidPeriod { indicator: "EMA" });
    }
    if prices.is_empty() {
        return Err(IndicatorError::EmptyInput { indicator: "EMA" });
    }

    let alpha = Decimal::TWO / Decimal::from(period + 1);
    let keep = Decimal::ONE - alpha;

    let mut ema = Vec::with_capacity(prices.len());
    let mut running_sum = Decimal::ZERO;

    for (i, &price) in prices.iter().enumerate() {
        let value = if i < period {
            running_sum += price;
            running_sum / Decimal::from(i + 1)
        } else {
            price * alpha + ema[i - 1] * keep
        };
        ema.push(value);
    }

    Ok(ema)
}

/// True when `fast` crossed above `slow` on the last bar
pub fn crossed_above(fast: &[Decimal], slow: &[Decimal]) -> bool {
    match (last_two(fast), last_two(slow)) {
        (Some((f_prev, f_curr)), Some((s_prev, s_curr))) => f_prev <= s_prev && f_curr > s_curr,
        _ => false,
    }
}

/// True when `fast` crossed below `slow` on the last bar
pub fn crossed_below(fast: &[Decimal], slow: &[Decimal]) -> bool {
    match (last_two(fast), last_two(slow)) {
        (Some((f_prev, f_curr)), Some((s_prev, s_curr))) => f_prev >= s_prev && f_curr < s_curr,
        _ => false,
    }
}

fn last_two(series: &[Decimal]) -> Option<(Decimal, Decimal)> {
    match series {
        [.., prev, curr] => Some((*prev, *curr)),
        _ => None,
    }
}
