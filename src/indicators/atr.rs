//! Average True Range (ATR) and Chandelier Exit
//!
//! True Range is the greatest of:
//! - Current High - Current Low
//! - Abs(Current High - Previous Close)
//! - Abs(Current Low - Previous Close)
//!
//! ATR here is the simple average of the last `period` true ranges, the
//! current bar included.

use rust_decimal::Decimal;

use crate::error::{IndicatorError, IndicatorResult};

fn check_inputs(
    indicator: &'static str,
    highs: &[Decimal],
    lows: &[Decimal],
    closes: &[Decimal],
    period: usize,
) -> IndicatorResult<()> {
    if period == 0 {
        return Err(IndicatorError::InvalidPeriod { indicator });
    }
    if closes.is_empty() {
        return Err(IndicatorError::EmptyInput { indicator });
    }
    if highs.len() != closes.len() || lows.len() != closes.len() {
        return Err(IndicatorError::LengthMismatch {
            indicator,
            highs: highs.len(),
            lows: lows.len(),
            closes: closes.len(),
        });
    }
    if closes.len() < period + 1 {
        return Err(IndicatorError::InsufficientData {
            indicator,
            needed: period + 1,
            available: closes.len(),
        });
    }
    Ok(())
}

/// True ranges for every bar after the first
///
/// `tr[j]` belongs to bar `j + 1`.
pub fn calculate_true_range(
    highs: &[Decimal],
    lows: &[Decimal],
    closes: &[Decimal],
) -> IndicatorResult<Vec<Decimal>> {
    check_inputs("TR", highs, lows, closes, 1)?;

    Ok((1..closes.len())
        .map(|i| {
            let prev_close = closes[i - 1];
            (highs[i] - lows[i])
                .max((highs[i] - prev_close).abs())
                .max((lows[i] - prev_close).abs())
        })
        .collect())
}

/// Calculate the ATR series
///
/// Tail-aligned: `atr[0]` belongs to bar `period`, the last value to the last bar.
pub fn calculate_atr(
    highs: &[Decimal],
    lows: &[Decimal],
    closes: &[Decimal],
    period: usize,
) -> IndicatorResult<Vec<Decimal>> {
    check_inputs("ATR", highs, lows, closes, period)?;

    let true_ranges = calculate_true_range(highs, lows, closes)?;
    let n = Decimal::from(period);

    Ok(true_ranges
        .windows(period)
        .map(|window| window.iter().sum::<Decimal>() / n)
        .collect())
}

/// Chandelier Exit long stop levels
///
/// `level[i] = highest high over the trailing period - multiplier·ATR[i]`,
/// aligned the same way as [`calculate_atr`].
pub fn calculate_chandelier_exit(
    highs: &[Decimal],
    lows: &[Decimal],
    closes: &[Decimal],
    period: usize,
    multiplier: Decimal,
) -> IndicatorResult<Vec<Decimal>> {
    check_inputs("ChandelierExit", highs, lows, closes, period)?;

    let atr = calculate_atr(highs, lows, closes, period)?;

    let mut levels = Vec::with_capacity(atr.len());
    for (offset, atr_value) in atr.iter().enumerate() {
        let bar = period + offset;
        let highest = highs[bar + 1 - period..=bar]
            .iter()
            .copied()
            .max()
            .unwrap_or(highs[bar]);
        levels.push(highest - multiplier * atr_value);
    }

    Ok(levels)
}

/// Close dropped through the chandelier level on the last bar
///
/// `levels` must be tail-aligned with `closes`.
pub fn chandelier_cross(closes: &[Decimal], levels: &[Decimal]) -> bool {
    match (closes, levels) {
        ([.., prev_close, close], [.., prev_level, level]) => {
            prev_close >= prev_level && close < level
        }
        _ => false,
    }
}
