use rust_decimal::Decimal;

use crate::error::{IndicatorError, IndicatorResult};

/// Interior points of `series` that are <= both neighbours
pub fn find_swing_lows(series: &[Decimal]) -> Vec<(usize, Decimal)> {
    series
        .windows(3)
        .enumerate()
        .filter(|(_, w)| w[1] <= w[0] && w[1] <= w[2])
        .map(|(i, w)| (i + 1, w[1]))
        .collect()
}

/// Interior points of `series` that are >= both neighbours
pub fn find_swing_highs(series: &[Decimal]) -> Vec<(usize, Decimal)> {
    series
        .windows(3)
        .enumerate()
        .filter(|(_, w)| w[1] >= w[0] && w[1] >= w[2])
        .map(|(i, w)| (i + 1, w[1]))
        .collect()
}

fn trailing_windows<'a>(
    prices: &'a [Decimal],
    oscillator: &'a [Decimal],
    lookback: usize,
) -> IndicatorResult<(&'a [Decimal], &'a [Decimal])> {
    if lookback == 0 {
        return Err(IndicatorError::InvalidPeriod {
            indicator: "Divergence",
        });
    }
    let needed = lookback + 2;
    let available = prices.len().min(oscillator.len());
    if available < needed {
        return Err(IndicatorError::InsufficientData {
            indicator: "Divergence",
            needed,
            available,
        });
    }

    Ok((
        &prices[prices.len() - needed..],
        &oscillator[oscillator.len() - needed..],
    ))
}

fn last_two(points: &[(usize, Decimal)]) -> Option<(Decimal, Decimal)> {
    match points {
        [.., (_, prior), (_, latest)] => Some((*prior, *latest)),
        _ => None,
    }
}

/// Price prints a lower swing low while the oscillator prints a higher one
///
/// Works on RSI or MACD line alike; each series is read from its own tail so
/// tail-aligned oscillators need no padding.
pub fn detect_bullish_divergence(
    prices: &[Decimal],
    oscillator: &[Decimal],
    lookback: usize,
) -> IndicatorResult<bool> {
    let (prices, oscillator) = trailing_windows(prices, oscillator, lookback)?;

    let result = match (
        last_two(&find_swing_lows(prices)),
        last_two(&find_swing_lows(oscillator)),
    ) {
        (Some((price_prior, price_latest)), Some((osc_prior, osc_latest))) => {
            price_latest < price_prior && osc_latest > osc_prior
        }
        _ => false,
    };
    Ok(result)
}

/// Price prints a higher swing high while the oscillator prints a lower one
pub fn detect_bearish_divergence(
    prices: &[Decimal],
    oscillator: &[Decimal],
    lookback: usize,
) -> IndicatorResult<bool> {
    let (prices, oscillator) = trailing_windows(prices, oscillator, lookback)?;

    let result = match (
        last_two(&find_swing_highs(prices)),
        last_two(&find_swing_highs(oscillator)),
    ) {
        (Some((price_prior, price_latest)), Some((osc_prior, osc_latest))) => {
            price_latest > price_prior && osc_latest < osc_prior
        }
        _ => false,
    };
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::prelude::FromPrimitive;

    fn series(values: &[i64]) -> Vec<Decimal> {
        values.iter().map(|v| Decimal::from_i64(*v).unwrap()).collect()
    }

    #[test]
    fn test_swing_points_are_interior() {
        let values = series(&[1, 3, 2, 4, 0]);
        assert_eq!(find_swing_lows(&values), vec![(2, Decimal::from(2))]);
        assert_eq!(find_swing_highs(&values), vec![(1, Decimal::from(3)), (3, Decimal::from(4))]);
    }

    #[test]
    fn test_bullish_divergence() {
        let prices = series(&[10, 8, 9, 10, 7, 9, 10, 11]);
        let rsi = series(&[50, 30, 40, 50, 35, 45, 55, 60]);

        assert!(detect_bullish_divergence(&prices, &rsi, 6).unwrap());
        assert!(!detect_bearish_divergence(&prices, &rsi, 6).unwrap());
    }

    #[test]
    fn test_bearish_divergence() {
        let prices = series(&[10, 12, 11, 10, 13, 11, 10, 9]);
        let macd = series(&[50, 70, 60, 50, 65, 55, 45, 40]);

        assert!(detect_bearish_divergence(&prices, &macd, 6).unwrap());
    }

    #[test]
    fn test_oscillator_read_from_its_own_tail() {
        let prices = series(&[10, 8, 9, 10, 7, 9, 10, 11]);
        // longer oscillator, only the last 8 values matter
        let mut rsi = series(&[1, 1, 1]);
        rsi.extend(series(&[50, 30, 40, 50, 35, 45, 55, 60]));

        assert!(detect_bullish_divergence(&prices, &rsi, 6).unwrap());
    }

    #[test]
    fn test_flat_series_has_no_divergence() {
        let flat = vec![Decimal::from(5); 12];
        assert!(!detect_bullish_divergence(&flat, &flat, 10).unwrap());
        assert!(!detect_bearish_divergence(&flat, &flat, 10).unwrap());
    }

    #[test]
    fn test_divergence_insufficient_data() {
        let short = vec![Decimal::ONE; 11];
        assert!(detect_bullish_divergence(&short, &short, 10)
            .unwrap_err()
            .is_insufficient_data());
    }
}
