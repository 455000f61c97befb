use rust_decimal::Decimal;
use serde::Serialize;

use super::moving_average::{calculate_ema, crossed_above, crossed_below};
use crate::error::{IndicatorError, IndicatorResult};

/// MACD output, all three series index-aligned with the input prices
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Macd {
    pub macd_line: Vec<Decimal>,
    pub signal_line: Vec<Decimal>,
    pub histogram: Vec<Decimal>,
}

impl Macd {
    /// MACD line crossed above its signal line on the last bar
    pub fn is_bullish_cross(&self) -> bool {
        crossed_above(&self.macd_line, &self.signal_line)
    }

    /// MACD line crossed below its signal line on the last bar
    pub fn is_bearish_cross(&self) -> bool {
        crossed_below(&self.macd_line, &self.signal_line)
    }
}

/// Calculate MACD (short EMA - long EMA, EMA of that as signal)
///
/// Needs at least `long + signal` prices so the signal line has settled.
pub fn calculate_macd(
    prices: &[Decimal],
    short_period: usize,
    long_period: usize,
    signal_period: usize,
) -> IndicatorResult<Macd> {
    if short_period == 0 || long_period == 0 || signal_period == 0 {
        return Err(IndicatorError::InvalidPeriod { indicator: "MACD" });
    }
    if short_period >= long_period {
        return Err(IndicatorError::InvalidInput {
            indicator: "MACD",
            reason: format!(
                "short period ({}) must be below long period ({})",
                short_period, long_period
            ),
        });
    }
    if prices.is_empty() {
        return Err(IndicatorError::EmptyInput { indicator: "MACD" });
    }

    let needed = long_period + signal_period;
    if prices.len() < needed {
        return Err(IndicatorError::InsufficientData {
            indicator: "MACD",
            needed,
            available: prices.len(),
        });
    }

    let ema_short = calculate_ema(prices, short_period)?;
    let ema_long = calculate_ema(prices, long_period)?;

    let macd_line: Vec<Decimal> = ema_short
        .iter()
        .zip(ema_long.iter())
        .map(|(s, l)| s - l)
        .collect();
    let signal_line = calculate_ema(&macd_line, signal_period)?;
    let histogram = macd_line
        .iter()
        .zip(signal_line.iter())
        .map(|(m, s)| m - s)
        .collect();

    Ok(Macd {
        macd_line,
        signal_line,
        histogram,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn wave(len: usize) -> Vec<Decimal> {
        (0..len)
            .map(|i| dec!(100) + Decimal::from((i * 7) % 11) - Decimal::from(i % 3))
            .collect()
    }

    #[test]
    fn test_histogram_identity() {
        let macd = calculate_macd(&wave(80), 12, 26, 9).unwrap();

        assert_eq!(macd.macd_line.len(), 80);
        assert_eq!(macd.signal_line.len(), 80);
        for i in 0..80 {
            assert_eq!(macd.histogram[i], macd.macd_line[i] - macd.signal_line[i]);
        }
    }

    #[test]
    fn test_insufficient_data() {
        let err = calculate_macd(&wave(30), 12, 26, 9).unwrap_err();
        assert!(err.is_insufficient_data());
    }

    #[test]
    fn test_rejects_inverted_periods() {
        let err = calculate_macd(&wave(80), 26, 12, 9).unwrap_err();
        assert!(matches!(err, IndicatorError::InvalidInput { .. }));
    }

    #[test]
    fn test_uptrend_after_decline_crosses_bullish() {
        let mut prices: Vec<Decimal> = (0..40).map(|i| Decimal::from(200 - i)).collect();
        prices.extend((0..6).map(|i| Decimal::from(161 + i * 6)));

        let mut crossed = false;
        for end in 36..=prices.len() {
            let macd = calculate_macd(&prices[..end], 12, 26, 9).unwrap();
            crossed |= macd.is_bullish_cross();
        }
        assert!(crossed);
    }

    #[test]
    fn test_constant_prices_never_cross() {
        let macd = calculate_macd(&vec![dec!(50); 60], 12, 26, 9).unwrap();
        assert!(macd.histogram.iter().all(|h| h.is_zero()));
        assert!(!macd.is_bullish_cross());
        assert!(!macd.is_bearish_cross());
    }
}
