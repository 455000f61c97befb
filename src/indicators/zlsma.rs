//! Zero-Lag Least Squares Moving Average (ZLSMA)
//!
//! LSMA is the value of the ordinary least-squares line fitted to the last
//! `period` points, evaluated at the newest point. ZLSMA removes most of the
//! LSMA lag by subtracting a second LSMA pass taken over the LSMA series:
//! `zlsma = 2·lsma − lsma(lsma)`.

use rust_decimal::Decimal;

use crate::error::{IndicatorError, IndicatorResult};

/// Least-squares line value at the end of `window`
///
/// x runs 0..n-1 over the window, the result is `a + b·(n-1)`.
fn regression_end_value(window: &[Decimal]) -> IndicatorResult<Decimal> {
    let n = window.len();
    match n {
        0 => return Err(IndicatorError::EmptyInput { indicator: "LSMA" }),
        1 => return Ok(window[0]),
        _ => {}
    }

    let mut sum_x = Decimal::ZERO;
    let mut sum_y = Decimal::ZERO;
    let mut sum_xy = Decimal::ZERO;
    let mut sum_xx = Decimal::ZERO;
    for (i, y) in window.iter().enumerate() {
        let x = Decimal::from(i);
        sum_x += x;
        sum_y += y;
        sum_xy += x * y;
        sum_xx += x * x;
    }

    let count = Decimal::from(n);
    let divisor = count * sum_xx - sum_x * sum_x;
    let slope = (count * sum_xy - sum_x * sum_y)
        .checked_div(divisor)
        .ok_or_else(|| IndicatorError::InvalidInput {
            indicator: "LSMA",
            reason: "regression divisor is zero".to_string(),
        })?;
    let intercept = (sum_y - slope * sum_x) / count;

    Ok(intercept + slope * Decimal::from(n - 1))
}

/// Calculate the LSMA series
///
/// Tail-aligned: `lsma[0]` belongs to `prices[period - 1]`.
pub fn calculate_lsma(prices: &[Decimal], period: usize) -> IndicatorResult<Vec<Decimal>> {
    if period == 0 {
        return Err(IndicatorError::InvalidPeriod { indicator: "LSMA" });
    }
    if prices.len() < period {
        return Err(IndicatorError::InsufficientData {
            indicator: "LSMA",
            needed: period,
            available: prices.len(),
        });
    }

    prices.windows(period).map(regression_end_value).collect()
}

/// Calculate the ZLSMA series
///
/// Tail-aligned like [`calculate_lsma`]. The second pass runs over the LSMA
/// series itself; while fewer than `period` LSMA values exist it regresses
/// over all of them.
pub fn calculate_zlsma(prices: &[Decimal], period: usize) -> IndicatorResult<Vec<Decimal>> {
    if period == 0 {
        return Err(IndicatorError::InvalidPeriod { indicator: "ZLSMA" });
    }
    if prices.is_empty() {
        return Err(IndicatorError::EmptyInput { indicator: "ZLSMA" });
    }
    if prices.len() < period {
        return Err(IndicatorError::InsufficientData {
            indicator: "ZLSMA",
            needed: period,
            available: prices.len(),
        });
    }

    let lsma = calculate_lsma(prices, period)?;
    let mut zlsma = Vec::with_capacity(lsma.len());

    for i in 0..lsma.len() {
        let start = (i + 1).saturating_sub(period);
        let second_pass = regression_end_value(&lsma[start..=i])?;
        zlsma.push(Decimal::TWO * lsma[i] - second_pass);
    }

    Ok(zlsma)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_lsma_on_a_line_is_the_line() {
        let prices: Vec<Decimal> = (0..10).map(|i| dec!(5) + Decimal::from(i) * dec!(2)).collect();
        let lsma = calculate_lsma(&prices, 4).unwrap();

        assert_eq!(lsma.len(), 7);
        assert_eq!(lsma[0], prices[3]);
        assert_eq!(*lsma.last().unwrap(), prices[9]);
    }

    #[test]
    fn test_zlsma_on_a_line_tracks_price() {
        let prices: Vec<Decimal> = (0..40).map(|i| dec!(100) + Decimal::from(i)).collect();
        let zlsma = calculate_zlsma(&prices, 30).unwrap();

        assert_eq!(zlsma.len(), 11);
        for (z, p) in zlsma.iter().zip(prices[29..].iter()) {
            assert_eq!(z, p);
        }
    }

    #[test]
    fn test_zlsma_constant_series() {
        let zlsma = calculate_zlsma(&vec![dec!(7.5); 35], 30).unwrap();
        assert!(zlsma.iter().all(|v| *v == dec!(7.5)));
    }

    #[test]
    fn test_zlsma_insufficient_data() {
        let prices = vec![dec!(1); 29];
        assert!(calculate_zlsma(&prices, 30).unwrap_err().is_insufficient_data());
    }

    #[test]
    fn test_zlsma_period_one_is_identity() {
        let prices = vec![dec!(3), dec!(1), dec!(4), dec!(1), dec!(5)];
        assert_eq!(calculate_zlsma(&prices, 1).unwrap(), prices);
    }
}
