use rust_decimal::Decimal;
use serde::Serialize;

use crate::error::{IndicatorError, IndicatorResult};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Breakout {
    /// Highest close of the lookback window, current bar excluded
    pub resistance: Decimal,
    /// Distance of the last close above resistance, in percent
    pub change_pct: Decimal,
    pub is_breakout: bool,
}

/// Resistance breakout on closes
///
/// Fires when the last close sits more than `threshold_pct` percent above the
/// highest of the `lookback` closes before it.
pub fn detect_breakout(
    closes: &[Decimal],
    lookback: usize,
    threshold_pct: Decimal,
) -> IndicatorResult<Breakout> {
    if lookback == 0 {
        return Err(IndicatorError::InvalidPeriod {
            indicator: "Breakout",
        });
    }
    let needed = lookback + 1;
    if closes.len() < needed {
        return Err(IndicatorError::InsufficientData {
            indicator: "Breakout",
            needed,
            available: closes.len(),
        });
    }

    let current = closes[closes.len() - 1];
    let window = &closes[closes.len() - needed..closes.len() - 1];
    let resistance = window.iter().copied().max().unwrap_or(current);

    if resistance <= Decimal::ZERO {
        return Err(IndicatorError::InvalidInput {
            indicator: "Breakout",
            reason: format!("resistance must be positive, got {}", resistance),
        });
    }

    let change_pct = (current - resistance) / resistance * Decimal::ONE_HUNDRED;

    Ok(Breakout {
        resistance,
        change_pct,
        is_breakout: change_pct > threshold_pct,
    })
}
