use super::{
    conditions::FeatureToggles,
    signals::{evaluate_entry, evaluate_exit, tp_sl_exit, IndicatorSet, SignalInputs},
    MarketContext, Signal, Strategy,
};
use crate::error::Error;
use crate::execution::position_manager::ActivePosition;
use crate::models::ExitReason;
use crate::settings::{RiskSettings, Settings, StrategyParams};
use crate::Result;

/// EMA crossover strategy with toggleable confirmations
///
/// Entry fires when any enabled predicate holds (crossovers, RSI band,
/// recent move, ZLSMA, MACD, breakout, divergences). Exit is TP/SL on the
/// live price, or the combined Chandelier + MACD bearish + below-ZLSMA rule.
#[derive(Debug, Clone)]
pub struct CrossoverStrategy {
    params: StrategyParams,
    risk: RiskSettings,
    toggles: FeatureToggles,
}

impl CrossoverStrategy {
    pub fn new(params: StrategyParams, risk: RiskSettings, toggles: FeatureToggles) -> Self {
        Self {
            params,
            risk,
            toggles,
        }
    }

    /// Build from the settings read at the start of a tick
    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            settings.strategy.clone(),
            settings.risk.clone(),
            settings.toggles.clone(),
        )
    }

    pub fn params(&self) -> &StrategyParams {
        &self.params
    }

    /// Take-profit / stop-loss on the live price, falling back to the last close
    fn tp_sl_signal(&self, position: &ActivePosition, market: &MarketContext) -> Option<Signal> {
        let price = market.live_price.or(market.snapshot.last_close())?;
        let (reason, change) = tp_sl_exit(position.entry_price, price, &self.risk)?;
        let label = match reason {
            ExitReason::TakeProfit => format!("🥳 Take profit hit {:+.2}%", change),
            _ => format!("⚠️ Stop loss hit {:+.2}%", change),
        };
        Some(Signal::Sell {
            reason,
            reasons: vec![label],
        })
    }
}

impl Default for CrossoverStrategy {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

impl Strategy for CrossoverStrategy {
    fn evaluate(&self, market: &MarketContext, position: Option<&ActivePosition>) -> Result<Signal> {
        let snapshot = &market.snapshot;

        // TP/SL is checked first and needs no warm-up or indicators
        if let Some(position) = position {
            if let Some(signal) = self.tp_sl_signal(position, market) {
                return Ok(signal);
            }
        }

        if snapshot.len() < self.min_candles_required() {
            return Err(Error::InsufficientData(format!(
                "{}: {} candles, need {}",
                snapshot.symbol,
                snapshot.len(),
                self.min_candles_required()
            )));
        }

        let indicators = IndicatorSet::compute(snapshot, &self.params)?;

        tracing::debug!(
            symbol = %snapshot.symbol,
            close = ?indicators.last_close(),
            ema_short = ?indicators.ema_short.last(),
            ema_long = ?indicators.ema_long.last(),
            rsi = ?indicators.last_rsi(),
            zlsma = ?indicators.last_zlsma(),
            rsi_bearish_divergence = ?indicators.rsi_bearish_divergence,
            macd_bearish_divergence = ?indicators.macd_bearish_divergence,
            "Indicators computed"
        );

        let inputs = SignalInputs {
            indicators: &indicators,
            params: &self.params,
            price_change_pct: market.price_change_pct,
        };

        if position.is_none() {
            let reasons = evaluate_entry(&inputs, &self.toggles);
            if reasons.is_empty() {
                return Ok(Signal::Hold);
            }
            return Ok(Signal::Buy {
                reasons: reasons.iter().map(|c| c.label().to_string()).collect(),
            });
        }

        if let Some(conditions) = evaluate_exit(&inputs, &self.toggles) {
            return Ok(Signal::Sell {
                reason: ExitReason::Signal,
                reasons: conditions.iter().map(|c| c.label().to_string()).collect(),
            });
        }

        Ok(Signal::Hold)
    }

    fn name(&self) -> &str {
        "CrossoverStrategy"
    }

    fn min_candles_required(&self) -> usize {
        self.params.warm_up_bars()
    }
}
