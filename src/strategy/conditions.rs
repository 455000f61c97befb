use super::signals::SignalInputs;
use crate::indicators::{chandelier_cross, crossed_above};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Entry predicates; any enabled one that holds triggers a buy
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryCondition {
    BullishCross,
    ShortBelowLongBefore,
    RsiNeutral,
    PriceIncreasedRecently,
    EmaSlope,
    PriceAboveZlsma,
    MacdBullish,
    Breakout,
    RsiBullishDivergence,
    MacdBullishDivergence,
}

/// Secondary exit predicates; all of them must be enabled and hold
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitCondition {
    ChandelierCross,
    MacdBearish,
    PriceBelowZlsma,
}

impl EntryCondition {
    pub const ALL: [EntryCondition; 10] = [
        EntryCondition::BullishCross,
        EntryCondition::ShortBelowLongBefore,
        EntryCondition::RsiNeutral,
        EntryCondition::PriceIncreasedRecently,
        EntryCondition::EmaSlope,
        EntryCondition::PriceAboveZlsma,
        EntryCondition::MacdBullish,
        EntryCondition::Breakout,
        EntryCondition::RsiBullishDivergence,
        EntryCondition::MacdBullishDivergence,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            EntryCondition::BullishCross => "bullish_cross",
            EntryCondition::ShortBelowLongBefore => "short_below_long_before",
            EntryCondition::RsiNeutral => "rsi_neutral",
            EntryCondition::PriceIncreasedRecently => "price_increased_recently",
            EntryCondition::EmaSlope => "ema_slope",
            EntryCondition::PriceAboveZlsma => "price_above_zlsma",
            EntryCondition::MacdBullish => "macd_bullish",
            EntryCondition::Breakout => "breakout",
            EntryCondition::RsiBullishDivergence => "rsi_bullish_divergence",
            EntryCondition::MacdBullishDivergence => "macd_bullish_divergence",
        }
    }

    /// Human readable reason attached to buy signals
    pub fn label(&self) -> &'static str {
        match self {
            EntryCondition::BullishCross => "📈 Bullish Cross",
            EntryCondition::ShortBelowLongBefore => "🔻 Short Below Long Before",
            EntryCondition::RsiNeutral => "💡 RSI In Range",
            EntryCondition::PriceIncreasedRecently => "📊 Price Increased Recently",
            EntryCondition::EmaSlope => "📐 EMA Slope Positive",
            EntryCondition::PriceAboveZlsma => "⬆️ Price Above ZLSMA",
            EntryCondition::MacdBullish => "📈 MACD Bullish Cross",
            EntryCondition::Breakout => "🚀 Resistance Breakout",
            EntryCondition::RsiBullishDivergence => "🔀 RSI Bullish Divergence",
            EntryCondition::MacdBullishDivergence => "🔀 MACD Bullish Divergence",
        }
    }

    /// Enabled unless overridden
    pub fn enabled_by_default(&self) -> bool {
        !matches!(
            self,
            EntryCondition::RsiBullishDivergence | EntryCondition::MacdBullishDivergence
        )
    }

    /// Whether the predicate holds; missing indicators never hold
    pub fn evaluate(&self, inputs: &SignalInputs<'_>) -> bool {
        let ind = inputs.indicators;
        let params = inputs.params;

        match self {
            EntryCondition::BullishCross => crossed_above(&ind.ema_short, &ind.ema_long),
            EntryCondition::ShortBelowLongBefore => {
                let len = ind.ema_short.len().min(ind.ema_long.len());
                let needed = params.look_back + 2;
                if params.look_back == 0 || len < needed {
                    return false;
                }
                let short = &ind.ema_short[ind.ema_short.len() - needed..ind.ema_short.len() - 2];
                let long = &ind.ema_long[ind.ema_long.len() - needed..ind.ema_long.len() - 2];
                short.iter().zip(long).all(|(s, l)| s < l)
            }
            EntryCondition::RsiNeutral => ind
                .rsi
                .as_ref()
                .and_then(|rsi| rsi.last())
                .is_some_and(|v| *v >= params.rsi_oversold && *v <= params.rsi_overbought),
            EntryCondition::PriceIncreasedRecently => inputs.price_change_pct.is_some_and(|pct| {
                pct >= params.min_increase_pct && pct <= params.max_increase_pct
            }),
            EntryCondition::EmaSlope => match ind.ema_long.as_slice() {
                [.., three_ago, _, _, now] => now > three_ago,
                _ => false,
            },
            EntryCondition::PriceAboveZlsma => match (ind.last_close(), ind.last_zlsma()) {
                (Some(close), Some(zlsma)) => close > zlsma,
                _ => false,
            },
            EntryCondition::MacdBullish => ind.macd.as_ref().is_some_and(|m| m.is_bullish_cross()),
            EntryCondition::Breakout => ind.breakout.as_ref().is_some_and(|b| b.is_breakout),
            EntryCondition::RsiBullishDivergence => ind.rsi_bullish_divergence.unwrap_or(false),
            EntryCondition::MacdBullishDivergence => ind.macd_bullish_divergence.unwrap_or(false),
        }
    }
}

impl ExitCondition {
    pub const ALL: [ExitCondition; 3] = [
        ExitCondition::ChandelierCross,
        ExitCondition::MacdBearish,
        ExitCondition::PriceBelowZlsma,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            ExitCondition::ChandelierCross => "chandelier_cross",
            ExitCondition::MacdBearish => "macd_bearish",
            ExitCondition::PriceBelowZlsma => "price_below_zlsma",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ExitCondition::ChandelierCross => "💡 Chandelier Exit",
            ExitCondition::MacdBearish => "📉 MACD Bearish",
            ExitCondition::PriceBelowZlsma => "⬇️ Price Below ZLSMA",
        }
    }

    pub fn evaluate(&self, inputs: &SignalInputs<'_>) -> bool {
        let ind = inputs.indicators;

        match self {
            ExitCondition::ChandelierCross => ind
                .chandelier
                .as_ref()
                .is_some_and(|levels| chandelier_cross(&ind.closes, levels)),
            ExitCondition::MacdBearish => ind.macd.as_ref().is_some_and(|m| m.is_bearish_cross()),
            ExitCondition::PriceBelowZlsma => match (ind.last_close(), ind.last_zlsma()) {
                (Some(close), Some(zlsma)) => close < zlsma,
                _ => false,
            },
        }
    }
}

impl fmt::Display for EntryCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl fmt::Display for ExitCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for EntryCondition {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntryCondition::ALL
            .into_iter()
            .find(|c| c.key() == s)
            .ok_or_else(|| format!("unknown entry condition '{}'", s))
    }
}

impl FromStr for ExitCondition {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ExitCondition::ALL
            .into_iter()
            .find(|c| c.key() == s)
            .ok_or_else(|| format!("unknown exit condition '{}'", s))
    }
}

/// Enabled/disabled flags for every entry and exit predicate
///
/// Conditions missing from the maps fall back to their defaults, so a config
/// file only needs to list the ones it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureToggles {
    pub entry: BTreeMap<EntryCondition, bool>,
    pub exit: BTreeMap<ExitCondition, bool>,
}

impl Default for FeatureToggles {
    fn default() -> Self {
        Self {
            entry: EntryCondition::ALL
                .into_iter()
                .map(|c| (c, c.enabled_by_default()))
                .collect(),
            exit: ExitCondition::ALL.into_iter().map(|c| (c, true)).collect(),
        }
    }
}

impl FeatureToggles {
    pub fn entry_enabled(&self, condition: EntryCondition) -> bool {
        self.entry
            .get(&condition)
            .copied()
            .unwrap_or_else(|| condition.enabled_by_default())
    }

    pub fn exit_enabled(&self, condition: ExitCondition) -> bool {
        self.exit.get(&condition).copied().unwrap_or(true)
    }

    pub fn set_entry(&mut self, condition: EntryCondition, enabled: bool) {
        self.entry.insert(condition, enabled);
    }

    pub fn set_exit(&mut self, condition: ExitCondition, enabled: bool) {
        self.exit.insert(condition, enabled);
    }

    /// Everything off, entry and exit
    pub fn all_disabled() -> Self {
        Self {
            entry: EntryCondition::ALL.into_iter().map(|c| (c, false)).collect(),
            exit: ExitCondition::ALL.into_iter().map(|c| (c, false)).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_toggles() {
        let toggles = FeatureToggles::default();
        assert!(toggles.entry_enabled(EntryCondition::BullishCross));
        assert!(toggles.entry_enabled(EntryCondition::Breakout));
        assert!(!toggles.entry_enabled(EntryCondition::RsiBullishDivergence));
        assert!(!toggles.entry_enabled(EntryCondition::MacdBullishDivergence));
        assert!(ExitCondition::ALL.iter().all(|c| toggles.exit_enabled(*c)));
    }

    #[test]
    fn test_missing_entries_use_defaults() {
        let toggles = FeatureToggles {
            entry: BTreeMap::new(),
            exit: BTreeMap::new(),
        };
        assert!(toggles.entry_enabled(EntryCondition::EmaSlope));
        assert!(!toggles.entry_enabled(EntryCondition::RsiBullishDivergence));
    }

    #[test]
    fn test_parse_condition_keys() {
        for condition in EntryCondition::ALL {
            assert_eq!(condition.key().parse::<EntryCondition>(), Ok(condition));
        }
        assert_eq!("macd_bearish".parse::<ExitCondition>(), Ok(ExitCondition::MacdBearish));
        assert!("volume_spike".parse::<EntryCondition>().is_err());
    }

    #[test]
    fn test_toggles_deserialize_from_snake_case_keys() {
        let json = r#"{"entry": {"breakout": false}, "exit": {"macd_bearish": false}}"#;
        let toggles: FeatureToggles = serde_json::from_str(json).unwrap();

        assert!(!toggles.entry_enabled(EntryCondition::Breakout));
        assert!(toggles.entry_enabled(EntryCondition::BullishCross));
        assert!(!toggles.exit_enabled(ExitCondition::MacdBearish));
    }
}
