//! Runtime configuration
//!
//! Loaded once from an optional TOML file and `SPOTBOT__*` environment
//! variables, then shared behind [`SharedSettings`] so control commands can
//! change thresholds and toggles while the scheduler is running.
//!
//! ```toml
//! [strategy]
//! ema_short = 8
//! ema_long = 30
//!
//! [toggles.entry]
//! breakout = false
//! ```

use crate::error::{Error, Result};
use crate::strategy::conditions::{EntryCondition, ExitCondition, FeatureToggles};
use chrono::NaiveTime;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};

/// Indicator periods and entry thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyParams {
    pub ema_short: usize,
    pub ema_long: usize,
    pub rsi_period: usize,
    pub rsi_oversold: Decimal,
    pub rsi_overbought: Decimal,
    /// Bars the short EMA must have spent below the long EMA before a cross
    pub look_back: usize,
    pub zlsma_period: usize,
    pub chandelier_period: usize,
    pub chandelier_multiplier: Decimal,
    pub macd_short: usize,
    pub macd_long: usize,
    pub macd_signal: usize,
    pub breakout_lookback: usize,
    pub breakout_threshold_pct: Decimal,
    pub divergence_lookback: usize,
    pub min_increase_pct: Decimal,
    pub max_increase_pct: Decimal,
}

impl Default for StrategyParams {
    fn default() -> Self {
        Self {
            ema_short: 8,
            ema_long: 30,
            rsi_period: 10,
            rsi_oversold: dec!(25),
            rsi_overbought: dec!(75),
            look_back: 5,
            zlsma_period: 30,
            chandelier_period: 22,
            chandelier_multiplier: dec!(3),
            macd_short: 12,
            macd_long: 26,
            macd_signal: 9,
            breakout_lookback: 20,
            breakout_threshold_pct: dec!(0.5),
            divergence_lookback: 10,
            min_increase_pct: dec!(7),
            max_increase_pct: dec!(12),
        }
    }
}

impl StrategyParams {
    /// Bars a symbol needs before it is evaluated
    pub fn warm_up_bars(&self) -> usize {
        self.ema_long.max(self.rsi_period)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskSettings {
    /// Percent gain over entry that closes the position
    pub take_profit_pct: Decimal,
    /// Percent change (negative) that closes the position
    pub stop_loss_pct: Decimal,
    /// Summed losing-trade percent within an hour that halts trading
    pub max_loss_per_hour_pct: Decimal,
}

impl Default for RiskSettings {
    fn default() -> Self {
        Self {
            take_profit_pct: dec!(1),
            stop_loss_pct: dec!(-3),
            max_loss_per_hour_pct: dec!(10),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TradingSettings {
    pub quote_asset: String,
    /// Below this quote balance no buy is attempted
    pub min_usdt: Decimal,
    pub min_trade_usdt: Decimal,
    pub max_trade_usdt: Decimal,
    /// Share of the balance spent on a buy, leaves room for fees
    pub balance_usage: Decimal,
}

impl Default for TradingSettings {
    fn default() -> Self {
        Self {
            quote_asset: "USDT".to_string(),
            min_usdt: dec!(10),
            min_trade_usdt: dec!(11),
            max_trade_usdt: dec!(5000),
            balance_usage: dec!(0.999),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerSettings {
    pub trade_interval_secs: u64,
    pub candle_capacity: usize,
    pub monitor_minutes: i64,
    pub kline_interval: String,
    /// Bars fetched per symbol at startup
    pub bootstrap_bars: usize,
    pub symbols_per_group: usize,
    pub poll_interval_secs: u64,
    /// UTC time of day for the daily report, `HH:MM`
    pub daily_report_time: String,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            trade_interval_secs: 6,
            candle_capacity: 120,
            monitor_minutes: 1440,
            kline_interval: "15m".to_string(),
            bootstrap_bars: 100,
            symbols_per_group: 40,
            poll_interval_secs: 15,
            daily_report_time: "20:59".to_string(),
        }
    }
}

impl SchedulerSettings {
    pub fn daily_report_at(&self) -> Result<NaiveTime> {
        NaiveTime::parse_from_str(&self.daily_report_time, "%H:%M").map_err(|e| {
            Error::Config(format!(
                "daily_report_time '{}' is not HH:MM: {}",
                self.daily_report_time, e
            ))
        })
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub strategy: StrategyParams,
    pub risk: RiskSettings,
    pub trading: TradingSettings,
    pub scheduler: SchedulerSettings,
    pub toggles: FeatureToggles,
}

impl Settings {
    /// Load settings from an optional TOML file and the environment
    ///
    /// Environment variables use the `SPOTBOT` prefix and `__` as separator,
    /// e.g. `SPOTBOT__STRATEGY__EMA_SHORT=9`.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }
        let settings: Settings = builder
            .add_source(
                config::Environment::with_prefix("SPOTBOT")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        let s = &self.strategy;
        let periods = [
            ("ema_short", s.ema_short),
            ("ema_long", s.ema_long),
            ("rsi_period", s.rsi_period),
            ("look_back", s.look_back),
            ("zlsma_period", s.zlsma_period),
            ("chandelier_period", s.chandelier_period),
            ("macd_short", s.macd_short),
            ("macd_long", s.macd_long),
            ("macd_signal", s.macd_signal),
            ("breakout_lookback", s.breakout_lookback),
            ("divergence_lookback", s.divergence_lookback),
        ];
        if let Some((name, _)) = periods.iter().find(|(_, value)| *value == 0) {
            return Err(Error::Config(format!("{} must be greater than zero", name)));
        }
        if s.ema_short >= s.ema_long {
            return Err(Error::Config(format!(
                "ema_short ({}) must be below ema_long ({})",
                s.ema_short, s.ema_long
            )));
        }
        if s.macd_short >= s.macd_long {
            return Err(Error::Config(format!(
                "macd_short ({}) must be below macd_long ({})",
                s.macd_short, s.macd_long
            )));
        }
        if s.rsi_oversold >= s.rsi_overbought
            || s.rsi_oversold < Decimal::ZERO
            || s.rsi_overbought > Decimal::ONE_HUNDRED
        {
            return Err(Error::Config(format!(
                "RSI band {}..{} is invalid",
                s.rsi_oversold, s.rsi_overbought
            )));
        }
        if s.min_increase_pct > s.max_increase_pct {
            return Err(Error::Config(format!(
                "min_increase_pct ({}) exceeds max_increase_pct ({})",
                s.min_increase_pct, s.max_increase_pct
            )));
        }

        let r = &self.risk;
        if r.take_profit_pct <= Decimal::ZERO {
            return Err(Error::Config("take_profit_pct must be positive".to_string()));
        }
        if r.stop_loss_pct >= Decimal::ZERO {
            return Err(Error::Config("stop_loss_pct must be negative".to_string()));
        }
        if r.max_loss_per_hour_pct <= Decimal::ZERO {
            return Err(Error::Config("max_loss_per_hour_pct must be positive".to_string()));
        }

        let t = &self.trading;
        if t.min_trade_usdt > t.max_trade_usdt {
            return Err(Error::Config(format!(
                "min_trade_usdt ({}) exceeds max_trade_usdt ({})",
                t.min_trade_usdt, t.max_trade_usdt
            )));
        }
        if t.balance_usage <= Decimal::ZERO || t.balance_usage > Decimal::ONE {
            return Err(Error::Config("balance_usage must be within (0, 1]".to_string()));
        }

        let sch = &self.scheduler;
        if sch.trade_interval_secs == 0 || sch.poll_interval_secs == 0 {
            return Err(Error::Config("intervals must be greater than zero".to_string()));
        }
        if sch.symbols_per_group == 0 {
            return Err(Error::Config("symbols_per_group must be greater than zero".to_string()));
        }
        if sch.monitor_minutes <= 0 {
            return Err(Error::Config("monitor_minutes must be positive".to_string()));
        }
        if sch.candle_capacity < s.warm_up_bars() {
            return Err(Error::Config(format!(
                "candle_capacity ({}) cannot hold the {} bars needed to warm up",
                sch.candle_capacity,
                s.warm_up_bars()
            )));
        }
        sch.daily_report_at()?;

        Ok(())
    }

    /// Apply a single `key value` update, returning a confirmation line
    ///
    /// Toggles use `toggle <condition> on|off`.
    pub fn apply(&mut self, command: &str) -> Result<String> {
        let mut parts = command.split_whitespace();
        let key = parts
            .next()
            .ok_or_else(|| Error::Config("empty settings command".to_string()))?;

        if key == "toggle" {
            let condition = parts
                .next()
                .ok_or_else(|| Error::Config("toggle needs a condition name".to_string()))?;
            let enabled = parse_switch(parts.next())?;
            return self.apply_toggle(condition, enabled);
        }

        let value = parts
            .next()
            .ok_or_else(|| Error::Config(format!("missing value for '{}'", key)))?;

        let mut updated = self.clone();
        {
            let s = &mut updated.strategy;
            let r = &mut updated.risk;
            let t = &mut updated.trading;
            let sch = &mut updated.scheduler;
            match key {
                "ema_short" => s.ema_short = parse_value(key, value)?,
                "ema_long" => s.ema_long = parse_value(key, value)?,
                "rsi_period" => s.rsi_period = parse_value(key, value)?,
                "rsi_oversold" => s.rsi_oversold = parse_value(key, value)?,
                "rsi_overbought" => s.rsi_overbought = parse_value(key, value)?,
                "look_back" => s.look_back = parse_value(key, value)?,
                "zlsma_period" => s.zlsma_period = parse_value(key, value)?,
                "chandelier_period" => s.chandelier_period = parse_value(key, value)?,
                "chandelier_multiplier" => s.chandelier_multiplier = parse_value(key, value)?,
                "macd_short" => s.macd_short = parse_value(key, value)?,
                "macd_long" => s.macd_long = parse_value(key, value)?,
                "macd_signal" => s.macd_signal = parse_value(key, value)?,
                "breakout_lookback" => s.breakout_lookback = parse_value(key, value)?,
                "breakout_threshold_pct" => s.breakout_threshold_pct = parse_value(key, value)?,
                "divergence_lookback" => s.divergence_lookback = parse_value(key, value)?,
                "min_increase_pct" => s.min_increase_pct = parse_value(key, value)?,
                "max_increase_pct" => s.max_increase_pct = parse_value(key, value)?,
                "take_profit_pct" => r.take_profit_pct = parse_value(key, value)?,
                "stop_loss_pct" => r.stop_loss_pct = parse_value(key, value)?,
                "max_loss_per_hour_pct" => r.max_loss_per_hour_pct = parse_value(key, value)?,
                "min_usdt" => t.min_usdt = parse_value(key, value)?,
                "min_trade_usdt" => t.min_trade_usdt = parse_value(key, value)?,
                "max_trade_usdt" => t.max_trade_usdt = parse_value(key, value)?,
                "trade_interval_secs" => sch.trade_interval_secs = parse_value(key, value)?,
                "monitor_minutes" => sch.monitor_minutes = parse_value(key, value)?,
                "daily_report_time" => sch.daily_report_time = value.to_string(),
                other => return Err(Error::Config(format!("unknown setting '{}'", other))),
            }
        }

        updated.validate()?;
        *self = updated;
        Ok(format!("{} = {}", key, value))
    }

    fn apply_toggle(&mut self, condition: &str, enabled: bool) -> Result<String> {
        if let Ok(entry) = condition.parse::<EntryCondition>() {
            self.toggles.set_entry(entry, enabled);
        } else if let Ok(exit) = condition.parse::<ExitCondition>() {
            self.toggles.set_exit(exit, enabled);
        } else {
            return Err(Error::Config(format!("unknown condition '{}'", condition)));
        }
        Ok(format!(
            "{} {}",
            condition,
            if enabled { "enabled" } else { "disabled" }
        ))
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e| Error::Config(format!("invalid value '{}' for {}: {}", value, key, e)))
}

fn parse_switch(value: Option<&str>) -> Result<bool> {
    match value {
        Some("on") | Some("true") | Some("1") => Ok(true),
        Some("off") | Some("false") | Some("0") => Ok(false),
        Some(other) => Err(Error::Config(format!("expected on/off, got '{}'", other))),
        None => Err(Error::Config("toggle needs on/off".to_string())),
    }
}

/// Settings shared between the scheduler and the control surface
///
/// Readers take a cloned copy per tick, writers swap in validated updates.
#[derive(Clone, Debug, Default)]
pub struct SharedSettings {
    inner: Arc<RwLock<Settings>>,
}

impl SharedSettings {
    pub fn new(settings: Settings) -> Self {
        Self {
            inner: Arc::new(RwLock::new(settings)),
        }
    }

    pub fn current(&self) -> Result<Settings> {
        self.inner
            .read()
            .map(|s| s.clone())
            .map_err(|e| Error::LockPoisoned(e.to_string()))
    }

    /// Parse, validate and apply a `key value` command
    pub fn apply(&self, command: &str) -> Result<String> {
        let mut settings = self
            .inner
            .write()
            .map_err(|e| Error::LockPoisoned(e.to_string()))?;
        let message = settings.apply(command)?;
        tracing::info!(command = %command, "⚙️ Settings updated");
        Ok(message)
    }

    pub fn replace(&self, settings: Settings) -> Result<()> {
        settings.validate()?;
        let mut guard = self
            .inner
            .write()
            .map_err(|e| Error::LockPoisoned(e.to_string()))?;
        *guard = settings;
        Ok(())
    }
}
