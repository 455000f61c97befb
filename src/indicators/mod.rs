// Technical indicators module
// Pure functions over Decimal price series: EMA, RSI, MACD, ZLSMA, ATR,
// Chandelier Exit, breakout and divergence detection

pub mod atr;
pub mod breakout;
pub mod divergence;
pub mod macd;
pub mod moving_average;
pub mod rsi;
pub mod zlsma;

pub use atr::{calculate_atr, calculate_chandelier_exit, calculate_true_range, chandelier_cross};
pub use breakout::{detect_breakout, Breakout};
pub use divergence::{detect_bearish_divergence, detect_bullish_divergence};
pub use macd::{calculate_macd, Macd};
pub use moving_average::{calculate_ema, calculate_sma, crossed_above, crossed_below};
pub use rsi::{calculate_rsi, latest_rsi};
pub use zlsma::{calculate_lsma, calculate_zlsma};
