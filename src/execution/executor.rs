use async_trait::async_trait;
use rand::Rng;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use std::collections::HashMap;
use std::sync::Mutex;

use super::candle_buffer::CandleStore;
use crate::error::{Error, Result};
use crate::models::{BuyFill, SellFill, SymbolInfo};
use crate::settings::TradingSettings;

/// Order placement against an exchange
///
/// Implementations report fills; they never touch position state.
#[async_trait]
pub trait OrderExecutor: Send + Sync {
    /// Free balance of the quote asset
    async fn quote_balance(&self) -> Result<Decimal>;

    /// Market buy spending `notional` of the quote asset
    async fn execute_buy(&self, symbol: &str, notional: Decimal) -> Result<BuyFill>;

    /// Market sell of `quantity` base units
    async fn execute_sell(&self, symbol: &str, quantity: Decimal) -> Result<SellFill>;
}

/// Quote amount to spend on a buy, `None` when the balance is too small
///
/// Spends `balance_usage` of the balance rounded down to 4 dp, capped at
/// `max_trade_usdt`.
pub fn buy_notional(balance: Decimal, trading: &TradingSettings) -> Option<Decimal> {
    if balance < trading.min_usdt {
        return None;
    }

    let notional = (balance * trading.balance_usage)
        .round_dp_with_strategy(4, RoundingStrategy::ToZero)
        .min(trading.max_trade_usdt);

    if notional < trading.min_trade_usdt {
        None
    } else {
        Some(notional)
    }
}

/// Sellable quantity rounded down to the step size, `None` for dust
pub fn sell_quantity(quantity: Decimal, info: &SymbolInfo) -> Option<Decimal> {
    let rounded = if info.step_size > Decimal::ZERO {
        (quantity / info.step_size).floor() * info.step_size
    } else {
        quantity.round_dp_with_strategy(info.quantity_precision, RoundingStrategy::ToZero)
    };

    if rounded <= Decimal::ZERO || rounded < info.min_qty {
        None
    } else {
        Some(rounded.normalize())
    }
}

#[derive(Debug, Default)]
struct PaperAccount {
    quote: Decimal,
    holdings: HashMap<String, Decimal>,
}

/// Simulated executor filling at the store's live price
///
/// Fills get a random jitter of up to `slippage_bps` either way.
pub struct PaperExecutor {
    store: CandleStore,
    account: Mutex<PaperAccount>,
    slippage_bps: Decimal,
}

impl PaperExecutor {
    pub fn new(store: CandleStore, initial_quote: Decimal, slippage_bps: Decimal) -> Self {
        tracing::info!(
            balance = %initial_quote,
            slippage_bps = %slippage_bps,
            "📝 Paper executor initialized"
        );
        Self {
            store,
            account: Mutex::new(PaperAccount {
                quote: initial_quote,
                holdings: HashMap::new(),
            }),
            slippage_bps,
        }
    }

    pub fn holding(&self, symbol: &str) -> Result<Decimal> {
        let account = self
            .account
            .lock()
            .map_err(|e| Error::LockPoisoned(e.to_string()))?;
        Ok(account.holdings.get(symbol).copied().unwrap_or_default())
    }

    fn fill_price(&self, symbol: &str) -> Result<Decimal> {
        let price = self
            .store
            .live_price(symbol)?
            .ok_or_else(|| Error::Execution(format!("no price available for {}", symbol)))?;

        // jitter in hundredths of a basis point
        let range = (self.slippage_bps * Decimal::ONE_HUNDRED)
            .to_i64()
            .unwrap_or(0)
            .abs();
        if range == 0 {
            return Ok(price);
        }
        let jitter = rand::thread_rng().gen_range(-range..=range);
        Ok(price * (Decimal::ONE + Decimal::new(jitter, 6)))
    }
}

#[async_trait]
impl OrderExecutor for PaperExecutor {
    async fn quote_balance(&self) -> Result<Decimal> {
        let account = self
            .account
            .lock()
            .map_err(|e| Error::LockPoisoned(e.to_string()))?;
        Ok(account.quote)
    }

    async fn execute_buy(&self, symbol: &str, notional: Decimal) -> Result<BuyFill> {
        let price = self.fill_price(symbol)?;
        let quantity = (notional / price).round_dp_with_strategy(8, RoundingStrategy::ToZero);
        let cost = quantity * price;

        let mut account = self
            .account
            .lock()
            .map_err(|e| Error::LockPoisoned(e.to_string()))?;
        if quantity <= Decimal::ZERO || cost > account.quote {
            return Err(Error::Execution(format!(
                "paper buy of {} {} rejected (balance {})",
                notional, symbol, account.quote
            )));
        }

        account.quote -= cost;
        *account.holdings.entry(symbol.to_string()).or_default() += quantity;

        tracing::debug!(symbol = %symbol, price = %price, quantity = %quantity, "Paper buy filled");

        Ok(BuyFill {
            avg_fill_price: price,
            filled_quantity: quantity,
        })
    }

    async fn execute_sell(&self, symbol: &str, quantity: Decimal) -> Result<SellFill> {
        let price = self.fill_price(symbol)?;

        let mut account = self
            .account
            .lock()
            .map_err(|e| Error::LockPoisoned(e.to_string()))?;
        let held = account.holdings.get(symbol).copied().unwrap_or_default();
        if quantity <= Decimal::ZERO || quantity > held {
            return Err(Error::Execution(format!(
                "paper sell of {} {} rejected (holding {})",
                quantity, symbol, held
            )));
        }

        let proceeds = quantity * price;
        account.quote += proceeds;
        account.holdings.insert(symbol.to_string(), held - quantity);

        tracing::debug!(symbol = %symbol, price = %price, quantity = %quantity, "Paper sell filled");

        Ok(SellFill {
            avg_fill_price: price,
            proceeds,
        })
    }
}
