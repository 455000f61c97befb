use rust_decimal::Decimal;

use crate::api::binance::{ExchangeSymbol, SymbolFilter};
use crate::models::SymbolInfo;

/// Filter for symbols the bot may trade
///
/// Applies, in order:
/// 1. Quote asset must match the configured one
/// 2. Exchange status must be TRADING
/// 3. Leveraged tokens (anything with UP or DOWN in the symbol) are skipped
///
/// Returns (is_tradable, reason) tuple
pub fn is_tradable_symbol(symbol: &ExchangeSymbol, quote_asset: &str) -> (bool, String) {
    if symbol.quote_asset != quote_asset {
        return (
            false,
            format!("WrongQuote: {} (want {})", symbol.quote_asset, quote_asset),
        );
    }

    if symbol.status != "TRADING" {
        return (false, format!("NotTrading: status {}", symbol.status));
    }

    if symbol.symbol.contains("UP") || symbol.symbol.contains("DOWN") {
        return (false, "Leveraged: UP/DOWN token".to_string());
    }

    (true, "Tradable".to_string())
}

/// Decimal places implied by a tick or step size, e.g. 0.001 -> 3
fn precision_of(increment: Decimal) -> u32 {
    if increment <= Decimal::ZERO {
        return 8;
    }
    increment.normalize().scale()
}

/// Build trading metadata from the exchange filters
pub fn symbol_info(symbol: &ExchangeSymbol) -> SymbolInfo {
    let mut price_precision = 8;
    let mut quantity_precision = 8;
    let mut min_qty = Decimal::ZERO;
    let mut step_size = Decimal::ZERO;

    for filter in &symbol.filters {
        match filter {
            SymbolFilter::PriceFilter { tick_size } => {
                price_precision = precision_of(*tick_size);
            }
            SymbolFilter::LotSize {
                min_qty: min,
                step_size: step,
            } => {
                quantity_precision = precision_of(*step);
                min_qty = *min;
                step_size = *step;
            }
            SymbolFilter::Other => {}
        }
    }

    SymbolInfo {
        symbol: symbol.symbol.clone(),
        base_asset: symbol.base_asset.clone(),
        quote_asset: symbol.quote_asset.clone(),
        price_precision,
        quantity_precision,
        min_qty,
        step_size,
    }
}
