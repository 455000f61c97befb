pub mod binance;

pub use binance::{BinanceClient, ExchangeInfo, ExchangeSymbol, SymbolFilter};
