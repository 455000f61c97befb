// Symbol discovery and metadata
pub mod registry;
pub mod safety;

pub use registry::SymbolRegistry;
pub use safety::{is_tradable_symbol, symbol_info};
