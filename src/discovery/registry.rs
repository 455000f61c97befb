use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::error::{Error, Result};
use crate::models::SymbolInfo;

/// Trading metadata for every discovered symbol
///
/// Cloneable; all clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct SymbolRegistry {
    inner: Arc<RwLock<HashMap<String, SymbolInfo>>>,
}

impl SymbolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Swap in a freshly discovered symbol set
    pub fn replace(&self, symbols: Vec<SymbolInfo>) -> Result<()> {
        let mut map = self
            .inner
            .write()
            .map_err(|e| Error::LockPoisoned(e.to_string()))?;
        *map = symbols
            .into_iter()
            .map(|info| (info.symbol.clone(), info))
            .collect();
        tracing::info!("🔍 Symbol registry holds {} symbols", map.len());
        Ok(())
    }

    pub fn insert(&self, info: SymbolInfo) -> Result<()> {
        let mut map = self
            .inner
            .write()
            .map_err(|e| Error::LockPoisoned(e.to_string()))?;
        map.insert(info.symbol.clone(), info);
        Ok(())
    }

    pub fn get(&self, symbol: &str) -> Result<SymbolInfo> {
        let map = self
            .inner
            .read()
            .map_err(|e| Error::LockPoisoned(e.to_string()))?;
        map.get(symbol)
            .cloned()
            .ok_or_else(|| Error::UnknownSymbol(symbol.to_string()))
    }

    /// Registered symbols, sorted by name
    pub fn symbols(&self) -> Result<Vec<String>> {
        let map = self
            .inner
            .read()
            .map_err(|e| Error::LockPoisoned(e.to_string()))?;
        let mut symbols: Vec<String> = map.keys().cloned().collect();
        symbols.sort();
        Ok(symbols)
    }

    pub fn len(&self) -> usize {
        self.inner.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
