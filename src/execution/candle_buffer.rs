use crate::error::{Error, Result};
use crate::models::{Candle, PriceHistoryEntry};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

/// Per-symbol data, guarded by its own lock
#[derive(Debug, Default)]
struct SymbolSeries {
    candles: VecDeque<Candle>,
    history: VecDeque<PriceHistoryEntry>,
    latest_seen: Option<DateTime<Utc>>,
    live_price: Option<Decimal>,
}

#[derive(Debug, Default)]
struct SymbolIndex {
    /// Discovery order
    order: Vec<String>,
    series: HashMap<String, Arc<Mutex<SymbolSeries>>>,
}

/// Owned copy of a symbol's candles taken under its lock
#[derive(Debug, Clone, PartialEq)]
pub struct CandleSnapshot {
    pub symbol: String,
    pub candles: Vec<Candle>,
}

impl CandleSnapshot {
    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn closes(&self) -> Vec<Decimal> {
        self.candles.iter().map(|c| c.close).collect()
    }

    /// Highs aligned with `closes()`, or `None` if any bar has no high
    pub fn highs(&self) -> Option<Vec<Decimal>> {
        self.candles.iter().map(|c| c.high).collect()
    }

    /// Lows aligned with `closes()`, or `None` if any bar has no low
    pub fn lows(&self) -> Option<Vec<Decimal>> {
        self.candles.iter().map(|c| c.low).collect()
    }

    /// Bars missing a high or a low
    pub fn bars_without_range(&self) -> usize {
        self.candles
            .iter()
            .filter(|c| c.high.is_none() || c.low.is_none())
            .count()
    }

    pub fn last_close(&self) -> Option<Decimal> {
        self.candles.last().map(|c| c.close)
    }
}

/// Thread-safe store of closed bars and recent prices per symbol
///
/// Ingestion appends, the scheduler snapshots. Each symbol has its own mutex
/// so a slow snapshot of one symbol never blocks appends to another.
#[derive(Clone)]
pub struct CandleStore {
    symbols: Arc<RwLock<SymbolIndex>>,
    capacity: usize,
    monitor_window_secs: Arc<AtomicI64>,
}

impl CandleStore {
    /// Create a new store
    ///
    /// # Arguments
    /// * `capacity` - Maximum number of candles kept per symbol
    /// * `monitor_window` - Age after which price-history entries are dropped
    pub fn new(capacity: usize, monitor_window: Duration) -> Self {
        Self {
            symbols: Arc::new(RwLock::new(SymbolIndex::default())),
            capacity,
            monitor_window_secs: Arc::new(AtomicI64::new(monitor_window.num_seconds())),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn monitor_window(&self) -> Duration {
        Duration::seconds(self.monitor_window_secs.load(Ordering::Relaxed))
    }

    /// Change the history window; applied on the next append
    pub fn set_monitor_window(&self, window: Duration) {
        self.monitor_window_secs
            .store(window.num_seconds(), Ordering::Relaxed);
    }

    /// Register symbols up front so they keep discovery order
    pub fn register_symbols<S: AsRef<str>>(&self, symbols: &[S]) -> Result<()> {
        let mut index = self
            .symbols
            .write()
            .map_err(|e| Error::LockPoisoned(e.to_string()))?;
        for symbol in symbols {
            Self::ensure_entry(&mut index, symbol.as_ref());
        }
        Ok(())
    }

    fn ensure_entry(index: &mut SymbolIndex, symbol: &str) -> Arc<Mutex<SymbolSeries>> {
        if let Some(series) = index.series.get(symbol) {
            return series.clone();
        }
        let series = Arc::new(Mutex::new(SymbolSeries::default()));
        index.order.push(symbol.to_string());
        index.series.insert(symbol.to_string(), series.clone());
        series
    }

    fn series(&self, symbol: &str) -> Result<Option<Arc<Mutex<SymbolSeries>>>> {
        let index = self
            .symbols
            .read()
            .map_err(|e| Error::LockPoisoned(e.to_string()))?;
        Ok(index.series.get(symbol).cloned())
    }

    fn series_or_insert(&self, symbol: &str) -> Result<Arc<Mutex<SymbolSeries>>> {
        if let Some(series) = self.series(symbol)? {
            return Ok(series);
        }
        let mut index = self
            .symbols
            .write()
            .map_err(|e| Error::LockPoisoned(e.to_string()))?;
        Ok(Self::ensure_entry(&mut index, symbol))
    }

    /// Append a closed bar
    ///
    /// Evicts the oldest bar beyond capacity and prunes price history older
    /// than the monitoring window, measured from the newest timestamp seen.
    /// Timestamps are taken as given: no dedup, no reordering.
    pub fn append_closed_bar(&self, symbol: &str, candle: Candle) -> Result<()> {
        let series = self.series_or_insert(symbol)?;
        let mut series = series
            .lock()
            .map_err(|e| Error::LockPoisoned(e.to_string()))?;

        let window = self.monitor_window();
        let timestamp = candle.timestamp;

        series.history.push_back(PriceHistoryEntry {
            timestamp,
            price: candle.close,
        });
        series.candles.push_back(candle);

        while series.candles.len() > self.capacity {
            series.candles.pop_front();
        }

        let latest = match series.latest_seen {
            Some(seen) if seen >= timestamp => seen,
            _ => timestamp,
        };
        series.latest_seen = Some(latest);

        let cutoff = latest - window;
        series.history.retain(|entry| entry.timestamp >= cutoff);

        Ok(())
    }

    /// Seed a symbol from historical bars
    pub fn bootstrap(&self, symbol: &str, candles: Vec<Candle>) -> Result<usize> {
        let count = candles.len();
        for candle in candles {
            self.append_closed_bar(symbol, candle)?;
        }
        Ok(count)
    }

    /// Record the latest traded price from an unfinished bar
    pub fn update_live_price(&self, symbol: &str, price: Decimal) -> Result<()> {
        let series = self.series_or_insert(symbol)?;
        let mut series = series
            .lock()
            .map_err(|e| Error::LockPoisoned(e.to_string()))?;
        series.live_price = Some(price);
        Ok(())
    }

    /// Latest traded price, falling back to the last close
    pub fn live_price(&self, symbol: &str) -> Result<Option<Decimal>> {
        let Some(series) = self.series(symbol)? else {
            return Ok(None);
        };
        let series = series
            .lock()
            .map_err(|e| Error::LockPoisoned(e.to_string()))?;
        Ok(series
            .live_price
            .or_else(|| series.candles.back().map(|c| c.close)))
    }

    pub fn snapshot(&self, symbol: &str) -> Result<CandleSnapshot> {
        let series = self
            .series(symbol)?
            .ok_or_else(|| Error::UnknownSymbol(symbol.to_string()))?;
        let series = series
            .lock()
            .map_err(|e| Error::LockPoisoned(e.to_string()))?;

        Ok(CandleSnapshot {
            symbol: symbol.to_string(),
            candles: series.candles.iter().cloned().collect(),
        })
    }

    /// Price history entries currently inside the monitoring window
    pub fn price_history(&self, symbol: &str) -> Result<Vec<PriceHistoryEntry>> {
        let Some(series) = self.series(symbol)? else {
            return Ok(Vec::new());
        };
        let series = series
            .lock()
            .map_err(|e| Error::LockPoisoned(e.to_string()))?;
        Ok(series.history.iter().copied().collect())
    }

    /// Percent change from the oldest to the newest history entry
    pub fn price_change_pct(&self, symbol: &str) -> Result<Option<Decimal>> {
        let history = self.price_history(symbol)?;
        let (Some(oldest), Some(newest)) = (history.first(), history.last()) else {
            return Ok(None);
        };
        if history.len() < 2 || oldest.price.is_zero() {
            return Ok(None);
        }
        Ok(Some(
            (newest.price - oldest.price) / oldest.price * Decimal::ONE_HUNDRED,
        ))
    }

    pub fn candle_count(&self, symbol: &str) -> Result<usize> {
        let Some(series) = self.series(symbol)? else {
            return Ok(0);
        };
        let series = series
            .lock()
            .map_err(|e| Error::LockPoisoned(e.to_string()))?;
        Ok(series.candles.len())
    }

    /// All symbols in discovery order
    pub fn symbols(&self) -> Result<Vec<String>> {
        let index = self
            .symbols
            .read()
            .map_err(|e| Error::LockPoisoned(e.to_string()))?;
        Ok(index.order.clone())
    }

    /// Symbols holding at least `min_candles` bars, in discovery order
    pub fn warmed_up_symbols(&self, min_candles: usize) -> Result<Vec<String>> {
        let mut ready = Vec::new();
        for symbol in self.symbols()? {
            if self.candle_count(&symbol)? >= min_candles {
                ready.push(symbol);
            }
        }
        Ok(ready)
    }
}
