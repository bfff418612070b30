use crate::models::Candle;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
struct CachedSeries {
    interval: String,
    limit: u32,
    candles: Vec<Candle>,
    fetched_at: Instant,
}

/// Thread-safe in-memory cache of the last fetched candle series per symbol
///
/// An entry is served only while it is younger than `ttl` and was fetched
/// with the same interval and limit. Entries are replaced, never evicted.
#[derive(Clone)]
pub struct CandleCache {
    data: Arc<RwLock<HashMap<String, CachedSeries>>>,
    ttl: Duration,
}

impl CandleCache {
    /// Create a new cache
    ///
    /// # Arguments
    /// * `ttl` - How long a fetched series stays fresh (the fetch interval)
    pub fn new(ttl: Duration) -> Self {
        Self {
            data: Arc::new(RwLock::new(HashMap::new())),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Fresh candles for `symbol`, or `None` on a miss
    pub fn get(
        &self,
        symbol: &str,
        interval: &str,
        limit: u32,
    ) -> Result<Option<Vec<Candle>>, String> {
        self.get_at(symbol, interval, limit, Instant::now())
    }

    fn get_at(
        &self,
        symbol: &str,
        interval: &str,
        limit: u32,
        now: Instant,
    ) -> Result<Option<Vec<Candle>>, String> {
        let data = self.data.read().map_err(|e| e.to_string())?;

        Ok(data
            .get(symbol)
            .filter(|entry| entry.interval == interval && entry.limit == limit)
            .filter(|entry| now.saturating_duration_since(entry.fetched_at) < self.ttl)
            .map(|entry| entry.candles.clone()))
    }

    /// Store a freshly fetched series, replacing any previous one
    pub fn insert(
        &self,
        symbol: &str,
        interval: &str,
        limit: u32,
        candles: Vec<Candle>,
    ) -> Result<(), String> {
        self.insert_at(symbol, interval, limit, candles, Instant::now())
    }

    fn insert_at(
        &self,
        symbol: &str,
        interval: &str,
        limit: u32,
        candles: Vec<Candle>,
        fetched_at: Instant,
    ) -> Result<(), String> {
        let mut data = self.data.write().map_err(|e| e.to_string())?;

        data.insert(
            symbol.to_string(),
            CachedSeries {
                interval: interval.to_string(),
                limit,
                candles,
                fetched_at,
            },
        );

        Ok(())
    }

    /// Symbols with a cached series (fresh or stale), sorted
    pub fn symbols(&self) -> Result<Vec<String>, String> {
        let data = self.data.read().map_err(|e| e.to_string())?;
        let mut symbols: Vec<String> = data.keys().cloned().collect();
        symbols.sort();
        Ok(symbols)
    }
}
