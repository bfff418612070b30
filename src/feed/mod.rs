// Market data feed
// Cached candle series from the exchange plus market-wide reference data

pub mod cache;
pub mod error;

pub use cache::CandleCache;
pub use error::FeedError;

use crate::api::{BinanceClient, CoinGeckoClient, FearGreedClient};
use crate::models::{Candle, FearGreedIndex, GlobalMarketData, Ticker, TrendingCoin};
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

/// What the feed currently knows about itself, for status reports
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FeedStatus {
    pub cached_symbols: Vec<String>,
    pub preferred_endpoint: Option<String>,
}

/// Market data the scheduler and the dispatcher consume
#[async_trait]
pub trait CandleSource: Send + Sync {
    /// Candle history for `symbol`, oldest first
    async fn candles(&self, symbol: &str) -> Result<Vec<Candle>, FeedError>;

    /// Latest traded price for `symbol`
    async fn ticker(&self, symbol: &str) -> Result<Ticker, FeedError>;

    fn feed_status(&self) -> FeedStatus {
        FeedStatus::default()
    }
}

/// Shape of the series fetched for each monitored symbol
#[derive(Debug, Clone)]
pub struct FeedConfig {
    pub interval: String,
    pub history_limit: u32,
    pub cache_ttl: Duration,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            interval: "15m".to_string(),
            history_limit: 250,
            cache_ttl: Duration::from_secs(300),
        }
    }
}

/// Resilient market data layer
///
/// Candle series are cached per symbol for `cache_ttl`; tickers and the
/// secondary sources are always fetched live.
#[derive(Clone)]
pub struct DataFeed {
    exchange: BinanceClient,
    coingecko: CoinGeckoClient,
    fear_greed: FearGreedClient,
    cache: CandleCache,
    config: FeedConfig,
}

impl DataFeed {
    pub fn new(
        exchange: BinanceClient,
        coingecko: CoinGeckoClient,
        fear_greed: FearGreedClient,
        config: FeedConfig,
    ) -> Self {
        Self {
            exchange,
            coingecko,
            fear_greed,
            cache: CandleCache::new(config.cache_ttl),
            config,
        }
    }

    pub fn config(&self) -> &FeedConfig {
        &self.config
    }

    /// Seed the preferred exchange endpoint
    pub async fn select_endpoint(&self) -> Option<String> {
        self.exchange.select_endpoint().await
    }

    pub fn preferred_endpoint(&self) -> String {
        self.exchange.preferred_endpoint().to_string()
    }

    /// Symbols with a cached candle series
    pub fn cached_symbols(&self) -> Vec<String> {
        self.cache.symbols().unwrap_or_else(|e| {
            tracing::warn!("Candle cache unavailable: {}", e);
            Vec::new()
        })
    }

    /// Candle series, served from cache while younger than the fetch interval
    pub async fn fetch_candles(
        &self,
        symbol: &str,
        interval: &str,
        limit: u32,
    ) -> Result<Vec<Candle>, FeedError> {
        match self.cache.get(symbol, interval, limit) {
            Ok(Some(candles)) => {
                tracing::debug!(symbol = %symbol, count = candles.len(), "Candle cache hit");
                return Ok(candles);
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(symbol = %symbol, "Candle cache unavailable: {}", e),
        }

        let candles = self.exchange.klines(symbol, interval, limit).await?;

        if let Err(e) = self.cache.insert(symbol, interval, limit, candles.clone()) {
            tracing::warn!(symbol = %symbol, "Failed to cache candles: {}", e);
        }

        tracing::debug!(symbol = %symbol, count = candles.len(), "Fetched candles");
        Ok(candles)
    }

    pub async fn fetch_ticker(&self, symbol: &str) -> Result<Ticker, FeedError> {
        self.exchange.ticker_price(symbol).await
    }

    pub async fn global_market(&self) -> anyhow::Result<GlobalMarketData> {
        self.coingecko.get_global().await
    }

    pub async fn trending(&self) -> anyhow::Result<Vec<TrendingCoin>> {
        self.coingecko.get_trending().await
    }

    pub async fn fear_greed(&self) -> anyhow::Result<FearGreedIndex> {
        self.fear_greed.get_index().await
    }
}

#[async_trait]
impl CandleSource for DataFeed {
    async fn candles(&self, symbol: &str) -> Result<Vec<Candle>, FeedError> {
        self.fetch_candles(symbol, &self.config.interval, self.config.history_limit)
            .await
    }

    async fn ticker(&self, symbol: &str) -> Result<Ticker, FeedError> {
        self.fetch_ticker(symbol).await
    }

    fn feed_status(&self) -> FeedStatus {
        FeedStatus {
            cached_symbols: self.cached_symbols(),
            preferred_endpoint: Some(self.preferred_endpoint()),
        }
    }
}
