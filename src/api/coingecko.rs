use crate::feed::FeedError;
use crate::models::{GlobalMarketData, TrendingCoin};
use anyhow::{Context, Result};
use governor::{Quota, RateLimiter};
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

pub const COINGECKO_API_BASE: &str = "https://api.coingecko.com/api/v3";
const MAX_RETRIES: u32 = 3;

// Type alias for the rate limiter to simplify signatures
type CoinGeckoRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// CoinGecko API client with client-side rate limiting
///
/// This struct is cloneable to allow sharing across async tasks.
/// All clones share the same rate limiter, so requests from every clone
/// are spaced at least `min_interval` apart.
#[derive(Clone)]
pub struct CoinGeckoClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    rate_limiter: Arc<CoinGeckoRateLimiter>,
}

/// Response from /global endpoint
#[derive(Debug, Deserialize)]
struct GlobalResponse {
    data: GlobalData,
}

#[derive(Debug, Deserialize)]
struct GlobalData {
    active_cryptocurrencies: Option<u64>,
    markets: Option<u64>,
    #[serde(default)]
    total_market_cap: HashMap<String, f64>,
    #[serde(default)]
    total_volume: HashMap<String, f64>,
    #[serde(default)]
    market_cap_percentage: HashMap<String, f64>,
    market_cap_change_percentage_24h_usd: Option<f64>,
    updated_at: Option<i64>,
}

/// Response from /search/trending endpoint
#[derive(Debug, Deserialize)]
struct TrendingResponse {
    #[serde(default)]
    coins: Vec<TrendingEntry>,
}

#[derive(Debug, Deserialize)]
struct TrendingEntry {
    item: TrendingItem,
}

#[derive(Debug, Deserialize)]
struct TrendingItem {
    id: String,
    name: String,
    symbol: String,
    market_cap_rank: Option<u32>,
    score: Option<u32>,
    price_btc: Option<f64>,
}

impl CoinGeckoClient {
    /// Create a client against the public API
    ///
    /// # Arguments
    /// * `min_interval` - Minimum spacing between any two requests
    /// * `timeout` - Per-request timeout
    pub fn new(min_interval: Duration, timeout: Duration) -> Result<Self> {
        Self::with_base_url(COINGECKO_API_BASE, min_interval, timeout)
    }

    pub fn with_base_url(
        base_url: impl Into<String>,
        min_interval: Duration,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        // One request per `min_interval`, no bursting
        let quota = Quota::with_period(min_interval)
            .context("CoinGecko request spacing must be non-zero")?;
        let rate_limiter = Arc::new(RateLimiter::direct(quota));

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: None,
            rate_limiter,
        })
    }

    /// Attach a demo API key (sent as `x_cg_demo_api_key`)
    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key.filter(|k| !k.is_empty());
        self
    }

    fn url(&self, path: &str) -> String {
        match &self.api_key {
            Some(key) => format!("{}{}?x_cg_demo_api_key={}", self.base_url, path, key),
            None => format!("{}{}", self.base_url, path),
        }
    }

    /// Make a rate-limited API request with retry logic
    async fn make_request(&self, url: &str) -> Result<reqwest::Response> {
        for attempt in 1..=MAX_RETRIES {
            // Wait for rate limiter
            self.rate_limiter.until_ready().await;

            match self.client.get(url).send().await {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        return Ok(response);
                    }

                    // Handle rate limit errors
                    if status.as_u16() == 429 {
                        if attempt == MAX_RETRIES {
                            return Err(FeedError::RateLimited("CoinGecko".to_string()).into());
                        }
                        let backoff_secs = 2u64.pow(attempt);
                        tracing::warn!(
                            "Rate limited by CoinGecko (429), backing off for {}s (attempt {}/{})",
                            backoff_secs,
                            attempt,
                            MAX_RETRIES
                        );
                        tokio::time::sleep(Duration::from_secs(backoff_secs)).await;
                        continue;
                    }

                    // Handle server errors (5xx)
                    if status.is_server_error() && attempt < MAX_RETRIES {
                        let backoff_secs = 2u64.pow(attempt);
                        tracing::warn!(
                            "Server error {} from CoinGecko, retrying in {}s (attempt {}/{})",
                            status,
                            backoff_secs,
                            attempt,
                            MAX_RETRIES
                        );
                        tokio::time::sleep(Duration::from_secs(backoff_secs)).await;
                        continue;
                    }

                    // Other errors (4xx) - don't retry. Query string dropped to keep the key out of logs
                    return Err(FeedError::Status {
                        status: status.as_u16(),
                        url: url.split('?').next().unwrap_or(url).to_string(),
                    }
                    .into());
                }
                Err(e) if attempt < MAX_RETRIES => {
                    let backoff_secs = 2u64.pow(attempt);
                    tracing::warn!(
                        "Network error: {}, retrying in {}s (attempt {}/{})",
                        e,
                        backoff_secs,
                        attempt,
                        MAX_RETRIES
                    );
                    tokio::time::sleep(Duration::from_secs(backoff_secs)).await;
                }
                Err(e) => anyhow::bail!("Network error after {} retries: {}", MAX_RETRIES, e),
            }
        }

        anyhow::bail!("Failed after {} retries", MAX_RETRIES)
    }

    /// Fetch market-wide capitalization, volume and dominance
    pub async fn get_global(&self) -> Result<GlobalMarketData> {
        let response = self.make_request(&self.url("/global")).await?;

        let global: GlobalResponse = response
            .json()
            .await
            .context("Failed to parse global market data")?;
        let data = global.data;

        tracing::debug!(
            active = ?data.active_cryptocurrencies,
            "Fetched CoinGecko global market data"
        );

        Ok(GlobalMarketData {
            active_cryptocurrencies: data.active_cryptocurrencies,
            markets: data.markets,
            total_market_cap_usd: data.total_market_cap.get("usd").copied(),
            total_volume_24h_usd: data.total_volume.get("usd").copied(),
            market_cap_change_percentage_24h_usd: data.market_cap_change_percentage_24h_usd,
            btc_dominance: data.market_cap_percentage.get("btc").copied(),
            updated_at: data.updated_at,
        })
    }

    /// Fetch the trending coin list
    pub async fn get_trending(&self) -> Result<Vec<TrendingCoin>> {
        let response = self.make_request(&self.url("/search/trending")).await?;

        let trending: TrendingResponse = response
            .json()
            .await
            .context("Failed to parse trending coins")?;

        tracing::debug!("Fetched {} trending coins", trending.coins.len());

        Ok(trending
            .coins
            .into_iter()
            .map(|entry| TrendingCoin {
                id: entry.item.id,
                name: entry.item.name,
                symbol: entry.item.symbol.to_uppercase(),
                market_cap_rank: entry.item.market_cap_rank,
                score: entry.item.score,
                price_btc: entry.item.price_btc,
            })
            .collect())
    }
}
