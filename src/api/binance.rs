use crate::feed::FeedError;
use crate::models::{Candle, Ticker};
use anyhow::{Context, Result};
use chrono::Utc;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Interchangeable public REST hosts, in default preference order
pub const DEFAULT_ENDPOINTS: &[&str] = &[
    "https://api.binance.com",
    "https://api.binance.us",
    "https://api1.binance.com",
    "https://api2.binance.com",
];

/// Exchange REST client that fails over across equivalent endpoints
///
/// Every call starts at the last endpoint that answered successfully and
/// walks the list in order. Clones share the preferred index.
#[derive(Clone)]
pub struct BinanceClient {
    client: Client,
    endpoints: Arc<Vec<String>>,
    preferred: Arc<AtomicUsize>,
}

#[derive(Debug, Deserialize)]
struct TickerResponse {
    symbol: String,
    price: String,
}

impl BinanceClient {
    /// Create a client over `endpoints` with a per-request timeout
    pub fn new(endpoints: Vec<String>, timeout: Duration) -> Result<Self> {
        if endpoints.is_empty() {
            anyhow::bail!("At least one exchange endpoint is required");
        }

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        let endpoints = endpoints
            .into_iter()
            .map(|e| e.trim_end_matches('/').to_string())
            .collect();

        Ok(Self {
            client,
            endpoints: Arc::new(endpoints),
            preferred: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn endpoints(&self) -> &[String] {
        &self.endpoints
    }

    /// Base URL every call currently tries first
    pub fn preferred_endpoint(&self) -> &str {
        &self.endpoints[self.preferred.load(Ordering::Acquire) % self.endpoints.len()]
    }

    /// Ping every endpoint once and prefer the first healthy one
    ///
    /// Returns the chosen endpoint, or `None` when nothing answered (the
    /// preference is then left unchanged and normal rotation takes over).
    pub async fn select_endpoint(&self) -> Option<String> {
        let mut chosen = None;

        for (index, base) in self.endpoints.iter().enumerate() {
            match self.fetch_json(base, "/api/v3/ping", &[]).await {
                Ok(_) => {
                    tracing::info!(endpoint = %base, "Exchange endpoint healthy");
                    if chosen.is_none() {
                        self.preferred.store(index, Ordering::Release);
                        chosen = Some(base.clone());
                    }
                }
                Err(e) => {
                    tracing::warn!(endpoint = %base, error = %e, "Exchange endpoint failed health check");
                }
            }
        }

        match &chosen {
            Some(base) => tracing::info!(endpoint = %base, "Preferred exchange endpoint selected"),
            None => tracing::error!("No exchange endpoint answered the startup health check"),
        }

        chosen
    }

    /// Fetch OHLCV candles, oldest first
    pub async fn klines(
        &self,
        symbol: &str,
        interval: &str,
        limit: u32,
    ) -> std::result::Result<Vec<Candle>, FeedError> {
        let query = [
            ("symbol", symbol.to_string()),
            ("interval", interval.to_string()),
            ("limit", limit.to_string()),
        ];

        self.request("/api/v3/klines", &query, parse_klines).await
    }

    /// Fetch the latest traded price
    pub async fn ticker_price(&self, symbol: &str) -> std::result::Result<Ticker, FeedError> {
        self.request("/api/v3/ticker/price", &[("symbol", symbol.to_string())], parse_ticker)
            .await
    }

    /// Run `path` against each endpoint in turn, starting at the preferred one
    ///
    /// A non-2xx status, transport error, timeout, or payload that `parse`
    /// rejects all count as an endpoint failure.
    async fn request<T>(
        &self,
        path: &str,
        query: &[(&str, String)],
        parse: impl Fn(Value) -> std::result::Result<T, FeedError>,
    ) -> std::result::Result<T, FeedError> {
        let count = self.endpoints.len();
        let start = self.preferred.load(Ordering::Acquire) % count;
        let mut failures = Vec::with_capacity(count);

        for attempt in 0..count {
            let index = (start + attempt) % count;
            let base = &self.endpoints[index];

            match self.fetch_json(base, path, query).await.and_then(&parse) {
                Ok(value) => {
                    if index != start {
                        tracing::info!(endpoint = %base, "Switched preferred exchange endpoint");
                        self.preferred.store(index, Ordering::Release);
                    }
                    return Ok(value);
                }
                Err(e) => {
                    tracing::warn!(
                        endpoint = %base,
                        attempt = attempt + 1,
                        error = %e,
                        "Exchange endpoint failed, rotating"
                    );
                    failures.push(format!("{}: {}", base, e));
                }
            }
        }

        Err(FeedError::NoEndpointReachable {
            attempts: count,
            failures,
        })
    }

    async fn fetch_json(
        &self,
        base: &str,
        path: &str,
        query: &[(&str, String)],
    ) -> std::result::Result<Value, FeedError> {
        let url = format!("{}{}", base, path);
        tracing::debug!(url = %url, ?query, "Exchange request");

        let response = self.client.get(&url).query(query).send().await?;
        let status = response.status();

        if status.as_u16() == 429 {
            return Err(FeedError::RateLimited(base.to_string()));
        }

        if !status.is_success() {
            return Err(FeedError::Status {
                status: status.as_u16(),
                url: response.url().to_string(),
            });
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| FeedError::malformed(format!("invalid JSON: {}", e)))
    }
}

/// Parse the kline array format:
/// `[openTime, "open", "high", "low", "close", "volume", closeTime, "quoteVolume", trades, ...]`
fn parse_klines(payload: Value) -> std::result::Result<Vec<Candle>, FeedError> {
    let rows = payload
        .as_array()
        .ok_or_else(|| FeedError::malformed("klines payload is not an array"))?;

    let mut candles = rows
        .iter()
        .map(parse_kline_row)
        .collect::<std::result::Result<Vec<_>, _>>()?;

    candles.sort_by_key(|c| c.open_time);
    Ok(candles)
}

fn parse_kline_row(row: &Value) -> std::result::Result<Candle, FeedError> {
    let fields = row
        .as_array()
        .filter(|fields| fields.len() >= 9)
        .ok_or_else(|| FeedError::malformed(format!("kline row has wrong shape: {}", row)))?;

    Ok(Candle {
        open_time: integer_field(fields, 0)?,
        open: decimal_field(fields, 1)?,
        high: decimal_field(fields, 2)?,
        low: decimal_field(fields, 3)?,
        close: decimal_field(fields, 4)?,
        volume: decimal_field(fields, 5)?,
        close_time: integer_field(fields, 6)?,
        quote_volume: decimal_field(fields, 7)?,
        trade_count: integer_field(fields, 8)?
            .try_into()
            .map_err(|_| FeedError::malformed("negative trade count"))?,
    })
}

fn integer_field(fields: &[Value], index: usize) -> std::result::Result<i64, FeedError> {
    fields[index]
        .as_i64()
        .ok_or_else(|| FeedError::malformed(format!("field {} is not an integer", index)))
}

fn decimal_field(fields: &[Value], index: usize) -> std::result::Result<Decimal, FeedError> {
    match &fields[index] {
        Value::String(s) => parse_decimal(s),
        Value::Number(n) => parse_decimal(&n.to_string()),
        other => Err(FeedError::malformed(format!(
            "field {} is not numeric: {}",
            index, other
        ))),
    }
}

fn parse_decimal(s: &str) -> std::result::Result<Decimal, FeedError> {
    Decimal::from_str(s)
        .or_else(|_| Decimal::from_scientific(s))
        .map_err(|_| FeedError::malformed(format!("not a decimal: {:?}", s)))
}

fn parse_ticker(payload: Value) -> std::result::Result<Ticker, FeedError> {
    let ticker: TickerResponse = serde_json::from_value(payload)
        .map_err(|e| FeedError::malformed(format!("ticker: {}", e)))?;

    Ok(Ticker {
        price: parse_decimal(&ticker.price)?,
        symbol: ticker.symbol,
        fetched_at: Utc::now(),
    })
}
