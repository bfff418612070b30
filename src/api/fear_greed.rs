use crate::feed::FeedError;
use crate::models::FearGreedIndex;
use anyhow::{Context, Result};
use chrono::DateTime;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

pub const FEAR_GREED_API: &str = "https://api.alternative.me/fng/";

/// Client for the crypto fear & greed index
#[derive(Clone)]
pub struct FearGreedClient {
    client: Client,
    url: String,
}

#[derive(Debug, Deserialize)]
struct FearGreedResponse {
    #[serde(default)]
    data: Vec<FearGreedEntry>,
}

#[derive(Debug, Deserialize)]
struct FearGreedEntry {
    value: String,
    value_classification: String,
    timestamp: Option<String>,
}

impl FearGreedClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        Self::with_url(FEAR_GREED_API, timeout)
    }

    pub fn with_url(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }

    /// Fetch the latest index reading
    pub async fn get_index(&self) -> Result<FearGreedIndex> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .context("Fear & greed request failed")?;

        let status = response.status();
        if !status.is_success() {
            return Err(FeedError::Status {
                status: status.as_u16(),
                url: self.url.clone(),
            }
            .into());
        }

        let body: FearGreedResponse = response
            .json()
            .await
            .context("Failed to parse fear & greed response")?;

        let entry = body
            .data
            .into_iter()
            .next()
            .ok_or_else(|| FeedError::malformed("fear & greed response has no data"))?;

        let value: u8 = entry
            .value
            .trim()
            .parse()
            .map_err(|_| FeedError::malformed(format!("fear & greed value {:?}", entry.value)))?;

        let timestamp = entry
            .timestamp
            .and_then(|t| t.trim().parse::<i64>().ok())
            .and_then(|secs| DateTime::from_timestamp(secs, 0));

        tracing::debug!(value, classification = %entry.value_classification, "Fetched fear & greed index");

        Ok(FearGreedIndex {
            value,
            classification: entry.value_classification,
            timestamp,
        })
    }
}
