use thiserror::Error;

/// Failure of a market data fetch
///
/// Every per-endpoint variant is consumed by the rotation in
/// [`crate::api::BinanceClient`]; callers of the exchange only ever see
/// `NoEndpointReachable` once the whole list is exhausted.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("no endpoint reachable after {attempts} attempt(s): {}", failures.join("; "))]
    NoEndpointReachable {
        attempts: usize,
        failures: Vec<String>,
    },

    #[error("transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected status {status} from {url}")]
    Status { status: u16, url: String },

    #[error("malformed payload: {0}")]
    Malformed(String),

    #[error("rate limited by {0}")]
    RateLimited(String),
}

impl FeedError {
    pub fn malformed(msg: impl Into<String>) -> Self {
        FeedError::Malformed(msg.into())
    }
}
