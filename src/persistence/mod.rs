use crate::monitor::MonitorSettings;
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use serde::{Deserialize, Serialize};
use tokio::time::{timeout, Duration};

const OVERRIDES_KEY: &str = "cryptomonitor:overrides";

/// Runtime changes to the monitor settings that outlive a restart
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredOverrides {
    pub primary_symbols: Vec<String>,
    pub secondary_symbols: Vec<String>,
    pub heartbeat_interval_secs: u64,
    pub saved_at: DateTime<Utc>,
}

impl StoredOverrides {
    pub fn from_settings(settings: &MonitorSettings) -> Self {
        Self {
            primary_symbols: settings.primary_symbols.clone(),
            secondary_symbols: settings.secondary_symbols.clone(),
            heartbeat_interval_secs: settings.heartbeat_interval_secs,
            saved_at: Utc::now(),
        }
    }
}

#[async_trait]
pub trait OverrideStore: Send + Sync {
    async fn save(&self, settings: &MonitorSettings) -> Result<()>;

    async fn load(&self) -> Result<Option<StoredOverrides>>;
}

/// Redis-backed override store
///
/// The whole override set lives as one JSON value, replaced on every save.
pub struct RedisOverrideStore {
    conn: ConnectionManager,
    key: String,
}

impl RedisOverrideStore {
    /// Connect to Redis
    ///
    /// # Arguments
    /// * `redis_url` - Redis connection URL (e.g., "redis://127.0.0.1:6379")
    pub async fn new(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url)?;

        // Add 5 second timeout to connection attempt
        let conn = timeout(Duration::from_secs(5), ConnectionManager::new(client))
            .await
            .map_err(|_| "Redis connection timeout after 5 seconds")??;

        tracing::info!("Connected to Redis at {}", redis_url);

        Ok(Self {
            conn,
            key: OVERRIDES_KEY.to_string(),
        })
    }

    /// Isolate a test run from the live key
    #[cfg(test)]
    fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    #[cfg(test)]
    async fn clear(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(&self.key).await?;
        Ok(())
    }
}

#[async_trait]
impl OverrideStore for RedisOverrideStore {
    async fn save(&self, settings: &MonitorSettings) -> Result<()> {
        let value = serde_json::to_string(&StoredOverrides::from_settings(settings))?;

        let mut conn = self.conn.clone();
        conn.set::<_, _, ()>(&self.key, value).await?;

        tracing::debug!(key = %self.key, "Saved monitor overrides to Redis");
        Ok(())
    }

    async fn load(&self) -> Result<Option<StoredOverrides>> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(&self.key).await?;

        match value {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }
}
