//! Layered application configuration
//!
//! Built-in defaults, then an optional TOML file, then `CRYPTOMONITOR__*`
//! environment variables (`CRYPTOMONITOR__MONITOR__HEARTBEAT_INTERVAL_SECS=900`).
//! Secrets are read separately from the process environment.

use crate::api::DEFAULT_ENDPOINTS;
use crate::collaborators::{AnalystPrompts, PaperPosition};
use crate::conditions::Thresholds;
use crate::feed::FeedConfig;
use crate::indicators::IndicatorConfig;
use crate::monitor::MonitorSettings;
use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "config/monitor.toml";
const ENV_PREFIX: &str = "CRYPTOMONITOR";
const ENV_SEPARATOR: &str = "__";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MonitorSection {
    pub primary_symbols: Vec<String>,
    pub secondary_symbols: Vec<String>,
    pub heartbeat_interval_secs: u64,
    pub fetch_interval_secs: u64,
}

impl Default for MonitorSection {
    fn default() -> Self {
        Self {
            primary_symbols: vec!["BTCUSDT".to_string(), "ETHUSDT".to_string()],
            secondary_symbols: vec!["SOLUSDT".to_string()],
            heartbeat_interval_secs: 1800,
            fetch_interval_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FeedSection {
    pub endpoints: Vec<String>,
    pub interval: String,
    /// Enough for the 200-period MA to fill
    pub history_limit: u32,
    pub request_timeout_secs: u64,
    pub coingecko_min_interval_secs: u64,
}

impl Default for FeedSection {
    fn default() -> Self {
        Self {
            endpoints: DEFAULT_ENDPOINTS.iter().map(|s| s.to_string()).collect(),
            interval: "15m".to_string(),
            history_limit: 250,
            request_timeout_secs: 10,
            coingecko_min_interval_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LlmSection {
    pub model: String,
    pub base_url: Option<String>,
    pub system_prompt: String,
    pub analyst_prompts: AnalystPrompts,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            model: crate::api::llm::DEFAULT_MODEL.to_string(),
            base_url: None,
            system_prompt: crate::decision::DEFAULT_SYSTEM_PROMPT.to_string(),
            analyst_prompts: AnalystPrompts::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AccountSection {
    pub starting_balance: f64,
    pub positions: Vec<PaperPosition>,
}

impl Default for AccountSection {
    fn default() -> Self {
        Self {
            starting_balance: 10_000.0,
            positions: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub monitor: MonitorSection,
    pub feed: FeedSection,
    pub indicators: IndicatorConfig,
    pub thresholds: Thresholds,
    pub llm: LlmSection,
    pub account: AccountSection,
}

impl AppConfig {
    /// Load defaults, the TOML file and the environment
    ///
    /// An explicit `path` must exist; the default path is optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with(path, Environment::with_prefix(ENV_PREFIX))
    }

    fn load_with(path: Option<&Path>, env: Environment) -> Result<Self> {
        let (file, required) = match path {
            Some(path) => (path, true),
            None => (Path::new(DEFAULT_CONFIG_PATH), false),
        };

        let defaults = Config::try_from(&AppConfig::default())
            .context("Failed to serialize default configuration")?;

        let env = env
            .prefix_separator(ENV_SEPARATOR)
            .separator(ENV_SEPARATOR)
            .try_parsing(true)
            .list_separator(",")
            .with_list_parse_key("monitor.primary_symbols")
            .with_list_parse_key("monitor.secondary_symbols")
            .with_list_parse_key("feed.endpoints");

        let config = Config::builder()
            .add_source(defaults)
            .add_source(File::from(file).required(required))
            .add_source(env)
            .build()
            .with_context(|| format!("Failed to build configuration from {}", file.display()))?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    pub fn monitor_settings(&self) -> MonitorSettings {
        MonitorSettings {
            primary_symbols: self.monitor.primary_symbols.clone(),
            secondary_symbols: self.monitor.secondary_symbols.clone(),
            heartbeat_interval_secs: self.monitor.heartbeat_interval_secs,
            fetch_interval_secs: self.monitor.fetch_interval_secs,
        }
    }

    /// Candle series are cached for one fetch interval
    pub fn feed_config(&self) -> FeedConfig {
        FeedConfig {
            interval: self.feed.interval.clone(),
            history_limit: self.feed.history_limit,
            cache_ttl: Duration::from_secs(self.monitor.fetch_interval_secs),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.feed.request_timeout_secs)
    }

    pub fn coingecko_min_interval(&self) -> Duration {
        Duration::from_secs(self.feed.coingecko_min_interval_secs)
    }
}

/// Credentials and connection strings from the process environment
#[derive(Debug, Clone, Default)]
pub struct Secrets {
    pub openai_api_key: Option<String>,
    pub telegram_token: Option<String>,
    pub telegram_chat_id: Option<String>,
    pub database_url: Option<String>,
    pub redis_url: Option<String>,
    pub coingecko_api_key: Option<String>,
}

impl Secrets {
    pub fn from_env() -> Self {
        fn var(name: &str) -> Option<String> {
            std::env::var(name).ok().filter(|v| !v.trim().is_empty())
        }

        Self {
            openai_api_key: var("OPENAI_API_KEY"),
            telegram_token: var("TELEGRAM_TOKEN"),
            telegram_chat_id: var("TELEGRAM_CHAT_ID"),
            database_url: var("DATABASE_URL"),
            redis_url: var("REDIS_URL"),
            coingecko_api_key: var("COINGECKO_API_KEY"),
        }
    }
}
