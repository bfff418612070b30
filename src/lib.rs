// Core modules
pub mod api;
pub mod collaborators;
pub mod conditions;
pub mod db;
pub mod decision;
pub mod dispatch;
pub mod feed;
pub mod indicators;
pub mod models;
pub mod monitor;
pub mod persistence;
pub mod settings;

// Re-export commonly used types
pub use models::*;
pub use dispatch::{CapabilityCall, DecisionDispatcher, Transcript};
pub use feed::{CandleSource, DataFeed};
pub use monitor::{HeartbeatScheduler, MonitorConfig};

// Error handling
pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;
