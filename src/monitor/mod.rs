// Monitoring control loop and its live configuration

pub mod config;
pub mod scheduler;

pub use config::{
    normalize_symbol, ConfigError, MonitorConfig, MonitorSettings, MAX_HEARTBEAT_SECS,
    MIN_HEARTBEAT_SECS,
};
pub use scheduler::{
    decide_trigger, AnalysisRequest, HeartbeatHandler, HeartbeatScheduler, PassReport,
    StopHandle, SymbolPhase, TriggerReason, EMPTY_SYMBOLS_WAIT,
};
