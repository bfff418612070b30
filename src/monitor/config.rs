use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Notify;

pub const MIN_HEARTBEAT_SECS: u64 = 60;
pub const MAX_HEARTBEAT_SECS: u64 = 3600;
const QUOTE_ASSET: &str = "USDT";

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConfigError {
    #[error(
        "heartbeat interval {value}s is outside [{min}, {max}] seconds",
        min = MIN_HEARTBEAT_SECS,
        max = MAX_HEARTBEAT_SECS
    )]
    IntervalOutOfRange { value: f64 },

    #[error("invalid symbol {0:?}: expected an alphanumeric pair ending in {quote}", quote = QUOTE_ASSET)]
    InvalidSymbol(String),

    #[error("symbol {0} is listed more than once")]
    DuplicateSymbol(String),

    #[error("symbol {symbol} is not monitored (monitored: {})", monitored.join(", "))]
    SymbolNotMonitored {
        symbol: String,
        monitored: Vec<String>,
    },
}

/// Immutable view of the live-mutable monitor settings
///
/// Readers hold an `Arc` to one version; setters swap in a whole new one.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonitorSettings {
    pub primary_symbols: Vec<String>,
    pub secondary_symbols: Vec<String>,
    pub heartbeat_interval_secs: u64,
    pub fetch_interval_secs: u64,
}

impl MonitorSettings {
    /// Primary then secondary symbols, in configured order
    pub fn all_symbols(&self) -> Vec<String> {
        self.primary_symbols
            .iter()
            .chain(self.secondary_symbols.iter())
            .cloned()
            .collect()
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn fetch_interval(&self) -> Duration {
        Duration::from_secs(self.fetch_interval_secs)
    }
}

struct Inner {
    settings: RwLock<Arc<MonitorSettings>>,
    last_analysis: Mutex<HashMap<String, DateTime<Utc>>>,
    manual_triggers: Mutex<BTreeSet<String>>,
    manual_wake: Notify,
}

/// Shared, synchronized monitor configuration
///
/// Cheap to clone; all clones see the same state. Symbol lists and the
/// heartbeat interval change only through the validated setters.
#[derive(Clone)]
pub struct MonitorConfig {
    inner: Arc<Inner>,
}

impl MonitorConfig {
    /// Validate `settings` with the same rules the setters apply
    pub fn new(settings: MonitorSettings) -> Result<Self, ConfigError> {
        let (primary, secondary) =
            validate_symbols(&settings.primary_symbols, &settings.secondary_symbols)?;
        let heartbeat = validate_interval(settings.heartbeat_interval_secs as f64)?;

        let settings = MonitorSettings {
            primary_symbols: primary,
            secondary_symbols: secondary,
            heartbeat_interval_secs: heartbeat,
            fetch_interval_secs: settings.fetch_interval_secs.max(1),
        };

        Ok(Self {
            inner: Arc::new(Inner {
                settings: RwLock::new(Arc::new(settings)),
                last_analysis: Mutex::new(HashMap::new()),
                manual_triggers: Mutex::new(BTreeSet::new()),
                manual_wake: Notify::new(),
            }),
        })
    }

    /// Current settings version
    pub fn snapshot(&self) -> Arc<MonitorSettings> {
        self.inner
            .settings
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn update(&self, f: impl FnOnce(&MonitorSettings) -> MonitorSettings) -> Arc<MonitorSettings> {
        let mut guard = self
            .inner
            .settings
            .write()
            .unwrap_or_else(|e| e.into_inner());
        let next = Arc::new(f(&guard));
        *guard = next.clone();
        next
    }

    /// Replace both symbol lists; on error nothing changes
    pub fn set_symbols(
        &self,
        primary: &[String],
        secondary: &[String],
    ) -> Result<Arc<MonitorSettings>, ConfigError> {
        let (primary, secondary) = validate_symbols(primary, secondary)?;

        let next = self.update(|current| MonitorSettings {
            primary_symbols: primary,
            secondary_symbols: secondary,
            ..current.clone()
        });

        tracing::info!(
            primary = ?next.primary_symbols,
            secondary = ?next.secondary_symbols,
            "Monitoring symbols updated"
        );
        Ok(next)
    }

    /// Set the heartbeat interval in seconds
    ///
    /// Values outside [60, 3600] are rejected; accepted values are
    /// truncated to whole seconds.
    pub fn set_heartbeat_interval(&self, seconds: f64) -> Result<u64, ConfigError> {
        let secs = validate_interval(seconds)?;

        self.update(|current| MonitorSettings {
            heartbeat_interval_secs: secs,
            ..current.clone()
        });

        tracing::info!(interval_secs = secs, "Heartbeat interval updated");
        Ok(secs)
    }

    pub fn last_analysis(&self, symbol: &str) -> Option<DateTime<Utc>> {
        self.inner
            .last_analysis
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(symbol)
            .copied()
    }

    pub fn record_analysis(&self, symbol: &str, at: DateTime<Utc>) {
        self.inner
            .last_analysis
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(symbol.to_string(), at);
    }

    pub fn last_analysis_times(&self) -> HashMap<String, DateTime<Utc>> {
        self.inner
            .last_analysis
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Resolve `raw` to a monitored symbol (`"btc"` -> `"BTCUSDT"`)
    pub fn resolve_monitored(&self, raw: &str) -> Result<String, ConfigError> {
        let symbol = normalize_symbol(raw);
        let monitored = self.snapshot().all_symbols();

        if monitored.contains(&symbol) {
            Ok(symbol)
        } else {
            Err(ConfigError::SymbolNotMonitored { symbol, monitored })
        }
    }

    /// Mark a monitored symbol due on the next pass
    pub fn request_manual_trigger(&self, raw: &str) -> Result<String, ConfigError> {
        let symbol = self.resolve_monitored(raw)?;

        self.inner
            .manual_triggers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(symbol.clone());
        self.inner.manual_wake.notify_one();

        tracing::info!(symbol = %symbol, "Manual analysis requested");
        Ok(symbol)
    }

    /// Resolves once a manual trigger has been requested
    ///
    /// A request made while nobody is waiting is kept for the next waiter.
    pub async fn manual_trigger_requested(&self) {
        self.inner.manual_wake.notified().await;
    }

    /// Consume a pending manual trigger
    pub fn take_manual_trigger(&self, symbol: &str) -> bool {
        self.inner
            .manual_triggers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(symbol)
    }

    pub fn pending_manual_triggers(&self) -> Vec<String> {
        self.inner
            .manual_triggers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .cloned()
            .collect()
    }
}

/// Uppercase, trim, and append the quote asset when missing
pub fn normalize_symbol(raw: &str) -> String {
    let symbol = raw.trim().to_uppercase();
    if symbol.ends_with(QUOTE_ASSET) {
        symbol
    } else {
        format!("{}{}", symbol, QUOTE_ASSET)
    }
}

fn validate_symbol(raw: &str) -> Result<String, ConfigError> {
    let symbol = raw.trim().to_uppercase();

    let valid = symbol.len() > QUOTE_ASSET.len()
        && symbol.ends_with(QUOTE_ASSET)
        && symbol.chars().all(|c| c.is_ascii_alphanumeric());

    if valid {
        Ok(symbol)
    } else {
        Err(ConfigError::InvalidSymbol(raw.to_string()))
    }
}

fn validate_symbols(
    primary: &[String],
    secondary: &[String],
) -> Result<(Vec<String>, Vec<String>), ConfigError> {
    let primary = primary
        .iter()
        .map(|s| validate_symbol(s))
        .collect::<Result<Vec<_>, _>>()?;
    let secondary = secondary
        .iter()
        .map(|s| validate_symbol(s))
        .collect::<Result<Vec<_>, _>>()?;

    let mut seen = HashSet::new();
    for symbol in primary.iter().chain(secondary.iter()) {
        if !seen.insert(symbol.as_str()) {
            return Err(ConfigError::DuplicateSymbol(symbol.clone()));
        }
    }

    Ok((primary, secondary))
}

fn validate_interval(seconds: f64) -> Result<u64, ConfigError> {
    if !seconds.is_finite()
        || seconds < MIN_HEARTBEAT_SECS as f64
        || seconds > MAX_HEARTBEAT_SECS as f64
    {
        return Err(ConfigError::IntervalOutOfRange { value: seconds });
    }

    Ok(seconds.trunc() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn symbols(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn test_config() -> MonitorConfig {
        MonitorConfig::new(MonitorSettings {
            primary_symbols: symbols(&["BTCUSDT", "ETHUSDT"]),
            secondary_symbols: symbols(&["SOLUSDT"]),
            heartbeat_interval_secs: 1800,
            fetch_interval_secs: 300,
        })
        .unwrap()
    }

    #[test]
    fn test_new_validates() {
        let bad = MonitorConfig::new(MonitorSettings {
            primary_symbols: symbols(&["BTC-USD"]),
            secondary_symbols: vec![],
            heartbeat_interval_secs: 1800,
            fetch_interval_secs: 300,
        });
        assert!(matches!(bad, Err(ConfigError::InvalidSymbol(_))));

        let bad = MonitorConfig::new(MonitorSettings {
            primary_symbols: symbols(&["BTCUSDT"]),
            secondary_symbols: vec![],
            heartbeat_interval_secs: 30,
            fetch_interval_secs: 300,
        });
        assert!(matches!(bad, Err(ConfigError::IntervalOutOfRange { .. })));
    }

    #[test]
    fn test_all_symbols_order() {
        let config = test_config();
        assert_eq!(
            config.snapshot().all_symbols(),
            symbols(&["BTCUSDT", "ETHUSDT", "SOLUSDT"])
        );
    }

    #[test]
    fn test_set_heartbeat_interval_bounds() {
        let config = test_config();

        assert_eq!(config.set_heartbeat_interval(60.0), Ok(60));
        assert_eq!(config.set_heartbeat_interval(3600.0), Ok(3600));
        assert_eq!(config.set_heartbeat_interval(120.9), Ok(120));

        for bad in [30.0, 59.99, 3600.5, f64::NAN, f64::INFINITY, -100.0] {
            assert!(config.set_heartbeat_interval(bad).is_err(), "{} accepted", bad);
        }

        // Rejections leave the last accepted value
        assert_eq!(config.snapshot().heartbeat_interval_secs, 120);
    }

    #[test]
    fn test_set_symbols_normalizes_case() {
        let config = test_config();
        let next = config
            .set_symbols(&symbols(&["btcusdt", " ADAUSDT "]), &[])
            .unwrap();

        assert_eq!(next.primary_symbols, symbols(&["BTCUSDT", "ADAUSDT"]));
        assert!(next.secondary_symbols.is_empty());
        assert_eq!(next.heartbeat_interval_secs, 1800);
    }

    #[test]
    fn test_set_symbols_rejections_leave_config_unchanged() {
        let config = test_config();
        let before = config.snapshot();

        assert!(matches!(
            config.set_symbols(&symbols(&["BTCUSDT", "DOGE"]), &[]),
            Err(ConfigError::InvalidSymbol(s)) if s == "DOGE"
        ));
        assert!(matches!(
            config.set_symbols(&symbols(&["BTCUSDT"]), &symbols(&["BTCUSDT"])),
            Err(ConfigError::DuplicateSymbol(s)) if s == "BTCUSDT"
        ));
        assert!(config.set_symbols(&symbols(&["USDT"]), &[]).is_err());

        assert_eq!(config.snapshot(), before);
    }

    #[test]
    fn test_empty_symbol_lists_allowed() {
        let config = test_config();
        let next = config.set_symbols(&[], &[]).unwrap();
        assert!(next.all_symbols().is_empty());
    }

    #[test]
    fn test_normalize_symbol() {
        assert_eq!(normalize_symbol("BTC"), "BTCUSDT");
        assert_eq!(normalize_symbol(" eth "), "ETHUSDT");
        assert_eq!(normalize_symbol("solusdt"), "SOLUSDT");
    }

    #[test]
    fn test_manual_trigger() {
        let config = test_config();

        assert_eq!(config.request_manual_trigger("btc"), Ok("BTCUSDT".to_string()));
        assert_eq!(config.pending_manual_triggers(), symbols(&["BTCUSDT"]));

        assert!(config.take_manual_trigger("BTCUSDT"));
        assert!(!config.take_manual_trigger("BTCUSDT"));
    }

    #[test]
    fn test_manual_trigger_unmonitored_symbol() {
        let config = test_config();

        match config.request_manual_trigger("DOGE") {
            Err(ConfigError::SymbolNotMonitored { symbol, monitored }) => {
                assert_eq!(symbol, "DOGEUSDT");
                assert_eq!(monitored.len(), 3);
            }
            other => panic!("unexpected: {:?}", other),
        }
        assert!(config.pending_manual_triggers().is_empty());
    }

    #[tokio::test]
    async fn test_manual_trigger_wakes_waiter() {
        let config = test_config();

        // Rejected requests do not wake anyone
        let _ = config.request_manual_trigger("DOGE");
        assert!(
            tokio::time::timeout(Duration::from_millis(20), config.manual_trigger_requested())
                .await
                .is_err()
        );

        config.request_manual_trigger("eth").unwrap();
        tokio::time::timeout(Duration::from_secs(1), config.manual_trigger_requested())
            .await
            .unwrap();
    }

    #[test]
    fn test_last_analysis_tracking() {
        let config = test_config();
        assert!(config.last_analysis("BTCUSDT").is_none());

        let now = Utc::now();
        config.record_analysis("BTCUSDT", now);

        assert_eq!(config.last_analysis("BTCUSDT"), Some(now));
        assert_eq!(config.last_analysis_times().len(), 1);
    }

    #[test]
    fn test_concurrent_interval_updates_never_tear() {
        let config = test_config();
        config.set_heartbeat_interval(1800.0).unwrap();

        let writers: Vec<_> = (0..4)
            .map(|i| {
                let config = config.clone();
                thread::spawn(move || {
                    for _ in 0..500 {
                        let value = if i % 2 == 0 { 120.0 } else { 1800.0 };
                        config.set_heartbeat_interval(value).unwrap();
                    }
                })
            })
            .collect();

        let reader = {
            let config = config.clone();
            thread::spawn(move || {
                for _ in 0..2000 {
                    let settings = config.snapshot();
                    assert!(matches!(settings.heartbeat_interval_secs, 120 | 1800));
                    assert_eq!(settings.primary_symbols.len(), 2);
                }
            })
        };

        for writer in writers {
            writer.join().unwrap();
        }
        reader.join().unwrap();
    }

    #[test]
    fn test_concurrent_symbol_swaps_are_atomic() {
        let config = test_config();
        let a = symbols(&["BTCUSDT", "ETHUSDT"]);
        let b = symbols(&["ADAUSDT", "XRPUSDT", "DOTUSDT"]);

        let writer = {
            let (config, a, b) = (config.clone(), a.clone(), b.clone());
            thread::spawn(move || {
                for i in 0..500 {
                    let primary = if i % 2 == 0 { &a } else { &b };
                    config.set_symbols(primary, &[]).unwrap();
                }
            })
        };

        for _ in 0..2000 {
            let primary = config.snapshot().primary_symbols.clone();
            assert!(primary == a || primary == b, "torn symbol list: {:?}", primary);
        }

        writer.join().unwrap();
    }
}
