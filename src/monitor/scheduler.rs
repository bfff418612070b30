use super::config::MonitorConfig;
use crate::conditions::{ConditionEvaluator, TriggerCondition};
use crate::db::MarketStore;
use crate::feed::CandleSource;
use crate::indicators::{IndicatorEngine, IndicatorSnapshot};
use crate::models::{Candle, MarketDataRecord};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

/// Wait before re-reading the configuration when no symbols are monitored
pub const EMPTY_SYMBOLS_WAIT: Duration = Duration::from_secs(30);

/// Why a symbol became due this pass
#[derive(Debug, Clone, PartialEq)]
pub enum TriggerReason {
    Manual,
    SpecialConditions(Vec<TriggerCondition>),
    HeartbeatElapsed { elapsed_secs: Option<i64> },
}

impl fmt::Display for TriggerReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerReason::Manual => write!(f, "manual trigger"),
            TriggerReason::SpecialConditions(conditions) => {
                let labels: Vec<String> = conditions.iter().map(|c| c.to_string()).collect();
                write!(f, "special conditions: {}", labels.join(", "))
            }
            TriggerReason::HeartbeatElapsed {
                elapsed_secs: Some(secs),
            } => write!(f, "heartbeat interval elapsed ({}s since last analysis)", secs),
            TriggerReason::HeartbeatElapsed { elapsed_secs: None } => {
                write!(f, "first analysis")
            }
        }
    }
}

/// Per-symbol scheduling state
#[derive(Debug, Clone, PartialEq)]
pub enum SymbolPhase {
    Idle,
    Due(TriggerReason),
    InAnalysis,
}

/// Everything the handler needs to analyse one due symbol
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub symbol: String,
    pub reason: TriggerReason,
    pub snapshot: IndicatorSnapshot,
    pub conditions: Vec<TriggerCondition>,
}

/// Receives due symbols from the scheduler
#[async_trait]
pub trait HeartbeatHandler: Send + Sync {
    async fn on_due(&self, request: AnalysisRequest) -> crate::Result<()>;
}

/// Outcome of one pass over the configured symbols
#[derive(Debug, Default, Clone, PartialEq)]
pub struct PassReport {
    pub evaluated: Vec<String>,
    pub dispatched: Vec<String>,
    pub failed_dispatches: Vec<String>,
    pub skipped: Vec<(String, String)>,
}

/// Decide whether a symbol is due
///
/// Manual requests win, then special conditions, then the elapsed-time
/// rule. A symbol never analysed before is always due.
pub fn decide_trigger(
    conditions: &[TriggerCondition],
    manual: bool,
    last_analysis: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    interval: Duration,
) -> Option<TriggerReason> {
    if manual {
        return Some(TriggerReason::Manual);
    }

    if !conditions.is_empty() {
        return Some(TriggerReason::SpecialConditions(conditions.to_vec()));
    }

    match last_analysis {
        None => Some(TriggerReason::HeartbeatElapsed { elapsed_secs: None }),
        Some(last) => {
            let elapsed = now.signed_duration_since(last);
            let due = elapsed
                .to_std()
                .map(|elapsed| elapsed >= interval)
                .unwrap_or(false); // clock went backwards

            due.then(|| TriggerReason::HeartbeatElapsed {
                elapsed_secs: Some(elapsed.num_seconds()),
            })
        }
    }
}

/// Cooperative stop flag with an interruptible sleep
#[derive(Clone, Default)]
pub struct StopHandle {
    inner: Arc<StopInner>,
}

#[derive(Default)]
struct StopInner {
    stopped: AtomicBool,
    notify: Notify,
}

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.inner.stopped.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::SeqCst)
    }

    /// Sleep for `duration` or until stopped; returns whether stopped
    pub async fn sleep(&self, duration: Duration) -> bool {
        let notified = self.inner.notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        if self.is_stopped() {
            return true;
        }

        tokio::select! {
            _ = tokio::time::sleep(duration) => {}
            _ = &mut notified => {}
        }

        self.is_stopped()
    }
}

/// Sequential monitoring loop
///
/// Each pass fetches, computes and evaluates every configured symbol in
/// order, dispatching a due symbol before moving to the next one.
pub struct HeartbeatScheduler {
    source: Arc<dyn CandleSource>,
    handler: Arc<dyn HeartbeatHandler>,
    config: MonitorConfig,
    engine: IndicatorEngine,
    evaluator: ConditionEvaluator,
    store: Option<Arc<dyn MarketStore>>,
    phases: Mutex<HashMap<String, SymbolPhase>>,
    stop: StopHandle,
}

impl HeartbeatScheduler {
    pub fn new(
        source: Arc<dyn CandleSource>,
        handler: Arc<dyn HeartbeatHandler>,
        config: MonitorConfig,
        engine: IndicatorEngine,
        evaluator: ConditionEvaluator,
    ) -> Self {
        Self {
            source,
            handler,
            config,
            engine,
            evaluator,
            store: None,
            phases: Mutex::new(HashMap::new()),
            stop: StopHandle::new(),
        }
    }

    /// Persist one market data row per evaluated symbol
    pub fn with_store(mut self, store: Arc<dyn MarketStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Share an externally owned stop flag
    pub fn with_stop_handle(mut self, stop: StopHandle) -> Self {
        self.stop = stop;
        self
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn phase(&self, symbol: &str) -> SymbolPhase {
        self.phases
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(symbol)
            .cloned()
            .unwrap_or(SymbolPhase::Idle)
    }

    fn set_phase(&self, symbol: &str, phase: SymbolPhase) {
        self.phases
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(symbol.to_string(), phase);
    }

    /// Run passes until stopped
    pub async fn run(&self) {
        tracing::info!("Heartbeat scheduler started");

        while !self.stop.is_stopped() {
            let settings = self.config.snapshot();

            if settings.all_symbols().is_empty() {
                tracing::warn!(
                    "No symbols configured, re-checking in {}s",
                    EMPTY_SYMBOLS_WAIT.as_secs()
                );
                self.stop.sleep(EMPTY_SYMBOLS_WAIT).await;
                continue;
            }

            let report = self.run_pass().await;
            tracing::info!(
                evaluated = report.evaluated.len(),
                dispatched = report.dispatched.len(),
                skipped = report.skipped.len(),
                "Heartbeat pass complete"
            );

            let sleep_for = self.config.snapshot().fetch_interval();
            tokio::select! {
                stopped = self.stop.sleep(sleep_for) => {
                    if stopped {
                        break;
                    }
                }
                _ = self.config.manual_trigger_requested() => {
                    tracing::info!("Manual trigger requested, starting pass early");
                }
            }
        }

        tracing::info!("Heartbeat scheduler stopped");
    }

    pub async fn run_pass(&self) -> PassReport {
        self.run_pass_at(Utc::now()).await
    }

    /// One pass over the current symbol list, evaluated as of `now`
    pub async fn run_pass_at(&self, now: DateTime<Utc>) -> PassReport {
        let settings = self.config.snapshot();
        let interval = settings.heartbeat_interval();
        let mut report = PassReport::default();

        tracing::info!(
            symbols = ?settings.all_symbols(),
            interval_secs = settings.heartbeat_interval_secs,
            "Starting heartbeat pass"
        );

        for symbol in settings.all_symbols() {
            if self.stop.is_stopped() {
                tracing::info!("Stop requested, ending pass early");
                break;
            }

            let candles = match self.source.candles(&symbol).await {
                Ok(candles) => candles,
                Err(e) => {
                    tracing::error!(symbol = %symbol, reason = %e, "Market data unavailable, skipping symbol this pass");
                    report.skipped.push((symbol.clone(), e.to_string()));
                    continue;
                }
            };

            let snapshot = self.engine.compute(&candles);
            let conditions = self.evaluator.evaluate(&symbol, &snapshot);
            self.persist(&symbol, &candles, &snapshot).await;
            report.evaluated.push(symbol.clone());

            let manual = self.config.take_manual_trigger(&symbol);
            let last = self.config.last_analysis(&symbol);

            let Some(reason) = decide_trigger(&conditions, manual, last, now, interval) else {
                tracing::debug!(symbol = %symbol, "Not due");
                self.set_phase(&symbol, SymbolPhase::Idle);
                continue;
            };

            tracing::info!(symbol = %symbol, reason = %reason, "Symbol due for analysis");
            self.set_phase(&symbol, SymbolPhase::Due(reason.clone()));

            self.set_phase(&symbol, SymbolPhase::InAnalysis);
            let request = AnalysisRequest {
                symbol: symbol.clone(),
                reason,
                snapshot,
                conditions,
            };

            match self.handler.on_due(request).await {
                Ok(()) => report.dispatched.push(symbol.clone()),
                Err(e) => {
                    tracing::error!(symbol = %symbol, reason = %e, "Analysis dispatch failed");
                    report.failed_dispatches.push(symbol.clone());
                }
            }

            // Reset the timer even on failure
            self.config.record_analysis(&symbol, now);
            self.set_phase(&symbol, SymbolPhase::Idle);
        }

        report
    }

    async fn persist(&self, symbol: &str, candles: &[Candle], snapshot: &IndicatorSnapshot) {
        let (Some(store), Some(last)) = (&self.store, candles.last()) else {
            return;
        };

        let record = MarketDataRecord {
            symbol: symbol.to_string(),
            timestamp: last.open_time,
            price: last.close,
            rsi: snapshot.rsi,
            macd: snapshot.macd,
            volume: last.volume,
            ma_short: snapshot.ma_short,
            ma_medium: snapshot.ma_medium,
            ma_long: snapshot.ma_long,
        };

        if let Err(e) = store.save_market_data(&record).await {
            tracing::warn!(symbol = %symbol, "Failed to persist market data: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conditions::{ConditionKind, Thresholds};
    use crate::feed::FeedError;
    use crate::indicators::engine::tests::candles_from_closes;
    use crate::indicators::IndicatorConfig;
    use crate::models::{Ticker, TriggerEvent};
    use crate::monitor::config::MonitorSettings;
    use chrono::Duration as ChronoDuration;
    use rust_decimal::Decimal;

    /// Serves fixed closes per symbol; unknown symbols fail
    struct FixedSource {
        closes: HashMap<String, Vec<f64>>,
    }

    #[async_trait]
    impl CandleSource for FixedSource {
        async fn candles(&self, symbol: &str) -> Result<Vec<Candle>, FeedError> {
            self.closes
                .get(symbol)
                .map(|closes| candles_from_closes(closes))
                .ok_or_else(|| FeedError::NoEndpointReachable {
                    attempts: 1,
                    failures: vec!["mock: down".to_string()],
                })
        }

        async fn ticker(&self, symbol: &str) -> Result<Ticker, FeedError> {
            Err(FeedError::malformed(format!("no ticker for {}", symbol)))
        }
    }

    #[derive(Default)]
    struct RecordingHandler {
        requests: Mutex<Vec<AnalysisRequest>>,
        fail: bool,
    }

    #[async_trait]
    impl HeartbeatHandler for RecordingHandler {
        async fn on_due(&self, request: AnalysisRequest) -> crate::Result<()> {
            self.requests.lock().unwrap().push(request);
            if self.fail {
                return Err("analyst unavailable".into());
            }
            Ok(())
        }
    }

    #[derive(Default)]
    struct MemoryStore {
        records: Mutex<Vec<MarketDataRecord>>,
    }

    #[async_trait]
    impl MarketStore for MemoryStore {
        async fn save_market_data(&self, record: &MarketDataRecord) -> crate::Result<()> {
            self.records.lock().unwrap().push(record.clone());
            Ok(())
        }

        async fn record_event(&self, _event: &TriggerEvent) -> crate::Result<()> {
            Ok(())
        }
    }

    fn config(symbols: &[&str]) -> MonitorConfig {
        MonitorConfig::new(MonitorSettings {
            primary_symbols: symbols.iter().map(|s| s.to_string()).collect(),
            secondary_symbols: vec![],
            heartbeat_interval_secs: 600,
            fetch_interval_secs: 300,
        })
        .unwrap()
    }

    /// Short flat history: every indicator undefined, no conditions
    fn quiet_source(symbols: &[&str]) -> Arc<FixedSource> {
        Arc::new(FixedSource {
            closes: symbols
                .iter()
                .map(|s| (s.to_string(), vec![100.0; 5]))
                .collect(),
        })
    }

    fn scheduler(
        source: Arc<dyn CandleSource>,
        handler: Arc<dyn HeartbeatHandler>,
        config: MonitorConfig,
    ) -> HeartbeatScheduler {
        HeartbeatScheduler::new(
            source,
            handler,
            config,
            IndicatorEngine::new(IndicatorConfig::default()),
            ConditionEvaluator::new(Thresholds::default()),
        )
    }

    #[test]
    fn test_decide_trigger_elapsed() {
        let now = Utc::now();
        let interval = Duration::from_secs(600);

        assert!(decide_trigger(&[], false, Some(now - ChronoDuration::seconds(10)), now, interval).is_none());
        assert_eq!(
            decide_trigger(&[], false, Some(now - ChronoDuration::seconds(600)), now, interval),
            Some(TriggerReason::HeartbeatElapsed { elapsed_secs: Some(600) })
        );
        assert_eq!(
            decide_trigger(&[], false, None, now, interval),
            Some(TriggerReason::HeartbeatElapsed { elapsed_secs: None })
        );
    }

    #[test]
    fn test_decide_trigger_priorities() {
        let now = Utc::now();
        let recent = Some(now - ChronoDuration::seconds(1));
        let interval = Duration::from_secs(600);
        let conditions = vec![TriggerCondition {
            kind: ConditionKind::MacdGoldenCross,
            value: None,
            threshold: None,
        }];

        assert_eq!(
            decide_trigger(&conditions, true, recent, now, interval),
            Some(TriggerReason::Manual)
        );
        assert_eq!(
            decide_trigger(&conditions, false, recent, now, interval),
            Some(TriggerReason::SpecialConditions(conditions.clone()))
        );
    }

    #[test]
    fn test_decide_trigger_clock_skew_not_due() {
        let now = Utc::now();
        let future = Some(now + ChronoDuration::seconds(30));
        assert!(decide_trigger(&[], false, future, now, Duration::from_secs(60)).is_none());
    }

    #[tokio::test]
    async fn test_recent_symbol_stays_idle() {
        let handler = Arc::new(RecordingHandler::default());
        let config = config(&["BTCUSDT"]);
        let now = Utc::now();
        config.record_analysis("BTCUSDT", now - ChronoDuration::seconds(10));

        let scheduler = scheduler(quiet_source(&["BTCUSDT"]), handler.clone(), config);
        let report = scheduler.run_pass_at(now).await;

        assert_eq!(report.evaluated, vec!["BTCUSDT".to_string()]);
        assert!(report.dispatched.is_empty());
        assert!(handler.requests.lock().unwrap().is_empty());
        assert_eq!(scheduler.phase("BTCUSDT"), SymbolPhase::Idle);
    }

    #[tokio::test]
    async fn test_elapsed_interval_dispatches_once() {
        let handler = Arc::new(RecordingHandler::default());
        let config = config(&["BTCUSDT"]);
        let now = Utc::now();
        config.record_analysis("BTCUSDT", now - ChronoDuration::seconds(600));

        let scheduler = scheduler(quiet_source(&["BTCUSDT"]), handler.clone(), config.clone());

        let report = scheduler.run_pass_at(now).await;
        assert_eq!(report.dispatched, vec!["BTCUSDT".to_string()]);
        assert_eq!(config.last_analysis("BTCUSDT"), Some(now));

        // Same instant again: timer was reset, nothing due
        let report = scheduler.run_pass_at(now + ChronoDuration::seconds(5)).await;
        assert!(report.dispatched.is_empty());
        assert_eq!(handler.requests.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_special_condition_bypasses_interval() {
        // Steady decline: RSI 0, extreme oversold
        let closes: Vec<f64> = (0..20).map(|i| 200.0 - i as f64).collect();
        let source = Arc::new(FixedSource {
            closes: [("ETHUSDT".to_string(), closes)].into_iter().collect(),
        });
        let handler = Arc::new(RecordingHandler::default());
        let config = config(&["ETHUSDT"]);
        let now = Utc::now();
        config.record_analysis("ETHUSDT", now - ChronoDuration::seconds(1));

        let scheduler = scheduler(source, handler.clone(), config);
        scheduler.run_pass_at(now).await;

        let requests = handler.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert!(matches!(requests[0].reason, TriggerReason::SpecialConditions(_)));
        assert_eq!(requests[0].conditions[0].kind, ConditionKind::RsiExtremeOversold);
    }

    #[tokio::test]
    async fn test_manual_trigger_consumed() {
        let handler = Arc::new(RecordingHandler::default());
        let config = config(&["BTCUSDT"]);
        let now = Utc::now();
        config.record_analysis("BTCUSDT", now);
        config.request_manual_trigger("BTC").unwrap();

        let scheduler = scheduler(quiet_source(&["BTCUSDT"]), handler.clone(), config.clone());
        let report = scheduler.run_pass_at(now).await;

        assert_eq!(report.dispatched, vec!["BTCUSDT".to_string()]);
        assert_eq!(handler.requests.lock().unwrap()[0].reason, TriggerReason::Manual);
        assert!(config.pending_manual_triggers().is_empty());
    }

    #[tokio::test]
    async fn test_feed_failure_skips_only_that_symbol() {
        let handler = Arc::new(RecordingHandler::default());
        let config = config(&["BTCUSDT", "ETHUSDT", "SOLUSDT"]);

        // ETHUSDT has no data and fails
        let scheduler = scheduler(
            quiet_source(&["BTCUSDT", "SOLUSDT"]),
            handler.clone(),
            config.clone(),
        );
        let report = scheduler.run_pass_at(Utc::now()).await;

        assert_eq!(report.evaluated, vec!["BTCUSDT".to_string(), "SOLUSDT".to_string()]);
        assert_eq!(report.dispatched, vec!["BTCUSDT".to_string(), "SOLUSDT".to_string()]);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].0, "ETHUSDT");
        assert!(config.last_analysis("ETHUSDT").is_none());
    }

    #[tokio::test]
    async fn test_failed_dispatch_still_resets_timer() {
        let handler = Arc::new(RecordingHandler {
            fail: true,
            ..RecordingHandler::default()
        });
        let config = config(&["BTCUSDT"]);
        let now = Utc::now();

        let scheduler = scheduler(quiet_source(&["BTCUSDT"]), handler, config.clone());
        let report = scheduler.run_pass_at(now).await;

        assert_eq!(report.failed_dispatches, vec!["BTCUSDT".to_string()]);
        assert_eq!(config.last_analysis("BTCUSDT"), Some(now));
        assert_eq!(scheduler.phase("BTCUSDT"), SymbolPhase::Idle);
    }

    #[tokio::test]
    async fn test_symbol_change_applies_next_pass() {
        let handler = Arc::new(RecordingHandler::default());
        let config = config(&["BTCUSDT"]);
        let scheduler = scheduler(
            quiet_source(&["BTCUSDT", "ETHUSDT"]),
            handler,
            config.clone(),
        );

        let first = scheduler.run_pass_at(Utc::now()).await;
        assert_eq!(first.evaluated, vec!["BTCUSDT".to_string()]);

        config
            .set_symbols(&["ETHUSDT".to_string()], &[])
            .unwrap();

        let second = scheduler.run_pass_at(Utc::now()).await;
        assert_eq!(second.evaluated, vec!["ETHUSDT".to_string()]);
    }

    #[tokio::test]
    async fn test_persists_one_record_per_symbol() {
        let store = Arc::new(MemoryStore::default());
        let scheduler = scheduler(
            quiet_source(&["BTCUSDT", "ETHUSDT"]),
            Arc::new(RecordingHandler::default()),
            config(&["BTCUSDT", "ETHUSDT"]),
        )
        .with_store(store.clone());

        scheduler.run_pass_at(Utc::now()).await;

        let records = store.records.lock().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].symbol, "BTCUSDT");
        assert!(records[0].rsi.is_none());
        assert_eq!(records[0].price, Decimal::from(100));
    }

    #[tokio::test]
    async fn test_stopped_scheduler_does_nothing() {
        let handler = Arc::new(RecordingHandler::default());
        let scheduler = scheduler(quiet_source(&["BTCUSDT"]), handler.clone(), config(&["BTCUSDT"]));

        scheduler.stop_handle().stop();
        scheduler.run().await;
        let report = scheduler.run_pass_at(Utc::now()).await;

        assert!(report.evaluated.is_empty());
        assert!(handler.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_stop_interrupts_sleep() {
        let stop = StopHandle::new();
        let waiter = {
            let stop = stop.clone();
            tokio::spawn(async move { stop.sleep(Duration::from_secs(3600)).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        stop.stop();

        let stopped = tokio::time::timeout(Duration::from_secs(5), waiter)
            .await
            .unwrap()
            .unwrap();
        assert!(stopped);
    }

    /// Let spawned tasks run without moving the paused clock
    async fn settle() {
        for _ in 0..50 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_trigger_wakes_sleeping_scheduler() {
        let handler = Arc::new(RecordingHandler::default());
        let config = config(&["BTCUSDT"]);
        let scheduler = Arc::new(scheduler(quiet_source(&["BTCUSDT"]), handler.clone(), config.clone()));
        let stop = scheduler.stop_handle();

        let task = {
            let scheduler = scheduler.clone();
            tokio::spawn(async move { scheduler.run().await })
        };

        // First pass dispatches, then the loop sleeps for the 300s fetch interval
        settle().await;
        assert_eq!(handler.requests.lock().unwrap().len(), 1);

        config.request_manual_trigger("BTC").unwrap();
        tokio::time::advance(Duration::from_secs(60)).await;
        settle().await;

        {
            let requests = handler.requests.lock().unwrap();
            assert_eq!(requests.len(), 2);
            assert_eq!(requests[1].reason, TriggerReason::Manual);
        }

        stop.stop();
        task.await.unwrap();
    }
}
