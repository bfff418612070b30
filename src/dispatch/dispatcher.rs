use super::call::{CapabilityCall, RawInvocation};
use super::directive::{self, Line};
use super::error::DispatchError;
use super::transcript::{Transcript, TranscriptEntry};
use crate::collaborators::{Analyst, Briefing, Notifier, SymbolBriefing, TradingAccount};
use crate::db::MarketStore;
use crate::feed::CandleSource;
use crate::models::{AnalysisKind, AnalysisRecord, EventStatus, TriggerEvent};
use crate::monitor::{normalize_symbol, MonitorConfig, MonitorSettings, StopHandle, MAX_HEARTBEAT_SECS, MIN_HEARTBEAT_SECS};
use crate::persistence::OverrideStore;
use rust_decimal::prelude::ToPrimitive;
use chrono::Utc;
use serde_json::{json, Map, Value};
use std::future::Future;
use std::sync::Arc;

/// Trigger events shown in system status
const RECENT_EVENTS: usize = 5;

/// Characters of a report kept as its stored summary
const SUMMARY_CHARS: usize = 200;

/// Executes capability calls against the monitor and its collaborators
///
/// Calls run one at a time in the order given; every failure becomes a
/// value in the result, never a panic or an early return.
pub struct DecisionDispatcher {
    analyst: Arc<dyn Analyst>,
    account: Arc<dyn TradingAccount>,
    notifier: Arc<dyn Notifier>,
    config: MonitorConfig,
    source: Arc<dyn CandleSource>,
    stop: Option<StopHandle>,
    overrides: Option<Arc<dyn OverrideStore>>,
    store: Option<Arc<dyn MarketStore>>,
}

impl DecisionDispatcher {
    pub fn new(
        analyst: Arc<dyn Analyst>,
        account: Arc<dyn TradingAccount>,
        notifier: Arc<dyn Notifier>,
        config: MonitorConfig,
        source: Arc<dyn CandleSource>,
    ) -> Self {
        Self {
            analyst,
            account,
            notifier,
            config,
            source,
            stop: None,
            overrides: None,
            store: None,
        }
    }

    /// Report the scheduler's running state in system status
    pub fn with_stop_handle(mut self, stop: StopHandle) -> Self {
        self.stop = Some(stop);
        self
    }

    /// Persist successful settings changes
    pub fn with_override_store(mut self, store: Arc<dyn OverrideStore>) -> Self {
        self.overrides = Some(store);
        self
    }

    /// Append one event per invocation and keep analyst reports
    pub fn with_store(mut self, store: Arc<dyn MarketStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Run one validated call and log it
    pub async fn dispatch(&self, call: &CapabilityCall) -> Result<String, DispatchError> {
        let capability = call.name();
        tracing::info!(capability, "Dispatching capability");

        let result = self.execute(call).await;

        let (status, detail) = match &result {
            Ok(output) => (EventStatus::Ok, output.clone()),
            Err(e) => {
                tracing::warn!(capability, reason = %e, "Capability failed");
                (EventStatus::Error, e.to_string())
            }
        };
        self.record_event(capability, call.symbol().map(normalize_symbol), status, detail)
            .await;

        result
    }

    /// Bind and run one invocation, rendered as a transcript entry
    pub async fn dispatch_raw(
        &self,
        invocation: &Result<RawInvocation, DispatchError>,
    ) -> TranscriptEntry {
        let raw = match invocation {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(reason = %e, "Rejected directive");
                return TranscriptEntry::Failed {
                    capability: None,
                    error: e.clone(),
                };
            }
        };

        let call = match CapabilityCall::bind(raw) {
            Ok(call) => call,
            Err(e) => {
                tracing::warn!(capability = %raw.name, reason = %e, "Rejected directive");
                return TranscriptEntry::Failed {
                    capability: Some(raw.name.clone()),
                    error: e,
                };
            }
        };

        match self.dispatch(&call).await {
            Ok(result) => TranscriptEntry::Called {
                capability: call.name().to_string(),
                result,
            },
            Err(error) => TranscriptEntry::Failed {
                capability: Some(call.name().to_string()),
                error,
            },
        }
    }

    /// Run structured invocations in order
    pub async fn dispatch_calls(
        &self,
        invocations: &[Result<RawInvocation, DispatchError>],
    ) -> Transcript {
        let mut transcript = Transcript::default();
        for invocation in invocations {
            transcript.push(self.dispatch_raw(invocation).await);
        }
        transcript
    }

    /// Run every directive in `text`, interleaved with its plain lines
    pub async fn dispatch_text(&self, text: &str) -> Transcript {
        let mut transcript = Transcript::default();

        for line in directive::parse_text(text) {
            let entry = match line {
                Line::Text(text) => TranscriptEntry::Text(text),
                Line::Directive(invocation) => self.dispatch_raw(&invocation).await,
            };
            transcript.push(entry);
        }

        transcript
    }

    async fn execute(&self, call: &CapabilityCall) -> Result<String, DispatchError> {
        let name = call.name();

        match call {
            CapabilityCall::TechnicalAnalysis { symbol } => {
                let symbol = normalize_symbol(symbol);
                self.analysis(AnalysisKind::Technical, Some(symbol.as_str()), self.analyst.technical(&symbol))
                    .await
            }

            CapabilityCall::FundamentalAnalysis { symbol } => {
                let symbol = normalize_symbol(symbol);
                self.analysis(AnalysisKind::Fundamental, Some(symbol.as_str()), self.analyst.fundamental(&symbol))
                    .await
            }

            CapabilityCall::MarketSentimentAnalysis => {
                self.analysis(AnalysisKind::Sentiment, None, self.analyst.sentiment())
                    .await
            }

            CapabilityCall::MacroAnalysis => {
                self.analysis(AnalysisKind::Macro, None, self.analyst.macro_outlook())
                    .await
            }

            CapabilityCall::ComprehensiveAnalysis { question, symbols } => {
                self.comprehensive(question, symbols.as_deref()).await
            }

            CapabilityCall::GetAccountStatus => self
                .account
                .account_status()
                .await
                .map(|v| v.to_string())
                .map_err(|e| DispatchError::handler(name, e)),

            CapabilityCall::GetCurrentPositions => self
                .account
                .positions()
                .await
                .map(|v| v.to_string())
                .map_err(|e| DispatchError::handler(name, e)),

            CapabilityCall::ManualTriggerAnalysis { symbol } => {
                let symbol = self
                    .config
                    .request_manual_trigger(symbol)
                    .map_err(|e| DispatchError::rejected(name, e))?;
                Ok(format!("{} will be analysed on the next heartbeat pass", symbol))
            }

            CapabilityCall::SetMonitoringSymbols { primary, secondary } => {
                let next = self
                    .config
                    .set_symbols(primary, secondary)
                    .map_err(|e| DispatchError::rejected(name, e))?;

                self.persist_overrides(&next).await;
                Ok(symbols_json(&next).to_string())
            }

            CapabilityCall::GetMonitoringSymbols => Ok(symbols_json(&self.config.snapshot()).to_string()),

            CapabilityCall::SetHeartbeatInterval { interval_seconds } => {
                let secs = self
                    .config
                    .set_heartbeat_interval(*interval_seconds)
                    .map_err(|e| DispatchError::rejected(name, e))?;

                self.persist_overrides(&self.config.snapshot()).await;
                Ok(format!("Heartbeat interval set to {}s", secs))
            }

            CapabilityCall::GetHeartbeatSettings => {
                Ok(heartbeat_json(&self.config.snapshot()).to_string())
            }

            CapabilityCall::SendNotification { message } => {
                self.notifier
                    .notify(message)
                    .await
                    .map_err(|e| DispatchError::handler(name, e))?;
                Ok("Notification sent".to_string())
            }

            CapabilityCall::GetMarketData { symbols } => self.market_data(symbols.as_deref()).await,

            CapabilityCall::GetSystemStatus => Ok(self.system_status().await.to_string()),
        }
    }

    /// Run one analyst report, reusing today's stored report for slow-moving kinds
    async fn analysis<F>(
        &self,
        kind: AnalysisKind,
        symbol: Option<&str>,
        run: F,
    ) -> Result<String, DispatchError>
    where
        F: Future<Output = crate::Result<String>> + Send,
    {
        if kind.reusable_same_day() {
            if let Some(record) = self.stored_analysis(kind, symbol).await {
                if record.is_same_day(Utc::now()) {
                    tracing::debug!(kind = kind.as_str(), ?symbol, "Reusing today's analysis");
                    return Ok(record.content);
                }
            }
        }

        let content = run
            .await
            .map_err(|e| DispatchError::handler(kind.capability(), e))?;

        let summary: String = content.lines().next().unwrap_or_default().chars().take(SUMMARY_CHARS).collect();
        self.save_analysis(AnalysisRecord::new(
            kind,
            symbol.map(str::to_string),
            content.clone(),
            summary,
        ))
        .await;

        Ok(content)
    }

    /// Gather every report for `symbols` and have the analyst answer `question`
    ///
    /// A report that fails is passed on as unavailable; the call fails only
    /// when no report could be produced.
    async fn comprehensive(
        &self,
        question: &str,
        symbols: Option<&[String]>,
    ) -> Result<String, DispatchError> {
        let name = AnalysisKind::Comprehensive.capability();

        let symbols: Vec<String> = match symbols {
            Some(symbols) if !symbols.is_empty() => symbols.iter().map(|s| normalize_symbol(s)).collect(),
            _ => self.config.snapshot().primary_symbols.clone(),
        };
        if symbols.is_empty() {
            return Err(DispatchError::rejected(name, "no symbols to analyse"));
        }

        let mut failures = 0;

        let macro_outlook = section(
            self.analysis(AnalysisKind::Macro, None, self.analyst.macro_outlook()).await,
            &mut failures,
        );
        let sentiment = section(
            self.analysis(AnalysisKind::Sentiment, None, self.analyst.sentiment()).await,
            &mut failures,
        );

        let mut entries = Vec::with_capacity(symbols.len());
        for symbol in &symbols {
            let technical = section(
                self.analysis(AnalysisKind::Technical, Some(symbol.as_str()), self.analyst.technical(symbol))
                    .await,
                &mut failures,
            );
            let fundamental = section(
                self.analysis(AnalysisKind::Fundamental, Some(symbol.as_str()), self.analyst.fundamental(symbol))
                    .await,
                &mut failures,
            );
            entries.push(SymbolBriefing {
                symbol: symbol.clone(),
                technical,
                fundamental,
            });
        }

        if failures == 2 + 2 * symbols.len() {
            return Err(DispatchError::handler(name, "no analysis available"));
        }

        let briefing = Briefing {
            macro_outlook,
            sentiment,
            symbols: entries,
        };
        let answer = self
            .analyst
            .comprehensive(question, &briefing)
            .await
            .map_err(|e| DispatchError::handler(name, e))?;

        self.save_analysis(AnalysisRecord::new(
            AnalysisKind::Comprehensive,
            None,
            answer.clone(),
            question,
        ))
        .await;

        Ok(answer)
    }

    async fn market_data(&self, symbols: Option<&[String]>) -> Result<String, DispatchError> {
        let symbols: Vec<String> = match symbols {
            Some(symbols) if !symbols.is_empty() => symbols.iter().map(|s| normalize_symbol(s)).collect(),
            _ => self.config.snapshot().all_symbols(),
        };

        let mut prices = Map::new();
        let mut failed = 0;

        for symbol in &symbols {
            let entry = match self.source.ticker(symbol).await {
                Ok(ticker) => json!({
                    "price": ticker.price.to_f64(),
                    "fetched_at": ticker.fetched_at,
                }),
                Err(e) => {
                    failed += 1;
                    json!({ "error": e.to_string() })
                }
            };
            prices.insert(symbol.clone(), entry);
        }

        if !symbols.is_empty() && failed == symbols.len() {
            return Err(DispatchError::handler(
                "get_market_data",
                format!("no prices available for {}", symbols.join(", ")),
            ));
        }

        Ok(Value::Object(prices).to_string())
    }

    async fn system_status(&self) -> Value {
        let settings = self.config.snapshot();
        let feed = self.source.feed_status();
        let running = self.stop.as_ref().map(|s| !s.is_stopped()).unwrap_or(true);

        let last_analysis: Map<String, Value> = self
            .config
            .last_analysis_times()
            .into_iter()
            .map(|(symbol, at)| (symbol, json!(at)))
            .collect();

        let mut status = json!({
            "running": running,
            "monitoring": symbols_json(&settings),
            "heartbeat": heartbeat_json(&settings),
            "cached_symbols": feed.cached_symbols,
            "preferred_endpoint": feed.preferred_endpoint,
            "last_analysis": last_analysis,
            "pending_manual_triggers": self.config.pending_manual_triggers(),
        });

        if let Some(store) = &self.store {
            match store.recent_events(RECENT_EVENTS).await {
                Ok(events) => {
                    status["recent_events"] = events
                        .iter()
                        .map(|e| {
                            json!({
                                "capability": e.capability,
                                "symbol": e.symbol,
                                "status": e.status.as_str(),
                                "at": e.timestamp,
                            })
                        })
                        .collect();
                }
                Err(e) => tracing::warn!("Failed to load recent trigger events: {}", e),
            }
        }

        status
    }

    async fn persist_overrides(&self, settings: &MonitorSettings) {
        let Some(store) = &self.overrides else {
            return;
        };

        if let Err(e) = store.save(settings).await {
            tracing::warn!("Failed to persist monitor overrides: {}", e);
        }
    }

    async fn record_event(
        &self,
        capability: &str,
        symbol: Option<String>,
        status: EventStatus,
        detail: String,
    ) {
        let Some(store) = &self.store else {
            return;
        };

        let event = TriggerEvent::new(capability, symbol, status, detail);
        if let Err(e) = store.record_event(&event).await {
            tracing::warn!(capability, "Failed to record trigger event: {}", e);
        }
    }

    async fn stored_analysis(
        &self,
        kind: AnalysisKind,
        symbol: Option<&str>,
    ) -> Option<AnalysisRecord> {
        let store = self.store.as_ref()?;

        match store.latest_analysis(kind, symbol).await {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(kind = kind.as_str(), "Failed to load stored analysis: {}", e);
                None
            }
        }
    }

    async fn save_analysis(&self, record: AnalysisRecord) {
        let Some(store) = &self.store else {
            return;
        };

        if let Err(e) = store.save_analysis(&record).await {
            tracing::warn!(kind = record.kind.as_str(), "Failed to save analysis: {}", e);
        }
    }
}

/// Report text for the briefing, counting failures
fn section(result: Result<String, DispatchError>, failures: &mut usize) -> String {
    result.unwrap_or_else(|e| {
        *failures += 1;
        format!("unavailable ({})", e)
    })
}

fn symbols_json(settings: &MonitorSettings) -> Value {
    json!({
        "primary_symbols": settings.primary_symbols,
        "secondary_symbols": settings.secondary_symbols,
    })
}

fn heartbeat_json(settings: &MonitorSettings) -> Value {
    json!({
        "heartbeat_interval_secs": settings.heartbeat_interval_secs,
        "fetch_interval_secs": settings.fetch_interval_secs,
        "min_interval_secs": MIN_HEARTBEAT_SECS,
        "max_interval_secs": MAX_HEARTBEAT_SECS,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::{FeedError, FeedStatus};
    use crate::models::{Candle, MarketDataRecord, Ticker};
    use crate::persistence::StoredOverrides;
    use async_trait::async_trait;
    use chrono::Utc;
    use rust_decimal::Decimal;
    use std::sync::Mutex;

    #[derive(Default)]
    struct CountingAnalyst {
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Analyst for CountingAnalyst {
        async fn technical(&self, symbol: &str) -> crate::Result<String> {
            self.calls.lock().unwrap().push(format!("technical:{}", symbol));
            Ok(format!("{} looks range-bound", symbol))
        }

        async fn fundamental(&self, symbol: &str) -> crate::Result<String> {
            self.calls.lock().unwrap().push(format!("fundamental:{}", symbol));
            Ok("solid".to_string())
        }

        async fn sentiment(&self) -> crate::Result<String> {
            Err("sentiment feed down".into())
        }

        async fn macro_outlook(&self) -> crate::Result<String> {
            self.calls.lock().unwrap().push("macro".to_string());
            Ok("risk-on".to_string())
        }

        async fn comprehensive(&self, question: &str, briefing: &Briefing) -> crate::Result<String> {
            self.calls.lock().unwrap().push("comprehensive".to_string());
            Ok(format!("{} -> {}", question, briefing.render()))
        }
    }

    struct EmptyAccount;

    #[async_trait]
    impl TradingAccount for EmptyAccount {
        async fn account_status(&self) -> crate::Result<Value> {
            Ok(json!({ "cash_balance": 1000.0 }))
        }

        async fn positions(&self) -> crate::Result<Value> {
            Ok(json!([]))
        }
    }

    #[derive(Default)]
    struct FlakyNotifier {
        sent: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Notifier for FlakyNotifier {
        async fn notify(&self, message: &str) -> crate::Result<()> {
            if message.contains("fail") {
                return Err("chat unreachable".into());
            }
            self.sent.lock().unwrap().push(message.to_string());
            Ok(())
        }
    }

    struct TickerSource;

    #[async_trait]
    impl CandleSource for TickerSource {
        async fn candles(&self, _symbol: &str) -> Result<Vec<Candle>, FeedError> {
            Ok(vec![])
        }

        async fn ticker(&self, symbol: &str) -> Result<Ticker, FeedError> {
            if symbol == "SOLUSDT" {
                return Err(FeedError::NoEndpointReachable {
                    attempts: 2,
                    failures: vec![],
                });
            }
            Ok(Ticker {
                symbol: symbol.to_string(),
                price: Decimal::from(100),
                fetched_at: Utc::now(),
            })
        }

        fn feed_status(&self) -> FeedStatus {
            FeedStatus {
                cached_symbols: vec!["BTCUSDT".to_string()],
                preferred_endpoint: Some("https://api.binance.com".to_string()),
            }
        }
    }

    #[derive(Default)]
    struct MemoryOverrides {
        saved: Mutex<Vec<MonitorSettings>>,
    }

    #[async_trait]
    impl OverrideStore for MemoryOverrides {
        async fn save(&self, settings: &MonitorSettings) -> crate::Result<()> {
            self.saved.lock().unwrap().push(settings.clone());
            Ok(())
        }

        async fn load(&self) -> crate::Result<Option<StoredOverrides>> {
            Ok(self
                .saved
                .lock()
                .unwrap()
                .last()
                .map(StoredOverrides::from_settings))
        }
    }

    #[derive(Default)]
    struct MemoryEvents {
        events: Mutex<Vec<TriggerEvent>>,
        analyses: Mutex<Vec<AnalysisRecord>>,
    }

    #[async_trait]
    impl MarketStore for MemoryEvents {
        async fn save_market_data(&self, _record: &MarketDataRecord) -> crate::Result<()> {
            Ok(())
        }

        async fn record_event(&self, event: &TriggerEvent) -> crate::Result<()> {
            self.events.lock().unwrap().push(event.clone());
            Ok(())
        }

        async fn recent_events(&self, limit: usize) -> crate::Result<Vec<TriggerEvent>> {
            Ok(self.events.lock().unwrap().iter().rev().take(limit).cloned().collect())
        }

        async fn save_analysis(&self, record: &AnalysisRecord) -> crate::Result<()> {
            self.analyses.lock().unwrap().push(record.clone());
            Ok(())
        }

        async fn latest_analysis(
            &self,
            kind: AnalysisKind,
            symbol: Option<&str>,
        ) -> crate::Result<Option<AnalysisRecord>> {
            Ok(self
                .analyses
                .lock()
                .unwrap()
                .iter()
                .rev()
                .find(|r| r.kind == kind && r.symbol.as_deref() == symbol)
                .cloned())
        }
    }

    struct Fixture {
        dispatcher: DecisionDispatcher,
        analyst: Arc<CountingAnalyst>,
        notifier: Arc<FlakyNotifier>,
        overrides: Arc<MemoryOverrides>,
        events: Arc<MemoryEvents>,
        config: MonitorConfig,
    }

    fn fixture() -> Fixture {
        let config = MonitorConfig::new(MonitorSettings {
            primary_symbols: vec!["BTCUSDT".to_string(), "ETHUSDT".to_string()],
            secondary_symbols: vec!["SOLUSDT".to_string()],
            heartbeat_interval_secs: 1800,
            fetch_interval_secs: 300,
        })
        .unwrap();

        let analyst = Arc::new(CountingAnalyst::default());
        let notifier = Arc::new(FlakyNotifier::default());
        let overrides = Arc::new(MemoryOverrides::default());
        let events = Arc::new(MemoryEvents::default());

        let dispatcher = DecisionDispatcher::new(
            analyst.clone(),
            Arc::new(EmptyAccount),
            notifier.clone(),
            config.clone(),
            Arc::new(TickerSource),
        )
        .with_override_store(overrides.clone())
        .with_store(events.clone());

        Fixture {
            dispatcher,
            analyst,
            notifier,
            overrides,
            events,
            config,
        }
    }

    #[tokio::test]
    async fn test_rejected_interval_keeps_order() {
        let f = fixture();
        let text = "FUNCTION_CALL: get_monitoring_symbols()\nFUNCTION_CALL: set_heartbeat_interval(interval_seconds=30)";

        let transcript = f.dispatcher.dispatch_text(text).await;

        assert_eq!(transcript.entries.len(), 2);
        match &transcript.entries[0] {
            TranscriptEntry::Called { capability, result } => {
                assert_eq!(capability, "get_monitoring_symbols");
                assert!(result.contains("BTCUSDT"));
            }
            other => panic!("expected a call, got {:?}", other),
        }
        assert!(matches!(
            &transcript.entries[1],
            TranscriptEntry::Failed {
                error: DispatchError::Rejected { .. },
                ..
            }
        ));
        assert_eq!(f.config.snapshot().heartbeat_interval_secs, 1800);
        assert!(f.overrides.saved.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_capability_does_not_abort() {
        let f = fixture();
        let text = "Plan:\nFUNCTION_CALL: execute_trade(symbol=BTCUSDT)\nFUNCTION_CALL: get_heartbeat_settings()\nDone.";

        let transcript = f.dispatcher.dispatch_text(text).await;
        let rendered = transcript.render();

        assert_eq!(transcript.entries.len(), 4);
        assert!(rendered.starts_with("Plan:\n"));
        assert!(rendered.contains("unknown capability 'execute_trade'"));
        assert!(rendered.contains("\"heartbeat_interval_secs\":1800"));
        assert!(rendered.ends_with("Done."));
        assert_eq!(transcript.failures(), 1);
    }

    #[tokio::test]
    async fn test_missing_parameter_named_in_transcript() {
        let f = fixture();
        let transcript = f
            .dispatcher
            .dispatch_text("FUNCTION_CALL: technical_analysis()")
            .await;

        assert!(transcript.render().contains("missing required parameter 'symbol'"));
        assert!(f.analyst.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_one_handler_call_per_directive() {
        let f = fixture();
        let text = "FUNCTION_CALL: technical_analysis(symbol=btc)\nFUNCTION_CALL: technical_analysis('ETHUSDT')";

        f.dispatcher.dispatch_text(text).await;

        assert_eq!(
            *f.analyst.calls.lock().unwrap(),
            vec!["technical:BTCUSDT".to_string(), "technical:ETHUSDT".to_string()]
        );
    }

    #[tokio::test]
    async fn test_set_symbols_without_secondary_clears_it() {
        let f = fixture();

        let result = f
            .dispatcher
            .dispatch_text("FUNCTION_CALL: set_monitoring_symbols(primary_symbols=[\"ada\"])")
            .await
            .render();

        let settings = f.config.snapshot();
        assert_eq!(settings.primary_symbols, vec!["ADAUSDT".to_string()]);
        assert!(settings.secondary_symbols.is_empty());
        assert!(result.contains("ADAUSDT"));
        assert_eq!(f.overrides.saved.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_symbols_rejected_unchanged() {
        let f = fixture();

        let err = f
            .dispatcher
            .dispatch(&CapabilityCall::SetMonitoringSymbols {
                primary: vec!["BTCUSDT".to_string()],
                secondary: vec!["BTCUSDT".to_string()],
            })
            .await
            .unwrap_err();

        assert!(matches!(err, DispatchError::Rejected { .. }));
        assert_eq!(f.config.snapshot().primary_symbols.len(), 2);
    }

    #[tokio::test]
    async fn test_interval_accepted_and_persisted() {
        let f = fixture();

        let result = f
            .dispatcher
            .dispatch(&CapabilityCall::SetHeartbeatInterval {
                interval_seconds: 120.0,
            })
            .await
            .unwrap();

        assert_eq!(result, "Heartbeat interval set to 120s");
        let saved = f.overrides.saved.lock().unwrap();
        assert_eq!(saved[0].heartbeat_interval_secs, 120);
    }

    #[tokio::test]
    async fn test_manual_trigger_normalizes_and_validates() {
        let f = fixture();

        let ok = f
            .dispatcher
            .dispatch(&CapabilityCall::ManualTriggerAnalysis {
                symbol: "eth".to_string(),
            })
            .await
            .unwrap();
        assert!(ok.starts_with("ETHUSDT"));
        assert_eq!(f.config.pending_manual_triggers(), vec!["ETHUSDT".to_string()]);

        let err = f
            .dispatcher
            .dispatch(&CapabilityCall::ManualTriggerAnalysis {
                symbol: "DOGE".to_string(),
            })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not monitored"));
    }

    #[tokio::test]
    async fn test_handler_failures_reported() {
        let f = fixture();
        let text = "FUNCTION_CALL: send_notification(message=\"please fail\")\nFUNCTION_CALL: market_sentiment_analysis()\nFUNCTION_CALL: send_notification(message=ok)";

        let transcript = f.dispatcher.dispatch_text(text).await;

        assert_eq!(transcript.failures(), 2);
        assert!(transcript.render().contains("chat unreachable"));
        assert_eq!(*f.notifier.sent.lock().unwrap(), vec!["ok".to_string()]);
    }

    #[tokio::test]
    async fn test_market_data_defaults_to_monitored() {
        let f = fixture();

        let result = f
            .dispatcher
            .dispatch(&CapabilityCall::GetMarketData { symbols: None })
            .await
            .unwrap();
        let data: Value = serde_json::from_str(&result).unwrap();

        assert_eq!(data["BTCUSDT"]["price"], 100.0);
        assert!(data["SOLUSDT"]["error"].is_string());

        let err = f
            .dispatcher
            .dispatch(&CapabilityCall::GetMarketData {
                symbols: Some(vec!["sol".to_string()]),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Handler { .. }));
    }

    #[tokio::test]
    async fn test_system_status() {
        let f = fixture();
        let stop = StopHandle::new();
        let dispatcher = f.dispatcher.with_stop_handle(stop.clone());

        let status: Value =
            serde_json::from_str(&dispatcher.dispatch(&CapabilityCall::GetSystemStatus).await.unwrap())
                .unwrap();
        assert_eq!(status["running"], true);
        assert_eq!(status["cached_symbols"], json!(["BTCUSDT"]));
        assert_eq!(status["heartbeat"]["heartbeat_interval_secs"], 1800);

        assert_eq!(status["recent_events"], json!([]));

        stop.stop();
        let status: Value =
            serde_json::from_str(&dispatcher.dispatch(&CapabilityCall::GetSystemStatus).await.unwrap())
                .unwrap();
        assert_eq!(status["running"], false);
        // The previous status call is logged once it completes
        assert_eq!(status["recent_events"][0]["capability"], "get_system_status");
        assert_eq!(status["recent_events"][0]["status"], "ok");
    }

    #[tokio::test]
    async fn test_events_logged_per_invocation() {
        let f = fixture();
        let text = "FUNCTION_CALL: technical_analysis(symbol=BTC)\nFUNCTION_CALL: set_heartbeat_interval(5000)\nFUNCTION_CALL: bogus()";

        f.dispatcher.dispatch_text(text).await;

        let events = f.events.events.lock().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].capability, "technical_analysis");
        assert_eq!(events[0].symbol.as_deref(), Some("BTCUSDT"));
        assert_eq!(events[0].status, EventStatus::Ok);
        assert_eq!(events[1].status, EventStatus::Error);
    }

    #[tokio::test]
    async fn test_structured_calls_in_order() {
        let f = fixture();
        let calls = vec![
            Ok(RawInvocation::new("get_account_status")),
            Err(DispatchError::MalformedDirective("bad".to_string())),
            Ok(RawInvocation::new("get_current_positions")),
        ];

        let transcript = f.dispatcher.dispatch_calls(&calls).await;

        assert_eq!(transcript.entries.len(), 3);
        assert!(transcript.entries[0].to_string().contains("cash_balance"));
        assert_eq!(transcript.entries[2].to_string(), "✅ called get_current_positions → []");
    }

    #[tokio::test]
    async fn test_slow_analysis_reused_same_day() {
        let f = fixture();

        let first = f.dispatcher.dispatch(&CapabilityCall::MacroAnalysis).await.unwrap();
        let second = f.dispatcher.dispatch(&CapabilityCall::MacroAnalysis).await.unwrap();
        for _ in 0..2 {
            f.dispatcher
                .dispatch(&CapabilityCall::TechnicalAnalysis {
                    symbol: "BTC".to_string(),
                })
                .await
                .unwrap();
        }

        assert_eq!(first, second);
        assert_eq!(
            *f.analyst.calls.lock().unwrap(),
            vec![
                "macro".to_string(),
                "technical:BTCUSDT".to_string(),
                "technical:BTCUSDT".to_string()
            ]
        );
        let analyses = f.events.analyses.lock().unwrap();
        assert_eq!(analyses.len(), 3);
        assert_eq!(analyses[1].symbol.as_deref(), Some("BTCUSDT"));
    }

    #[tokio::test]
    async fn test_stale_analysis_not_reused() {
        let f = fixture();
        let yesterday = AnalysisRecord {
            created_at: Utc::now() - chrono::Duration::days(1),
            ..AnalysisRecord::new(AnalysisKind::Macro, None, "risk-off", "risk-off")
        };
        f.events.analyses.lock().unwrap().push(yesterday);

        let result = f.dispatcher.dispatch(&CapabilityCall::MacroAnalysis).await.unwrap();

        assert_eq!(result, "risk-on");
        assert_eq!(*f.analyst.calls.lock().unwrap(), vec!["macro".to_string()]);
    }

    #[tokio::test]
    async fn test_comprehensive_gathers_reports() {
        let f = fixture();
        let text = "FUNCTION_CALL: comprehensive_analysis(\"Hold or trim?\", symbols=[eth])";

        let transcript = f.dispatcher.dispatch_text(text).await;
        let rendered = transcript.render();

        assert_eq!(transcript.failures(), 0);
        assert!(rendered.contains("Hold or trim? ->"));
        assert!(rendered.contains("unavailable (market_sentiment_analysis failed: sentiment feed down)"));
        assert!(rendered.contains("## ETHUSDT"));
        assert_eq!(
            *f.analyst.calls.lock().unwrap(),
            vec![
                "macro".to_string(),
                "technical:ETHUSDT".to_string(),
                "fundamental:ETHUSDT".to_string(),
                "comprehensive".to_string()
            ]
        );

        let analyses = f.events.analyses.lock().unwrap();
        let last = analyses.last().unwrap();
        assert_eq!(last.kind, AnalysisKind::Comprehensive);
        assert_eq!(last.summary, "Hold or trim?");
    }

    #[tokio::test]
    async fn test_comprehensive_defaults_to_primary_symbols() {
        let f = fixture();

        f.dispatcher
            .dispatch(&CapabilityCall::ComprehensiveAnalysis {
                question: "Outlook?".to_string(),
                symbols: None,
            })
            .await
            .unwrap();

        let calls = f.analyst.calls.lock().unwrap();
        assert!(calls.contains(&"technical:BTCUSDT".to_string()));
        assert!(calls.contains(&"technical:ETHUSDT".to_string()));
        assert!(!calls.iter().any(|c| c.contains("SOLUSDT")));
    }
}
