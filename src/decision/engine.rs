use super::decider::Decider;
use crate::dispatch::{contains_directive, DecisionDispatcher, DispatchError, Transcript, TranscriptEntry};
use crate::monitor::{AnalysisRequest, HeartbeatHandler};
use async_trait::async_trait;
use std::sync::Arc;

/// Routes heartbeat events and operator messages to the dispatcher
///
/// Both paths may run concurrently; the dispatcher's config holder is the
/// only shared mutable state.
pub struct DecisionEngine {
    decider: Arc<dyn Decider>,
    dispatcher: Arc<DecisionDispatcher>,
}

impl DecisionEngine {
    pub fn new(decider: Arc<dyn Decider>, dispatcher: Arc<DecisionDispatcher>) -> Self {
        Self {
            decider,
            dispatcher,
        }
    }

    pub fn dispatcher(&self) -> &Arc<DecisionDispatcher> {
        &self.dispatcher
    }

    /// Ask the decider, then run its text directives and its structured calls
    pub async fn decide_and_dispatch(&self, request: &str) -> crate::Result<Transcript> {
        let decision = self.decider.decide(request).await?;

        let mut transcript = self.dispatcher.dispatch_text(&decision.text).await;
        let structured = self.dispatcher.dispatch_calls(&decision.calls).await;
        transcript.entries.extend(structured.entries);

        Ok(transcript)
    }

    /// Handle one out-of-band operator message
    ///
    /// Text that already carries directives runs as-is; anything else goes
    /// through the decider first.
    pub async fn handle_operator_message(&self, text: &str) -> Transcript {
        if contains_directive(text) {
            return self.dispatcher.dispatch_text(text).await;
        }

        match self.decide_and_dispatch(text).await {
            Ok(transcript) => transcript,
            Err(e) => {
                tracing::error!(reason = %e, "Decider failed on operator message");
                Transcript {
                    entries: vec![TranscriptEntry::Failed {
                        capability: None,
                        error: DispatchError::handler("decide", e),
                    }],
                }
            }
        }
    }
}

/// Prompt describing why `request.symbol` is due
pub fn heartbeat_prompt(request: &AnalysisRequest) -> String {
    let conditions = if request.conditions.is_empty() {
        "none".to_string()
    } else {
        request
            .conditions
            .iter()
            .map(|c| c.to_string())
            .collect::<Vec<_>>()
            .join("; ")
    };

    format!(
        "Heartbeat event for {}\nReason: {}\nIndicators: {}\nSpecial conditions: {}\n\
         Decide whether deeper analysis or an operator notification is needed, or keep watching.",
        request.symbol,
        request.reason,
        request.snapshot.summary(),
        conditions
    )
}

#[async_trait]
impl HeartbeatHandler for DecisionEngine {
    async fn on_due(&self, request: AnalysisRequest) -> crate::Result<()> {
        let prompt = heartbeat_prompt(&request);
        let transcript = self.decide_and_dispatch(&prompt).await?;

        let failures = transcript.failures();
        if failures > 0 {
            tracing::warn!(symbol = %request.symbol, failures, "Heartbeat decision had failed calls");
        }
        tracing::info!(symbol = %request.symbol, "Heartbeat decision:\n{}", transcript.render());

        Ok(())
    }
}
