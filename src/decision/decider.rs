use crate::api::{ChatMessage, LlmClient};
use crate::dispatch::{catalog, from_tool_call, DispatchError, RawInvocation, DIRECTIVE_MARKER};
use crate::Result;
use async_trait::async_trait;

/// What the decider wants done: free text plus structured calls
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Decision {
    /// May still carry directive lines for the text shim
    pub text: String,
    pub calls: Vec<std::result::Result<RawInvocation, DispatchError>>,
}

#[async_trait]
pub trait Decider: Send + Sync {
    async fn decide(&self, request: &str) -> Result<Decision>;
}

pub const DEFAULT_SYSTEM_PROMPT: &str = "You supervise a crypto market monitor. \
Use the available tools to analyse markets, inspect the account, notify the operator \
or adjust what is monitored. Explain your reasoning briefly.";

/// Decider backed by chat-completion tool calling
pub struct LlmDecider {
    llm: LlmClient,
    system_prompt: String,
}

impl LlmDecider {
    pub fn new(llm: LlmClient, system_prompt: impl Into<String>) -> Self {
        Self {
            llm,
            system_prompt: system_prompt.into(),
        }
    }

    fn system_message(&self) -> ChatMessage {
        ChatMessage::system(format!(
            "{}\n\nCapabilities:\n{}\n\nIf you cannot use tools, write one line per call as \
             `{} name(param=value, ...)`.",
            self.system_prompt,
            catalog::describe(),
            DIRECTIVE_MARKER
        ))
    }
}

#[async_trait]
impl Decider for LlmDecider {
    async fn decide(&self, request: &str) -> Result<Decision> {
        let messages = [self.system_message(), ChatMessage::user(request)];
        let completion = self
            .llm
            .complete(&messages, &catalog::tool_definitions())
            .await?;

        let calls = completion
            .tool_calls
            .iter()
            .map(|tc| from_tool_call(&tc.function.name, &tc.function.arguments))
            .collect::<Vec<_>>();

        tracing::debug!(
            tool_calls = calls.len(),
            text_len = completion.content.len(),
            "Decider responded"
        );

        Ok(Decision {
            text: completion.content,
            calls,
        })
    }
}
