//! OpenAI-compatible chat completions client
//!
//! Used both for free-form analysis text and for the decision step, where
//! the capability catalog is advertised as function tools.

use crate::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
const MAX_TOKENS: u32 = 1024;
const RETRY_DELAY_MS: u64 = 2500;
const MAX_RETRIES: u32 = 3;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// A function the model may call
#[derive(Debug, Clone, Serialize)]
pub struct ToolDefinition {
    #[serde(rename = "type")]
    pub kind: String,
    pub function: FunctionDefinition,
}

#[derive(Debug, Clone, Serialize)]
pub struct FunctionDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value, // JSON schema
}

impl ToolDefinition {
    pub fn function(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Self {
        Self {
            kind: "function".to_string(),
            function: FunctionDefinition {
                name: name.into(),
                description: description.into(),
                parameters,
            },
        }
    }
}

#[derive(Debug, Serialize)]
struct OpenAIRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "no_tools")]
    tools: &'a [ToolDefinition],
}

fn no_tools(tools: &&[ToolDefinition]) -> bool {
    tools.is_empty()
}

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: MessageContent,
}

#[derive(Debug, Deserialize)]
struct MessageContent {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ToolCall>,
}

/// A function call requested by the model
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ToolCall {
    #[serde(default)]
    pub id: String,
    pub function: FunctionCall,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct FunctionCall {
    pub name: String,
    pub arguments: String, // JSON-encoded object
}

/// Text and tool calls of the first choice
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatCompletion {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
}

#[derive(Clone)]
pub struct LlmClient {
    api_key: String,
    client: reqwest::Client,
    url: String,
    model: String,
    temperature: f32,
}

impl LlmClient {
    pub fn new(api_key: String, model: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            api_key,
            client,
            url: OPENAI_API_URL.to_string(),
            model: model.into(),
            temperature: 0.2,
        })
    }

    /// Point at another OpenAI-compatible endpoint
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Run one chat completion, retrying transport errors and 429s
    pub async fn complete(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> Result<ChatCompletion> {
        let request = OpenAIRequest {
            model: &self.model,
            max_tokens: MAX_TOKENS,
            temperature: self.temperature,
            messages,
            tools,
        };

        let mut retry_count = 0;

        loop {
            if retry_count > 0 {
                let delay_ms = RETRY_DELAY_MS * 2_u64.pow(retry_count - 1); // Exponential backoff
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }

            let response = match self
                .client
                .post(&self.url)
                .header("Authorization", format!("Bearer {}", &self.api_key))
                .header("content-type", "application/json")
                .json(&request)
                .send()
                .await
            {
                Ok(r) => r,
                Err(e) => {
                    retry_count += 1;
                    if retry_count >= MAX_RETRIES {
                        return Err(format!("Network error: {}", e).into());
                    }
                    tracing::warn!(attempt = retry_count, "LLM request failed: {}", e);
                    continue;
                }
            };

            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                let error = format!("LLM API error {}: {}", status, body);

                // Retry on rate limit errors (429)
                if status.as_u16() == 429 {
                    retry_count += 1;
                    if retry_count >= MAX_RETRIES {
                        return Err(error.into());
                    }
                    tracing::warn!(attempt = retry_count, "LLM rate limited, backing off");
                    continue;
                }

                // Don't retry on other errors
                return Err(error.into());
            }

            let body: OpenAIResponse = response
                .json()
                .await
                .map_err(|e| format!("JSON decode error: {}", e))?;

            let message = body
                .choices
                .into_iter()
                .next()
                .ok_or("LLM response has no choices")?
                .message;

            return Ok(ChatCompletion {
                content: message.content.unwrap_or_default(),
                tool_calls: message.tool_calls,
            });
        }
    }
}
