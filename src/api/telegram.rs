use anyhow::{Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const TELEGRAM_API_BASE: &str = "https://api.telegram.org";
const MAX_MESSAGE_CHARS: usize = 4096;

/// Minimal Telegram Bot API client (sendMessage only)
#[derive(Clone)]
pub struct TelegramClient {
    client: Client,
    base_url: String,
    token: String,
    chat_id: String,
}

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: &'a str,
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct TelegramResponse {
    ok: bool,
    description: Option<String>,
}

impl TelegramClient {
    pub fn new(token: String, chat_id: String, timeout: Duration) -> Result<Self> {
        Self::with_base_url(TELEGRAM_API_BASE, token, chat_id, timeout)
    }

    pub fn with_base_url(
        base_url: impl Into<String>,
        token: String,
        chat_id: String,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
            chat_id,
        })
    }

    /// Send `text` to the configured chat, truncated to the Bot API limit
    pub async fn send_message(&self, text: &str) -> Result<()> {
        let text = truncate_chars(text, MAX_MESSAGE_CHARS);
        let url = format!("{}/bot{}/sendMessage", self.base_url, self.token);

        let response = self
            .client
            .post(&url)
            .json(&SendMessageRequest {
                chat_id: &self.chat_id,
                text,
            })
            .send()
            .await
            .context("Telegram request failed")?;

        let status = response.status();
        let body: TelegramResponse = response
            .json()
            .await
            .with_context(|| format!("Failed to parse Telegram response ({})", status))?;

        if !body.ok {
            anyhow::bail!(
                "Telegram rejected message ({}): {}",
                status,
                body.description.unwrap_or_default()
            );
        }

        Ok(())
    }
}

fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn client(server: &mockito::Server) -> TelegramClient {
        TelegramClient::with_base_url(
            server.url(),
            "123:abc".to_string(),
            "42".to_string(),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("hello", 10), "hello");
        assert_eq!(truncate_chars("hello", 2), "he");
        assert_eq!(truncate_chars("ééé", 2), "éé");
    }

    #[tokio::test]
    async fn test_send_message() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/bot123:abc/sendMessage")
            .match_body(Matcher::Json(serde_json::json!({"chat_id": "42", "text": "BTC alert"})))
            .with_status(200)
            .with_body(r#"{"ok":true,"result":{}}"#)
            .create_async()
            .await;

        client(&server).send_message("BTC alert").await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_rejected_message_is_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/bot123:abc/sendMessage")
            .with_status(400)
            .with_body(r#"{"ok":false,"description":"Bad Request: chat not found"}"#)
            .create_async()
            .await;

        let err = client(&server).send_message("hi").await.unwrap_err();
        assert!(err.to_string().contains("chat not found"));
    }
}
