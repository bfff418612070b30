use super::Notifier;
use crate::api::TelegramClient;
use crate::Result;
use async_trait::async_trait;

pub struct TelegramNotifier {
    client: TelegramClient,
}

impl TelegramNotifier {
    pub fn new(client: TelegramClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify(&self, message: &str) -> Result<()> {
        self.client
            .send_message(message)
            .await
            .map_err(|e| format!("{:#}", e))?;

        tracing::info!("📨 Notification sent via Telegram");
        Ok(())
    }
}

/// Fallback when no chat is configured: notifications only reach the log
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, message: &str) -> Result<()> {
        tracing::info!("📨 Notification: {}", message);
        Ok(())
    }
}
