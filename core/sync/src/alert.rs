//! Operator notifications.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

use folio_common::{AlertConfig, Error, ExportConfig, Result};

/// Icon shown next to an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertIcon {
    /// Something failed.
    RedLight,
    /// Progress or completion notice.
    FileFolder,
}

impl AlertIcon {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertIcon::RedLight => ":redlight:",
            AlertIcon::FileFolder => ":file_folder:",
        }
    }
}

/// Sends short text alerts to the operators.
#[async_trait]
pub trait Alerter: Send + Sync {
    async fn alert(&self, message: &str, icon: AlertIcon) -> Result<()>;
}

#[async_trait]
impl<T: Alerter + ?Sized> Alerter for Arc<T> {
    async fn alert(&self, message: &str, icon: AlertIcon) -> Result<()> {
        (**self).alert(message, icon).await
    }
}

#[derive(Serialize)]
struct WebhookPayload<'a> {
    channel: &'a str,
    text: &'a str,
    username: &'a str,
    icon_emoji: &'a str,
}

/// Posts alerts to a chat webhook.
pub struct WebhookAlerter {
    client: reqwest::Client,
    config: AlertConfig,
}

impl WebhookAlerter {
    pub fn new(config: AlertConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }
}

#[async_trait]
impl Alerter for WebhookAlerter {
    async fn alert(&self, message: &str, icon: AlertIcon) -> Result<()> {
        let payload = WebhookPayload {
            channel: &self.config.channel,
            text: message,
            username: &self.config.username,
            icon_emoji: icon.as_str(),
        };

        let response = self
            .client
            .post(&self.config.webhook_url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| Error::Network(format!("Failed to send alert: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(Error::Network(format!(
                "Alert webhook failed: {} - {}",
                status, text
            )));
        }

        debug!("Alert sent to {}", self.config.channel);
        Ok(())
    }
}

/// Writes alerts to the log only.
#[derive(Debug, Default)]
pub struct LogAlerter;

#[async_trait]
impl Alerter for LogAlerter {
    async fn alert(&self, message: &str, icon: AlertIcon) -> Result<()> {
        info!("{} {}", icon.as_str(), message);
        Ok(())
    }
}

/// Keeps alerts in memory.
#[derive(Debug, Default)]
pub struct MemoryAlerter {
    sent: Mutex<Vec<(AlertIcon, String)>>,
}

impl MemoryAlerter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<(AlertIcon, String)> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Alerter for MemoryAlerter {
    async fn alert(&self, message: &str, icon: AlertIcon) -> Result<()> {
        let mut sent = self
            .sent
            .lock()
            .map_err(|e| Error::InvalidInput(format!("alert log poisoned: {}", e)))?;
        sent.push((icon, message.to_string()));
        Ok(())
    }
}

/// Webhook alerts when configured, log alerts in debug mode or otherwise.
pub fn alerter_for(config: &ExportConfig) -> Arc<dyn Alerter> {
    match (&config.alert, config.debug_mode) {
        (Some(alert), false) => Arc::new(WebhookAlerter::new(alert.clone())),
        _ => Arc::new(LogAlerter),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_icons() {
        assert_eq!(AlertIcon::RedLight.as_str(), ":redlight:");
        assert_eq!(AlertIcon::FileFolder.as_str(), ":file_folder:");
    }

    #[test]
    fn test_payload_shape() {
        let payload = WebhookPayload {
            channel: "#engineering-mobile",
            text: "done",
            username: "Mobile Export",
            icon_emoji: AlertIcon::FileFolder.as_str(),
        };
        assert_eq!(
            serde_json::to_value(&payload).unwrap(),
            serde_json::json!({
                "channel": "#engineering-mobile",
                "text": "done",
                "username": "Mobile Export",
                "icon_emoji": ":file_folder:"
            })
        );
    }

    #[tokio::test]
    async fn test_memory_alerter_records() {
        let alerter = MemoryAlerter::new();
        alerter.alert("disk full", AlertIcon::RedLight).await.unwrap();
        assert_eq!(
            alerter.sent(),
            vec![(AlertIcon::RedLight, "disk full".to_string())]
        );
    }

    #[tokio::test]
    async fn test_debug_mode_logs_instead() {
        let mut config = ExportConfig::with_root("/tmp/folio");
        config.debug_mode = true;
        config.alert = Some(AlertConfig {
            webhook_url: "http://127.0.0.1:9/hook".to_string(),
            channel: "#x".to_string(),
            username: "bot".to_string(),
        });
        alerter_for(&config)
            .alert("quiet", AlertIcon::FileFolder)
            .await
            .unwrap();
    }
}
