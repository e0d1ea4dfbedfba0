//! Telegram Bot API sink

use super::{async_trait, NotificationSink};
use crate::error::{ReporterError, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Destination and credentials for the chat bot
#[derive(Debug, Clone, Deserialize)]
pub struct TelegramConfig {
    /// Bot API base URL
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub chat_id: i64,
}

fn default_api_url() -> String {
    "https://api.telegram.org".to_string()
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            token: String::new(),
            chat_id: 0,
        }
    }
}

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: i64,
    text: &'a str,
    parse_mode: &'static str,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

/// Sends reports as HTML-formatted chat messages
pub struct TelegramSink {
    client: Client,
    endpoint: Url,
    chat_id: i64,
}

impl TelegramSink {
    pub fn new(config: &TelegramConfig) -> Result<Self> {
        if config.token.is_empty() {
            return Err(ReporterError::Config("telegram token is not set".to_string()));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ReporterError::Config(format!("failed to create HTTP client: {}", e)))?;

        // The token contains ':' so it cannot go through Url::join
        let endpoint = Url::parse(&format!(
            "{}/bot{}/sendMessage",
            config.api_url.trim_end_matches('/'),
            config.token
        ))
        .map_err(|e| ReporterError::Config(format!("invalid telegram api url: {}", e)))?;

        Ok(Self {
            client,
            endpoint,
            chat_id: config.chat_id,
        })
    }
}

#[async_trait]
impl NotificationSink for TelegramSink {
    async fn send(&self, text: &str) -> Result<()> {
        let request = SendMessageRequest {
            chat_id: self.chat_id,
            text,
            parse_mode: "HTML",
        };

        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&request)
            .send()
            .await
            .map_err(|e| ReporterError::Notification(format!("failed to send request: {}", e)))?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let parsed: Option<ApiResponse> = serde_json::from_str(&body).ok();

        match parsed {
            Some(api) if status.is_success() && api.ok => {
                debug!(chat_id = self.chat_id, "Message delivered");
                Ok(())
            }
            Some(api) => Err(ReporterError::Notification(format!(
                "API error ({}): {}",
                status,
                api.description.unwrap_or_else(|| "unknown error".to_string())
            ))),
            None => Err(ReporterError::Notification(format!(
                "API error ({}): {}",
                status, body
            ))),
        }
    }

    fn name(&self) -> &str {
        "telegram"
    }
}
