use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{error, info, warn};
use url::Url;

use crate::error::QuoteError;

use super::NotificationSink;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_LOGGED_BODY: usize = 1024;

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
}

/// Telegram Bot API sink.
#[derive(Clone)]
pub struct TelegramSink {
    client: reqwest::Client,
    /// `<api_base>/bot<token>/`; contains the token, never log it.
    bot_url: Url,
}

impl TelegramSink {
    pub fn new(api_base: &str, token: &str) -> Result<Self, QuoteError> {
        let mut base = api_base.trim().to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        let bot_url = Url::parse(&base)
            .and_then(|u| u.join(&format!("./bot{}/", token)))
            .map_err(|e| QuoteError::Config(format!("Invalid Telegram API base '{}': {}", api_base, e)))?;

        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| QuoteError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, bot_url })
    }

    fn method_url(&self, method: &str) -> Result<Url, String> {
        self.bot_url
            .join(method)
            .map_err(|e| format!("Invalid Telegram method URL: {}", e))
    }

    /// Calls `getMe` to check the token.
    pub async fn check_connection(&self) -> bool {
        let url = match self.method_url("getMe") {
            Ok(u) => u,
            Err(e) => {
                error!("{}", e);
                return false;
            }
        };
        match self.client.get(url).send().await {
            Ok(response) => match handle_api_response(response, "getMe").await {
                Ok(body) => {
                    let username = serde_json::from_str::<serde_json::Value>(&body)
                        .ok()
                        .and_then(|v| v["result"]["username"].as_str().map(str::to_string));
                    info!("Telegram bot connected: @{}", username.as_deref().unwrap_or("?"));
                    true
                }
                Err(_) => false,
            },
            Err(e) => {
                warn!("Telegram connection check failed: {}", describe(&e));
                false
            }
        }
    }
}

#[async_trait]
impl NotificationSink for TelegramSink {
    async fn send(&self, destination: &str, text: &str) -> bool {
        let url = match self.method_url("sendMessage") {
            Ok(u) => u,
            Err(e) => {
                error!("{}", e);
                return false;
            }
        };
        let body = SendMessage {
            chat_id: destination,
            text,
        };

        match self.client.post(url).json(&body).send().await {
            Ok(response) => match handle_api_response(response, "sendMessage").await {
                Ok(_) => {
                    info!("Telegram message sent to {}", destination);
                    true
                }
                Err(_) => false,
            },
            Err(e) => {
                warn!("Failed to send Telegram message: {}", describe(&e));
                false
            }
        }
    }
}

fn describe(e: &reqwest::Error) -> String {
    if e.is_timeout() {
        format!("timeout after {}s", REQUEST_TIMEOUT.as_secs())
    } else {
        // The URL carries the bot token.
        match e.url() {
            Some(url) => e.to_string().replace(url.as_str(), "<telegram>"),
            None => e.to_string(),
        }
    }
}

/// Check status and extract the body text, logging non-2xx responses.
async fn handle_api_response(response: reqwest::Response, method: &str) -> Result<String, String> {
    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<failed to read body>".to_string());
        let truncated = if body.chars().count() > MAX_LOGGED_BODY {
            format!("{}...", body.chars().take(MAX_LOGGED_BODY).collect::<String>())
        } else {
            body
        };
        let msg = format!("Telegram API error: {} from {} - {}", status, method, truncated);
        warn!("{}", msg);
        return Err(msg);
    }
    response
        .text()
        .await
        .map_err(|e| format!("Failed to read Telegram response from {}: {}", method, describe(&e)))
}
