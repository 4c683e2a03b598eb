//! Telegram Bot API delivery provider.
//!
//! Wraps reqwest for `sendMessage` and `sendDocument`. HTTP outcomes are
//! mapped onto [`ProviderStatus`] so the notifier can decide on retries.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use crate::provider::DeliveryProvider;
use crate::types::{ChannelId, ProviderResponse, TextFormat};

/// Generic Telegram API response envelope.
#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    description: Option<String>,
    parameters: Option<ResponseParameters>,
}

#[derive(Debug, Deserialize)]
struct ResponseParameters {
    retry_after: Option<u64>,
}

/// Upper bound for a `sendMessage` round trip
pub const MESSAGE_TIMEOUT: Duration = Duration::from_secs(15);
/// Upper bound for a `sendDocument` upload
pub const DOCUMENT_TIMEOUT: Duration = Duration::from_secs(30);

/// Telegram Bot API client.
pub struct TelegramProvider {
    client: Client,
    base_url: String,
    message_timeout: Duration,
    document_timeout: Duration,
}

impl TelegramProvider {
    /// Create a new provider for the given bot token.
    pub fn new(bot_token: &str) -> Self {
        Self::with_base_url(bot_token, "https://api.telegram.org")
    }

    /// Create a new provider with a custom base URL (for testing).
    pub fn with_base_url(bot_token: &str, base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: format!("{}/bot{}", base_url.trim_end_matches('/'), bot_token),
            message_timeout: MESSAGE_TIMEOUT,
            document_timeout: DOCUMENT_TIMEOUT,
        }
    }

    /// Override the per-request time limits. A request that runs past its
    /// limit is reported as a network error.
    pub fn with_timeouts(mut self, message: Duration, document: Duration) -> Self {
        self.message_timeout = message;
        self.document_timeout = document;
        self
    }

    async fn classify(method: &str, result: Result<Response, reqwest::Error>) -> ProviderResponse {
        let resp = match result {
            Ok(resp) => resp,
            Err(err) => {
                warn!("{method} request failed: {err}");
                return ProviderResponse::network_error(err.to_string());
            }
        };

        let status = resp.status();
        // Error bodies are not always JSON; fall back to an empty envelope.
        let envelope: Option<ApiResponse> = resp.json().await.ok();
        let description = envelope
            .as_ref()
            .and_then(|e| e.description.clone())
            .unwrap_or_else(|| status.to_string());

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = envelope
                .as_ref()
                .and_then(|e| e.parameters.as_ref())
                .and_then(|p| p.retry_after)
                .map(Duration::from_secs);
            warn!("{method} rate limited (retry_after={retry_after:?})");
            return ProviderResponse::rate_limited(retry_after);
        }
        if status.is_server_error() {
            warn!("{method} server error {status}: {description}");
            return ProviderResponse::server_error(status.as_u16(), description);
        }
        if !status.is_success() {
            warn!("{method} rejected {status}: {description}");
            return ProviderResponse::client_error(Some(status.as_u16()), description);
        }

        match envelope {
            Some(env) if env.ok => ProviderResponse::ok(),
            Some(_) => ProviderResponse::client_error(Some(status.as_u16()), description),
            None => ProviderResponse::server_error(status.as_u16(), "unreadable response body"),
        }
    }
}

#[async_trait]
impl DeliveryProvider for TelegramProvider {
    async fn send_text(
        &self,
        channel: &ChannelId,
        text: &str,
        format: TextFormat,
    ) -> ProviderResponse {
        let mut body = json!({
            "chat_id": channel.as_str(),
            "text": text,
        });
        if let Some(mode) = format.parse_mode() {
            body["parse_mode"] = json!(mode);
        }

        debug!("sendMessage to chat_id={channel}");
        let result = self
            .client
            .post(format!("{}/sendMessage", self.base_url))
            .timeout(self.message_timeout)
            .json(&body)
            .send()
            .await;
        Self::classify("sendMessage", result).await
    }

    async fn send_file(
        &self,
        channel: &ChannelId,
        path: &Path,
        caption: Option<&str>,
        format: TextFormat,
    ) -> ProviderResponse {
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(err) => {
                return ProviderResponse::client_error(
                    None,
                    format!("cannot read {}: {err}", path.display()),
                )
            }
        };
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string());

        let document = reqwest::multipart::Part::bytes(bytes).file_name(file_name);
        let mut form = reqwest::multipart::Form::new()
            .text("chat_id", channel.as_str().to_string())
            .part("document", document);
        if let Some(caption) = caption {
            form = form.text("caption", caption.to_string());
            if let Some(mode) = format.parse_mode() {
                form = form.text("parse_mode", mode);
            }
        }

        debug!("sendDocument to chat_id={channel}: {}", path.display());
        let result = self
            .client
            .post(format!("{}/sendDocument", self.base_url))
            .timeout(self.document_timeout)
            .multipart(form)
            .send()
            .await;
        Self::classify("sendDocument", result).await
    }
}
