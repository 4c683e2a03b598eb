use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::{info, warn};

use crate::error::DeliveryError;
use crate::provider::DeliveryProvider;
use crate::rate_limit::{RateLimiter, ThrottleConfig};
use crate::types::{
    ChannelId, DeliveryReceipt, MessageBody, ProviderResponse, ProviderStatus, TextFormat,
};

const TRUNCATION_MARKER: &str = "...";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifierConfig {
    pub throttle: ThrottleConfig,
    /// Attempts per send, including the first
    pub max_attempts: u32,
    /// Delay after a transient failure
    pub transient_backoff_ms: u64,
    /// Delay after a rate-limited response that carries no hint
    pub rate_limit_fallback_ms: u64,
    /// Byte budget for message text
    pub text_budget: usize,
    /// Byte budget for file captions
    pub caption_budget: usize,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            throttle: ThrottleConfig::default(),
            max_attempts: 3,
            transient_backoff_ms: 5_000,
            rate_limit_fallback_ms: 5_000,
            text_budget: 4_000,
            caption_budget: 1_024,
        }
    }
}

/// Cut `text` to at most `budget` bytes, ending with a marker when shortened
///
/// The cut always lands on a char boundary.
pub fn truncate_to_budget(text: &str, budget: usize) -> String {
    if text.len() <= budget {
        return text.to_string();
    }
    let mut end = budget.saturating_sub(TRUNCATION_MARKER.len());
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}{}", &text[..end], TRUNCATION_MARKER)
}

/// Sends notifications through one shared limiter
pub struct Notifier {
    provider: Arc<dyn DeliveryProvider>,
    limiter: Arc<RateLimiter>,
    config: NotifierConfig,
}

impl Notifier {
    pub fn new(provider: Arc<dyn DeliveryProvider>, config: NotifierConfig) -> Self {
        let limiter = Arc::new(RateLimiter::new(config.throttle.clone()));
        Self {
            provider,
            limiter,
            config,
        }
    }

    /// Deliver `body` to `channel`
    ///
    /// Every attempt, retries included, first waits for a limiter slot.
    /// Retries follow the provider's verdicts. Exhaustion is returned to the
    /// caller, who decides whether it matters.
    pub async fn send(
        &self,
        body: MessageBody,
        channel: &ChannelId,
    ) -> Result<DeliveryReceipt, DeliveryError> {
        let body = self.fit_to_budget(body);
        let max_attempts = self.config.max_attempts.max(1);

        let mut throttled = Duration::ZERO;
        let mut attempt = 1;
        loop {
            throttled += self.limiter.acquire(channel, body.throttle_class()).await;
            let response = self.dispatch(&body, channel).await;
            let (wait, failure) = match response.status {
                ProviderStatus::Ok => {
                    if attempt > 1 {
                        info!(channel = %channel, attempt, "Delivered after retry");
                    }
                    return Ok(DeliveryReceipt {
                        attempts: attempt,
                        throttled,
                    });
                }
                ProviderStatus::ClientError { code, description } => {
                    warn!(channel = %channel, ?code, "Delivery rejected: {description}");
                    return Err(DeliveryError::Permanent {
                        reason: description,
                    });
                }
                ProviderStatus::RateLimited { retry_after } => (
                    retry_after
                        .unwrap_or(Duration::from_millis(self.config.rate_limit_fallback_ms)),
                    DeliveryError::RateLimited { attempts: attempt },
                ),
                ProviderStatus::ServerError { code, description } => (
                    Duration::from_millis(self.config.transient_backoff_ms),
                    DeliveryError::Transient {
                        attempts: attempt,
                        reason: format!("server error {code}: {description}"),
                    },
                ),
                ProviderStatus::NetworkError(reason) => (
                    Duration::from_millis(self.config.transient_backoff_ms),
                    DeliveryError::Transient {
                        attempts: attempt,
                        reason,
                    },
                ),
            };

            if attempt >= max_attempts {
                warn!(channel = %channel, attempt, "Delivery failed: {failure}");
                return Err(failure);
            }
            warn!(
                channel = %channel,
                attempt,
                wait_ms = wait.as_millis() as u64,
                "Delivery attempt failed, retrying: {failure}"
            );
            sleep(wait).await;
            attempt += 1;
        }
    }

    /// HTML text convenience wrapper around [`Notifier::send`]
    pub async fn send_html(
        &self,
        text: impl Into<String>,
        channel: &ChannelId,
    ) -> Result<DeliveryReceipt, DeliveryError> {
        self.send(MessageBody::html(text), channel).await
    }

    fn fit_to_budget(&self, body: MessageBody) -> MessageBody {
        match body {
            MessageBody::Text { text, format } => MessageBody::Text {
                text: truncate_to_budget(&text, self.config.text_budget),
                format,
            },
            MessageBody::File { path, caption } => MessageBody::File {
                path,
                caption: caption.map(|c| truncate_to_budget(&c, self.config.caption_budget)),
            },
        }
    }

    async fn dispatch(&self, body: &MessageBody, channel: &ChannelId) -> ProviderResponse {
        match body {
            MessageBody::Text { text, format } => {
                self.provider.send_text(channel, text, *format).await
            }
            MessageBody::File { path, caption } => {
                self.provider
                    .send_file(channel, path, caption.as_deref(), TextFormat::Html)
                    .await
            }
        }
    }
}
