use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::rate_limit::ThrottleClass;

/// Logical destination for notifications (a chat id for Telegram)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelId(pub String);

impl ChannelId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How the provider should render message text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TextFormat {
    Html,
    Plain,
}

impl TextFormat {
    /// Provider parse mode, if any
    pub fn parse_mode(&self) -> Option<&'static str> {
        match self {
            TextFormat::Html => Some("HTML"),
            TextFormat::Plain => None,
        }
    }
}

/// Body of a notification request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageBody {
    Text { text: String, format: TextFormat },
    File { path: PathBuf, caption: Option<String> },
}

impl MessageBody {
    pub fn html(text: impl Into<String>) -> Self {
        MessageBody::Text {
            text: text.into(),
            format: TextFormat::Html,
        }
    }

    pub fn plain(text: impl Into<String>) -> Self {
        MessageBody::Text {
            text: text.into(),
            format: TextFormat::Plain,
        }
    }

    pub fn file(path: impl Into<PathBuf>, caption: Option<String>) -> Self {
        MessageBody::File {
            path: path.into(),
            caption,
        }
    }

    pub fn throttle_class(&self) -> ThrottleClass {
        match self {
            MessageBody::Text { .. } => ThrottleClass::Text,
            MessageBody::File { .. } => ThrottleClass::File,
        }
    }
}

/// Provider verdict for one call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderStatus {
    Ok,
    RateLimited { retry_after: Option<Duration> },
    ServerError { code: u16, description: String },
    ClientError { code: Option<u16>, description: String },
    NetworkError(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderResponse {
    pub status: ProviderStatus,
}

impl ProviderResponse {
    pub fn ok() -> Self {
        Self {
            status: ProviderStatus::Ok,
        }
    }

    pub fn rate_limited(retry_after: Option<Duration>) -> Self {
        Self {
            status: ProviderStatus::RateLimited { retry_after },
        }
    }

    pub fn server_error(code: u16, description: impl Into<String>) -> Self {
        Self {
            status: ProviderStatus::ServerError {
                code,
                description: description.into(),
            },
        }
    }

    pub fn client_error(code: Option<u16>, description: impl Into<String>) -> Self {
        Self {
            status: ProviderStatus::ClientError {
                code,
                description: description.into(),
            },
        }
    }

    pub fn network_error(description: impl Into<String>) -> Self {
        Self {
            status: ProviderStatus::NetworkError(description.into()),
        }
    }
}

/// Final classification of a send
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryOutcome {
    Success,
    RateLimited,
    TransientError,
    PermanentError,
}

/// Successful delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReceipt {
    /// Attempts used, including the successful one
    pub attempts: u32,

    /// Time spent blocked by the rate limiter, summed over attempts
    pub throttled: Duration,
}

impl DeliveryReceipt {
    pub fn outcome(&self) -> DeliveryOutcome {
        DeliveryOutcome::Success
    }
}
