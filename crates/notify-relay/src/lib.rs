//! Outbound notification relay
//!
//! [`Notifier`] sends text messages and file artifacts to named channels
//! through a [`DeliveryProvider`]. Every send first passes a process-wide
//! [`RateLimiter`]; failed attempts are retried according to the provider's
//! verdict (rate limited, transient, permanent).

pub mod error;
pub mod notifier;
pub mod provider;
pub mod rate_limit;
pub mod telegram;
pub mod types;

pub use error::DeliveryError;
pub use notifier::{truncate_to_budget, Notifier, NotifierConfig};
pub use provider::DeliveryProvider;
pub use rate_limit::{RateLimiter, ThrottleClass, ThrottleConfig};
pub use telegram::TelegramProvider;
pub use types::{
    ChannelId, DeliveryOutcome, DeliveryReceipt, MessageBody, ProviderResponse, ProviderStatus,
    TextFormat,
};
