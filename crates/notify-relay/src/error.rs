use crate::types::DeliveryOutcome;
use thiserror::Error;

/// Delivery gave up on a request
#[derive(Debug, Clone, Error)]
pub enum DeliveryError {
    #[error("rate limited on all {attempts} attempt(s)")]
    RateLimited { attempts: u32 },

    #[error("transient failure after {attempts} attempt(s): {reason}")]
    Transient { attempts: u32, reason: String },

    #[error("rejected by provider: {reason}")]
    Permanent { reason: String },
}

impl DeliveryError {
    pub fn outcome(&self) -> DeliveryOutcome {
        match self {
            DeliveryError::RateLimited { .. } => DeliveryOutcome::RateLimited,
            DeliveryError::Transient { .. } => DeliveryOutcome::TransientError,
            DeliveryError::Permanent { .. } => DeliveryOutcome::PermanentError,
        }
    }
}
