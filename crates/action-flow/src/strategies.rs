//! Failure handling strategies

use crate::errors::StepError;
use crate::types::{AttemptContext, RetryPolicy};
use tokio::time::Duration;
use tracing::{debug, info, warn};

/// Decides what happens after an unsuccessful step attempt
pub trait FailureHandler: Send + Sync {
    /// Handle an attempt failure according to the step's policy
    fn handle_failure(
        &self,
        policy: RetryPolicy,
        ctx: &AttemptContext,
        error: &StepError,
    ) -> FailureHandlerResult;

    /// Check if another attempt is allowed
    fn should_retry(&self, policy: RetryPolicy, ctx: &AttemptContext) -> bool;

    /// Delay before the next attempt
    fn calculate_backoff(&self, policy: RetryPolicy, attempt: u32) -> Duration;
}

/// Result of failure handling
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureHandlerResult {
    /// Abort the run; the last error becomes fatal
    Abort,

    /// Retry the current step after `backoff`
    Retry { attempt: u32, backoff: Duration },
}

/// Fixed-delay retry for attempt steps, fixed-interval probing for poll steps
pub struct DefaultFailureHandler;

impl DefaultFailureHandler {
    pub fn new() -> Self {
        Self
    }
}

impl Default for DefaultFailureHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl FailureHandler for DefaultFailureHandler {
    fn handle_failure(
        &self,
        policy: RetryPolicy,
        ctx: &AttemptContext,
        error: &StepError,
    ) -> FailureHandlerResult {
        if !self.should_retry(policy, ctx) {
            warn!(
                step = %ctx.step,
                attempt = ctx.attempt,
                "Step exhausted its policy: {}",
                error
            );
            return FailureHandlerResult::Abort;
        }

        let backoff = self.calculate_backoff(policy, ctx.attempt);
        match policy {
            RetryPolicy::Attempts { max_attempts, .. } => {
                info!(
                    step = %ctx.step,
                    attempt = ctx.attempt,
                    max_attempts,
                    timeout = error.is_timeout(),
                    "Step attempt failed, retrying after {}ms: {}",
                    backoff.as_millis(),
                    error
                );
            }
            RetryPolicy::Poll { .. } => {
                debug!(step = %ctx.step, probe = ctx.attempt, "Probe negative: {}", error);
            }
        }

        FailureHandlerResult::Retry {
            attempt: ctx.attempt + 1,
            backoff,
        }
    }

    fn should_retry(&self, policy: RetryPolicy, ctx: &AttemptContext) -> bool {
        match policy {
            RetryPolicy::Attempts { max_attempts, .. } => ctx.attempt < max_attempts,
            RetryPolicy::Poll {
                interval_ms,
                timeout_ms,
            } => {
                let next_probe = ctx.elapsed + Duration::from_millis(interval_ms);
                next_probe <= Duration::from_millis(timeout_ms)
            }
        }
    }

    fn calculate_backoff(&self, policy: RetryPolicy, _attempt: u32) -> Duration {
        match policy {
            RetryPolicy::Attempts { backoff_ms, .. } => Duration::from_millis(backoff_ms),
            RetryPolicy::Poll { interval_ms, .. } => Duration::from_millis(interval_ms),
        }
    }
}
