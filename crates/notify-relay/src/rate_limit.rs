//! Cooperative send throttling
//!
//! Callers block until the global and per-channel minimum spacings have
//! elapsed. The state lock is held across the wait, so concurrent callers
//! are granted in submission order.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};
use tracing::debug;

use crate::types::ChannelId;

/// Which per-channel spacing applies to a send
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ThrottleClass {
    Text,
    File,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThrottleConfig {
    /// Minimum spacing between any two sends
    pub global_interval_ms: u64,
    /// Minimum spacing between two sends on the same channel
    pub channel_interval_ms: u64,
    /// Minimum spacing between two file sends on the same channel
    pub file_interval_ms: u64,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            global_interval_ms: 1_000,
            channel_interval_ms: 2_000,
            file_interval_ms: 30_000,
        }
    }
}

impl ThrottleConfig {
    /// No spacing at all
    pub fn unthrottled() -> Self {
        Self {
            global_interval_ms: 0,
            channel_interval_ms: 0,
            file_interval_ms: 0,
        }
    }
}

#[derive(Default)]
struct LimiterState {
    global_last: Option<Instant>,
    channel_last: HashMap<ChannelId, Instant>,
    file_last: HashMap<ChannelId, Instant>,
}

/// Process-wide send limiter
pub struct RateLimiter {
    config: ThrottleConfig,
    state: Mutex<LimiterState>,
}

impl RateLimiter {
    pub fn new(config: ThrottleConfig) -> Self {
        Self {
            config,
            state: Mutex::new(LimiterState::default()),
        }
    }

    /// Wait for a send slot on `channel` and claim it
    ///
    /// Returns how long the caller was held back.
    pub async fn acquire(&self, channel: &ChannelId, class: ThrottleClass) -> Duration {
        let mut state = self.state.lock().await;
        let requested = Instant::now();

        let mut ready_at = requested;
        let mut push = |last: Option<&Instant>, interval_ms: u64| {
            if let Some(last) = last {
                let earliest = *last + Duration::from_millis(interval_ms);
                if earliest > ready_at {
                    ready_at = earliest;
                }
            }
        };
        push(state.global_last.as_ref(), self.config.global_interval_ms);
        push(
            state.channel_last.get(channel),
            self.config.channel_interval_ms,
        );
        if class == ThrottleClass::File {
            push(state.file_last.get(channel), self.config.file_interval_ms);
        }

        if ready_at > requested {
            debug!(
                channel = %channel,
                wait_ms = (ready_at - requested).as_millis() as u64,
                "Throttling send"
            );
            sleep_until(ready_at).await;
        }

        let granted = Instant::now();
        state.global_last = Some(granted);
        state.channel_last.insert(channel.clone(), granted);
        if class == ThrottleClass::File {
            state.file_last.insert(channel.clone(), granted);
        }
        granted - requested
    }
}
