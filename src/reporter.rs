//! Status reporting
//!
//! Every status line is logged through `tracing`; everything above DEBUG is
//! also relayed to the log channel. Relaying is best-effort: a failed
//! delivery is logged and otherwise ignored.

use std::sync::Arc;
use std::time::Duration;

use action_flow::{AttemptContext, FlowError, PipelineObserver, StepError, StepResult};
use async_trait::async_trait;
use frame_tap::clock;
use frame_tap::summary::escape_html;
use notify_relay::{ChannelId, Notifier};
use tracing::{debug, error, info, warn};

use crate::config::Settings;

const RULE: &str = "━━━━━━━━━━━━━━━━━━━━";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Debug,
    Info,
    Success,
    Warning,
    Error,
}

impl Level {
    pub fn label(self) -> &'static str {
        match self {
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Success => "SUCCESS",
            Level::Warning => "WARNING",
            Level::Error => "ERROR",
        }
    }

    pub fn icon(self) -> &'static str {
        match self {
            Level::Debug => "🔍",
            Level::Info => "ℹ️",
            Level::Success => "✅",
            Level::Warning => "⚠️",
            Level::Error => "❌",
        }
    }
}

/// Relay text for a status line
pub fn relay_text(level: Level, message: &str) -> String {
    format!("{} <b>{}</b>\n{}", level.icon(), level.label(), message)
}

/// Drop the `-100` supergroup prefix for display
fn channel_handle(id: &str) -> String {
    format!("@{}", id.replacen("-100", "", 1))
}

pub struct Reporter {
    notifier: Arc<Notifier>,
    channel: ChannelId,
}

impl Reporter {
    pub fn new(notifier: Arc<Notifier>, channel: ChannelId) -> Self {
        Self { notifier, channel }
    }

    /// Log `message` and relay it unless it is DEBUG. Returns whether it was delivered.
    pub async fn report(&self, level: Level, message: impl AsRef<str>) -> bool {
        let message = message.as_ref();
        match level {
            Level::Debug => {
                debug!("{}", message);
                return false;
            }
            Level::Info | Level::Success => info!(level = level.label(), "{}", message),
            Level::Warning => warn!("{}", message),
            Level::Error => error!("{}", message),
        }

        match self
            .notifier
            .send_html(relay_text(level, message), &self.channel)
            .await
        {
            Ok(_) => true,
            Err(err) => {
                warn!(channel = %self.channel, "status relay failed: {}", err);
                false
            }
        }
    }

    pub async fn announce_startup(&self, settings: &Settings) {
        let started = clock::ist_now();
        let mode = if settings.cdp_ws_url.is_some() {
            "Attached browser"
        } else if settings.headless {
            "Headless browser"
        } else {
            "Headed browser"
        };
        let lines = [
            "🚀 <b>Ice Fishing Monitor Started</b>".to_string(),
            format!("• Start Time: {} IST", clock::time_label(&started)),
            format!("• Mode: {mode}"),
            format!("• Log Channel: {}", channel_handle(&settings.log_chat_id)),
            format!("• File Channel: {}", channel_handle(&settings.file_chat_id)),
        ];
        self.report(Level::Info, format!("{RULE}\n{}\n{RULE}", lines.join("\n")))
            .await;
    }

    pub async fn monitoring_active(&self) {
        let message = format!(
            "🎯 <b>MONITORING ACTIVE</b>\n{RULE}\n\
             • Listening for game data...\n\
             • Spin history will be captured\n\
             • Timezone: IST (UTC+5:30)\n{RULE}"
        );
        self.report(Level::Success, message).await;
    }

    pub async fn execution_error(&self, step: Option<&str>, err: &(dyn std::fmt::Display + Sync)) {
        let reason: String = escape_html(&err.to_string()).chars().take(200).collect();
        let mut message = format!("🔥 <b>EXECUTION ERROR</b>\n{RULE}\n");
        if let Some(step) = step {
            message.push_str(&format!("• Step: {}\n", escape_html(step)));
        }
        message.push_str(&format!(
            "• Error: {reason}\n• Time: {} IST\n{RULE}",
            clock::time_label(&clock::ist_now())
        ));
        self.report(Level::Error, message).await;
    }

    pub async fn stopped(&self, runtime: Duration, reason: &str) {
        let message = format!(
            "🛑 <b>MONITOR STOPPED</b>\n{RULE}\n\
             • End Time: {} IST\n\
             • Runtime: {}s\n\
             • Reason: {}\n{RULE}",
            clock::time_label(&clock::ist_now()),
            runtime.as_secs(),
            reason
        );
        self.report(Level::Info, message).await;
    }
}

#[async_trait]
impl PipelineObserver for Reporter {
    async fn step_started(&self, step: &str, index: usize, total: usize) {
        self.report(Level::Info, format!("▶️ Step {}/{}: {}", index + 1, total, step))
            .await;
    }

    async fn attempt_failed(&self, ctx: &AttemptContext, err: &StepError) {
        let of = ctx
            .max_attempts
            .map(|max| format!("{}/{}", ctx.attempt, max))
            .unwrap_or_else(|| ctx.attempt.to_string());
        let reason: String = escape_html(&err.to_string()).chars().take(100).collect();
        self.report(
            Level::Warning,
            format!("{} attempt {} failed: {}", ctx.step, of, reason),
        )
        .await;
    }

    async fn step_completed(&self, result: &StepResult) {
        let message = match &result.detail {
            Some(detail) => format!("{}: {}", result.step, escape_html(detail)),
            None => format!("{} completed", result.step),
        };
        self.report(Level::Success, message).await;
    }

    async fn run_aborted(&self, err: &FlowError) {
        match err {
            FlowError::Cancelled(step) => {
                self.report(Level::Info, format!("🛑 Monitor stopped by user during {step}"))
                    .await;
            }
            other => self.execution_error(other.step(), other).await,
        }
    }
}
