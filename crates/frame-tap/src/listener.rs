//! Frame filtering, decoding and one-shot capture.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use notify_relay::{ChannelId, MessageBody, Notifier};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::config::TapConfig;
use crate::signal::CompletionSignal;
use crate::store::{PayloadStore, StoredArtifact};
use crate::{clock, summary, FrameHandler, StreamFrame};

/// Where capture notifications go
#[derive(Debug, Clone)]
pub struct CaptureTargets {
    /// Receives the artifact itself
    pub file_channel: ChannelId,
    /// Receives the delivery note and summary
    pub log_channel: ChannelId,
}

/// A decoded frame that matched the discriminator
#[derive(Debug, Clone)]
pub struct CapturedEvent {
    pub raw: String,
    pub payload: Value,
    pub arrived_at: DateTime<Utc>,
}

/// What happened to one inbound frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameDisposition {
    /// Too short or missing the discriminator
    Filtered,
    /// A capture already happened (or is in progress)
    AlreadyCaptured,
    /// Matched the discriminator but was not valid JSON
    DecodeFailed(String),
    /// Decoded but could not be persisted; listening continues
    StoreFailed(String),
    Captured(StoredArtifact),
}

/// Counters exposed for diagnostics
#[derive(Debug, Default)]
pub struct ListenerStats {
    pub frames_seen: AtomicU64,
    pub filtered: AtomicU64,
    pub decode_failures: AtomicU64,
    pub duplicates: AtomicU64,
}

/// Listens on streaming frames and captures the first matching payload
///
/// Safe to invoke from many delivery contexts at once: an internal claim is
/// taken before any side effect, so at most one frame is ever persisted and
/// announced. The shared [`CompletionSignal`] is set only after persistence
/// and delivery have finished.
pub struct EventListener {
    config: TapConfig,
    targets: CaptureTargets,
    signal: Arc<CompletionSignal>,
    store: Arc<PayloadStore>,
    notifier: Arc<Notifier>,
    claimed: AtomicBool,
    stats: ListenerStats,
}

impl EventListener {
    pub fn new(
        config: TapConfig,
        targets: CaptureTargets,
        signal: Arc<CompletionSignal>,
        store: Arc<PayloadStore>,
        notifier: Arc<Notifier>,
    ) -> Self {
        Self {
            config,
            targets,
            signal,
            store,
            notifier,
            claimed: AtomicBool::new(false),
            stats: ListenerStats::default(),
        }
    }

    pub fn signal(&self) -> &Arc<CompletionSignal> {
        &self.signal
    }

    pub fn stats(&self) -> &ListenerStats {
        &self.stats
    }

    /// A frame has been claimed and its capture is still under way, or done
    pub fn is_claimed(&self) -> bool {
        self.claimed.load(Ordering::Acquire)
    }

    /// Run one frame through filter, decode and capture
    pub async fn process(&self, frame: StreamFrame) -> FrameDisposition {
        self.stats.frames_seen.fetch_add(1, Ordering::Relaxed);

        let text = frame.payload.text();
        let min_len = self.config.min_frame_len;
        let too_short = text.len() < min_len || text.chars().count() < min_len;
        if too_short || !text.contains(&self.config.discriminator) {
            self.stats.filtered.fetch_add(1, Ordering::Relaxed);
            return FrameDisposition::Filtered;
        }

        if self.signal.is_set() || self.claimed.load(Ordering::Acquire) {
            self.stats.duplicates.fetch_add(1, Ordering::Relaxed);
            debug!(stream = %frame.stream_id, "Capture already done, dropping frame");
            return FrameDisposition::AlreadyCaptured;
        }

        info!(
            stream = %frame.stream_id,
            bytes = text.len(),
            "Frame matches {}",
            self.config.discriminator
        );
        let payload: Value = match serde_json::from_str(&text) {
            Ok(payload) => payload,
            Err(err) => {
                self.stats.decode_failures.fetch_add(1, Ordering::Relaxed);
                warn!(stream = %frame.stream_id, "Could not decode matching frame: {err}");
                return FrameDisposition::DecodeFailed(err.to_string());
            }
        };

        if self
            .claimed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            self.stats.duplicates.fetch_add(1, Ordering::Relaxed);
            return FrameDisposition::AlreadyCaptured;
        }

        let event = CapturedEvent {
            raw: text.into_owned(),
            payload,
            arrived_at: frame.received_at,
        };
        self.capture(event).await
    }

    async fn capture(&self, event: CapturedEvent) -> FrameDisposition {
        let artifact = match self.store.save(&event.payload).await {
            Ok(artifact) => artifact,
            Err(err) => {
                error!("Failed to persist captured payload: {err}");
                self.claimed.store(false, Ordering::Release);
                return FrameDisposition::StoreFailed(err.to_string());
            }
        };

        let captured_at = clock::to_ist(event.arrived_at);
        let digest = summary::summarize(&event.payload, &captured_at);

        let caption = summary::file_caption(&digest, &captured_at);
        let upload = self
            .notifier
            .send(
                MessageBody::file(&artifact.path, Some(caption)),
                &self.targets.file_channel,
            )
            .await;
        match upload {
            Ok(receipt) => {
                info!(attempts = receipt.attempts, "Artifact delivered");
                let note = summary::file_sent_note(&artifact, &digest);
                if let Err(err) = self
                    .notifier
                    .send_html(note, &self.targets.log_channel)
                    .await
                {
                    warn!("Delivery note not sent: {err}");
                }
            }
            Err(err) => {
                warn!(
                    artifact = %artifact.path.display(),
                    "Artifact delivery failed, capture kept: {err}"
                );
                let note = format!(
                    "⚠️ <b>File delivery failed</b>\n{}\n\n{digest}",
                    summary::escape_html(&err.to_string())
                );
                if let Err(err) = self
                    .notifier
                    .send_html(note, &self.targets.log_channel)
                    .await
                {
                    warn!("Summary not sent: {err}");
                }
            }
        }

        if !self.signal.try_set() {
            warn!("Completion signal was already set");
        }
        info!(artifact = %artifact.path.display(), "Capture complete");
        FrameDisposition::Captured(artifact)
    }
}

#[async_trait]
impl FrameHandler for EventListener {
    async fn on_frame(&self, frame: StreamFrame) {
        self.process(frame).await;
    }

    async fn on_stream_opened(&self, stream_id: &str, url: &str) {
        if url.contains(&self.config.stream_keyword) {
            let base = url.split('?').next().unwrap_or(url);
            info!(stream = %stream_id, "Game stream opened: {base}");
        } else {
            debug!(stream = %stream_id, "Stream opened: {url}");
        }
    }
}
