//! Streaming frame tap.
//!
//! Defines the frame model delivered by streaming transports and the
//! [`FrameHandler`] seam they call into. [`EventListener`] is the handler
//! that filters frames by a discriminator, decodes the first match, persists
//! it through [`PayloadStore`], relays it and flips the [`CompletionSignal`].

pub mod clock;
pub mod config;
pub mod listener;
pub mod signal;
pub mod store;
pub mod summary;

use std::borrow::Cow;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use config::TapConfig;
pub use listener::{CaptureTargets, CapturedEvent, EventListener, FrameDisposition, ListenerStats};
pub use signal::CompletionSignal;
pub use store::{PayloadStore, StoreError, StoredArtifact};

/// Content of one frame as delivered by the transport.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FramePayload {
    Text(String),
    Binary(Vec<u8>),
}

impl FramePayload {
    /// Frame content as text; binary frames are decoded lossily as UTF-8.
    pub fn text(&self) -> Cow<'_, str> {
        match self {
            FramePayload::Text(text) => Cow::Borrowed(text),
            FramePayload::Binary(bytes) => String::from_utf8_lossy(bytes),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            FramePayload::Text(text) => text.len(),
            FramePayload::Binary(bytes) => bytes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One discrete message received on a streaming connection.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StreamFrame {
    /// Transport-assigned identifier of the connection
    pub stream_id: String,
    pub payload: FramePayload,
    pub received_at: DateTime<Utc>,
}

impl StreamFrame {
    pub fn text(stream_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            stream_id: stream_id.into(),
            payload: FramePayload::Text(text.into()),
            received_at: Utc::now(),
        }
    }

    pub fn binary(stream_id: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            stream_id: stream_id.into(),
            payload: FramePayload::Binary(bytes),
            received_at: Utc::now(),
        }
    }
}

/// Receives frames from a streaming subscription.
///
/// Transports may invoke a handler from several tasks at once.
#[async_trait]
pub trait FrameHandler: Send + Sync {
    async fn on_frame(&self, frame: StreamFrame);

    /// A new streaming connection was opened.
    async fn on_stream_opened(&self, _stream_id: &str, _url: &str) {}
}
