use async_trait::async_trait;
use frame_tap::{
    CaptureTargets, CompletionSignal, EventListener, FrameDisposition, PayloadStore, StreamFrame,
    TapConfig,
};
use notify_relay::{
    ChannelId, DeliveryProvider, Notifier, NotifierConfig, ProviderResponse, TextFormat,
    ThrottleConfig,
};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

#[derive(Default)]
struct RecordingProvider {
    texts: Mutex<Vec<(String, String)>>,
    files: Mutex<Vec<(String, PathBuf, Option<String>)>>,
    reject_files: bool,
}

#[async_trait]
impl DeliveryProvider for RecordingProvider {
    async fn send_text(
        &self,
        channel: &ChannelId,
        text: &str,
        _format: TextFormat,
    ) -> ProviderResponse {
        self.texts
            .lock()
            .unwrap()
            .push((channel.to_string(), text.to_string()));
        ProviderResponse::ok()
    }

    async fn send_file(
        &self,
        channel: &ChannelId,
        path: &Path,
        caption: Option<&str>,
        _format: TextFormat,
    ) -> ProviderResponse {
        self.files.lock().unwrap().push((
            channel.to_string(),
            path.to_path_buf(),
            caption.map(str::to_string),
        ));
        if self.reject_files {
            ProviderResponse::client_error(Some(413), "Request Entity Too Large")
        } else {
            ProviderResponse::ok()
        }
    }
}

struct Harness {
    dir: TempDir,
    provider: Arc<RecordingProvider>,
    signal: Arc<CompletionSignal>,
    listener: Arc<EventListener>,
}

fn harness(provider: RecordingProvider) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let provider = Arc::new(provider);
    let notifier = Arc::new(Notifier::new(
        provider.clone(),
        NotifierConfig {
            throttle: ThrottleConfig::unthrottled(),
            transient_backoff_ms: 1,
            ..NotifierConfig::default()
        },
    ));
    let signal = Arc::new(CompletionSignal::new());
    let store = Arc::new(PayloadStore::new(dir.path(), "spinHistory"));
    let listener = Arc::new(EventListener::new(
        TapConfig::default(),
        CaptureTargets {
            file_channel: ChannelId::new("files"),
            log_channel: ChannelId::new("log"),
        },
        signal.clone(),
        store,
        notifier,
    ));
    Harness {
        dir,
        provider,
        signal,
        listener,
    }
}

fn spin_frame(bet: u32) -> String {
    json!({
        "id": "a1b2c3d4e5f6",
        "type": "icefishing.spinHistory",
        "time": 1714545000000u64,
        "data": {"spinHistory": [{"bet": bet, "win": bet * 2, "multiplier": 2}]}
    })
    .to_string()
}

fn stored_files(dir: &TempDir) -> usize {
    std::fs::read_dir(dir.path()).unwrap().count()
}

#[tokio::test]
async fn frames_without_discriminator_or_too_short_are_filtered() {
    let h = harness(RecordingProvider::default());

    let short = StreamFrame::text("ws-1", r#"{"type":"icefishing.spinHistory"}"#);
    assert_eq!(h.listener.process(short).await, FrameDisposition::Filtered);

    let unrelated = StreamFrame::text(
        "ws-1",
        format!("{{\"type\":\"lobby.tick\",\"pad\":\"{}\"}}", "x".repeat(200)),
    );
    assert_eq!(h.listener.process(unrelated).await, FrameDisposition::Filtered);

    assert!(!h.signal.is_set());
    assert_eq!(stored_files(&h.dir), 0);
    assert_eq!(h.listener.stats().filtered.load(Ordering::Relaxed), 2);
}

#[tokio::test]
async fn frame_length_counts_characters_not_bytes() {
    let h = harness(RecordingProvider::default());

    // 82 characters, 122 bytes
    let accented = format!(
        "{{\"type\":\"icefishing.spinHistory\",\"pad\":\"{}\"}}",
        "é".repeat(40)
    );
    assert!(accented.len() >= 100);
    assert_eq!(
        h.listener.process(StreamFrame::text("ws-1", accented)).await,
        FrameDisposition::Filtered
    );
    assert!(!h.listener.is_claimed());

    let disposition = h.listener.process(StreamFrame::text("ws-1", spin_frame(5))).await;
    assert!(matches!(disposition, FrameDisposition::Captured(_)));
    assert!(h.listener.is_claimed());
    assert!(h.signal.is_set());
}

#[tokio::test]
async fn only_first_matching_frame_is_captured() {
    let h = harness(RecordingProvider::default());

    let first = h
        .listener
        .process(StreamFrame::text("ws-1", spin_frame(10)))
        .await;
    let second = h
        .listener
        .process(StreamFrame::text("ws-1", spin_frame(20)))
        .await;

    let FrameDisposition::Captured(artifact) = first else {
        panic!("first frame not captured: {first:?}");
    };
    assert_eq!(second, FrameDisposition::AlreadyCaptured);
    assert!(h.signal.is_set());
    assert_eq!(stored_files(&h.dir), 1);

    let files = h.provider.files.lock().unwrap().clone();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].0, "files");
    assert_eq!(files[0].1, artifact.path);
    let caption = files[0].2.as_deref().unwrap();
    assert!(caption.contains("• Bet: 10"));
    assert!(caption.contains("• Win: 20"));

    let texts = h.provider.texts.lock().unwrap().clone();
    assert_eq!(texts.len(), 1);
    assert_eq!(texts[0].0, "log");
    assert!(texts[0].1.contains(&artifact.file_name()));
}

#[tokio::test]
async fn malformed_frame_is_skipped_and_listening_continues() {
    let h = harness(RecordingProvider::default());

    let broken = format!(
        "{{\"type\":\"icefishing.spinHistory\",\"data\":{{\"spinHistory\":[{{\"bet\":{}",
        "1".repeat(120)
    );
    let outcome = h.listener.process(StreamFrame::text("ws-1", broken)).await;
    assert!(matches!(outcome, FrameDisposition::DecodeFailed(_)));
    assert!(!h.signal.is_set());
    assert_eq!(stored_files(&h.dir), 0);

    let outcome = h
        .listener
        .process(StreamFrame::text("ws-1", spin_frame(5)))
        .await;
    assert!(matches!(outcome, FrameDisposition::Captured(_)));
    assert!(h.signal.is_set());
    assert_eq!(h.listener.stats().decode_failures.load(Ordering::Relaxed), 1);
}

#[tokio::test]
async fn binary_frames_are_decoded() {
    let h = harness(RecordingProvider::default());

    let outcome = h
        .listener
        .process(StreamFrame::binary("ws-2", spin_frame(7).into_bytes()))
        .await;
    assert!(matches!(outcome, FrameDisposition::Captured(_)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_matching_frames_capture_once() {
    let h = harness(RecordingProvider::default());

    let mut handles = Vec::new();
    for i in 0..8 {
        let listener = h.listener.clone();
        handles.push(tokio::spawn(async move {
            listener
                .process(StreamFrame::text(format!("ws-{i}"), spin_frame(i)))
                .await
        }));
    }

    let mut captured = 0;
    for handle in handles {
        match handle.await.unwrap() {
            FrameDisposition::Captured(_) => captured += 1,
            FrameDisposition::AlreadyCaptured => {}
            other => panic!("unexpected disposition: {other:?}"),
        }
    }

    assert_eq!(captured, 1);
    assert_eq!(stored_files(&h.dir), 1);
    assert_eq!(h.provider.files.lock().unwrap().len(), 1);
    assert!(h.signal.is_set());
}

#[tokio::test]
async fn delivery_failure_does_not_undo_capture() {
    let h = harness(RecordingProvider {
        reject_files: true,
        ..RecordingProvider::default()
    });

    let outcome = h
        .listener
        .process(StreamFrame::text("ws-1", spin_frame(3)))
        .await;
    let FrameDisposition::Captured(artifact) = outcome else {
        panic!("capture expected");
    };
    assert!(artifact.path.exists());
    assert!(h.signal.is_set());

    let texts = h.provider.texts.lock().unwrap().clone();
    assert_eq!(texts.len(), 1);
    assert!(texts[0].1.contains("File delivery failed"));
}
