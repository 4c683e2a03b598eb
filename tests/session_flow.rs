use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use cdp_adapter::{AdapterError, PageControl, WaitCondition};
use frame_tap::{FrameHandler, StreamFrame};
use notify_relay::{
    ChannelId, DeliveryProvider, Notifier, NotifierConfig, ProviderResponse, TextFormat,
};
use serde_json::{json, Value};
use spinwatch::{ExitStatus, Session, Settings};
use tempfile::TempDir;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

const LAUNCHER: &str = "https://evo.example/script/php/launcher.php?token=abc";

#[derive(Default)]
struct RecordingProvider {
    texts: Mutex<Vec<(String, String)>>,
    files: Mutex<Vec<(String, PathBuf)>>,
    upload_time: Duration,
    present_after_upload: Mutex<Vec<bool>>,
}

#[async_trait]
impl DeliveryProvider for RecordingProvider {
    async fn send_text(&self, channel: &ChannelId, text: &str, _: TextFormat) -> ProviderResponse {
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
        _: Option<&str>,
        _: TextFormat,
    ) -> ProviderResponse {
        self.files
            .lock()
            .unwrap()
            .push((channel.to_string(), path.to_path_buf()));
        if !self.upload_time.is_zero() {
            tokio::time::sleep(self.upload_time).await;
        }
        self.present_after_upload
            .lock()
            .unwrap()
            .push(path.exists());
        ProviderResponse::ok()
    }
}

/// In-memory page following a fixed script
struct ScriptedPage {
    casino_present: bool,
    emit_frames: bool,
    launcher_appears: bool,
    calls: Mutex<Vec<String>>,
    broader_probes: AtomicU32,
    load_probe_started: Mutex<Option<Instant>>,
    load_probes: AtomicU32,
    screenshots: Mutex<Vec<PathBuf>>,
}

impl ScriptedPage {
    fn new(casino_present: bool, emit_frames: bool) -> Self {
        Self {
            casino_present,
            emit_frames,
            launcher_appears: true,
            calls: Mutex::new(Vec::new()),
            broader_probes: AtomicU32::new(0),
            load_probe_started: Mutex::new(None),
            load_probes: AtomicU32::new(0),
            screenshots: Mutex::new(Vec::new()),
        }
    }

    fn without_launcher(mut self) -> Self {
        self.launcher_appears = false;
        self
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn count(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }
}

#[async_trait]
impl PageControl for ScriptedPage {
    async fn navigate(&self, url: &str, _timeout: Duration) -> Result<(), AdapterError> {
        self.record(format!("navigate {url}"));
        Ok(())
    }

    async fn wait_for(
        &self,
        condition: &WaitCondition,
        _timeout: Duration,
    ) -> Result<(), AdapterError> {
        self.record(format!("wait {condition}"));
        match condition {
            WaitCondition::UrlContains(_) => Err(AdapterError::timeout("no /home redirect")),
            WaitCondition::Selector(css) if css.contains("avatar") => {
                Err(AdapterError::timeout("no avatar"))
            }
            _ => Ok(()),
        }
    }

    async fn fill(&self, selector: &str, _value: &str) -> Result<(), AdapterError> {
        self.record(format!("fill {selector}"));
        Ok(())
    }

    async fn click(&self, selector: &str) -> Result<(), AdapterError> {
        self.record(format!("click {selector}"));
        Ok(())
    }

    async fn evaluate(&self, script: &str) -> Result<Value, AdapterError> {
        let value = if script.contains("launcher.php") {
            self.load_probes.fetch_add(1, Ordering::SeqCst);
            let started = *self
                .load_probe_started
                .lock()
                .unwrap()
                .get_or_insert_with(Instant::now);
            if self.launcher_appears && started.elapsed() >= Duration::from_secs(5) {
                json!([LAUNCHER])
            } else {
                json!([])
            }
        } else if script.contains("canvases") {
            json!({ "url": "https://evo.example/#game=icefishing", "title": "Ice Fishing", "canvases": 2, "inGame": true })
        } else if script.contains("popout-close") {
            json!(0)
        } else if script.contains("cat-selection-item") {
            json!({ "clicked": self.casino_present, "available": ["Sports", "Slots"] })
        } else if script.contains("error-message") {
            json!({ "errorText": null, "successText": false })
        } else if script.contains("includes('login')") {
            json!(true)
        } else if script.contains(r#"[class*="card"]"#) {
            let probe = self.broader_probes.fetch_add(1, Ordering::SeqCst) + 1;
            self.record(format!("strategy broader #{probe}"));
            json!(probe >= 2)
        } else if script.contains("platform-live") {
            self.record("strategy exact");
            json!(false)
        } else if script.contains("querySelectorAll('*')") {
            self.record("strategy text");
            json!(false)
        } else {
            json!(true)
        };
        Ok(value)
    }

    async fn subscribe_stream(&self, handler: Arc<dyn FrameHandler>) -> Result<(), AdapterError> {
        self.record("subscribe");
        if self.emit_frames {
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(8)).await;
                let malformed = format!(
                    r#"{{"type":"icefishing.spinHistory","args":{{"history":[{}"#,
                    "1,".repeat(60)
                );
                handler.on_frame(StreamFrame::text("ws-1", malformed)).await;
                let good = json!({
                    "type": "icefishing.spinHistory",
                    "tableId": "IceFishing000001",
                    "data": { "spinHistory": [{ "bet": 10, "win": 25, "multiplier": 2.5 }] }
                });
                handler.on_frame(StreamFrame::text("ws-1", good.to_string())).await;
            });
        }
        Ok(())
    }

    async fn screenshot(&self, path: &Path) -> Result<(), AdapterError> {
        self.screenshots.lock().unwrap().push(path.to_path_buf());
        Ok(())
    }

    async fn reload(&self, _timeout: Duration) -> Result<(), AdapterError> {
        self.record("reload");
        Ok(())
    }

    async fn current_url(&self) -> Result<String, AdapterError> {
        Ok("https://ind.55ace.com/lobby".to_string())
    }
}

fn settings(dir: &TempDir, extra: &[(&str, &str)]) -> Settings {
    let mut vars = vec![
        ("PHONE".to_string(), "0987654321".to_string()),
        ("PASSWORD".to_string(), "hunter2".to_string()),
        ("BOT_TOKEN".to_string(), "123:abc".to_string()),
        ("LOG_CHAT_ID".to_string(), "-100log".to_string()),
        ("FILE_CHAT_ID".to_string(), "-100file".to_string()),
        (
            "OUTPUT_DIR".to_string(),
            dir.path().to_string_lossy().into_owned(),
        ),
    ];
    vars.extend(extra.iter().map(|(k, v)| (k.to_string(), v.to_string())));
    Settings::from_vars(vars).unwrap()
}

fn json_files(dir: &Path) -> Vec<PathBuf> {
    std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
        .collect()
}

fn session(settings: Settings) -> (Arc<RecordingProvider>, Session) {
    session_with(settings, RecordingProvider::default())
}

fn session_with(settings: Settings, provider: RecordingProvider) -> (Arc<RecordingProvider>, Session) {
    let provider = Arc::new(provider);
    let notifier = Arc::new(Notifier::new(provider.clone(), NotifierConfig::default()));
    (provider, Session::new(settings, notifier))
}

#[tokio::test(start_paused = true)]
async fn scripted_run_captures_once_and_exits_cleanly() {
    let dir = tempfile::tempdir().unwrap();
    let (provider, session) = session(settings(&dir, &[]));
    let page = Arc::new(ScriptedPage::new(true, true));

    let status = session.execute(page.clone()).await;
    assert_eq!(status, ExitStatus::Captured);
    assert_eq!(status.code(), 0);

    // login confirmed on the first attempt through the URL change
    assert_eq!(page.count("navigate https://ind.55ace.com/login"), 1);
    assert_eq!(page.count("fill "), 2);

    // platform matched by the broader strategy on the second attempt
    let strategies: Vec<_> = page
        .calls()
        .into_iter()
        .filter(|c| c.starts_with("strategy"))
        .collect();
    assert_eq!(
        strategies,
        [
            "strategy exact",
            "strategy broader #1",
            "strategy text",
            "strategy exact",
            "strategy broader #2"
        ]
    );
    assert!(page.screenshots.lock().unwrap().is_empty());

    // load confirmed after about five seconds of polling
    let probes = page.load_probes.load(Ordering::SeqCst);
    assert!((6..=8).contains(&probes), "load probes: {probes}");

    // steps ran strictly in order
    let calls = page.calls();
    let position = |needle: &str| calls.iter().position(|c| c.contains(needle)).unwrap();
    assert!(position("login") < position("cat-selection-item"));
    assert!(position("cat-selection-item") < position("strategy exact"));
    assert!(position("strategy broader #2") < position("subscribe"));
    assert!(position("subscribe") < position("game=icefishing"));

    assert!(session.signal().is_set());
    let stored = json_files(dir.path());
    assert_eq!(stored.len(), 1);
    let saved: Value = serde_json::from_str(&std::fs::read_to_string(&stored[0]).unwrap()).unwrap();
    assert_eq!(saved["data"]["spinHistory"][0]["win"], 25);

    {
        let files = provider.files.lock().unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].0, "-100file");
    }

    session.finish(status).await;
    assert!(json_files(dir.path()).is_empty());
    let texts = provider.texts.lock().unwrap();
    assert!(texts.iter().any(|(_, t)| t.contains("MONITORING ACTIVE")));
    assert!(texts.last().unwrap().1.contains("MONITOR STOPPED"));
    assert!(texts.iter().all(|(channel, _)| channel == "-100log"));
}

#[tokio::test(start_paused = true)]
async fn exhausted_step_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let (provider, session) = session(settings(&dir, &[]));
    let page = Arc::new(ScriptedPage::new(false, true));

    let status = session.execute(page.clone()).await;
    assert_eq!(status, ExitStatus::FatalStep);
    assert_eq!(status.code(), 2);

    assert_eq!(page.count("wait selector '.cat-selection-item'"), 3);
    assert_eq!(page.count("strategy"), 0);
    assert_eq!(page.count("subscribe"), 0);
    assert!(json_files(dir.path()).is_empty());

    let texts = provider.texts.lock().unwrap();
    let error = texts
        .iter()
        .find(|(_, t)| t.contains("EXECUTION ERROR"))
        .expect("error report");
    assert!(error.1.contains("• Step: casino"));
    assert!(error.1.contains("Casino section not found"));
}

#[tokio::test(start_paused = true)]
async fn max_runtime_without_capture() {
    let dir = tempfile::tempdir().unwrap();
    let (_provider, session) = session(settings(&dir, &[("MAX_RUNTIME_SECS", "600")]));
    let page = Arc::new(ScriptedPage::new(true, false));

    let status = session.execute(page).await;
    assert_eq!(status, ExitStatus::MaxRuntime);
    assert_eq!(status.code(), 3);
    assert!(!session.signal().is_set());
}

#[tokio::test(start_paused = true)]
async fn interrupt_while_waiting_unwinds() {
    let dir = tempfile::tempdir().unwrap();
    let cancel = CancellationToken::new();
    let (provider, session) = session(settings(&dir, &[]));
    let session = session.with_cancellation(cancel.clone());
    let page = Arc::new(ScriptedPage::new(true, false));

    let trigger = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(3_600)).await;
        cancel.cancel();
    });

    let status = session.execute(page).await;
    trigger.await.unwrap();
    assert_eq!(status, ExitStatus::Interrupted);
    assert_eq!(status.code(), 130);

    session.finish(status).await;
    let texts = provider.texts.lock().unwrap();
    assert!(texts.last().unwrap().1.contains("stopped by user"));
}

#[tokio::test(start_paused = true)]
async fn step_failure_during_delivery_waits_for_the_capture() {
    let dir = tempfile::tempdir().unwrap();
    let provider = RecordingProvider {
        upload_time: Duration::from_secs(100),
        ..RecordingProvider::default()
    };
    let (provider, session) = session_with(settings(&dir, &[]), provider);
    let page = Arc::new(ScriptedPage::new(true, true).without_launcher());

    // the load step gives up while the artifact upload is still running
    let status = session.execute(page.clone()).await;
    assert_eq!(status, ExitStatus::Captured);
    assert!(session.signal().is_set());
    assert_eq!(provider.files.lock().unwrap().len(), 1);
    assert_eq!(*provider.present_after_upload.lock().unwrap(), vec![true]);
    assert_eq!(page.count("navigate https://evo"), 0);

    session.finish(status).await;
    assert!(json_files(dir.path()).is_empty());
}

#[tokio::test(start_paused = true)]
async fn finish_holds_cleanup_until_upload_completes() {
    let dir = tempfile::tempdir().unwrap();
    let cancel = CancellationToken::new();
    let provider = RecordingProvider {
        upload_time: Duration::from_secs(20),
        ..RecordingProvider::default()
    };
    let (provider, session) = session_with(settings(&dir, &[]), provider);
    let session = session.with_cancellation(cancel.clone());
    let page = Arc::new(ScriptedPage::new(true, true));

    // interrupted while the game page settles and the upload is still running
    let watched = page.clone();
    let trigger = tokio::spawn(async move {
        while watched.count("subscribe") == 0 {
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
        tokio::time::sleep(Duration::from_secs(12)).await;
        cancel.cancel();
    });

    let status = session.execute(page).await;
    trigger.await.unwrap();
    assert_eq!(status, ExitStatus::Captured);
    assert_eq!(*provider.present_after_upload.lock().unwrap(), vec![true]);

    session.finish(status).await;
    assert!(json_files(dir.path()).is_empty());
}
