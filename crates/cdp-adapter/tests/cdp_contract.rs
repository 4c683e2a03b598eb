//! Contract tests against a real Chromium binary. Ignored by default; set
//! SPINWATCH_CDP_CONTRACT=1 (and optionally CHROME_PATH) to run them.

use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cdp_adapter::{AdapterErrorKind, CdpAdapter, CdpConfig, PageControl, WaitCondition};
use frame_tap::{FrameHandler, StreamFrame};
use tokio::sync::Mutex;

const FORM_PAGE: &str = "data:text/html,<input id='user' autocomplete='username'>\
<button id='go' onclick=\"document.title='clicked:'+document.getElementById('user').value\">Login</button>";

fn contract_enabled() -> bool {
    env::var("SPINWATCH_CDP_CONTRACT")
        .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false)
}

fn contract_config(profile: &tempfile::TempDir) -> CdpConfig {
    CdpConfig {
        executable: env::var("CHROME_PATH").ok().map(PathBuf::from),
        user_data_dir: profile.path().to_path_buf(),
        ..CdpConfig::default()
    }
}

#[derive(Default)]
struct Collect {
    opened: Mutex<Vec<String>>,
    frames: Mutex<Vec<StreamFrame>>,
}

#[async_trait]
impl FrameHandler for Collect {
    async fn on_frame(&self, frame: StreamFrame) {
        self.frames.lock().await.push(frame);
    }

    async fn on_stream_opened(&self, _stream_id: &str, url: &str) {
        self.opened.lock().await.push(url.to_string());
    }
}

#[tokio::test]
#[ignore = "requires Chrome/Chromium; set SPINWATCH_CDP_CONTRACT=1"]
async fn contract_fill_click_and_wait() {
    if !contract_enabled() {
        eprintln!("skipping CDP contract test (SPINWATCH_CDP_CONTRACT not enabled)");
        return;
    }

    let profile = tempfile::tempdir().unwrap();
    let adapter = CdpAdapter::launch(contract_config(&profile))
        .await
        .expect("launch chromium");
    let page = adapter.open_page().await.expect("open page");

    page.navigate(FORM_PAGE, Duration::from_secs(15))
        .await
        .expect("navigate succeeds");
    page.wait_for(
        &WaitCondition::selector("input[autocomplete='username']"),
        Duration::from_secs(5),
    )
    .await
    .expect("input present");
    page.fill("#user", "0987654321").await.expect("fill succeeds");
    page.click("#go").await.expect("click succeeds");
    page.wait_for(
        &WaitCondition::predicate("document.title === 'clicked:0987654321'"),
        Duration::from_secs(5),
    )
    .await
    .expect("click handler ran");

    let err = page
        .wait_for(&WaitCondition::selector("#missing"), Duration::from_secs(1))
        .await
        .unwrap_err();
    assert_eq!(err.kind, AdapterErrorKind::Timeout);

    let shot = profile.path().join("form.png");
    page.screenshot(&shot).await.expect("screenshot");
    assert!(shot.exists());

    adapter.shutdown().await;
}

#[tokio::test]
#[ignore = "requires Chrome/Chromium and network access; set SPINWATCH_CDP_CONTRACT=1"]
async fn contract_forwards_websocket_frames() {
    if !contract_enabled() {
        eprintln!("skipping CDP contract test (SPINWATCH_CDP_CONTRACT not enabled)");
        return;
    }

    let profile = tempfile::tempdir().unwrap();
    let adapter = CdpAdapter::launch(contract_config(&profile))
        .await
        .expect("launch chromium");
    let page = adapter.open_page().await.expect("open page");
    let collect = Arc::new(Collect::default());
    page.subscribe_stream(collect.clone()).await.expect("subscribe");

    page.evaluate(
        "(() => { const ws = new WebSocket('wss://echo.websocket.org'); \
         ws.onopen = () => ws.send('x'.repeat(128)); return true; })()",
    )
    .await
    .expect("open socket");

    let start = std::time::Instant::now();
    while start.elapsed() < Duration::from_secs(15) && collect.frames.lock().await.is_empty() {
        tokio::time::sleep(Duration::from_millis(200)).await;
    }

    assert!(!collect.opened.lock().await.is_empty(), "stream open not seen");
    assert!(!collect.frames.lock().await.is_empty(), "no frames forwarded");
    adapter.shutdown().await;
}
