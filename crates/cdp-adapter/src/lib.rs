//! Chromium DevTools Protocol adapter.
//!
//! Launches (or attaches to) one Chromium instance, tracks its page targets
//! and exposes every page through the [`PageControl`] surface. WebSocket
//! traffic observed by a page is forwarded to registered
//! [`frame_tap::FrameHandler`]s.

use std::path::PathBuf;

use which::which;

pub mod metrics;
pub mod page;
pub mod registry;
pub mod transport;
pub mod util;

pub use adapter::CdpAdapter;
pub use config::{CdpConfig, PageProfile};
pub use error::{AdapterError, AdapterErrorKind};
pub use ids::{BrowserId, PageId};
pub use page::{PageControl, PageSession, WaitCondition};

pub mod ids {
    use serde::{Deserialize, Serialize};
    use uuid::Uuid;

    /// Unique identifier for the browser instance managed by the adapter.
    #[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
    pub struct BrowserId(pub Uuid);

    /// Unique identifier for a page/tab.
    #[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
    pub struct PageId(pub Uuid);

    impl BrowserId {
        pub fn new() -> Self {
            Self(Uuid::new_v4())
        }
    }

    impl PageId {
        pub fn new() -> Self {
            Self(Uuid::new_v4())
        }
    }
}

pub mod error {
    use serde::{Deserialize, Serialize};
    use std::fmt;
    use thiserror::Error;

    /// High-level error categories surfaced by the adapter.
    #[derive(Clone, Debug, Error, PartialEq, Eq, Serialize, Deserialize)]
    pub enum AdapterErrorKind {
        /// A bounded wait expired
        #[error("timed out")]
        Timeout,
        #[error("cdp i/o failure")]
        CdpIo,
        #[error("target element not found")]
        TargetNotFound,
        #[error("script raised an exception")]
        ScriptError,
        #[error("internal error")]
        Internal,
    }

    /// Enriched error metadata passed back to higher layers.
    #[derive(Clone, Debug, Serialize, Deserialize)]
    pub struct AdapterError {
        pub kind: AdapterErrorKind,
        pub hint: Option<String>,
        pub retriable: bool,
        pub data: Option<serde_json::Value>,
    }

    impl fmt::Display for AdapterError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{}", self.kind)?;
            if let Some(hint) = &self.hint {
                write!(f, ": {}", hint)?;
            }
            Ok(())
        }
    }

    impl std::error::Error for AdapterError {}

    impl AdapterError {
        pub fn new(kind: AdapterErrorKind) -> Self {
            Self {
                kind,
                hint: None,
                retriable: false,
                data: None,
            }
        }

        pub fn timeout(hint: impl Into<String>) -> Self {
            Self::new(AdapterErrorKind::Timeout)
                .with_hint(hint)
                .retriable(true)
        }

        pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
            self.hint = Some(hint.into());
            self
        }

        pub fn retriable(mut self, flag: bool) -> Self {
            self.retriable = flag;
            self
        }

        pub fn with_data(mut self, data: serde_json::Value) -> Self {
            self.data = Some(data);
            self
        }

        pub fn is_timeout(&self) -> bool {
            self.kind == AdapterErrorKind::Timeout
        }
    }
}

pub mod config {
    use serde::{Deserialize, Serialize};
    use std::path::PathBuf;

    /// Chromium flags applied on every launch.
    pub const DEFAULT_LAUNCH_ARGS: &[&str] = &[
        "--no-sandbox",
        "--disable-blink-features=AutomationControlled",
        "--disable-dev-shm-usage",
        "--disable-gpu",
        "--disable-quic",
        "--window-size=1920,1080",
        "--mute-audio",
        "--ignore-certificate-errors",
        "--no-first-run",
        "--no-default-browser-check",
        "--password-store=basic",
        "--remote-allow-origins=*",
    ];

    /// Emulation applied to every page the adapter opens.
    #[derive(Clone, Debug, Serialize, Deserialize)]
    pub struct PageProfile {
        pub user_agent: String,
        pub timezone: String,
        pub locale: String,
        pub viewport_width: u32,
        pub viewport_height: u32,
    }

    impl Default for PageProfile {
        fn default() -> Self {
            Self {
                user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                             (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36"
                    .to_string(),
                timezone: "Asia/Kolkata".to_string(),
                locale: "en-US".to_string(),
                viewport_width: 1920,
                viewport_height: 1080,
            }
        }
    }

    /// Configuration for launching and tuning the adapter.
    #[derive(Clone, Debug, Serialize, Deserialize)]
    pub struct CdpConfig {
        /// Explicit browser binary; detected from PATH and OS locations when unset
        pub executable: Option<PathBuf>,
        pub user_data_dir: PathBuf,
        pub headless: bool,
        /// Upper bound for a single CDP command round trip
        pub default_deadline_ms: u64,
        /// Attach to an already running browser instead of launching one
        pub websocket_url: Option<String>,
        pub heartbeat_interval_ms: u64,
        pub launch_args: Vec<String>,
        pub profile: PageProfile,
    }

    impl Default for CdpConfig {
        fn default() -> Self {
            Self {
                executable: None,
                user_data_dir: PathBuf::from("./.spinwatch-profile"),
                headless: true,
                default_deadline_ms: 60_000,
                websocket_url: None,
                heartbeat_interval_ms: 15_000,
                launch_args: DEFAULT_LAUNCH_ARGS.iter().map(|arg| arg.to_string()).collect(),
                profile: PageProfile::default(),
            }
        }
    }
}

/// Locate a Chromium-family browser on this machine.
pub fn detect_chrome_executable() -> Option<PathBuf> {
    for name in chrome_executable_names() {
        if let Ok(path) = which(name) {
            return Some(path);
        }
    }

    os_specific_chrome_paths()
        .into_iter()
        .find(|candidate| candidate.exists())
}

/// Browser binary for `cfg`, or an error describing why none is usable.
pub fn resolve_executable(cfg: &CdpConfig) -> Result<PathBuf, AdapterError> {
    match &cfg.executable {
        Some(path) if path.exists() => Ok(path.clone()),
        Some(path) => Err(AdapterError::new(AdapterErrorKind::CdpIo)
            .with_hint(format!("chrome executable not found at {}", path.display()))),
        None => detect_chrome_executable().ok_or_else(|| {
            AdapterError::new(AdapterErrorKind::CdpIo)
                .with_hint("no Chrome/Chromium executable found; set CHROME_PATH or CDP_WS_URL")
        }),
    }
}

fn chrome_executable_names() -> &'static [&'static str] {
    #[cfg(target_os = "windows")]
    {
        &["chrome.exe", "chromium.exe", "msedge.exe"]
    }

    #[cfg(not(target_os = "windows"))]
    {
        &[
            "google-chrome-stable",
            "google-chrome",
            "chromium",
            "chromium-browser",
        ]
    }
}

fn os_specific_chrome_paths() -> Vec<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        let mut paths = Vec::new();
        for key in ["PROGRAMFILES", "PROGRAMFILES(X86)", "LOCALAPPDATA"] {
            if let Ok(root) = std::env::var(key) {
                let root = PathBuf::from(root.trim());
                paths.push(root.join("Google/Chrome/Application/chrome.exe"));
                paths.push(root.join("Chromium/Application/chrome.exe"));
            }
        }
        paths
    }

    #[cfg(target_os = "macos")]
    {
        vec![
            PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome"),
            PathBuf::from("/Applications/Chromium.app/Contents/MacOS/Chromium"),
        ]
    }

    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        vec![
            PathBuf::from("/usr/bin/google-chrome-stable"),
            PathBuf::from("/usr/bin/google-chrome"),
            PathBuf::from("/usr/bin/chromium-browser"),
            PathBuf::from("/usr/bin/chromium"),
        ]
    }
}


pub mod adapter {
    use super::config::CdpConfig;
    use super::error::{AdapterError, AdapterErrorKind};
    use super::ids::{BrowserId, PageId};
    use super::metrics;
    use super::page::{PageSession, WaitCondition};
    use super::registry::Registry;
    use super::transport::{CdpTransport, ChromiumTransport, CommandTarget, TransportEvent};
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use dashmap::DashMap;
    use frame_tap::{FrameHandler, StreamFrame};
    use serde::Deserialize;
    use serde_json::{json, Value};
    use std::path::Path;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::Mutex;
    use tokio::task::JoinHandle;
    use tokio::time::{sleep, Instant};
    use tokio::{select, spawn};
    use tokio_util::sync::CancellationToken;
    use tracing::{debug, info, warn};

    const POLL_INTERVAL: Duration = Duration::from_millis(250);
    const ATTACH_TIMEOUT: Duration = Duration::from_secs(10);

    /// Adapter implementation with pluggable transport.
    pub struct CdpAdapter {
        pub browser_id: BrowserId,
        pub cfg: CdpConfig,
        pub registry: Arc<Registry>,
        shutdown: CancellationToken,
        tasks: Mutex<Vec<JoinHandle<()>>>,
        transport: Arc<dyn CdpTransport>,
        targets: DashMap<String, PageId>,
        sessions: DashMap<String, PageId>,
        frame_sessions: DashMap<String, PageId>,
        handlers: DashMap<PageId, Vec<Arc<dyn FrameHandler>>>,
        sockets: DashMap<String, String>,
    }

    impl CdpAdapter {
        /// Launch Chromium (or attach to `cfg.websocket_url`) and start the event loop.
        pub async fn launch(mut cfg: CdpConfig) -> Result<Arc<Self>, AdapterError> {
            if cfg.websocket_url.is_none() {
                let executable = super::resolve_executable(&cfg)?;
                info!(target: "cdp-adapter", executable = %executable.display(), "launching chromium");
                cfg.executable = Some(executable);
            } else {
                info!(target: "cdp-adapter", "attaching to running browser");
            }

            let transport: Arc<dyn CdpTransport> = Arc::new(ChromiumTransport::new(cfg.clone()));
            let adapter = Arc::new(Self::with_transport(cfg, transport));
            Arc::clone(&adapter).start().await?;
            Ok(adapter)
        }

        pub fn with_transport(cfg: CdpConfig, transport: Arc<dyn CdpTransport>) -> Self {
            Self {
                browser_id: BrowserId::new(),
                cfg,
                registry: Arc::new(Registry::new()),
                shutdown: CancellationToken::new(),
                tasks: Mutex::new(Vec::new()),
                transport,
                targets: DashMap::new(),
                sessions: DashMap::new(),
                frame_sessions: DashMap::new(),
                handlers: DashMap::new(),
                sockets: DashMap::new(),
            }
        }

        pub async fn start(self: Arc<Self>) -> Result<(), AdapterError> {
            {
                let guard = self.tasks.lock().await;
                if !guard.is_empty() {
                    return Ok(());
                }
            }

            self.transport.start().await?;
            let loop_task = spawn(Self::event_loop(Arc::clone(&self)));
            self.tasks.lock().await.push(loop_task);
            info!(target: "cdp-adapter", browser = ?self.browser_id, "event loop started");
            Ok(())
        }

        /// Stop the event loop and release the browser.
        pub async fn shutdown(&self) {
            self.shutdown.cancel();
            let mut handles = self.tasks.lock().await;
            while let Some(handle) = handles.pop() {
                let _ = handle.await;
            }
            self.handlers.clear();
            self.transport.close().await;
            info!(target: "cdp-adapter", "adapter shut down");
        }

        pub fn register_page(&self, page: PageId, target_id: Option<String>, cdp_session: Option<String>) {
            if let Some(target) = &target_id {
                self.targets.insert(target.clone(), page);
            }
            if let Some(session) = &cdp_session {
                self.sessions.insert(session.clone(), page);
            }
            self.registry.insert_page(page, target_id, cdp_session);
        }

        /// Open a fresh tab with the configured emulation profile applied.
        pub async fn open_page(self: &Arc<Self>) -> Result<PageSession, AdapterError> {
            let page = self.create_page("about:blank").await?;
            self.apply_profile(page).await?;
            Ok(PageSession::new(Arc::clone(self), page))
        }

        pub async fn create_page(&self, url: &str) -> Result<PageId, AdapterError> {
            let response = self
                .send_command("Target.createTarget", json!({ "url": url }))
                .await?;
            let target_id = response
                .get("targetId")
                .and_then(|v| v.as_str())
                .ok_or_else(|| {
                    AdapterError::new(AdapterErrorKind::Internal)
                        .with_hint("createTarget missing targetId")
                })?
                .to_string();

            let deadline = Instant::now() + ATTACH_TIMEOUT;
            loop {
                if let Some(page) = self.targets.get(&target_id).map(|entry| *entry.value()) {
                    if self.registry.get_cdp_session(&page).is_some() {
                        return Ok(page);
                    }
                }

                if Instant::now() >= deadline {
                    return Err(AdapterError::new(AdapterErrorKind::Internal)
                        .with_hint("timed out waiting for target attach"));
                }

                sleep(Duration::from_millis(50)).await;
            }
        }

        async fn apply_profile(&self, page: PageId) -> Result<(), AdapterError> {
            let profile = &self.cfg.profile;
            self.send_page_command(page, "Page.enable", json!({})).await?;
            self.send_page_command(
                page,
                "Emulation.setUserAgentOverride",
                json!({
                    "userAgent": profile.user_agent,
                    "acceptLanguage": profile.locale,
                }),
            )
            .await?;
            self.send_page_command(
                page,
                "Emulation.setTimezoneOverride",
                json!({ "timezoneId": profile.timezone }),
            )
            .await?;
            if let Err(err) = self
                .send_page_command(
                    page,
                    "Emulation.setLocaleOverride",
                    json!({ "locale": profile.locale }),
                )
                .await
            {
                warn!(target: "cdp-adapter", %err, "locale override rejected");
            }
            self.send_page_command(
                page,
                "Emulation.setDeviceMetricsOverride",
                json!({
                    "width": profile.viewport_width,
                    "height": profile.viewport_height,
                    "deviceScaleFactor": 1,
                    "mobile": false,
                }),
            )
            .await?;
            debug!(target: "cdp-adapter", ?page, "page profile applied");
            Ok(())
        }

        /// Forward WebSocket traffic seen by `page` to `handler`.
        ///
        /// Sockets opened inside out-of-process iframes are routed to the
        /// owning page as well.
        pub async fn subscribe_frames(
            &self,
            page: PageId,
            handler: Arc<dyn FrameHandler>,
        ) -> Result<(), AdapterError> {
            let first = !self.handlers.contains_key(&page);
            self.handlers.entry(page).or_default().push(handler);
            if first {
                if let Err(err) = self.send_page_command(page, "Network.enable", json!({})).await {
                    self.handlers.remove(&page);
                    return Err(err);
                }
                if let Err(err) = self
                    .send_page_command(
                        page,
                        "Target.setAutoAttach",
                        json!({
                            "autoAttach": true,
                            "waitForDebuggerOnStart": false,
                            "flatten": true,
                        }),
                    )
                    .await
                {
                    warn!(target: "cdp-adapter", ?page, %err, "iframe auto-attach rejected");
                }
                let frames: Vec<String> = self
                    .frame_sessions
                    .iter()
                    .filter(|entry| *entry.value() == page)
                    .map(|entry| entry.key().clone())
                    .collect();
                for session in frames {
                    self.enable_frame_network(session);
                }
            }
            info!(target: "cdp-adapter", ?page, "websocket frame subscription active");
            Ok(())
        }

        async fn event_loop(self: Arc<Self>) {
            debug!(target: "cdp-adapter", "event loop entered");
            loop {
                select! {
                    _ = self.shutdown.cancelled() => {
                        break;
                    }
                    event = self.transport.next_event() => {
                        match event {
                            Some(ev) => self.handle_event(ev).await,
                            None => {
                                if !self.shutdown.is_cancelled() {
                                    warn!(target: "cdp-adapter", "transport stream ended");
                                }
                                break;
                            }
                        }
                    }
                }
            }
            debug!(target: "cdp-adapter", "event loop exiting");
        }

        async fn handle_event(&self, event: TransportEvent) {
            let method = event.method.clone();
            if let Err(err) = self.process_event(event).await {
                warn!(target: "cdp-adapter", %method, %err, "cdp event handling error");
            }
        }

        async fn process_event(&self, event: TransportEvent) -> Result<(), AdapterError> {
            metrics::record_event();
            match event.method.as_str() {
                "Target.targetCreated" => self.on_target_created(event.params)?,
                "Target.targetDestroyed" => self.on_target_destroyed(event.params)?,
                "Target.attachedToTarget" => self.on_target_attached(event)?,
                "Target.detachedFromTarget" => self.on_target_detached(event.params)?,
                "Target.targetInfoChanged" => self.on_target_info_changed(event.params)?,
                "Network.webSocketCreated" => self.on_websocket_created(event).await?,
                "Network.webSocketFrameReceived" => self.on_websocket_frame(event)?,
                "Network.webSocketClosed" => self.on_websocket_closed(event.params)?,
                _ => {
                    debug!(target: "cdp-adapter", method = %event.method, "unhandled cdp event");
                }
            }
            Ok(())
        }

        fn on_target_created(&self, params: Value) -> Result<(), AdapterError> {
            let payload: TargetCreatedParams = decode(params)?;
            if payload.target_info.target_type != "page" {
                return Ok(());
            }

            let target_id = payload.target_info.target_id;
            if self.targets.contains_key(&target_id) {
                return Ok(());
            }
            let page = PageId::new();
            self.targets.insert(target_id.clone(), page);
            self.registry.insert_page(page, Some(target_id), None);
            if let Some(url) = payload.target_info.url.filter(|u| !u.is_empty()) {
                self.registry.set_recent_url(&page, url);
            }
            debug!(target: "cdp-adapter", ?page, "page target created");
            Ok(())
        }

        fn on_target_destroyed(&self, params: Value) -> Result<(), AdapterError> {
            let payload: TargetDestroyedParams = decode(params)?;
            if let Some((_, page)) = self.targets.remove(&payload.target_id) {
                self.sessions.retain(|_, v| *v != page);
                self.frame_sessions.retain(|_, v| *v != page);
                self.handlers.remove(&page);
                self.registry.remove_page(&page);
                debug!(target: "cdp-adapter", ?page, "page target destroyed");
            }
            Ok(())
        }

        fn on_target_attached(&self, event: TransportEvent) -> Result<(), AdapterError> {
            let payload: AttachedToTargetParams = decode(event.params)?;

            if payload.target_info.target_type == "iframe" {
                let Some(page) = self.page_from_session(event.session_id.as_ref()) else {
                    return Ok(());
                };
                debug!(target: "cdp-adapter", ?page, session = %payload.session_id, "iframe attached");
                self.frame_sessions.insert(payload.session_id.clone(), page);
                if self.handlers.contains_key(&page) {
                    self.enable_frame_network(payload.session_id);
                }
                return Ok(());
            }
            if payload.target_info.target_type != "page" {
                return Ok(());
            }

            let target_id = payload.target_info.target_id;
            let page = match self.targets.get(&target_id).map(|entry| *entry.value()) {
                Some(page) => page,
                None => {
                    let page = PageId::new();
                    self.targets.insert(target_id.clone(), page);
                    self.registry.insert_page(page, Some(target_id), None);
                    page
                }
            };
            self.sessions.insert(payload.session_id.clone(), page);
            self.registry.set_cdp_session(&page, payload.session_id);
            Ok(())
        }

        fn on_target_detached(&self, params: Value) -> Result<(), AdapterError> {
            let payload: DetachedFromTargetParams = decode(params)?;
            self.sessions.remove(&payload.session_id);
            self.frame_sessions.remove(&payload.session_id);
            Ok(())
        }

        fn on_target_info_changed(&self, params: Value) -> Result<(), AdapterError> {
            let payload: TargetCreatedParams = decode(params)?;
            if let Some(page) = self
                .targets
                .get(&payload.target_info.target_id)
                .map(|entry| *entry.value())
            {
                if let Some(url) = payload.target_info.url.filter(|u| !u.is_empty()) {
                    self.registry.set_recent_url(&page, url);
                }
            }
            Ok(())
        }

        async fn on_websocket_created(&self, event: TransportEvent) -> Result<(), AdapterError> {
            let payload: WebSocketCreatedParams = decode(event.params)?;
            self.sockets
                .insert(payload.request_id.clone(), payload.url.clone());

            let Some(page) = self.page_from_session(event.session_id.as_ref()) else {
                return Ok(());
            };
            for handler in self.handlers_for(page) {
                handler
                    .on_stream_opened(&payload.request_id, &payload.url)
                    .await;
            }
            Ok(())
        }

        fn on_websocket_frame(&self, event: TransportEvent) -> Result<(), AdapterError> {
            let Some(page) = self.page_from_session(event.session_id.as_ref()) else {
                return Ok(());
            };
            let handlers = self.handlers_for(page);
            if handlers.is_empty() {
                return Ok(());
            }

            let payload: WebSocketFrameParams = decode(event.params)?;
            let frame = match payload.response.opcode as u8 {
                1 => StreamFrame::text(payload.request_id, payload.response.payload_data),
                2 => match STANDARD.decode(payload.response.payload_data.as_bytes()) {
                    Ok(bytes) => StreamFrame::binary(payload.request_id, bytes),
                    Err(err) => {
                        warn!(target: "cdp-adapter", %err, "undecodable binary websocket frame");
                        return Ok(());
                    }
                },
                _ => return Ok(()),
            };
            metrics::record_stream_frame();

            for handler in handlers {
                let frame = frame.clone();
                spawn(async move {
                    handler.on_frame(frame).await;
                });
            }
            Ok(())
        }

        fn on_websocket_closed(&self, params: Value) -> Result<(), AdapterError> {
            let payload: WebSocketClosedParams = decode(params)?;
            if let Some((_, url)) = self.sockets.remove(&payload.request_id) {
                let base = url.split('?').next().unwrap_or(&url);
                debug!(target: "cdp-adapter", stream = %payload.request_id, "websocket closed: {base}");
            }
            Ok(())
        }

        fn handlers_for(&self, page: PageId) -> Vec<Arc<dyn FrameHandler>> {
            self.handlers
                .get(&page)
                .map(|entry| entry.value().clone())
                .unwrap_or_default()
        }

        fn page_from_session(&self, session: Option<&String>) -> Option<PageId> {
            let sid = session?;
            self.sessions
                .get(sid)
                .or_else(|| self.frame_sessions.get(sid))
                .map(|entry| *entry.value())
        }

        /// Enable the Network domain on an iframe session without blocking
        /// the event loop.
        fn enable_frame_network(&self, session: String) {
            let transport = Arc::clone(&self.transport);
            spawn(async move {
                metrics::record_command("Network.enable");
                if let Err(err) = transport
                    .send_command(CommandTarget::Session(session), "Network.enable", json!({}))
                    .await
                {
                    metrics::record_command_failure("Network.enable");
                    warn!(target: "cdp-adapter", %err, "iframe network enable failed");
                }
            });
        }

        async fn send_command(&self, method: &str, params: Value) -> Result<Value, AdapterError> {
            self.dispatch(CommandTarget::Browser, method, params).await
        }

        async fn send_page_command(
            &self,
            page: PageId,
            method: &str,
            params: Value,
        ) -> Result<Value, AdapterError> {
            let session = self.registry.get_cdp_session(&page).ok_or_else(|| {
                AdapterError::new(AdapterErrorKind::Internal)
                    .with_hint(format!("missing cdp session for page {page:?}"))
            })?;
            self.dispatch(CommandTarget::Session(session), method, params)
                .await
        }

        async fn dispatch(
            &self,
            target: CommandTarget,
            method: &str,
            params: Value,
        ) -> Result<Value, AdapterError> {
            let start = std::time::Instant::now();
            metrics::record_command(method);
            match self.transport.send_command(target, method, params).await {
                Ok(value) => {
                    metrics::record_command_success(method, start.elapsed());
                    Ok(value)
                }
                Err(err) => {
                    metrics::record_command_failure(method);
                    Err(err)
                }
            }
        }

        pub async fn navigate(
            &self,
            page: PageId,
            url: &str,
            timeout: Duration,
        ) -> Result<(), AdapterError> {
            let deadline = Instant::now() + timeout;
            let response = tokio::time::timeout(
                timeout,
                self.send_page_command(page, "Page.navigate", json!({ "url": url })),
            )
            .await
            .map_err(|_| AdapterError::timeout(format!("navigation to {url} timed out")))??;

            if let Some(reason) = response.get("errorText").and_then(|v| v.as_str()) {
                return Err(AdapterError::new(AdapterErrorKind::CdpIo)
                    .with_hint(format!("navigation to {url} failed: {reason}"))
                    .retriable(true));
            }
            self.registry.set_recent_url(&page, url.to_string());
            self.wait_for_dom_ready(page, deadline).await
        }

        pub async fn reload(&self, page: PageId, timeout: Duration) -> Result<(), AdapterError> {
            let deadline = Instant::now() + timeout;
            self.send_page_command(page, "Page.reload", json!({ "ignoreCache": false }))
                .await?;
            self.wait_for_dom_ready(page, deadline).await
        }

        async fn wait_for_dom_ready(
            &self,
            page: PageId,
            deadline: Instant,
        ) -> Result<(), AdapterError> {
            let condition =
                WaitCondition::predicate("['interactive', 'complete'].includes(document.readyState)");
            self.poll_condition(page, &condition, deadline)
                .await
                .map_err(|err| {
                    if err.is_timeout() {
                        AdapterError::timeout("document did not become ready")
                    } else {
                        err
                    }
                })
        }

        pub async fn wait_for(
            &self,
            page: PageId,
            condition: &WaitCondition,
            timeout: Duration,
        ) -> Result<(), AdapterError> {
            self.poll_condition(page, condition, Instant::now() + timeout)
                .await
        }

        async fn poll_condition(
            &self,
            page: PageId,
            condition: &WaitCondition,
            deadline: Instant,
        ) -> Result<(), AdapterError> {
            let expression = condition.probe_expression()?;
            loop {
                match self.evaluate(page, &expression).await {
                    Ok(Value::Bool(true)) => return Ok(()),
                    Ok(_) => {}
                    // execution contexts are torn down mid-navigation
                    Err(err) if err.kind == AdapterErrorKind::ScriptError || err.retriable => {
                        debug!(target: "cdp-adapter", %err, "wait probe failed, polling on");
                    }
                    Err(err) => return Err(err),
                }

                if Instant::now() >= deadline {
                    return Err(AdapterError::timeout(format!(
                        "wait for {condition} timed out"
                    )));
                }
                sleep(POLL_INTERVAL).await;
            }
        }

        pub async fn evaluate(&self, page: PageId, expression: &str) -> Result<Value, AdapterError> {
            let response = self
                .send_page_command(
                    page,
                    "Runtime.evaluate",
                    json!({
                        "expression": expression,
                        "awaitPromise": true,
                        "returnByValue": true,
                        "userGesture": true,
                    }),
                )
                .await?;

            if let Some(details) = response.get("exceptionDetails") {
                return Err(AdapterError::new(AdapterErrorKind::ScriptError)
                    .with_hint("evaluate raised an exception")
                    .with_data(details.clone()));
            }

            Ok(response
                .get("result")
                .and_then(|res| res.get("value"))
                .cloned()
                .unwrap_or(Value::Null))
        }

        pub async fn fill(&self, page: PageId, selector: &str, value: &str) -> Result<(), AdapterError> {
            let selector_literal = js_literal(selector)?;
            let focus_expression = format!(
                "(() => {{\n    const el = document.querySelector({selector_literal});\n    if (!el) {{ return 'not-found'; }}\n    el.focus();\n    if ('value' in el) {{ el.value = ''; }}\n    return 'focused';\n}})()"
            );

            match self.evaluate(page, &focus_expression).await? {
                Value::String(status) if status == "focused" => {}
                _ => {
                    return Err(AdapterError::new(AdapterErrorKind::TargetNotFound)
                        .with_hint(format!("no input matches '{selector}'")))
                }
            }

            self.send_page_command(page, "Input.insertText", json!({ "text": value }))
                .await?;
            Ok(())
        }

        pub async fn click(&self, page: PageId, selector: &str) -> Result<(), AdapterError> {
            let selector_literal = js_literal(selector)?;
            let locate_expression = format!(
                "(() => {{\n    const el = document.querySelector({selector_literal});\n    if (!el) {{ return null; }}\n    el.scrollIntoView({{ block: 'center', inline: 'center' }});\n    const rect = el.getBoundingClientRect();\n    return {{ x: rect.left + rect.width / 2, y: rect.top + rect.height / 2 }};\n}})()"
            );

            let anchor = self.evaluate(page, &locate_expression).await?;
            let (Some(x), Some(y)) = (
                anchor.get("x").and_then(|v| v.as_f64()),
                anchor.get("y").and_then(|v| v.as_f64()),
            ) else {
                return Err(AdapterError::new(AdapterErrorKind::TargetNotFound)
                    .with_hint(format!("click target not found for selector '{selector}'")));
            };

            for kind in ["mousePressed", "mouseReleased"] {
                self.send_page_command(
                    page,
                    "Input.dispatchMouseEvent",
                    json!({
                        "type": kind,
                        "x": x,
                        "y": y,
                        "button": "left",
                        "buttons": 1,
                        "clickCount": 1,
                        "pointerType": "mouse",
                    }),
                )
                .await?;
            }
            Ok(())
        }

        pub async fn screenshot(&self, page: PageId, path: &Path) -> Result<(), AdapterError> {
            let response = self
                .send_page_command(page, "Page.captureScreenshot", json!({ "format": "png" }))
                .await?;
            let data = response
                .get("data")
                .and_then(|v| v.as_str())
                .ok_or_else(|| {
                    AdapterError::new(AdapterErrorKind::Internal)
                        .with_hint("missing screenshot data")
                })?;
            let bytes = STANDARD.decode(data).map_err(|err| {
                AdapterError::new(AdapterErrorKind::Internal).with_hint(err.to_string())
            })?;
            tokio::fs::write(path, bytes).await.map_err(|err| {
                AdapterError::new(AdapterErrorKind::Internal)
                    .with_hint(format!("cannot write {}: {err}", path.display()))
            })?;
            info!(target: "cdp-adapter", path = %path.display(), "screenshot saved");
            Ok(())
        }

        pub async fn current_url(&self, page: PageId) -> Result<String, AdapterError> {
            match self.evaluate(page, "window.location.href").await? {
                Value::String(url) => {
                    self.registry.set_recent_url(&page, url.clone());
                    Ok(url)
                }
                _ => self.registry.get(&page).and_then(|ctx| ctx.recent_url).ok_or_else(|| {
                    AdapterError::new(AdapterErrorKind::Internal).with_hint("page url unavailable")
                }),
            }
        }
    }

    fn decode<T: for<'de> Deserialize<'de>>(params: Value) -> Result<T, AdapterError> {
        serde_json::from_value(params)
            .map_err(|err| AdapterError::new(AdapterErrorKind::Internal).with_hint(err.to_string()))
    }

    pub(crate) fn js_literal(text: &str) -> Result<String, AdapterError> {
        serde_json::to_string(text)
            .map_err(|err| AdapterError::new(AdapterErrorKind::Internal).with_hint(err.to_string()))
    }

    #[derive(Debug, Deserialize)]
    struct TargetCreatedParams {
        #[serde(rename = "targetInfo")]
        target_info: TargetInfoPayload,
    }

    #[derive(Debug, Deserialize)]
    struct TargetDestroyedParams {
        #[serde(rename = "targetId")]
        target_id: String,
    }

    #[derive(Debug, Deserialize)]
    struct AttachedToTargetParams {
        #[serde(rename = "sessionId")]
        session_id: String,
        #[serde(rename = "targetInfo")]
        target_info: TargetInfoPayload,
    }

    #[derive(Debug, Deserialize)]
    struct DetachedFromTargetParams {
        #[serde(rename = "sessionId")]
        session_id: String,
    }

    #[derive(Debug, Deserialize)]
    struct TargetInfoPayload {
        #[serde(rename = "targetId")]
        target_id: String,
        #[serde(rename = "type")]
        target_type: String,
        url: Option<String>,
    }

    #[derive(Debug, Deserialize)]
    struct WebSocketCreatedParams {
        #[serde(rename = "requestId")]
        request_id: String,
        url: String,
    }

    #[derive(Debug, Deserialize)]
    struct WebSocketFrameParams {
        #[serde(rename = "requestId")]
        request_id: String,
        response: WebSocketFramePayload,
    }

    #[derive(Debug, Deserialize)]
    struct WebSocketFramePayload {
        opcode: f64,
        #[serde(rename = "payloadData")]
        payload_data: String,
    }

    #[derive(Debug, Deserialize)]
    struct WebSocketClosedParams {
        #[serde(rename = "requestId")]
        request_id: String,
    }

}
