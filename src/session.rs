//! Session lifecycle
//!
//! Announce, launch the browser, run the site pipeline, block until the
//! spin history is captured (or the run is interrupted or times out), then
//! clean up. Cleanup runs on every path.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use action_flow::{PipelineConfig, StepPipeline};
use cdp_adapter::{metrics, CdpAdapter};
use frame_tap::{CaptureTargets, CompletionSignal, EventListener, PayloadStore, TapConfig};
use notify_relay::{ChannelId, Notifier, NotifierConfig, TelegramProvider};
use tokio::time::{sleep_until, timeout, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Settings;
use crate::errors::{ExitStatus, SessionError};
use crate::reporter::{Level, Reporter};
use crate::steps::{site_steps, Page};

pub const ARTIFACT_PREFIX: &str = "spinHistory";

/// How long shutdown waits for a capture that is already delivering
pub const CAPTURE_GRACE: Duration = Duration::from_secs(60);

pub struct Session {
    settings: Settings,
    reporter: Arc<Reporter>,
    signal: Arc<CompletionSignal>,
    store: Arc<PayloadStore>,
    listener: Arc<EventListener>,
    pipeline: PipelineConfig,
    cancel: CancellationToken,
    started: Instant,
}

impl Session {
    pub fn new(settings: Settings, notifier: Arc<Notifier>) -> Self {
        let reporter = Arc::new(Reporter::new(
            notifier.clone(),
            ChannelId::new(settings.log_chat_id.clone()),
        ));
        let store = Arc::new(PayloadStore::new(&settings.output_dir, ARTIFACT_PREFIX));
        let signal = Arc::new(CompletionSignal::new());
        let listener = Arc::new(EventListener::new(
            TapConfig::default(),
            CaptureTargets {
                file_channel: ChannelId::new(settings.file_chat_id.clone()),
                log_channel: ChannelId::new(settings.log_chat_id.clone()),
            },
            signal.clone(),
            store.clone(),
            notifier,
        ));
        Self {
            settings,
            reporter,
            signal,
            store,
            listener,
            pipeline: PipelineConfig::default(),
            cancel: CancellationToken::new(),
            started: Instant::now(),
        }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn signal(&self) -> &Arc<CompletionSignal> {
        &self.signal
    }

    pub fn reporter(&self) -> &Arc<Reporter> {
        &self.reporter
    }

    pub async fn announce(&self) {
        self.reporter.announce_startup(&self.settings).await;
    }

    /// Drive `page` to a capture and classify how it ended
    pub async fn execute(&self, page: Page) -> ExitStatus {
        match self.drive(page).await {
            Ok(()) => ExitStatus::Captured,
            Err(err) => {
                if self.settle_capture().await {
                    warn!("Run ended early ({}) but the capture completed", err);
                    return ExitStatus::Captured;
                }
                if matches!(err, SessionError::MaxRuntime(_)) {
                    self.reporter.report(Level::Warning, err.to_string()).await;
                }
                err.exit_status()
            }
        }
    }

    /// Run the pipeline on `page` and wait for the capture
    pub async fn drive(&self, page: Page) -> Result<(), SessionError> {
        let steps = site_steps(page, &self.settings, self.listener.clone());
        let pipeline = StepPipeline::new(self.pipeline.clone())
            .with_observer(self.reporter.clone())
            .with_cancellation(self.cancel.clone());

        if let Err(err) = pipeline.run(steps).await {
            if self.settle_capture().await {
                warn!("Pipeline stopped after the capture completed: {}", err);
                return Ok(());
            }
            return Err(err.into());
        }

        self.reporter.monitoring_active().await;
        self.wait_for_capture().await
    }

    async fn wait_for_capture(&self) -> Result<(), SessionError> {
        let max_runtime = self.settings.max_runtime;
        let deadline = async {
            match max_runtime {
                Some(limit) => sleep_until(self.started + limit).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = self.signal.wait() => {
                info!("Spin history captured");
                Ok(())
            }
            _ = self.cancel.cancelled() => Err(SessionError::Interrupted),
            _ = deadline => Err(SessionError::MaxRuntime(
                max_runtime.map(|d| d.as_secs()).unwrap_or_default(),
            )),
        }
    }

    /// Wait out a capture that was claimed but has not signalled yet
    ///
    /// Returns whether the capture is complete.
    async fn settle_capture(&self) -> bool {
        if self.listener.is_claimed() && !self.signal.is_set() {
            info!("Capture in progress, waiting for delivery to finish");
            if timeout(CAPTURE_GRACE, self.signal.wait()).await.is_err() {
                warn!("Capture still delivering after {:?}", CAPTURE_GRACE);
            }
        }
        self.signal.is_set()
    }

    /// Remove the stored artifact and announce the stop; never fails
    pub async fn finish(&self, status: ExitStatus) {
        self.settle_capture().await;
        let stats = self.listener.stats();
        info!(
            frames_seen = stats.frames_seen.load(Ordering::Relaxed),
            filtered = stats.filtered.load(Ordering::Relaxed),
            decode_failures = stats.decode_failures.load(Ordering::Relaxed),
            duplicates = stats.duplicates.load(Ordering::Relaxed),
            "Frame listener totals"
        );
        self.store.cleanup_latest().await;
        self.reporter
            .stopped(self.started.elapsed(), status.reason())
            .await;
    }
}

/// Full session against a real browser and the Telegram Bot API
pub async fn run(settings: Settings, cancel: CancellationToken) -> ExitStatus {
    let provider = Arc::new(TelegramProvider::new(&settings.bot_token));
    let notifier = Arc::new(Notifier::new(provider, NotifierConfig::default()));
    let cdp_config = settings.cdp_config();
    let session = Session::new(settings, notifier).with_cancellation(cancel);
    session.announce().await;

    session
        .reporter()
        .report(Level::Info, "Launching Chromium browser...")
        .await;
    let adapter = match CdpAdapter::launch(cdp_config).await {
        Ok(adapter) => adapter,
        Err(err) => {
            let err = SessionError::from(err);
            session
                .reporter()
                .report(Level::Error, format!("Failed to initialize browser: {err}"))
                .await;
            let status = err.exit_status();
            session.finish(status).await;
            return status;
        }
    };

    let status = match adapter.open_page().await {
        Ok(page) => session.execute(Arc::new(page)).await,
        Err(err) => {
            let err = SessionError::from(err);
            session.reporter().execution_error(None, &err).await;
            err.exit_status()
        }
    };

    session
        .reporter()
        .report(Level::Info, "Cleaning up browser resources...")
        .await;
    adapter.shutdown().await;
    let totals = metrics::snapshot();
    info!(
        commands = totals.commands,
        failures = totals.command_failures,
        events = totals.events,
        stream_frames = totals.stream_frames,
        "CDP session totals"
    );
    debug!("{}", metrics::render());

    session.finish(status).await;
    status
}
