//! Site steps
//!
//! Each step drives the active page through [`PageControl`] and reports
//! success or a classified failure; retrying is left to the pipeline.

mod casino;
mod game;
mod load;
mod login;
mod platform;
mod popups;
mod stream;

use std::sync::Arc;
use std::time::Duration;

use action_flow::{RetryPolicy, Step, StepError};
use cdp_adapter::{AdapterError, PageControl};
use frame_tap::EventListener;

use crate::config::Settings;

pub use casino::CasinoStep;
pub use game::GameStep;
pub use load::{LoadConfirmationStep, LAUNCHER_MARKER};
pub use login::{assess_login, LoginProbe, LoginStep, LoginVerdict};
pub use platform::{MatchStrategy, PlatformStep};
pub use popups::PopupStep;
pub use stream::AttachListenerStep;

pub type Page = Arc<dyn PageControl>;

const RETRY_BACKOFF: Duration = Duration::from_secs(5);
const LOAD_POLL_INTERVAL: Duration = Duration::from_secs(1);
const LOAD_TIMEOUT: Duration = Duration::from_secs(90);

/// Classify an adapter failure for the pipeline's retry policy
pub(crate) fn step_error(err: AdapterError, bound: Duration) -> StepError {
    if err.is_timeout() {
        StepError::timeout(err.to_string(), bound.as_millis() as u64)
    } else {
        StepError::failed(err.to_string())
    }
}

/// The full ordered step list for one session
pub fn site_steps(page: Page, settings: &Settings, listener: Arc<EventListener>) -> Vec<Step> {
    let retried = RetryPolicy::attempts(3, RETRY_BACKOFF);
    vec![
        Step::new(
            "login",
            Arc::new(LoginStep::new(
                page.clone(),
                &settings.login_url,
                &settings.phone,
                &settings.password,
            )),
        )
        .with_policy(retried),
        Step::new("close_popups", Arc::new(PopupStep::new(page.clone())))
            .with_policy(RetryPolicy::once()),
        Step::new("casino", Arc::new(CasinoStep::new(page.clone()))).with_policy(retried),
        Step::new(
            "platform",
            Arc::new(PlatformStep::new(page.clone(), &settings.output_dir)),
        )
        .with_policy(retried),
        Step::new(
            "attach_listener",
            Arc::new(AttachListenerStep::new(page.clone(), listener)),
        )
        .with_policy(retried),
        Step::new("load_confirmation", Arc::new(LoadConfirmationStep::new(page.clone())))
            .with_policy(RetryPolicy::poll(LOAD_POLL_INTERVAL, LOAD_TIMEOUT)),
        Step::new("launch_game", Arc::new(GameStep::new(page, &settings.game_url)))
            .with_policy(retried),
    ]
}
