use std::time::Duration;

use action_flow::{AttemptContext, StepAction, StepError, StepReport};
use async_trait::async_trait;
use tokio::time::sleep;
use tracing::{debug, warn};

use super::Page;

const CLOSE_BUTTON: &str = "button.popout-close";
const COUNT_SCRIPT: &str = "document.querySelectorAll('button.popout-close').length";
const SETTLE: Duration = Duration::from_millis(1200);
const ROUNDS: usize = 2;

/// Dismisses promotional popups; never fails
pub struct PopupStep {
    page: Page,
}

impl PopupStep {
    pub fn new(page: Page) -> Self {
        Self { page }
    }

    async fn visible(&self) -> bool {
        match self.page.evaluate(COUNT_SCRIPT).await {
            Ok(count) => count.as_u64().unwrap_or(0) > 0,
            Err(err) => {
                debug!("popup probe failed: {}", err);
                false
            }
        }
    }
}

#[async_trait]
impl StepAction for PopupStep {
    async fn run(&self, _ctx: &AttemptContext) -> Result<StepReport, StepError> {
        let mut closed = 0;
        for _ in 0..ROUNDS {
            sleep(SETTLE).await;
            if !self.visible().await {
                break;
            }
            match self.page.click(CLOSE_BUTTON).await {
                Ok(()) => {
                    closed += 1;
                    debug!(closed, "Popup closed");
                }
                Err(err) => {
                    warn!("popup close click failed: {}", err);
                    break;
                }
            }
        }

        Ok(match closed {
            0 => StepReport::with_detail("No popups found"),
            n => StepReport::with_detail(format!("Closed {n} popup(s)")),
        })
    }
}
