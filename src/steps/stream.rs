use std::sync::Arc;

use action_flow::{AttemptContext, StepAction, StepError, StepReport};
use async_trait::async_trait;
use frame_tap::{EventListener, FrameHandler};

use super::Page;

/// Subscribes the capture listener to the page's streaming connections
pub struct AttachListenerStep {
    page: Page,
    listener: Arc<EventListener>,
}

impl AttachListenerStep {
    pub fn new(page: Page, listener: Arc<EventListener>) -> Self {
        Self { page, listener }
    }
}

#[async_trait]
impl StepAction for AttachListenerStep {
    async fn run(&self, _ctx: &AttemptContext) -> Result<StepReport, StepError> {
        let handler: Arc<dyn FrameHandler> = self.listener.clone();
        self.page
            .subscribe_stream(handler)
            .await
            .map_err(|e| StepError::failed(format!("could not attach stream listener: {e}")))?;
        Ok(StepReport::with_detail("WebSocket listener ready"))
    }
}
