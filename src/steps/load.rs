use action_flow::{AttemptContext, StepAction, StepError, StepReport};
use async_trait::async_trait;
use tracing::debug;

use super::Page;

/// Resource URL fragment that appears once the provider launcher has loaded
pub const LAUNCHER_MARKER: &str = "/script/php/launcher.php?token=";

const RESOURCES_SCRIPT: &str = r#"(() => {
    try {
        return performance.getEntriesByType('resource')
            .map(entry => entry.name)
            .filter(name => name.includes('launcher.php'));
    } catch (e) {
        return [];
    }
})()"#;

/// Polled probe: has the launcher resource been fetched yet
pub struct LoadConfirmationStep {
    page: Page,
}

impl LoadConfirmationStep {
    pub fn new(page: Page) -> Self {
        Self { page }
    }
}

#[async_trait]
impl StepAction for LoadConfirmationStep {
    async fn run(&self, ctx: &AttemptContext) -> Result<StepReport, StepError> {
        let elapsed = ctx.elapsed.as_secs();
        let resources = self
            .page
            .evaluate(RESOURCES_SCRIPT)
            .await
            .map_err(|e| StepError::pending(e.to_string()))?;

        let loaded = resources
            .as_array()
            .into_iter()
            .flatten()
            .filter_map(|name| name.as_str())
            .any(|name| name.contains(LAUNCHER_MARKER));
        if loaded {
            return Ok(StepReport::with_detail(format!(
                "Evolution platform loaded in {elapsed}s"
            )));
        }

        if elapsed > 0 && elapsed % 10 == 0 {
            debug!("Still waiting... ({elapsed}s)");
        }
        Err(StepError::pending("launcher.php not detected"))
    }
}
