use std::time::Duration;

use action_flow::{AttemptContext, StepAction, StepError, StepReport};
use async_trait::async_trait;
use cdp_adapter::WaitCondition;
use tracing::debug;

use super::{step_error, Page};

const CATEGORY_ITEM: &str = ".cat-selection-item";
const CATEGORY_TIMEOUT: Duration = Duration::from_secs(60);

const SELECT_CASINO_SCRIPT: &str = r#"(() => {
    const items = [...document.querySelectorAll('.cat-selection-item')];
    const titles = items
        .map(el => el.querySelector('.cat-title'))
        .filter(Boolean)
        .map(title => title.innerText.trim());
    const casino = items.find(el => {
        const title = el.querySelector('.cat-title');
        return title && title.innerText.trim() === 'Casino';
    });
    if (!casino) return { clicked: false, available: titles };
    casino.scrollIntoView({ block: 'center' });
    ['mousedown', 'mouseup', 'click'].forEach(type =>
        casino.dispatchEvent(new MouseEvent(type, { bubbles: true })));
    return { clicked: true, available: titles };
})()"#;

pub struct CasinoStep {
    page: Page,
}

impl CasinoStep {
    pub fn new(page: Page) -> Self {
        Self { page }
    }
}

#[async_trait]
impl StepAction for CasinoStep {
    async fn run(&self, _ctx: &AttemptContext) -> Result<StepReport, StepError> {
        self.page
            .wait_for(&WaitCondition::selector(CATEGORY_ITEM), CATEGORY_TIMEOUT)
            .await
            .map_err(|e| step_error(e, CATEGORY_TIMEOUT))?;
        debug!("Category items loaded");

        let result = self
            .page
            .evaluate(SELECT_CASINO_SCRIPT)
            .await
            .map_err(|e| step_error(e, CATEGORY_TIMEOUT))?;
        if result["clicked"].as_bool() == Some(true) {
            return Ok(StepReport::with_detail("Casino section clicked"));
        }

        let available: Vec<&str> = result["available"]
            .as_array()
            .map(|titles| titles.iter().filter_map(|t| t.as_str()).collect())
            .unwrap_or_default();
        Err(StepError::failed(format!(
            "Casino section not found (categories: {})",
            if available.is_empty() {
                "none".to_string()
            } else {
                available.join(", ")
            }
        )))
    }
}
