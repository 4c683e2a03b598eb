use std::path::{Path, PathBuf};
use std::time::Duration;

use action_flow::{AttemptContext, StepAction, StepError, StepReport};
use async_trait::async_trait;
use cdp_adapter::WaitCondition;
use frame_tap::clock;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use super::{step_error, Page};

const LIVE_CARDS: &str = "[class*='platform-live']";
const ANY_CARDS: &str = "[class*='platform'], [class*='provider']";
const CARD_TIMEOUT: Duration = Duration::from_secs(30);
const RELOAD_TIMEOUT: Duration = Duration::from_secs(60);
const ANIMATION_SETTLE: Duration = Duration::from_secs(2);
const CLICK_SETTLE: Duration = Duration::from_secs(3);

const MENTIONS_PLATFORM_SCRIPT: &str = r#"(() => {
    const url = window.location.href.toLowerCase();
    const html = (document.documentElement && document.documentElement.innerHTML || '').toLowerCase();
    return url.includes('evo') || html.includes('evolution');
})()"#;

/// Ways to locate the Evolution card, tried in declaration order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchStrategy {
    /// `platform-live` cards whose text or imagery names Evolution
    ExactClass,
    /// Any platform/provider/card element mentioning Evolution, including its class
    BroaderMatch,
    /// Any short element whose text contains "evolution"
    TextSearch,
}

impl MatchStrategy {
    pub const ALL: [MatchStrategy; 3] = [
        MatchStrategy::ExactClass,
        MatchStrategy::BroaderMatch,
        MatchStrategy::TextSearch,
    ];

    pub fn label(self) -> &'static str {
        match self {
            MatchStrategy::ExactClass => "platform-live",
            MatchStrategy::BroaderMatch => "broader-selector",
            MatchStrategy::TextSearch => "text-search",
        }
    }

    /// Script that clicks the match and returns whether one was found
    pub fn script(self) -> &'static str {
        match self {
            MatchStrategy::ExactClass => {
                r#"(() => {
    const cards = [...document.querySelectorAll('[class*="platform-live"]')];
    const evo = cards.find(el => {
        const text = (el.innerText || '').toLowerCase();
        const img = (el.querySelector('img') || {}).src || '';
        const bg = el.style.backgroundImage || '';
        return [text, img, bg].some(s => s.includes('evolution') || s.includes('evo'));
    });
    if (!evo) return false;
    evo.scrollIntoView({ block: 'center' });
    ['mousedown', 'mouseup', 'click'].forEach(type =>
        evo.dispatchEvent(new MouseEvent(type, { bubbles: true })));
    return true;
})()"#
            }
            MatchStrategy::BroaderMatch => {
                r#"(() => {
    const cards = [...document.querySelectorAll('[class*="platform"], [class*="provider"], [class*="card"]')];
    const evo = cards.find(el => {
        const text = (el.innerText || '').toLowerCase();
        const img = (el.querySelector('img') || {}).src || '';
        const bg = el.style.backgroundImage || '';
        const cls = (typeof el.className === 'string' ? el.className : '').toLowerCase();
        return [text, img, bg, cls].some(s => s.includes('evolution') || s.includes('evo'));
    });
    if (!evo) return false;
    evo.scrollIntoView({ block: 'center' });
    evo.click();
    return true;
})()"#
            }
            MatchStrategy::TextSearch => {
                r#"(() => {
    for (const el of document.querySelectorAll('*')) {
        const text = (el.innerText || '').toLowerCase();
        if (!text.includes('evolution') || text.length >= 100) continue;
        el.scrollIntoView({ block: 'center' });
        const rect = el.getBoundingClientRect();
        const at = { bubbles: true, clientX: rect.left + rect.width / 2, clientY: rect.top + rect.height / 2 };
        ['mousedown', 'mouseup', 'click'].forEach(type => el.dispatchEvent(new MouseEvent(type, at)));
        return true;
    }
    return false;
})()"#
            }
        }
    }
}

/// Opens the Evolution provider through the first strategy that matches
pub struct PlatformStep {
    page: Page,
    output_dir: PathBuf,
}

impl PlatformStep {
    pub fn new(page: Page, output_dir: &Path) -> Self {
        Self {
            page,
            output_dir: output_dir.to_path_buf(),
        }
    }

    async fn select(&self) -> Result<MatchStrategy, StepError> {
        if let Err(err) = self
            .page
            .wait_for(&WaitCondition::selector(LIVE_CARDS), CARD_TIMEOUT)
            .await
        {
            debug!("no live provider cards ({}), waiting for any card", err);
            self.page
                .wait_for(&WaitCondition::selector(ANY_CARDS), CARD_TIMEOUT)
                .await
                .map_err(|e| step_error(e, CARD_TIMEOUT))?;
        }
        sleep(ANIMATION_SETTLE).await;

        for strategy in MatchStrategy::ALL {
            let matched = self
                .page
                .evaluate(strategy.script())
                .await
                .map_err(|e| step_error(e, CARD_TIMEOUT))?;
            if matched.as_bool() == Some(true) {
                return Ok(strategy);
            }
            debug!(strategy = strategy.label(), "no match");
        }
        Err(StepError::failed("Evolution not found by any strategy"))
    }

    /// Screenshot on the second-to-last attempt, then reload for the next one
    async fn prepare_retry(&self, ctx: &AttemptContext) {
        if ctx.max_attempts == Some(ctx.attempt + 1) {
            let path = self.output_dir.join(format!(
                "debug_evolution_{}.png",
                clock::file_stamp(&clock::ist_now())
            ));
            match self.page.screenshot(&path).await {
                Ok(()) => debug!(path = %path.display(), "Saved screenshot"),
                Err(err) => warn!("screenshot failed: {}", err),
            }
        }
        if let Err(err) = self.page.reload(RELOAD_TIMEOUT).await {
            warn!("reload after failed platform attempt: {}", err);
        }
    }
}

#[async_trait]
impl StepAction for PlatformStep {
    async fn run(&self, ctx: &AttemptContext) -> Result<StepReport, StepError> {
        let strategy = match self.select().await {
            Ok(strategy) => strategy,
            Err(err) => {
                if !ctx.is_final() {
                    self.prepare_retry(ctx).await;
                }
                return Err(err);
            }
        };
        info!(strategy = strategy.label(), "Evolution clicked");

        sleep(CLICK_SETTLE).await;
        match self.page.evaluate(MENTIONS_PLATFORM_SCRIPT).await {
            Ok(value) if value.as_bool() == Some(true) => info!("Evolution platform confirmed"),
            Ok(_) => debug!("page does not mention the platform yet"),
            Err(err) => debug!("platform verification skipped: {}", err),
        }

        Ok(StepReport::with_detail(format!(
            "Evolution clicked via {}",
            strategy.label()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strategies_are_ordered_narrow_to_broad() {
        let labels: Vec<_> = MatchStrategy::ALL.iter().map(|s| s.label()).collect();
        assert_eq!(labels, ["platform-live", "broader-selector", "text-search"]);
        assert!(MatchStrategy::ExactClass.script().contains("platform-live"));
        assert!(MatchStrategy::BroaderMatch.script().contains(r#"[class*="card"]"#));
        assert!(MatchStrategy::TextSearch.script().contains("querySelectorAll('*')"));
    }
}
