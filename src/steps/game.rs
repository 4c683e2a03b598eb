use std::time::Duration;

use action_flow::{AttemptContext, StepAction, StepError, StepReport};
use async_trait::async_trait;
use serde::Deserialize;
use tokio::time::sleep;
use tracing::{debug, info};

use super::{step_error, Page};

const NAVIGATION_TIMEOUT: Duration = Duration::from_secs(120);
const SETTLE_TICK: Duration = Duration::from_secs(2);
const SETTLE_TICKS: u32 = 10;

const GAME_STATE_SCRIPT: &str = r#"(() => ({
    url: window.location.href,
    title: document.title,
    canvases: document.querySelectorAll('canvas').length,
    inGame: window.location.href.includes('game=icefishing'),
}))()"#;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct GameState {
    url: String,
    title: String,
    canvases: u64,
    in_game: bool,
}

/// Opens the game table and lets it settle
pub struct GameStep {
    page: Page,
    game_url: String,
}

impl GameStep {
    pub fn new(page: Page, game_url: &str) -> Self {
        Self {
            page,
            game_url: game_url.to_string(),
        }
    }
}

#[async_trait]
impl StepAction for GameStep {
    async fn run(&self, _ctx: &AttemptContext) -> Result<StepReport, StepError> {
        self.page
            .navigate(&self.game_url, NAVIGATION_TIMEOUT)
            .await
            .map_err(|e| step_error(e, NAVIGATION_TIMEOUT))?;

        for tick in 1..=SETTLE_TICKS {
            sleep(SETTLE_TICK).await;
            if tick % 3 == 0 {
                debug!("Game loading... ({}s)", tick * 2);
            }
        }

        let state: GameState = match self.page.evaluate(GAME_STATE_SCRIPT).await {
            Ok(value) => serde_json::from_value(value).unwrap_or_default(),
            Err(err) => {
                debug!("game state probe failed: {}", err);
                GameState::default()
            }
        };
        let url: String = state.url.chars().take(50).collect();
        info!(
            title = %state.title,
            canvases = state.canvases,
            in_game = state.in_game,
            url = %url,
            "Game page settled"
        );

        Ok(StepReport::with_detail(format!(
            "Ice Fishing game loaded ({} canvas element(s)); waiting for spin history",
            state.canvases
        )))
    }
}
