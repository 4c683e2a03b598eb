use std::time::Duration;

use action_flow::{AttemptContext, StepAction, StepError, StepReport};
use async_trait::async_trait;
use cdp_adapter::WaitCondition;
use serde::Deserialize;
use tracing::{debug, info, warn};
use url::Url;

use super::{step_error, Page};

const USERNAME_INPUT: &str = r#"input[autocomplete="username"]"#;
const PASSWORD_INPUT: &str = r#"input[autocomplete="current-password"]"#;
const AVATAR: &str = r#"img[src*="avatar"]"#;
const HOME_FRAGMENT: &str = "/home";

const NAVIGATION_TIMEOUT: Duration = Duration::from_secs(180);
const FIELD_TIMEOUT: Duration = Duration::from_secs(30);
const REDIRECT_TIMEOUT: Duration = Duration::from_secs(45);
const AVATAR_TIMEOUT: Duration = Duration::from_secs(10);

const CLICK_LOGIN_SCRIPT: &str = r#"(() => {
    const button = [...document.querySelectorAll('button')]
        .find(el => (el.innerText || '').trim().toLowerCase().includes('login'));
    if (!button) return false;
    button.scrollIntoView({ block: 'center' });
    button.click();
    return true;
})()"#;

const LOGIN_STATE_SCRIPT: &str = r#"(() => {
    const marker = document.querySelector('.error-message, .alert-danger, .text-danger');
    const errorText = marker ? (marker.textContent || '').trim().slice(0, 100) : null;
    const body = (document.body && document.body.innerText || '').toLowerCase();
    const successText = ['login successful', 'logged in successfully', 'welcome back']
        .some(phrase => body.includes(phrase));
    return { errorText, successText };
})()"#;

/// What the page looks like after the redirect wait expired
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginProbe {
    #[serde(skip)]
    pub avatar: bool,
    pub error_text: Option<String>,
    #[serde(skip)]
    pub url: String,
    #[serde(default)]
    pub success_text: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginVerdict {
    Authenticated(&'static str),
    Rejected(String),
    Unconfirmed,
}

/// Decide whether a login went through although the redirect was not seen
///
/// Signals are checked in order: session marker, explicit error marker,
/// URL away from the login path, success text.
pub fn assess_login(probe: &LoginProbe) -> LoginVerdict {
    if probe.avatar {
        return LoginVerdict::Authenticated("user avatar detected");
    }
    if let Some(text) = probe.error_text.as_deref().filter(|t| !t.is_empty()) {
        return LoginVerdict::Rejected(text.to_string());
    }
    if left_login_page(&probe.url) {
        return LoginVerdict::Authenticated("redirected away from login");
    }
    if probe.success_text {
        return LoginVerdict::Authenticated("success message shown");
    }
    LoginVerdict::Unconfirmed
}

fn left_login_page(current: &str) -> bool {
    match Url::parse(current) {
        Ok(url) => matches!(url.scheme(), "http" | "https") && !url.path().contains("login"),
        Err(_) => false,
    }
}

pub struct LoginStep {
    page: Page,
    login_url: String,
    phone: String,
    password: String,
}

impl LoginStep {
    pub fn new(page: Page, login_url: &str, phone: &str, password: &str) -> Self {
        Self {
            page,
            login_url: login_url.to_string(),
            phone: phone.to_string(),
            password: password.to_string(),
        }
    }

    async fn probe(&self) -> LoginProbe {
        let avatar = self
            .page
            .wait_for(&WaitCondition::selector(AVATAR), AVATAR_TIMEOUT)
            .await
            .is_ok();
        let mut probe = match self.page.evaluate(LOGIN_STATE_SCRIPT).await {
            Ok(value) => serde_json::from_value(value).unwrap_or_default(),
            Err(err) => {
                debug!("login state probe failed: {}", err);
                LoginProbe::default()
            }
        };
        probe.avatar = avatar;
        probe.url = self.page.current_url().await.unwrap_or_default();
        probe
    }
}

#[async_trait]
impl StepAction for LoginStep {
    async fn run(&self, ctx: &AttemptContext) -> Result<StepReport, StepError> {
        if ctx.is_retry() {
            if let Err(err) = self.page.reload(NAVIGATION_TIMEOUT).await {
                debug!("reload before login retry failed: {}", err);
            }
        }

        self.page
            .navigate(&self.login_url, NAVIGATION_TIMEOUT)
            .await
            .map_err(|e| step_error(e, NAVIGATION_TIMEOUT))?;
        debug!("Login page loaded");

        for field in [USERNAME_INPUT, PASSWORD_INPUT] {
            self.page
                .wait_for(&WaitCondition::selector(field), FIELD_TIMEOUT)
                .await
                .map_err(|e| step_error(e, FIELD_TIMEOUT))?;
        }
        self.page
            .fill(USERNAME_INPUT, &self.phone)
            .await
            .map_err(|e| step_error(e, FIELD_TIMEOUT))?;
        self.page
            .fill(PASSWORD_INPUT, &self.password)
            .await
            .map_err(|e| step_error(e, FIELD_TIMEOUT))?;
        debug!("Credentials entered");

        let clicked = self
            .page
            .evaluate(CLICK_LOGIN_SCRIPT)
            .await
            .map_err(|e| step_error(e, FIELD_TIMEOUT))?;
        if clicked.as_bool() != Some(true) {
            return Err(StepError::failed("login button not found"));
        }

        match self
            .page
            .wait_for(&WaitCondition::url_contains(HOME_FRAGMENT), REDIRECT_TIMEOUT)
            .await
        {
            Ok(()) => {
                info!("Redirected to home page");
                return Ok(StepReport::with_detail("Redirected to home page"));
            }
            Err(err) if !err.is_timeout() => return Err(step_error(err, REDIRECT_TIMEOUT)),
            Err(_) => {}
        }

        let probe = self.probe().await;
        match assess_login(&probe) {
            LoginVerdict::Authenticated(signal) => {
                info!(url = %probe.url, "Login confirmed: {}", signal);
                Ok(StepReport::with_detail(format!("Login confirmed ({signal})")))
            }
            LoginVerdict::Rejected(text) => {
                warn!("Login rejected: {}", text);
                Err(StepError::failed(format!("Login error: {text}")))
            }
            LoginVerdict::Unconfirmed => Err(StepError::timeout(
                format!("no sign of a session after login (still at {})", probe.url),
                REDIRECT_TIMEOUT.as_millis() as u64,
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn probe(url: &str) -> LoginProbe {
        LoginProbe {
            url: url.to_string(),
            ..LoginProbe::default()
        }
    }

    #[test]
    fn avatar_wins_over_everything() {
        let mut p = probe("https://ind.55ace.com/login");
        p.avatar = true;
        p.error_text = Some("Wrong password".into());
        assert!(matches!(assess_login(&p), LoginVerdict::Authenticated(_)));
    }

    #[test]
    fn error_marker_rejects_even_after_redirect() {
        let mut p = probe("https://ind.55ace.com/lobby");
        p.error_text = Some("Wrong password".into());
        assert_eq!(
            assess_login(&p),
            LoginVerdict::Rejected("Wrong password".into())
        );
    }

    #[test]
    fn url_change_confirms_login() {
        assert!(matches!(
            assess_login(&probe("https://ind.55ace.com/lobby?tab=1")),
            LoginVerdict::Authenticated("redirected away from login")
        ));
        assert_eq!(
            assess_login(&probe("https://ind.55ace.com/login?next=/home")),
            LoginVerdict::Unconfirmed
        );
        assert_eq!(assess_login(&probe("about:blank")), LoginVerdict::Unconfirmed);
    }

    #[test]
    fn success_text_is_the_last_resort() {
        let mut p = probe("https://ind.55ace.com/login");
        p.success_text = true;
        assert_eq!(
            assess_login(&p),
            LoginVerdict::Authenticated("success message shown")
        );
    }

    #[test]
    fn state_script_result_deserializes() {
        let value = serde_json::json!({ "errorText": null, "successText": true });
        let p: LoginProbe = serde_json::from_value(value).unwrap();
        assert!(p.success_text);
        assert!(p.error_text.is_none());
    }
}
