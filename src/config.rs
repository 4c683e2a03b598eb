//! Runtime settings
//!
//! Everything is read from the process environment through the `config`
//! crate. There are no command-line flags.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use cdp_adapter::CdpConfig;
use serde::Deserialize;
use thiserror::Error;

pub const DEFAULT_LOGIN_URL: &str = "https://ind.55ace.com/login";
pub const DEFAULT_GAME_URL: &str = "https://evo.wcentertainments.com/frontend/evo/r2/\
#game=icefishing&table_id=IceFishing000001&vt_id=tbm6dbieeo4qbedu";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("required environment variable {0} is not set")]
    Missing(&'static str),

    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },

    #[error("failed to read environment: {0}")]
    Source(#[from] config::ConfigError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Environment keys as the `config` crate presents them (lowercased).
#[derive(Debug, Default, Deserialize)]
struct RawSettings {
    phone: Option<String>,
    password: Option<String>,
    bot_token: Option<String>,
    log_chat_id: Option<String>,
    file_chat_id: Option<String>,
    login_url: Option<String>,
    game_url: Option<String>,
    output_dir: Option<String>,
    max_runtime_secs: Option<String>,
    headless: Option<String>,
    chrome_path: Option<String>,
    cdp_ws_url: Option<String>,
    log_level: Option<String>,
    log_format: Option<String>,
}

#[derive(Clone)]
pub struct Settings {
    pub phone: String,
    pub password: String,
    pub bot_token: String,
    pub log_chat_id: String,
    pub file_chat_id: String,
    pub login_url: String,
    pub game_url: String,
    pub output_dir: PathBuf,
    /// Give up waiting for a capture after this long; unbounded when unset
    pub max_runtime: Option<Duration>,
    pub headless: bool,
    pub chrome_path: Option<PathBuf>,
    pub cdp_ws_url: Option<String>,
    pub log_level: String,
    pub log_format: LogFormat,
}

impl Settings {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(config::Environment::default())
    }

    /// Load from an explicit set of variables instead of the process environment.
    pub fn from_vars<I, K, V>(vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let vars: HashMap<String, String> = vars
            .into_iter()
            .map(|(key, value)| (key.into(), value.into()))
            .collect();
        Self::load(config::Environment::default().source(Some(vars.into_iter().collect())))
    }

    fn load(source: config::Environment) -> Result<Self, ConfigError> {
        let raw: RawSettings = config::Config::builder()
            .add_source(source)
            .build()?
            .try_deserialize()?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawSettings) -> Result<Self, ConfigError> {
        let max_runtime = match present(raw.max_runtime_secs) {
            Some(value) => {
                let secs: u64 = value.parse().map_err(|_| ConfigError::Invalid {
                    key: "MAX_RUNTIME_SECS",
                    reason: format!("'{value}' is not a whole number of seconds"),
                })?;
                (secs > 0).then(|| Duration::from_secs(secs))
            }
            None => None,
        };

        let headless = match present(raw.headless) {
            Some(value) => parse_flag("HEADLESS", &value)?,
            None => true,
        };

        let log_format = match present(raw.log_format).map(|v| v.to_ascii_lowercase()) {
            None => LogFormat::Text,
            Some(v) if v == "text" || v == "pretty" => LogFormat::Text,
            Some(v) if v == "json" => LogFormat::Json,
            Some(v) => {
                return Err(ConfigError::Invalid {
                    key: "LOG_FORMAT",
                    reason: format!("expected 'text' or 'json', got '{v}'"),
                })
            }
        };

        Ok(Self {
            phone: required("PHONE", raw.phone)?,
            password: required("PASSWORD", raw.password)?,
            bot_token: required("BOT_TOKEN", raw.bot_token)?,
            log_chat_id: required("LOG_CHAT_ID", raw.log_chat_id)?,
            file_chat_id: required("FILE_CHAT_ID", raw.file_chat_id)?,
            login_url: present(raw.login_url).unwrap_or_else(|| DEFAULT_LOGIN_URL.to_string()),
            game_url: present(raw.game_url).unwrap_or_else(|| DEFAULT_GAME_URL.to_string()),
            output_dir: present(raw.output_dir)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(".")),
            max_runtime,
            headless,
            chrome_path: present(raw.chrome_path).map(PathBuf::from),
            cdp_ws_url: present(raw.cdp_ws_url),
            log_level: present(raw.log_level).unwrap_or_else(|| "info".to_string()),
            log_format,
        })
    }

    /// Browser launch settings derived from this configuration.
    pub fn cdp_config(&self) -> CdpConfig {
        CdpConfig {
            executable: self.chrome_path.clone(),
            headless: self.headless,
            websocket_url: self.cdp_ws_url.clone(),
            ..CdpConfig::default()
        }
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("phone", &self.phone)
            .field("password", &"<redacted>")
            .field("bot_token", &"<redacted>")
            .field("log_chat_id", &self.log_chat_id)
            .field("file_chat_id", &self.file_chat_id)
            .field("login_url", &self.login_url)
            .field("game_url", &self.game_url)
            .field("output_dir", &self.output_dir)
            .field("max_runtime", &self.max_runtime)
            .field("headless", &self.headless)
            .field("chrome_path", &self.chrome_path)
            .field("cdp_ws_url", &self.cdp_ws_url)
            .field("log_level", &self.log_level)
            .field("log_format", &self.log_format)
            .finish()
    }
}

fn present(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn required(key: &'static str, value: Option<String>) -> Result<String, ConfigError> {
    present(value).ok_or(ConfigError::Missing(key))
}

fn parse_flag(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::Invalid {
            key,
            reason: format!("expected a boolean, got '{other}'"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_vars() -> Vec<(&'static str, &'static str)> {
        vec![
            ("PHONE", "0987654321"),
            ("PASSWORD", "hunter2"),
            ("BOT_TOKEN", "123:abc"),
            ("LOG_CHAT_ID", "-1001111"),
            ("FILE_CHAT_ID", "-1002222"),
        ]
    }

    #[test]
    fn defaults_fill_optional_keys() {
        let settings = Settings::from_vars(base_vars()).unwrap();
        assert_eq!(settings.phone, "0987654321");
        assert_eq!(settings.log_chat_id, "-1001111");
        assert_eq!(settings.login_url, DEFAULT_LOGIN_URL);
        assert!(settings.game_url.contains("game=icefishing"));
        assert_eq!(settings.output_dir, PathBuf::from("."));
        assert_eq!(settings.max_runtime, None);
        assert!(settings.headless);
        assert_eq!(settings.log_format, LogFormat::Text);
        assert_eq!(settings.log_level, "info");
    }

    #[test]
    fn missing_or_blank_required_key_is_named() {
        let vars: Vec<_> = base_vars()
            .into_iter()
            .filter(|(key, _)| *key != "BOT_TOKEN")
            .collect();
        let err = Settings::from_vars(vars).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("BOT_TOKEN")));

        let mut vars = base_vars();
        vars[0] = ("PHONE", "   ");
        let err = Settings::from_vars(vars).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("PHONE")));
    }

    #[test]
    fn optional_keys_are_parsed() {
        let mut vars = base_vars();
        vars.extend([
            ("MAX_RUNTIME_SECS", "600"),
            ("HEADLESS", "false"),
            ("CHROME_PATH", "/opt/chrome/chrome"),
            ("LOG_FORMAT", "JSON"),
            ("OUTPUT_DIR", "/tmp/spins"),
        ]);
        let settings = Settings::from_vars(vars).unwrap();
        assert_eq!(settings.max_runtime, Some(Duration::from_secs(600)));
        assert!(!settings.headless);
        assert_eq!(settings.log_format, LogFormat::Json);
        assert_eq!(settings.output_dir, PathBuf::from("/tmp/spins"));

        let cdp = settings.cdp_config();
        assert_eq!(cdp.executable, Some(PathBuf::from("/opt/chrome/chrome")));
        assert!(!cdp.headless);
        assert!(cdp.websocket_url.is_none());
    }

    #[test]
    fn malformed_optional_values_are_rejected() {
        let mut vars = base_vars();
        vars.push(("HEADLESS", "sometimes"));
        let err = Settings::from_vars(vars).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "HEADLESS", .. }));

        let mut vars = base_vars();
        vars.push(("MAX_RUNTIME_SECS", "ten"));
        let err = Settings::from_vars(vars).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "MAX_RUNTIME_SECS", .. }));
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let settings = Settings::from_vars(base_vars()).unwrap();
        let rendered = format!("{settings:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(!rendered.contains("123:abc"));
        assert!(rendered.contains("<redacted>"));
    }
}
