use std::process::ExitCode;

use anyhow::{Context, Result};
use spinwatch::{session, ExitStatus, LogFormat, Settings};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> ExitCode {
    let settings = Settings::from_env();
    let (level, format) = match &settings {
        Ok(settings) => (settings.log_level.clone(), settings.log_format),
        Err(_) => ("info".to_string(), LogFormat::Text),
    };
    if let Err(err) = init_logging(&level, format) {
        eprintln!("Failed to initialise logging: {err:#}");
        return ExitStatus::StartupFailure.into();
    }

    let settings = match settings {
        Ok(settings) => settings,
        Err(err) => {
            error!("Configuration error: {}", err);
            return ExitStatus::StartupFailure.into();
        }
    };
    info!(?settings, "Configuration loaded");

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, shutting down");
            interrupt.cancel();
        }
    });

    let status = session::run(settings, cancel).await;
    info!(code = status.code(), "Exiting: {}", status.reason());
    status.into()
}

fn init_logging(level: &str, format: LogFormat) -> Result<()> {
    let level: tracing::Level = level.parse().context("Invalid log level")?;
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level.to_string()));

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).try_init(),
    }
    .context("Failed to install subscriber")?;

    Ok(())
}
