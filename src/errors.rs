//! Session-level errors and how they end the process

use std::process::ExitCode;

use action_flow::FlowError;
use cdp_adapter::AdapterError;
use thiserror::Error;

use crate::config::ConfigError;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The browser or its first page could not be brought up
    #[error("browser startup failed: {0}")]
    Startup(#[from] AdapterError),

    #[error(transparent)]
    Pipeline(#[from] FlowError),

    #[error("no capture within {0}s")]
    MaxRuntime(u64),

    #[error("interrupted")]
    Interrupted,
}

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    Captured,
    StartupFailure,
    FatalStep,
    MaxRuntime,
    Interrupted,
}

impl ExitStatus {
    pub fn code(self) -> u8 {
        match self {
            ExitStatus::Captured => 0,
            ExitStatus::StartupFailure => 1,
            ExitStatus::FatalStep => 2,
            ExitStatus::MaxRuntime => 3,
            ExitStatus::Interrupted => 130,
        }
    }

    pub fn reason(self) -> &'static str {
        match self {
            ExitStatus::Captured => "spin history captured",
            ExitStatus::StartupFailure => "startup failure",
            ExitStatus::FatalStep => "step failure",
            ExitStatus::MaxRuntime => "max runtime reached",
            ExitStatus::Interrupted => "stopped by user",
        }
    }
}

impl From<ExitStatus> for ExitCode {
    fn from(status: ExitStatus) -> Self {
        ExitCode::from(status.code())
    }
}

impl SessionError {
    pub fn exit_status(&self) -> ExitStatus {
        match self {
            SessionError::Config(_) | SessionError::Startup(_) => ExitStatus::StartupFailure,
            SessionError::Pipeline(FlowError::Cancelled(_)) => ExitStatus::Interrupted,
            SessionError::Pipeline(_) => ExitStatus::FatalStep,
            SessionError::MaxRuntime(_) => ExitStatus::MaxRuntime,
            SessionError::Interrupted => ExitStatus::Interrupted,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use action_flow::StepError;
    use cdp_adapter::AdapterErrorKind;

    #[test]
    fn errors_map_to_exit_codes() {
        let startup = SessionError::from(AdapterError::new(AdapterErrorKind::CdpIo));
        assert_eq!(startup.exit_status().code(), 1);

        let missing = SessionError::from(ConfigError::Missing("PHONE"));
        assert_eq!(missing.exit_status().code(), 1);

        let fatal = SessionError::from(FlowError::FatalStepFailure {
            step: "login".into(),
            attempts: 3,
            source: StepError::failed("bad credentials"),
        });
        assert_eq!(fatal.exit_status().code(), 2);

        let cancelled = SessionError::from(FlowError::Cancelled("casino".into()));
        assert_eq!(cancelled.exit_status().code(), 130);

        assert_eq!(SessionError::MaxRuntime(60).exit_status().code(), 3);
        assert_eq!(SessionError::Interrupted.exit_status().code(), 130);
        assert_eq!(ExitStatus::Captured.code(), 0);
    }
}
