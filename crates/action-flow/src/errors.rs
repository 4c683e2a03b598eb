//! Pipeline error types

use thiserror::Error;

/// Classified failure of a single step attempt
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StepError {
    /// A bounded wait expired
    #[error("timed out after {elapsed_ms}ms: {context}")]
    Timeout { context: String, elapsed_ms: u64 },

    /// The attempt failed for any other reason
    #[error("{0}")]
    Failed(String),

    /// A polled signal is not present yet
    #[error("not ready: {0}")]
    Pending(String),
}

impl StepError {
    pub fn timeout(context: impl Into<String>, elapsed_ms: u64) -> Self {
        StepError::Timeout {
            context: context.into(),
            elapsed_ms,
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        StepError::Failed(reason.into())
    }

    pub fn pending(reason: impl Into<String>) -> Self {
        StepError::Pending(reason.into())
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, StepError::Timeout { .. })
    }
}

/// Pipeline execution errors
#[derive(Debug, Error)]
pub enum FlowError {
    /// A step exhausted its policy; the run is aborted
    #[error("step '{step}' failed after {attempts} attempt(s): {source}")]
    FatalStepFailure {
        step: String,
        attempts: u32,
        #[source]
        source: StepError,
    },

    /// The run was cancelled from outside
    #[error("pipeline cancelled during step '{0}'")]
    Cancelled(String),

    /// Invalid pipeline structure
    #[error("Invalid pipeline structure: {0}")]
    InvalidStructure(String),
}

impl FlowError {
    /// Name of the step the run stopped at, if any
    pub fn step(&self) -> Option<&str> {
        match self {
            FlowError::FatalStepFailure { step, .. } => Some(step),
            FlowError::Cancelled(step) => Some(step),
            FlowError::InvalidStructure(_) => None,
        }
    }
}
