//! Step pipeline
//!
//! Runs an ordered list of named steps against an external control surface.
//! Each step carries its own policy: attempt-based retry with a fixed delay,
//! or bounded polling for steps that wait on a derived signal. A step only
//! starts once its predecessor has succeeded, and exhausting a step's policy
//! aborts the whole run.

pub mod errors;
pub mod executor;
pub mod strategies;
pub mod types;

pub use errors::{FlowError, StepError};
pub use executor::{NoopObserver, PipelineObserver, StepAction, StepPipeline};
pub use strategies::{DefaultFailureHandler, FailureHandler, FailureHandlerResult};
pub use types::{
    AttemptContext, PipelineConfig, PipelineResult, PipelineRun, RetryPolicy, RunOutcome, Step,
    StepReport, StepResult,
};
