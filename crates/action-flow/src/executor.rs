//! Pipeline executor implementation

use crate::errors::{FlowError, StepError};
use crate::strategies::{DefaultFailureHandler, FailureHandler, FailureHandlerResult};
use crate::types::*;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::time::{sleep, timeout, Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// A capability invocation performed by one step
#[async_trait]
pub trait StepAction: Send + Sync {
    /// Perform one attempt (or one probe, for polling steps)
    async fn run(&self, ctx: &AttemptContext) -> Result<StepReport, StepError>;
}

/// Receives every state transition of a run
///
/// All methods default to no-ops so implementors pick what they care about.
#[async_trait]
pub trait PipelineObserver: Send + Sync {
    async fn step_started(&self, _step: &str, _index: usize, _total: usize) {}

    async fn attempt_failed(&self, _ctx: &AttemptContext, _error: &StepError) {}

    async fn step_completed(&self, _result: &StepResult) {}

    async fn run_aborted(&self, _error: &FlowError) {}
}

/// Observer that ignores everything
pub struct NoopObserver;

impl PipelineObserver for NoopObserver {}

/// Runs steps strictly in order, each under its own retry policy
pub struct StepPipeline {
    config: PipelineConfig,
    failure_handler: Arc<dyn FailureHandler>,
    observer: Arc<dyn PipelineObserver>,
    cancel: CancellationToken,
}

impl StepPipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            failure_handler: Arc::new(DefaultFailureHandler::new()),
            observer: Arc::new(NoopObserver),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn PipelineObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn with_failure_handler(mut self, handler: Arc<dyn FailureHandler>) -> Self {
        self.failure_handler = handler;
        self
    }

    /// Abort the run as soon as `token` is cancelled
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Validate pipeline structure
    pub fn validate(&self, steps: &[Step]) -> Result<(), FlowError> {
        if steps.is_empty() {
            return Err(FlowError::InvalidStructure(
                "pipeline has no steps".to_string(),
            ));
        }
        for step in steps {
            if step.name().trim().is_empty() {
                return Err(FlowError::InvalidStructure(
                    "step name cannot be empty".to_string(),
                ));
            }
            match step.policy() {
                RetryPolicy::Attempts { max_attempts: 0, .. } => {
                    return Err(FlowError::InvalidStructure(format!(
                        "step '{}' allows zero attempts",
                        step.name()
                    )));
                }
                RetryPolicy::Poll {
                    interval_ms: 0, ..
                } => {
                    return Err(FlowError::InvalidStructure(format!(
                        "step '{}' polls with a zero interval",
                        step.name()
                    )));
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Execute all steps in order
    ///
    /// Returns the collected step results on success. The first step that
    /// exhausts its policy aborts the run with [`FlowError::FatalStepFailure`].
    pub async fn run(&self, steps: Vec<Step>) -> Result<PipelineResult, FlowError> {
        self.validate(&steps)?;

        let mut run = PipelineRun::new(steps);
        let mut result = PipelineResult::new(run.id);
        let total = run.steps().len();
        info!(run_id = %run.id, steps = total, "Starting pipeline");

        while run.current() < total {
            let index = run.current();
            let step = run.steps()[index].clone();

            if index > 0 && self.config.inter_step_delay_ms > 0 {
                let delay = Duration::from_millis(self.config.inter_step_delay_ms);
                if let Err(err) = self.pause(delay, step.name()).await {
                    return Err(self.abort(&mut run, err).await);
                }
            }

            self.observer.step_started(step.name(), index, total).await;
            match self.execute_step(&step).await {
                Ok(step_result) => {
                    info!(
                        step = %step.name(),
                        attempts = step_result.attempts,
                        latency_ms = step_result.latency_ms,
                        "Step completed"
                    );
                    self.observer.step_completed(&step_result).await;
                    result = result.with_step(step_result);
                    run.advance();
                }
                Err(err) => return Err(self.abort(&mut run, err).await),
            }
        }

        run.conclude(RunOutcome::Success);
        info!(run_id = %run.id, outcome = ?run.outcome(), "Pipeline completed");
        Ok(result.with_outcome(RunOutcome::Success).finish())
    }

    async fn abort(&self, run: &mut PipelineRun, err: FlowError) -> FlowError {
        let outcome = match &err {
            FlowError::Cancelled(step) => RunOutcome::Cancelled { step: step.clone() },
            other => RunOutcome::FatalFailure {
                step: other.step().unwrap_or_default().to_string(),
                error: other.to_string(),
            },
        };
        run.conclude(outcome);
        warn!(
            run_id = %run.id,
            step_index = run.current(),
            outcome = ?run.outcome(),
            "Pipeline aborted: {}",
            err
        );
        self.observer.run_aborted(&err).await;
        err
    }

    /// Run one step until it succeeds or its policy is exhausted
    async fn execute_step(&self, step: &Step) -> Result<StepResult, FlowError> {
        let policy = step.policy();
        let max_attempts = match policy {
            RetryPolicy::Attempts { max_attempts, .. } => Some(max_attempts),
            RetryPolicy::Poll { .. } => None,
        };
        let started = Instant::now();
        let result = StepResult::new(step.name());
        let mut attempt = 1;

        loop {
            let ctx = AttemptContext {
                step: step.name().to_string(),
                attempt,
                max_attempts,
                elapsed: started.elapsed(),
            };
            debug!(step = %ctx.step, attempt, "Invoking step");

            let error = match self.invoke(step, &ctx).await? {
                Ok(report) => {
                    return Ok(result.with_attempts(attempt).with_success(report).finish());
                }
                Err(error) => error,
            };

            if matches!(policy, RetryPolicy::Attempts { .. }) {
                self.observer.attempt_failed(&ctx, &error).await;
            }

            let ctx = AttemptContext {
                elapsed: started.elapsed(),
                ..ctx
            };
            match self.failure_handler.handle_failure(policy, &ctx, &error) {
                FailureHandlerResult::Retry { attempt: next, backoff } => {
                    self.pause(backoff, step.name()).await?;
                    attempt = next;
                }
                FailureHandlerResult::Abort => {
                    let source = match policy {
                        RetryPolicy::Poll { .. } => StepError::timeout(
                            format!("'{}' not confirmed ({})", step.name(), error),
                            started.elapsed().as_millis() as u64,
                        ),
                        RetryPolicy::Attempts { .. } => error,
                    };
                    return Err(FlowError::FatalStepFailure {
                        step: step.name().to_string(),
                        attempts: attempt,
                        source,
                    });
                }
            }
        }
    }

    async fn invoke(
        &self,
        step: &Step,
        ctx: &AttemptContext,
    ) -> Result<Result<StepReport, StepError>, FlowError> {
        let call = async {
            match step.policy() {
                RetryPolicy::Poll { timeout_ms, .. } => {
                    let remaining = Duration::from_millis(timeout_ms).saturating_sub(ctx.elapsed);
                    match timeout(remaining, step.action().run(ctx)).await {
                        Ok(outcome) => outcome,
                        Err(_) => Err(StepError::timeout(
                            format!("probe for '{}'", ctx.step),
                            timeout_ms,
                        )),
                    }
                }
                RetryPolicy::Attempts { .. } => step.action().run(ctx).await,
            }
        };

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(FlowError::Cancelled(step.name().to_string())),
            outcome = call => Ok(outcome),
        }
    }

    async fn pause(&self, delay: Duration, step: &str) -> Result<(), FlowError> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(FlowError::Cancelled(step.to_string())),
            _ = sleep(delay) => Ok(()),
        }
    }
}
