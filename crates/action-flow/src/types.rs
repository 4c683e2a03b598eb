//! Core types for step orchestration

use crate::executor::StepAction;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// How a step is re-invoked after an unsuccessful attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum RetryPolicy {
    /// Invoke up to `max_attempts` times with a fixed delay in between
    Attempts { max_attempts: u32, backoff_ms: u64 },

    /// Probe every `interval_ms` until success or `timeout_ms` has elapsed
    Poll { interval_ms: u64, timeout_ms: u64 },
}

impl RetryPolicy {
    pub fn attempts(max_attempts: u32, backoff: Duration) -> Self {
        RetryPolicy::Attempts {
            max_attempts,
            backoff_ms: backoff.as_millis() as u64,
        }
    }

    pub fn poll(interval: Duration, timeout: Duration) -> Self {
        RetryPolicy::Poll {
            interval_ms: interval.as_millis() as u64,
            timeout_ms: timeout.as_millis() as u64,
        }
    }

    /// Single attempt, no retry
    pub fn once() -> Self {
        RetryPolicy::Attempts {
            max_attempts: 1,
            backoff_ms: 0,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::Attempts {
            max_attempts: 3,
            backoff_ms: 5_000,
        }
    }
}

/// One named, independently retried unit of the pipeline
#[derive(Clone)]
pub struct Step {
    name: String,
    action: Arc<dyn StepAction>,
    policy: RetryPolicy,
}

impl Step {
    /// Create a step with the default policy (3 attempts, 5s apart)
    pub fn new(name: impl Into<String>, action: Arc<dyn StepAction>) -> Self {
        Self {
            name: name.into(),
            action,
            policy: RetryPolicy::default(),
        }
    }

    /// Set the retry policy
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    pub(crate) fn action(&self) -> &Arc<dyn StepAction> {
        &self.action
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Step")
            .field("name", &self.name)
            .field("policy", &self.policy)
            .finish()
    }
}

/// Information handed to a step for each invocation
#[derive(Debug, Clone)]
pub struct AttemptContext {
    /// Step name
    pub step: String,

    /// 1-based attempt (or probe) number
    pub attempt: u32,

    /// Attempt cap; `None` for polling steps
    pub max_attempts: Option<u32>,

    /// Time spent in this step so far
    pub elapsed: Duration,
}

impl AttemptContext {
    /// Whether this is the last attempt the policy allows
    pub fn is_final(&self) -> bool {
        self.max_attempts
            .map(|max| self.attempt >= max)
            .unwrap_or(false)
    }

    /// Whether another attempt follows if this one fails
    pub fn is_retry(&self) -> bool {
        self.attempt > 1
    }
}

/// What a successful step reports back
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepReport {
    /// Short human-readable detail
    pub detail: Option<String>,
}

impl StepReport {
    pub fn done() -> Self {
        Self::default()
    }

    pub fn with_detail(detail: impl Into<String>) -> Self {
        Self {
            detail: Some(detail.into()),
        }
    }
}

/// Pipeline-wide settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Pause between a step's success and the next step's start
    pub inter_step_delay_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            inter_step_delay_ms: 3_000,
        }
    }
}

/// Terminal outcome of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Success,
    FatalFailure { step: String, error: String },
    Cancelled { step: String },
}

/// In-flight state of one pipeline execution
#[derive(Debug)]
pub struct PipelineRun {
    /// Run identifier
    pub id: Uuid,

    steps: Vec<Step>,
    current: usize,
    outcome: Option<RunOutcome>,
}

impl PipelineRun {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            id: Uuid::new_v4(),
            steps,
            current: 0,
            outcome: None,
        }
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Index of the step currently executing (or next to execute)
    pub fn current(&self) -> usize {
        self.current
    }

    pub fn outcome(&self) -> Option<&RunOutcome> {
        self.outcome.as_ref()
    }

    pub(crate) fn advance(&mut self) {
        self.current = (self.current + 1).min(self.steps.len());
    }

    pub(crate) fn conclude(&mut self, outcome: RunOutcome) {
        self.outcome = Some(outcome);
    }
}

/// Pipeline execution result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineResult {
    /// Run identifier
    pub run_id: Uuid,

    /// Terminal outcome
    pub outcome: RunOutcome,

    /// Start time
    pub started_at: DateTime<Utc>,

    /// Finish time
    pub finished_at: DateTime<Utc>,

    /// Total latency in milliseconds
    pub latency_ms: u64,

    /// Results of the steps that ran, in order
    pub step_results: Vec<StepResult>,
}

impl PipelineResult {
    pub fn new(run_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            run_id,
            outcome: RunOutcome::Success,
            started_at: now,
            finished_at: now,
            latency_ms: 0,
            step_results: Vec::new(),
        }
    }

    pub fn with_step(mut self, result: StepResult) -> Self {
        self.step_results.push(result);
        self
    }

    pub fn with_outcome(mut self, outcome: RunOutcome) -> Self {
        self.outcome = outcome;
        self
    }

    /// Set finish time and calculate latency
    pub fn finish(mut self) -> Self {
        self.finished_at = Utc::now();
        self.latency_ms = (self.finished_at - self.started_at).num_milliseconds() as u64;
        self
    }

    pub fn is_success(&self) -> bool {
        self.outcome == RunOutcome::Success
    }
}

/// Step execution result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    /// Step name
    pub step: String,

    /// Success flag
    pub success: bool,

    /// Attempts (or probes) used
    pub attempts: u32,

    /// Detail reported by the step
    pub detail: Option<String>,

    /// Start time
    pub started_at: DateTime<Utc>,

    /// Finish time
    pub finished_at: DateTime<Utc>,

    /// Latency in milliseconds
    pub latency_ms: u64,
}

impl StepResult {
    pub fn new(step: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            step: step.into(),
            success: false,
            attempts: 0,
            detail: None,
            started_at: now,
            finished_at: now,
            latency_ms: 0,
        }
    }

    /// Mark as success
    pub fn with_success(mut self, report: StepReport) -> Self {
        self.success = true;
        self.detail = report.detail;
        self
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    /// Set finish time and calculate latency
    pub fn finish(mut self) -> Self {
        self.finished_at = Utc::now();
        self.latency_ms = (self.finished_at - self.started_at).num_milliseconds() as u64;
        self
    }
}
