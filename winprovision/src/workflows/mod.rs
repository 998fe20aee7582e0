//! Provisioning sequences built on the readiness waits.
//!
//! Each workflow returns a [`WorkflowReport`]; soft timeouts end a workflow early
//! with [`WorkflowStatus::TimedOut`] instead of an error.

use crate::{AutomationError, TimeoutMode, WaitOutcome};
use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

pub mod first_boot;
pub mod mt5;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WorkflowStatus {
    Completed,
    /// The process restarted itself elevated; the new instance carries on
    Relaunched,
    TimedOut {
        condition: String,
        elapsed_ms: u64,
        timeout_ms: u64,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepRecord {
    pub name: String,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkflowReport {
    pub workflow: String,
    #[serde(flatten)]
    pub status: WorkflowStatus,
    pub steps: Vec<StepRecord>,
    pub elapsed_ms: u64,
}

impl WorkflowReport {
    pub fn is_completed(&self) -> bool {
        self.status == WorkflowStatus::Completed
    }

    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name.as_str()).collect()
    }
}

/// Collects step timings while a workflow runs
pub(crate) struct Progress {
    workflow: &'static str,
    started: Instant,
    step_started: Instant,
    steps: Vec<StepRecord>,
}

impl Progress {
    pub(crate) fn new(workflow: &'static str) -> Self {
        let now = Instant::now();
        Self {
            workflow,
            started: now,
            step_started: now,
            steps: Vec::new(),
        }
    }

    pub(crate) fn step(&mut self, name: impl Into<String>) {
        let name = name.into();
        let elapsed = self.step_started.elapsed();
        info!("[{}] {} done in {:?}", self.workflow, name, elapsed);
        self.steps.push(StepRecord {
            name,
            elapsed_ms: as_millis(elapsed),
        });
        self.step_started = Instant::now();
    }

    pub(crate) fn finish(self, status: WorkflowStatus) -> WorkflowReport {
        WorkflowReport {
            workflow: self.workflow.to_string(),
            status,
            steps: self.steps,
            elapsed_ms: as_millis(self.started.elapsed()),
        }
    }
}

/// Result of applying a [`TimeoutMode`] to a wait
pub(crate) enum Gate<T> {
    Continue(T),
    Stop(WorkflowStatus),
}

pub(crate) fn gate<T>(
    outcome: WaitOutcome<T>,
    mode: TimeoutMode,
) -> Result<Gate<T>, AutomationError> {
    match (outcome, mode) {
        (WaitOutcome::Ready { value, .. }, _) => Ok(Gate::Continue(value)),
        (timed_out, TimeoutMode::Hard) => timed_out.into_result().map(Gate::Continue),
        (
            WaitOutcome::TimedOut {
                condition,
                elapsed,
                timeout,
                ..
            },
            TimeoutMode::Soft,
        ) => {
            warn!(
                "Timeout waiting for {}: waited {:?}, stopping without error",
                condition, elapsed
            );
            Ok(Gate::Stop(WorkflowStatus::TimedOut {
                condition,
                elapsed_ms: as_millis(elapsed),
                timeout_ms: as_millis(timeout),
            }))
        }
    }
}

fn as_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
