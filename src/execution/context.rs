//! Per-run execution state.
//!
//! A `RunContext` tracks one execution of a selected plan: counters, the
//! accumulated risk reduction, per-task outcomes, and the coherence health
//! scalar. All mutation happens on the dispatching control flow immediately
//! after a task reaches a terminal state, never on the concurrent workers,
//! so none of these fields need locks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use crate::core::plan::{PlanId, Strategy};
use crate::core::task::TaskId;

/// Coherence recovery per successful task.
const COHERENCE_RECOVERY: f64 = 0.05;
/// Coherence decay factor per failed task.
const COHERENCE_DECAY: f64 = 0.85;

/// Unique identifier for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Return first 8 characters of the UUID for display.
    pub fn short(&self) -> String {
        self.0.to_string()[..8].to_string()
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Terminal result of a single task within a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskOutcome {
    pub task_id: TaskId,
    pub finding_id: String,
    pub succeeded: bool,
    /// Error text for failed tasks.
    pub error: Option<String>,
    /// Wall-clock duration of the remediation call.
    pub duration: Duration,
    /// Risk reduction credited (zero for failed tasks).
    pub risk_reduction: f64,
    /// Set during abort when the task's change was reversed.
    pub rolled_back: bool,
}

/// Mutable state of one plan execution.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub id: RunId,
    pub plan_id: PlanId,
    pub strategy: Strategy,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    tasks_executed: u32,
    tasks_succeeded: u32,
    tasks_failed: u32,
    risk_reduction_achieved: f64,
    /// Health proxy in [0, 1]: decays on failure, recovers on success.
    /// Gates self-healing aggressiveness only; no correctness role.
    coherence: f64,
    outcomes: Vec<TaskOutcome>,
}

impl RunContext {
    pub fn new(plan_id: PlanId, strategy: Strategy) -> Self {
        Self {
            id: RunId::new(),
            plan_id,
            strategy,
            started_at: Utc::now(),
            finished_at: None,
            tasks_executed: 0,
            tasks_succeeded: 0,
            tasks_failed: 0,
            risk_reduction_achieved: 0.0,
            coherence: 1.0,
            outcomes: Vec::new(),
        }
    }

    /// Record a terminal task outcome.
    ///
    /// This is the single mutation point for the counters, which keeps the
    /// invariant `executed == succeeded + failed` true at all times.
    pub fn record_outcome(&mut self, outcome: TaskOutcome) {
        self.tasks_executed += 1;
        if outcome.succeeded {
            self.tasks_succeeded += 1;
            self.risk_reduction_achieved += outcome.risk_reduction;
            self.coherence = (self.coherence + COHERENCE_RECOVERY).min(1.0);
        } else {
            self.tasks_failed += 1;
            self.coherence = (self.coherence * COHERENCE_DECAY).max(0.0);
        }
        self.outcomes.push(outcome);
    }

    /// Mark a recorded outcome as rolled back.
    pub fn mark_rolled_back(&mut self, task_id: TaskId) {
        if let Some(outcome) = self.outcomes.iter_mut().find(|o| o.task_id == task_id) {
            outcome.rolled_back = true;
        }
    }

    pub fn tasks_executed(&self) -> u32 {
        self.tasks_executed
    }

    pub fn tasks_succeeded(&self) -> u32 {
        self.tasks_succeeded
    }

    pub fn tasks_failed(&self) -> u32 {
        self.tasks_failed
    }

    pub fn risk_reduction_achieved(&self) -> f64 {
        self.risk_reduction_achieved
    }

    pub fn coherence(&self) -> f64 {
        self.coherence
    }

    pub fn outcomes(&self) -> &[TaskOutcome] {
        &self.outcomes
    }

    /// Fraction of executed tasks that failed; 0.0 before any execution.
    pub fn failure_fraction(&self) -> f64 {
        if self.tasks_executed == 0 {
            0.0
        } else {
            self.tasks_failed as f64 / self.tasks_executed as f64
        }
    }

    /// Average remediation-call latency over the most recent `window` outcomes.
    pub fn recent_avg_latency(&self, window: usize) -> Option<Duration> {
        if self.outcomes.is_empty() {
            return None;
        }
        let start = self.outcomes.len().saturating_sub(window);
        let recent = &self.outcomes[start..];
        let total: Duration = recent.iter().map(|o| o.duration).sum();
        Some(total / recent.len() as u32)
    }

    /// Finalize the run and produce its report.
    pub fn finalize(mut self, aborted: bool, rolled_back: bool) -> RunReport {
        self.finished_at = Some(Utc::now());
        RunReport {
            run_id: self.id,
            plan_id: self.plan_id,
            strategy: self.strategy,
            started_at: self.started_at,
            finished_at: self.finished_at.unwrap_or(self.started_at),
            tasks_executed: self.tasks_executed,
            tasks_succeeded: self.tasks_succeeded,
            tasks_failed: self.tasks_failed,
            risk_reduction_achieved: self.risk_reduction_achieved,
            coherence: self.coherence,
            aborted,
            rolled_back,
            outcomes: self.outcomes,
        }
    }
}

/// Structured result of a run, returned to the caller and emitted with the
/// completion event. Never persisted by this subsystem.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: RunId,
    pub plan_id: PlanId,
    pub strategy: Strategy,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub tasks_executed: u32,
    pub tasks_succeeded: u32,
    pub tasks_failed: u32,
    pub risk_reduction_achieved: f64,
    /// Final coherence health metric.
    pub coherence: f64,
    pub aborted: bool,
    pub rolled_back: bool,
    pub outcomes: Vec<TaskOutcome>,
}
