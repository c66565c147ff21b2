//! Engine events for external observation.
//!
//! The engine emits discrete events over an mpsc channel passed in at
//! construction; consumption (logging, alerting, dashboards) is entirely the
//! receiver's responsibility, and a dropped receiver never blocks execution.

use std::time::Duration;

use crate::core::plan::{PlanId, Strategy};
use crate::core::task::TaskId;
use crate::execution::context::RunReport;

/// Events emitted by the execution engine for run and task lifecycle changes.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// A plan has been selected and handed to the engine.
    PlanningComplete {
        plan_id: PlanId,
        strategy: Strategy,
        task_count: usize,
        fitness: f64,
    },
    /// A task has been dispatched to the remediation executor.
    TaskStarted { task_id: TaskId },
    /// A task's remediation call succeeded.
    TaskCompleted {
        task_id: TaskId,
        duration: Duration,
        risk_reduction: f64,
    },
    /// A task's remediation call failed.
    TaskFailed {
        task_id: TaskId,
        error: String,
        /// Whether the error matched the critical pattern set.
        critical: bool,
    },
    /// The self-healing coordinator applied a mitigation.
    SelfHealingAction {
        /// Name of the mitigation, e.g. "reclaim_memory".
        action: String,
        detail: String,
    },
    /// Rollback finished unwinding the undo stack.
    RollbackComplete { undone: usize, failed: usize },
    /// The run completed (with or without task failures) without aborting.
    ExecutionComplete { report: RunReport },
    /// The run aborted or failed validation.
    ExecutionError { error: String },
}
