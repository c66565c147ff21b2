//! Rollback stack for reversible remediation changes.
//!
//! Each task success that returned an undo token pushes a record; an abort
//! pops the records strictly in reverse push order and invokes the
//! executor's undo per record. Unwind is best-effort: a failed undo is
//! logged and the remaining records are still popped. The stack is mutated
//! only during two disjoint phases (push while Executing, pop while
//! RollingBack) that never overlap.

use chrono::{DateTime, Utc};

use crate::collab::RemediationExecutor;
use crate::core::task::TaskId;
use crate::{wlog_debug, wlog_warn};

/// One reversible change captured on task success.
#[derive(Debug, Clone)]
pub struct RollbackRecord {
    pub task_id: TaskId,
    /// Opaque undo token returned by the remediation collaborator.
    pub undo_token: String,
    pub recorded_at: DateTime<Utc>,
}

/// Outcome of a full unwind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnwindSummary {
    /// Records whose undo call succeeded.
    pub undone: usize,
    /// Records whose undo call failed (logged, unwind continued).
    pub failed: usize,
    /// Task ids whose changes were reversed, in unwind order.
    pub total: usize,
}

/// LIFO stack of reversible-change tokens for one run.
#[derive(Debug, Default)]
pub struct RollbackManager {
    stack: Vec<RollbackRecord>,
}

impl RollbackManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a record for a task whose remediation reported a reversible change.
    pub fn record(&mut self, task_id: TaskId, undo_token: String) {
        wlog_debug!("rollback record pushed for task {}", task_id.short());
        self.stack.push(RollbackRecord {
            task_id,
            undo_token,
            recorded_at: Utc::now(),
        });
    }

    pub fn len(&self) -> usize {
        self.stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    /// Unwind the stack strictly LIFO, invoking undo for each record.
    ///
    /// Never returns an error: individual undo failures are logged and the
    /// unwind continues. Returns the summary plus the task ids that were
    /// successfully reversed, in unwind order.
    pub async fn unwind(
        &mut self,
        executor: &dyn RemediationExecutor,
    ) -> (UnwindSummary, Vec<TaskId>) {
        let total = self.stack.len();
        let mut undone = 0;
        let mut failed = 0;
        let mut reversed = Vec::new();

        while let Some(record) = self.stack.pop() {
            match executor.undo(&record.undo_token).await {
                Ok(()) => {
                    undone += 1;
                    reversed.push(record.task_id);
                    wlog_debug!("undo applied for task {}", record.task_id.short());
                }
                Err(err) => {
                    failed += 1;
                    wlog_warn!(
                        "undo failed for task {}: {} (continuing unwind)",
                        record.task_id.short(),
                        err
                    );
                }
            }
        }

        (
            UnwindSummary {
                undone,
                failed,
                total,
            },
            reversed,
        )
    }
}
