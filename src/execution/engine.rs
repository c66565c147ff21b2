//! Execution engine state machine.
//!
//! The engine validates a selected plan, dispatches its tasks under bounded
//! concurrency, computes the abort decision after every terminal task, and
//! drives rollback and self-healing. A single orchestrating control flow
//! owns all run state: workers only perform the remediation call and report
//! back, so counters, the coherence metric, and the rollback stack are
//! mutated without locks.
//!
//! Run-level phases: Idle → Planning → Validating → Preparing → Executing →
//! Analyzing → Learning → Idle, with an Aborting branch from Validating or
//! Executing, optionally followed by RollingBack.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::collab::{ApprovalGate, RemediationExecutor, RemediationOutcome, ResourceProbe};
use crate::config::OrchestratorConfig;
use crate::core::plan::{Plan, Strategy};
use crate::core::task::{RemediationTask, TaskId};
use crate::error::{Error, Result};
use crate::execution::context::{RunContext, RunReport, TaskOutcome};
use crate::execution::events::EngineEvent;
use crate::execution::healing::{HealingConfig, SelfHealingCoordinator};
use crate::execution::rollback::RollbackManager;
use crate::{wlog_debug, wlog_error, wlog_info, wlog_warn};

/// Error-text patterns that always trigger an abort, matched by substring.
pub const CRITICAL_ERROR_PATTERNS: &[&str] =
    &["permission denied", "resource not found", "quota exceeded"];

/// Minimum executed tasks before the failure-fraction rule applies.
pub const MIN_EXECUTED_FOR_ABORT: u32 = 3;

/// Failure fraction beyond which the run aborts.
pub const ABORT_FAILURE_FRACTION: f64 = 0.5;

/// Outcomes considered when computing recent average latency.
const LATENCY_WINDOW: usize = 5;

/// Run-level phase of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnginePhase {
    Idle,
    Planning,
    Validating,
    Preparing,
    Executing,
    Analyzing,
    Learning,
    Aborting,
    RollingBack,
}

impl EnginePhase {
    /// Whether a transition to `next` is legal.
    pub fn can_transition(&self, next: EnginePhase) -> bool {
        use EnginePhase::*;
        matches!(
            (self, next),
            (Idle, Planning)
                | (Planning, Validating)
                | (Validating, Preparing)
                | (Validating, Aborting)
                | (Preparing, Executing)
                | (Executing, Analyzing)
                | (Executing, Aborting)
                | (Analyzing, Learning)
                | (Learning, Idle)
                | (Aborting, RollingBack)
                | (Aborting, Idle)
                | (RollingBack, Idle)
        )
    }
}

impl std::fmt::Display for EnginePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EnginePhase::Idle => "Idle",
            EnginePhase::Planning => "Planning",
            EnginePhase::Validating => "Validating",
            EnginePhase::Preparing => "Preparing",
            EnginePhase::Executing => "Executing",
            EnginePhase::Analyzing => "Analyzing",
            EnginePhase::Learning => "Learning",
            EnginePhase::Aborting => "Aborting",
            EnginePhase::RollingBack => "RollingBack",
        };
        write!(f, "{}", s)
    }
}

/// Per-strategy outcome tallies accumulated across runs (Learning phase).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StrategyStats {
    pub runs: u32,
    pub aborted: u32,
    pub tasks_succeeded: u32,
    pub tasks_failed: u32,
    pub risk_reduction: f64,
}

/// Check whether error text matches the critical pattern set.
pub fn is_critical_error(text: &str) -> bool {
    let lower = text.to_lowercase();
    CRITICAL_ERROR_PATTERNS.iter().any(|p| lower.contains(p))
}

/// What a worker reports back for one task.
struct WorkerResult {
    task_id: TaskId,
    duration: Duration,
    result: Result<RemediationOutcome>,
}

/// Executes a selected plan.
pub struct ExecutionEngine {
    config: OrchestratorConfig,
    executor: Arc<dyn RemediationExecutor>,
    event_tx: mpsc::Sender<EngineEvent>,
    probe: Option<Arc<dyn ResourceProbe>>,
    phase: EnginePhase,
    stats: HashMap<Strategy, StrategyStats>,
}

impl ExecutionEngine {
    pub fn new(
        config: OrchestratorConfig,
        executor: Arc<dyn RemediationExecutor>,
        event_tx: mpsc::Sender<EngineEvent>,
    ) -> Self {
        Self {
            config,
            executor,
            event_tx,
            probe: None,
            phase: EnginePhase::Idle,
            stats: HashMap::new(),
        }
    }

    /// Attach a resource probe, enabling the self-healing coordinator.
    pub fn with_probe(mut self, probe: Arc<dyn ResourceProbe>) -> Self {
        self.set_probe(probe);
        self
    }

    /// See [`Self::with_probe`].
    pub fn set_probe(&mut self, probe: Arc<dyn ResourceProbe>) {
        self.probe = Some(probe);
    }

    /// Current run-level phase.
    pub fn phase(&self) -> EnginePhase {
        self.phase
    }

    /// Per-strategy tallies accumulated during Learning phases.
    pub fn strategy_stats(&self) -> &HashMap<Strategy, StrategyStats> {
        &self.stats
    }

    fn transition(&mut self, next: EnginePhase) -> Result<()> {
        if !self.phase.can_transition(next) {
            return Err(Error::InvalidPhaseTransition {
                from: self.phase.to_string(),
                to: next.to_string(),
            });
        }
        wlog_debug!("engine phase {} -> {}", self.phase, next);
        self.phase = next;
        Ok(())
    }

    async fn emit(&self, event: EngineEvent) {
        let _ = self.event_tx.send(event).await;
    }

    /// Execute a selected plan over its task set.
    ///
    /// Returns the run report on completion (task failures included); raises
    /// only on validation failure or a tripped abort, in which case the
    /// error carries the partial report and whether rollback ran.
    pub async fn execute(
        &mut self,
        plan: &Plan,
        tasks: Vec<RemediationTask>,
        gate: Option<&dyn ApprovalGate>,
    ) -> Result<RunReport> {
        self.transition(EnginePhase::Planning)?;
        self.emit(EngineEvent::PlanningComplete {
            plan_id: plan.id,
            strategy: plan.strategy,
            task_count: plan.tasks.len(),
            fitness: plan.fitness,
        })
        .await;

        let mut task_map: HashMap<TaskId, RemediationTask> =
            tasks.into_iter().map(|t| (t.id, t)).collect();

        self.transition(EnginePhase::Validating)?;
        if let Err(err) = self.validate(plan, &task_map, gate).await {
            wlog_error!("plan {} rejected: {}", plan.id.short(), err);
            self.emit(EngineEvent::ExecutionError {
                error: err.to_string(),
            })
            .await;
            self.transition(EnginePhase::Aborting)?;
            self.transition(EnginePhase::Idle)?;
            return Err(err);
        }

        self.transition(EnginePhase::Preparing)?;
        let mut ctx = RunContext::new(plan.id, plan.strategy);
        let mut rollback = RollbackManager::new();
        let batch_limit = Arc::new(AtomicUsize::new(self.config.max_concurrent_tasks.max(1)));
        let healing = self.probe.as_ref().map(|probe| {
            SelfHealingCoordinator::new(
                HealingConfig::default(),
                Arc::clone(probe),
                Arc::clone(&batch_limit),
                expected_task_latency(plan, &task_map),
            )
        });

        wlog_info!(
            "run {} started: {} plan {}, {} tasks",
            ctx.id.short(),
            plan.strategy,
            plan.id.short(),
            plan.tasks.len()
        );

        self.transition(EnginePhase::Executing)?;
        let abort_reason = self
            .dispatch(plan, &mut task_map, &mut ctx, &mut rollback, &batch_limit, healing)
            .await;

        match abort_reason {
            None => {
                self.transition(EnginePhase::Analyzing)?;
                let report = ctx.finalize(false, false);

                self.transition(EnginePhase::Learning)?;
                self.learn(&report);
                self.transition(EnginePhase::Idle)?;

                wlog_info!(
                    "run {} complete: {}/{} succeeded, risk reduction {:.1}",
                    report.run_id.short(),
                    report.tasks_succeeded,
                    report.tasks_executed,
                    report.risk_reduction_achieved
                );
                self.emit(EngineEvent::ExecutionComplete {
                    report: report.clone(),
                })
                .await;
                Ok(report)
            }
            Some(reason) => {
                self.transition(EnginePhase::Aborting)?;
                wlog_error!("run {} aborting: {}", ctx.id.short(), reason);

                let rolled_back = if self.config.rollback_enabled && !rollback.is_empty() {
                    self.transition(EnginePhase::RollingBack)?;
                    let (summary, reversed) = rollback.unwind(self.executor.as_ref()).await;
                    for task_id in reversed {
                        if let Some(task) = task_map.get_mut(&task_id) {
                            task.roll_back();
                        }
                        ctx.mark_rolled_back(task_id);
                    }
                    self.emit(EngineEvent::RollbackComplete {
                        undone: summary.undone,
                        failed: summary.failed,
                    })
                    .await;
                    true
                } else {
                    false
                };
                self.transition(EnginePhase::Idle)?;

                let report = ctx.finalize(true, rolled_back);
                self.learn(&report);
                self.emit(EngineEvent::ExecutionError {
                    error: reason.clone(),
                })
                .await;
                Err(Error::Aborted {
                    reason,
                    report: Box::new(report),
                    rolled_back,
                })
            }
        }
    }

    /// Pre-execution checks. Rejection is fatal: no task runs.
    ///
    /// Never mutates the plan; validating twice is idempotent.
    async fn validate(
        &self,
        plan: &Plan,
        task_map: &HashMap<TaskId, RemediationTask>,
        gate: Option<&dyn ApprovalGate>,
    ) -> Result<()> {
        if plan.has_duplicates() {
            return Err(Error::Validation(
                "plan task sequence contains duplicates".to_string(),
            ));
        }
        for id in &plan.tasks {
            if !task_map.contains_key(id) {
                return Err(Error::Validation(format!(
                    "plan references task {} outside the loaded set",
                    id.short()
                )));
            }
        }
        for c in &plan.constraints {
            if !plan.tasks.contains(&c.before) || !plan.tasks.contains(&c.after) {
                return Err(Error::Validation(format!(
                    "constraint prerequisite {} not present in plan",
                    c.before.short()
                )));
            }
        }
        plan.check_constraint_cycles()
            .map_err(|e| Error::Validation(e.to_string()))?;

        let parallelizable = plan
            .tasks
            .iter()
            .filter(|id| task_map[id].parallelizable)
            .count();
        if parallelizable > 2 * self.config.max_concurrent_tasks {
            return Err(Error::Validation(format!(
                "{} parallelizable tasks exceeds twice the concurrency limit of {}",
                parallelizable, self.config.max_concurrent_tasks
            )));
        }

        if self.config.safe_mode {
            for id in &plan.tasks {
                let task = &task_map[id];
                let high_impact = task.priority > 8.0 || task.risk_reduction > 8.0;
                if !high_impact || self.config.auto_approval {
                    continue;
                }
                if task.required_approvals.is_empty() {
                    return Err(Error::Validation(format!(
                        "high-impact task {} (priority {:.1}, risk reduction {:.1}) \
                         has no approvals and auto-approval is off",
                        task.id.short(),
                        task.priority,
                        task.risk_reduction
                    )));
                }
                if let Some(gate) = gate {
                    if !gate.approvals_satisfied(task).await? {
                        return Err(Error::Validation(format!(
                            "approvals not satisfied for high-impact task {}",
                            task.id.short()
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    /// Dispatch loop. Returns the abort reason, or `None` on a clean finish.
    ///
    /// Abort is soft and non-preemptive: the cancellation token stops new
    /// dispatch, but tasks already in flight drain to a terminal state.
    async fn dispatch(
        &self,
        plan: &Plan,
        task_map: &mut HashMap<TaskId, RemediationTask>,
        ctx: &mut RunContext,
        rollback: &mut RollbackManager,
        batch_limit: &Arc<AtomicUsize>,
        healing: Option<SelfHealingCoordinator>,
    ) -> Option<String> {
        let abort = CancellationToken::new();
        let mut abort_reason: Option<String> = None;
        let mut queue: VecDeque<Vec<TaskId>> = plan.batches.iter().cloned().collect();
        let mut last_probe = Instant::now();

        while let Some(batch) = queue.pop_front() {
            if abort.is_cancelled() {
                break;
            }

            // Periodic self-healing probe between batches.
            if let Some(h) = &healing {
                if last_probe.elapsed() >= self.config.probe_interval() {
                    last_probe = Instant::now();
                    if let Some(mitigation) = h.check(ctx.recent_avg_latency(LATENCY_WINDOW)).await
                    {
                        self.emit(EngineEvent::SelfHealingAction {
                            action: mitigation.name().to_string(),
                            detail: mitigation.detail(),
                        })
                        .await;
                    }
                }
            }

            // Hold back tasks whose Sequential predecessors are not yet
            // terminal, even inside a parallel batch.
            let (mut ready, held): (Vec<TaskId>, Vec<TaskId>) = batch
                .into_iter()
                .partition(|id| predecessors_resolved(plan, task_map, *id));
            if !held.is_empty() {
                wlog_debug!("{} tasks held back for unresolved predecessors", held.len());
                if !ready.is_empty() {
                    queue.push_front(held);
                } else if !queue.is_empty() {
                    // Nothing here can run until earlier work finishes.
                    queue.push_back(held);
                    continue;
                } else {
                    // Every other task is terminal yet a predecessor never
                    // settled (a lost worker). Dispatch rather than deadlock.
                    wlog_warn!(
                        "dispatching {} tasks with unresolved predecessors",
                        held.len()
                    );
                    ready = held;
                }
            }
            if ready.is_empty() {
                continue;
            }

            let singleton = ready.len() == 1;
            let limit = batch_limit.load(Ordering::Relaxed).max(1);
            for chunk in ready.chunks(limit) {
                if abort.is_cancelled() {
                    break;
                }

                let mut in_flight: JoinSet<WorkerResult> = JoinSet::new();
                for id in chunk {
                    let Some(task) = task_map.get_mut(id) else {
                        continue;
                    };
                    task.start();
                    self.emit(EngineEvent::TaskStarted { task_id: *id }).await;

                    let executor = Arc::clone(&self.executor);
                    let worker_task = task.clone();
                    in_flight.spawn(async move {
                        let started = Instant::now();
                        let result = executor.apply(&worker_task).await;
                        WorkerResult {
                            task_id: worker_task.id,
                            duration: started.elapsed(),
                            result,
                        }
                    });
                }

                // Wait for all, collect partial failures. Abort stops new
                // dispatch but this join lets in-flight tasks finish.
                while let Some(joined) = in_flight.join_next().await {
                    let worker = match joined {
                        Ok(worker) => worker,
                        Err(err) => {
                            wlog_error!("worker join error: {}", err);
                            continue;
                        }
                    };
                    let reason = self
                        .settle(worker, task_map, ctx, rollback)
                        .await;
                    if let Some(reason) = reason {
                        if abort_reason.is_none() {
                            abort_reason = Some(reason);
                            abort.cancel();
                        }
                    }
                }
            }

            // Safe-mode pacing between sequential dispatches.
            if singleton
                && self.config.safe_mode
                && plan.strategy != Strategy::Parallel
                && !queue.is_empty()
                && !abort.is_cancelled()
            {
                tokio::time::sleep(self.config.step_delay()).await;
            }
        }

        abort_reason
    }

    /// Settle one terminal task on the dispatching control flow: update the
    /// task and run state, push the rollback record, emit events, and
    /// compute the abort decision.
    async fn settle(
        &self,
        worker: WorkerResult,
        task_map: &mut HashMap<TaskId, RemediationTask>,
        ctx: &mut RunContext,
        rollback: &mut RollbackManager,
    ) -> Option<String> {
        let Some(task) = task_map.get_mut(&worker.task_id) else {
            return None;
        };
        let mut error_text = None;

        match worker.result {
            Ok(outcome) => {
                task.succeed();
                if outcome.applied {
                    if let Some(token) = outcome.undo_token {
                        rollback.record(task.id, token);
                    }
                }
                ctx.record_outcome(TaskOutcome {
                    task_id: task.id,
                    finding_id: task.finding_id.clone(),
                    succeeded: true,
                    error: None,
                    duration: worker.duration,
                    risk_reduction: task.risk_reduction,
                    rolled_back: false,
                });
                self.emit(EngineEvent::TaskCompleted {
                    task_id: task.id,
                    duration: worker.duration,
                    risk_reduction: task.risk_reduction,
                })
                .await;
            }
            Err(err) => {
                let text = err.to_string();
                task.fail(&text);
                ctx.record_outcome(TaskOutcome {
                    task_id: task.id,
                    finding_id: task.finding_id.clone(),
                    succeeded: false,
                    error: Some(text.clone()),
                    duration: worker.duration,
                    risk_reduction: 0.0,
                    rolled_back: false,
                });
                let critical = is_critical_error(&text);
                self.emit(EngineEvent::TaskFailed {
                    task_id: task.id,
                    error: text.clone(),
                    critical,
                })
                .await;
                wlog_warn!("task {} failed: {}", task.id.short(), text);
                error_text = Some(text);
            }
        }

        self.abort_decision(ctx, error_text.as_deref())
    }

    /// Abort after each task if the failure fraction trips past the
    /// threshold, or the last error matched a critical pattern.
    fn abort_decision(&self, ctx: &RunContext, last_error: Option<&str>) -> Option<String> {
        if let Some(text) = last_error {
            if is_critical_error(text) {
                return Some(format!("critical error: {}", text));
            }
        }
        if ctx.tasks_executed() >= MIN_EXECUTED_FOR_ABORT
            && ctx.failure_fraction() > ABORT_FAILURE_FRACTION
        {
            return Some(format!(
                "failure fraction {:.2} after {} tasks",
                ctx.failure_fraction(),
                ctx.tasks_executed()
            ));
        }
        None
    }

    /// Learning phase: fold the run's outcome into per-strategy tallies.
    fn learn(&mut self, report: &RunReport) {
        let stats = self.stats.entry(report.strategy).or_default();
        stats.runs += 1;
        if report.aborted {
            stats.aborted += 1;
        }
        stats.tasks_succeeded += report.tasks_succeeded;
        stats.tasks_failed += report.tasks_failed;
        stats.risk_reduction += report.risk_reduction_achieved;
    }
}

/// All Sequential predecessors of `id` have reached a terminal state.
fn predecessors_resolved(
    plan: &Plan,
    task_map: &HashMap<TaskId, RemediationTask>,
    id: TaskId,
) -> bool {
    plan.predecessors_of(id)
        .iter()
        .all(|pred| task_map.get(pred).map(|t| t.is_finished()).unwrap_or(true))
}

/// Expected per-task latency from the plan's own duration estimates.
fn expected_task_latency(plan: &Plan, task_map: &HashMap<TaskId, RemediationTask>) -> Duration {
    if plan.tasks.is_empty() {
        return Duration::from_secs(60);
    }
    let total: Duration = plan
        .tasks
        .iter()
        .filter_map(|id| task_map.get(id))
        .map(|t| t.estimated_duration)
        .sum();
    total / plan.tasks.len() as u32
}
