//! Top-level orchestration facade.
//!
//! Wires the planning pipeline to the execution engine: query findings over
//! the planning horizon, derive tasks, detect correlations, generate and
//! score candidate plans, then execute the winner. All side effects go
//! through the collaborator contracts, so the whole cycle is testable with
//! in-memory fakes.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::collab::{ApprovalGate, FindingFilter, FindingStore, RemediationExecutor, ResourceProbe};
use crate::config::OrchestratorConfig;
use crate::core::plan::{Plan, Strategy};
use crate::core::task::RemediationTask;
use crate::error::{Error, Result};
use crate::execution::engine::{ExecutionEngine, StrategyStats};
use crate::execution::events::EngineEvent;
use crate::execution::RunReport;
use crate::planning::detector::CorrelationDetector;
use crate::planning::factory::TaskFactory;
use crate::planning::optimizer::PlanOptimizer;
use crate::planning::strategy::StrategyGenerator;
use crate::{wlog_debug, wlog_info};

/// Output of one planning pass: the selected plan and the task set it
/// schedules.
#[derive(Debug, Clone)]
pub struct PlanningOutcome {
    pub plan: Plan,
    pub tasks: Vec<RemediationTask>,
    /// Tasks dropped at assembly for unmet approval requirements.
    pub excluded: usize,
}

/// Drives full remediation cycles against a set of collaborators.
pub struct Orchestrator {
    config: OrchestratorConfig,
    store: Arc<dyn FindingStore>,
    gate: Option<Arc<dyn ApprovalGate>>,
    engine: ExecutionEngine,
}

impl Orchestrator {
    pub fn new(
        config: OrchestratorConfig,
        store: Arc<dyn FindingStore>,
        executor: Arc<dyn RemediationExecutor>,
        event_tx: mpsc::Sender<EngineEvent>,
    ) -> Self {
        let engine = ExecutionEngine::new(config.clone(), executor, event_tx);
        Self {
            config,
            store,
            gate: None,
            engine,
        }
    }

    /// Attach an approval gate, consulted at assembly and again by the
    /// engine's safe-mode validation.
    pub fn with_gate(mut self, gate: Arc<dyn ApprovalGate>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Attach a resource probe, enabling self-healing during execution.
    pub fn with_probe(mut self, probe: Arc<dyn ResourceProbe>) -> Self {
        self.engine.set_probe(probe);
        self
    }

    /// Run the planning pipeline: findings to a selected, constraint-folded
    /// plan. Does not execute anything.
    pub async fn plan_cycle(&self) -> Result<PlanningOutcome> {
        let filter = FindingFilter {
            max_age_days: Some(self.config.planning_horizon_days),
            ..Default::default()
        };
        let findings = self.store.query_findings(&filter).await?;
        wlog_info!(
            "planning cycle: {} findings within {} day horizon",
            findings.len(),
            self.config.planning_horizon_days
        );

        let factory = TaskFactory::new(self.config.weights.clone());
        let tasks = factory.build_tasks(&findings, self.store.as_ref()).await?;
        let (tasks, excluded) = self.apply_approval_exclusions(tasks).await?;
        if tasks.is_empty() {
            return Err(Error::Planning(
                "no eligible findings to remediate".to_string(),
            ));
        }

        let detector = CorrelationDetector::new(
            self.config.correlation_pair_cap,
            self.config.correlation_threshold,
        );
        let matrix = detector.correlate(&tasks, self.store.as_ref()).await?;

        let candidates = StrategyGenerator::new(self.config.max_concurrent_tasks).generate(&tasks);
        let plan = PlanOptimizer::new(self.config.fitness.clone(), self.config.max_concurrent_tasks)
            .select(candidates, &tasks, &matrix)?;

        wlog_info!(
            "selected {} plan {} with fitness {:.3} over {} tasks",
            plan.strategy,
            plan.id.short(),
            plan.fitness,
            plan.tasks.len()
        );
        Ok(PlanningOutcome {
            plan,
            tasks,
            excluded,
        })
    }

    /// Run one full cycle: plan, then execute the selected plan.
    pub async fn run_cycle(&mut self) -> Result<RunReport> {
        let outcome = self.plan_cycle().await?;
        self.engine
            .execute(&outcome.plan, outcome.tasks, self.gate.as_deref())
            .await
    }

    /// Per-strategy tallies accumulated by the engine's Learning phase.
    pub fn strategy_stats(&self) -> &HashMap<Strategy, StrategyStats> {
        self.engine.strategy_stats()
    }

    /// Drop tasks whose named approvals the gate cannot satisfy.
    ///
    /// Only applies in safe mode without auto-approval; tasks with no named
    /// approvals pass through and are re-checked against the high-impact
    /// rule during the engine's Validating phase.
    async fn apply_approval_exclusions(
        &self,
        tasks: Vec<RemediationTask>,
    ) -> Result<(Vec<RemediationTask>, usize)> {
        if !self.config.safe_mode || self.config.auto_approval {
            return Ok((tasks, 0));
        }
        let mut kept = Vec::with_capacity(tasks.len());
        let mut excluded = 0;
        for task in tasks {
            if task.required_approvals.is_empty() {
                kept.push(task);
                continue;
            }
            let satisfied = match &self.gate {
                Some(gate) => gate.approvals_satisfied(&task).await?,
                None => false,
            };
            if satisfied {
                kept.push(task);
            } else {
                excluded += 1;
                wlog_debug!(
                    "excluding task {} for finding {}: approvals not satisfied",
                    task.id.short(),
                    task.finding_id
                );
            }
        }
        Ok((kept, excluded))
    }
}
