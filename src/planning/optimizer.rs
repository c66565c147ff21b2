//! Plan selection by fitness.
//!
//! The optimizer scores each candidate with a weighted fitness function,
//! selects the maximum (ties break toward lower estimated duration), and
//! folds correlation edges into the chosen plan: Sequential edges become
//! hard ordering constraints, Coordinated edges pull their endpoints into
//! a shared batch while keeping every batch within the concurrency limit.
//! Both apply regardless of which strategy won: even a Parallel plan must
//! honor them.

use std::collections::HashMap;
use std::time::Duration;

use crate::config::FitnessWeights;
use crate::core::correlation::CorrelationMatrix;
use crate::core::plan::{OrderingConstraint, Plan};
use crate::core::task::{RemediationTask, TaskId, TaskKind};
use crate::error::{Error, Result};
use crate::wlog_debug;

/// Estimated duration is capped at one hour for the time-to-value term.
const TIME_TO_VALUE_CAP: Duration = Duration::from_secs(3600);

/// Scores candidates and selects the plan to execute.
pub struct PlanOptimizer {
    weights: FitnessWeights,
    max_concurrent: usize,
}

impl PlanOptimizer {
    pub fn new(weights: FitnessWeights, max_concurrent: usize) -> Self {
        Self {
            weights,
            max_concurrent: max_concurrent.max(1),
        }
    }

    /// Score all candidates and return the winner with constraints attached.
    pub fn select(
        &self,
        mut candidates: Vec<Plan>,
        tasks: &[RemediationTask],
        matrix: &CorrelationMatrix,
    ) -> Result<Plan> {
        if candidates.is_empty() {
            return Err(Error::Planning("no candidate plans".to_string()));
        }

        let by_id: HashMap<TaskId, &RemediationTask> =
            tasks.iter().map(|t| (t.id, t)).collect();

        for candidate in &mut candidates {
            candidate.fitness = self.fitness(candidate, &by_id);
            wlog_debug!(
                "candidate {} ({}) fitness={:.4} duration={:?}",
                candidate.id.short(),
                candidate.strategy,
                candidate.fitness,
                candidate.estimated_duration
            );
        }

        let mut best = candidates.remove(0);
        for candidate in candidates {
            let better = candidate.fitness > best.fitness
                || (candidate.fitness == best.fitness
                    && candidate.estimated_duration < best.estimated_duration);
            if better {
                best = candidate;
            }
        }

        best.constraints = fold_constraints(&best, matrix, &by_id);
        best.check_constraint_cycles()?;
        fold_coordinated(&mut best, matrix, &by_id, self.max_concurrent);

        wlog_debug!(
            "selected {} plan {} with {} hard constraints",
            best.strategy,
            best.id.short(),
            best.constraints.len()
        );
        Ok(best)
    }

    /// Weighted fitness of one candidate.
    pub fn fitness(&self, plan: &Plan, by_id: &HashMap<TaskId, &RemediationTask>) -> f64 {
        let n = plan.tasks.len();
        if n == 0 {
            return 0.0;
        }

        let risk_reduction_norm =
            (plan.estimated_risk_reduction / (10.0 * n as f64)).clamp(0.0, 1.0);

        let parallelizable = plan
            .tasks
            .iter()
            .filter(|id| by_id.get(id).map(|t| t.parallelizable).unwrap_or(false))
            .count();
        let resource_efficiency = parallelizable as f64 / n as f64;

        let time_to_value_norm = plan
            .estimated_duration
            .min(TIME_TO_VALUE_CAP)
            .as_secs_f64()
            / TIME_TO_VALUE_CAP.as_secs_f64();

        let compliance = plan
            .tasks
            .iter()
            .filter(|id| {
                by_id
                    .get(id)
                    .map(|t| {
                        matches!(
                            t.kind,
                            TaskKind::ComplianceCheck | TaskKind::SecurityRemediation
                        )
                    })
                    .unwrap_or(false)
            })
            .count();
        let compliance_impact = compliance as f64 / n as f64;

        // Monotone in total duration, bounded in [0, 1).
        let d = plan.estimated_duration.as_secs_f64();
        let cost_norm = d / (d + TIME_TO_VALUE_CAP.as_secs_f64());

        self.weights.risk_reduction * risk_reduction_norm
            + self.weights.resource_efficiency * resource_efficiency
            + self.weights.time_to_value * (1.0 - time_to_value_norm)
            + self.weights.compliance_impact * compliance_impact
            + self.weights.cost * (1.0 - cost_norm)
    }
}

/// Turn every Sequential edge into a hard ordering constraint on the plan.
///
/// The edge is oriented by priority (higher first); equal priorities fall
/// back to the plan's own sequence order so orientation stays deterministic
/// and acyclic.
fn fold_constraints(
    plan: &Plan,
    matrix: &CorrelationMatrix,
    by_id: &HashMap<TaskId, &RemediationTask>,
) -> Vec<OrderingConstraint> {
    let position: HashMap<TaskId, usize> = plan
        .tasks
        .iter()
        .enumerate()
        .map(|(i, id)| (*id, i))
        .collect();

    let mut constraints = Vec::new();
    for edge in matrix.sequential_edges() {
        let (Some(a), Some(b)) = (by_id.get(&edge.task_a), by_id.get(&edge.task_b)) else {
            continue;
        };
        if !position.contains_key(&a.id) || !position.contains_key(&b.id) {
            continue;
        }

        let a_first = match a.priority.partial_cmp(&b.priority) {
            Some(std::cmp::Ordering::Greater) => true,
            Some(std::cmp::Ordering::Less) => false,
            _ => position[&a.id] < position[&b.id],
        };
        let (before, after) = if a_first { (a.id, b.id) } else { (b.id, a.id) };
        constraints.push(OrderingConstraint { before, after });
    }
    constraints
}

/// Pull Coordinated pairs into a shared batch.
///
/// When both endpoints are parallelizable and landed in different batches,
/// one endpoint moves into the other's batch, preferring the earlier batch.
/// The concurrency limit bounds every batch: a pair whose batches are both
/// full stays split rather than break the batch size bound.
fn fold_coordinated(
    plan: &mut Plan,
    matrix: &CorrelationMatrix,
    by_id: &HashMap<TaskId, &RemediationTask>,
    max_concurrent: usize,
) {
    for edge in matrix.coordinated_edges() {
        let (Some(a), Some(b)) = (by_id.get(&edge.task_a), by_id.get(&edge.task_b)) else {
            continue;
        };
        if !a.parallelizable || !b.parallelizable {
            continue;
        }
        let (Some(ia), Some(ib)) = (batch_index(plan, a.id), batch_index(plan, b.id)) else {
            continue;
        };
        if ia == ib {
            continue;
        }
        let (earlier, later, earlier_task, later_task) =
            if ia < ib { (ia, ib, a.id, b.id) } else { (ib, ia, b.id, a.id) };
        let (target, moved) = if plan.batches[earlier].len() < max_concurrent {
            (earlier, later_task)
        } else if plan.batches[later].len() < max_concurrent {
            (later, earlier_task)
        } else {
            continue;
        };
        for batch in &mut plan.batches {
            batch.retain(|id| *id != moved);
        }
        plan.batches[target].push(moved);
    }
    plan.batches.retain(|batch| !batch.is_empty());
}

fn batch_index(plan: &Plan, id: TaskId) -> Option<usize> {
    plan.batches.iter().position(|batch| batch.contains(&id))
}
