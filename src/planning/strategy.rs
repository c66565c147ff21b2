//! Candidate plan generation.
//!
//! The generator produces three named candidates from the same task set:
//! Sequential (everything one at a time in priority order), Parallel
//! (parallelizable tasks batched up to the concurrency limit), and Hybrid
//! (high-priority sequential prefix, parallel suffix). The optimizer scores
//! them afterwards; generation itself applies no fitness judgment.

use std::time::Duration;

use crate::core::plan::{Plan, PlanId, RiskLevel, Strategy};
use crate::core::task::RemediationTask;
use crate::wlog_debug;

/// Priority above which a task is pinned into the hybrid sequential prefix.
pub const HIGH_PRIORITY_CUTOFF: f64 = 8.0;

/// Builds candidate execution plans.
pub struct StrategyGenerator {
    max_concurrent: usize,
}

impl StrategyGenerator {
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            max_concurrent: max_concurrent.max(1),
        }
    }

    /// Generate the three candidates for one task set.
    ///
    /// Tasks are ordered by priority descending (weight breaks ties) in
    /// every candidate; the strategies differ only in batching.
    pub fn generate(&self, tasks: &[RemediationTask]) -> Vec<Plan> {
        let ordered = priority_order(tasks);
        let candidates = vec![
            self.sequential(&ordered),
            self.parallel(&ordered),
            self.hybrid(&ordered),
        ];
        wlog_debug!(
            "Generated {} candidates for {} tasks",
            candidates.len(),
            tasks.len()
        );
        candidates
    }

    /// Sequential: all tasks in priority order, duration is the exact sum.
    fn sequential(&self, ordered: &[&RemediationTask]) -> Plan {
        let batches = ordered.iter().map(|t| vec![t.id]).collect();
        let duration = ordered.iter().map(|t| t.estimated_duration).sum();
        self.assemble(Strategy::Sequential, ordered, batches, duration)
    }

    /// Parallel: parallelizable tasks grouped into batches bounded by the
    /// concurrency limit, non-parallelizable tasks each in their own
    /// singleton batch. Duration is the sum over batches of the batch max.
    fn parallel(&self, ordered: &[&RemediationTask]) -> Plan {
        let batches = self.batch(ordered);
        let duration = batches_duration(&batches, ordered);
        self.assemble(Strategy::Parallel, ordered, batches, duration)
    }

    /// Hybrid: high-priority tasks as a sequential prefix, the rest as a
    /// parallel suffix. Duration estimate is prefix sum + suffix max; the
    /// suffix still executes in bounded batches, the estimate is a ranking
    /// heuristic, not a schedule.
    fn hybrid(&self, ordered: &[&RemediationTask]) -> Plan {
        let (prefix, suffix): (Vec<&RemediationTask>, Vec<&RemediationTask>) = ordered
            .iter()
            .copied()
            .partition(|t| t.priority > HIGH_PRIORITY_CUTOFF);

        let mut batches: Vec<Vec<crate::core::task::TaskId>> =
            prefix.iter().map(|t| vec![t.id]).collect();
        batches.extend(self.batch(&suffix));

        let prefix_sum: Duration = prefix.iter().map(|t| t.estimated_duration).sum();
        let suffix_max = suffix
            .iter()
            .map(|t| t.estimated_duration)
            .max()
            .unwrap_or(Duration::ZERO);
        self.assemble(Strategy::Hybrid, ordered, batches, prefix_sum + suffix_max)
    }

    /// Chunk tasks into dispatch batches, respecting parallelizability and
    /// the concurrency limit, preserving priority order.
    fn batch(&self, ordered: &[&RemediationTask]) -> Vec<Vec<crate::core::task::TaskId>> {
        let mut batches = Vec::new();
        let mut current: Vec<crate::core::task::TaskId> = Vec::new();

        for task in ordered {
            if task.parallelizable {
                current.push(task.id);
                if current.len() == self.max_concurrent {
                    batches.push(std::mem::take(&mut current));
                }
            } else {
                if !current.is_empty() {
                    batches.push(std::mem::take(&mut current));
                }
                batches.push(vec![task.id]);
            }
        }
        if !current.is_empty() {
            batches.push(current);
        }
        batches
    }

    fn assemble(
        &self,
        strategy: Strategy,
        ordered: &[&RemediationTask],
        batches: Vec<Vec<crate::core::task::TaskId>>,
        duration: Duration,
    ) -> Plan {
        let high = ordered
            .iter()
            .filter(|t| t.priority > HIGH_PRIORITY_CUTOFF)
            .count();
        let fraction = if ordered.is_empty() {
            0.0
        } else {
            high as f64 / ordered.len() as f64
        };

        Plan {
            id: PlanId::new(),
            strategy,
            tasks: ordered.iter().map(|t| t.id).collect(),
            batches,
            constraints: Vec::new(),
            fitness: 0.0,
            estimated_duration: duration,
            estimated_risk_reduction: ordered.iter().map(|t| t.risk_reduction).sum(),
            risk_level: RiskLevel::from_high_priority_fraction(fraction),
        }
    }
}

/// Priority-descending order; weight breaks ties.
pub fn priority_order(tasks: &[RemediationTask]) -> Vec<&RemediationTask> {
    let mut ordered: Vec<&RemediationTask> = tasks.iter().collect();
    ordered.sort_by(|a, b| {
        b.priority
            .partial_cmp(&a.priority)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| {
                b.weight
                    .partial_cmp(&a.weight)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
    });
    ordered
}

fn batches_duration(
    batches: &[Vec<crate::core::task::TaskId>],
    ordered: &[&RemediationTask],
) -> Duration {
    batches
        .iter()
        .map(|batch| {
            batch
                .iter()
                .filter_map(|id| ordered.iter().find(|t| t.id == *id))
                .map(|t| t.estimated_duration)
                .max()
                .unwrap_or(Duration::ZERO)
        })
        .sum()
}
