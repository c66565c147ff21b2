//! Execution plan model.
//!
//! A plan is a strategy-labeled, ordered arrangement of tasks with an
//! estimated cost/benefit. Candidate plans are produced by the strategy
//! generator, scored by the optimizer, and the winner is executed as-is:
//! a plan is immutable once selected.
//!
//! Hard ordering constraints (derived from Sequential correlation edges)
//! are kept on the plan as a directed precedence relation and cycle-checked
//! with petgraph before execution.

use petgraph::algo::is_cyclic_directed;
use petgraph::graph::DiGraph;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use uuid::Uuid;

use crate::core::task::TaskId;
use crate::error::{Error, Result};

/// Unique identifier for a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlanId(pub Uuid);

impl PlanId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Return first 8 characters of the UUID for display.
    pub fn short(&self) -> String {
        self.0.to_string()[..8].to_string()
    }
}

impl Default for PlanId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for PlanId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Named execution strategies the generator produces candidates for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// All tasks one at a time in priority order.
    Sequential,
    /// Parallelizable tasks batched up to the concurrency limit.
    Parallel,
    /// High-priority sequential prefix, parallel suffix.
    Hybrid,
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Strategy::Sequential => write!(f, "sequential"),
            Strategy::Parallel => write!(f, "parallel"),
            Strategy::Hybrid => write!(f, "hybrid"),
        }
    }
}

/// Coarse risk classification of a candidate plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    /// Classify from the fraction of high-priority tasks in the plan.
    pub fn from_high_priority_fraction(fraction: f64) -> Self {
        if fraction >= 0.5 {
            RiskLevel::High
        } else if fraction >= 0.2 {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }
}

/// A hard ordering constraint: `before` must reach a terminal state before
/// `after` may be dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderingConstraint {
    pub before: TaskId,
    pub after: TaskId,
}

/// A strategy-labeled, ordered, constrained arrangement of tasks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub id: PlanId,
    pub strategy: Strategy,
    /// Ordered task sequence: a permutation of the loaded task set, minus
    /// tasks excluded for unmet approval requirements. Never contains
    /// duplicates or tasks outside the originally loaded set.
    pub tasks: Vec<TaskId>,
    /// Dispatch batches. Singleton batches carry sequential semantics;
    /// multi-task batches run concurrently up to the configured limit.
    pub batches: Vec<Vec<TaskId>>,
    /// Hard ordering constraints folded in from Sequential correlation edges.
    pub constraints: Vec<OrderingConstraint>,
    /// Fitness assigned by the optimizer; candidates start at 0.
    pub fitness: f64,
    pub estimated_duration: Duration,
    pub estimated_risk_reduction: f64,
    pub risk_level: RiskLevel,
}

impl Plan {
    /// Predecessors of `task` under the hard ordering constraints.
    pub fn predecessors_of(&self, task: TaskId) -> Vec<TaskId> {
        self.constraints
            .iter()
            .filter(|c| c.after == task)
            .map(|c| c.before)
            .collect()
    }

    /// Check the invariant that the task sequence has no duplicates.
    pub fn has_duplicates(&self) -> bool {
        let mut seen = HashSet::new();
        self.tasks.iter().any(|id| !seen.insert(*id))
    }

    /// Verify the constraint relation is acyclic.
    ///
    /// Sequential correlation edges are oriented by priority, so a cycle can
    /// only arise from inconsistent input; it is a planning error.
    pub fn check_constraint_cycles(&self) -> Result<()> {
        let mut graph: DiGraph<TaskId, ()> = DiGraph::new();
        let mut nodes = HashMap::new();
        for c in &self.constraints {
            let a = *nodes
                .entry(c.before)
                .or_insert_with(|| graph.add_node(c.before));
            let b = *nodes
                .entry(c.after)
                .or_insert_with(|| graph.add_node(c.after));
            graph.add_edge(a, b, ());
        }
        if is_cyclic_directed(&graph) {
            return Err(Error::Planning(
                "ordering constraints form a cycle".to_string(),
            ));
        }
        Ok(())
    }
}
