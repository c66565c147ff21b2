//! Pairwise task correlation model.
//!
//! A correlation edge records how strongly two tasks are related and what
//! ordering constraint that relationship implies. Strength is symmetric and
//! the matrix stores each pair once, keyed on the unordered task-id pair.
//! The matrix is built once per planning cycle, before any concurrent
//! dispatch begins, and is read-only thereafter.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::core::task::TaskId;

/// Strength above which two tasks must execute strictly one after the other.
pub const SEQUENTIAL_THRESHOLD: f64 = 0.8;

/// Strength at or above which two tasks must be scheduled in the same batch.
pub const COORDINATED_THRESHOLD: f64 = 0.5;

/// Ordering constraint implied by a correlation strength.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintType {
    /// Tasks must execute non-overlapping, in priority order.
    Sequential,
    /// Tasks must be dispatched within the same batch but may overlap.
    Coordinated,
    /// No relative-order guarantee needed.
    ParallelOk,
}

impl ConstraintType {
    /// Classify a correlation strength into a constraint.
    ///
    /// strength > 0.8 ⇒ Sequential; 0.5..=0.8 ⇒ Coordinated; else ParallelOk.
    pub fn classify(strength: f64) -> Self {
        if strength > SEQUENTIAL_THRESHOLD {
            ConstraintType::Sequential
        } else if strength >= COORDINATED_THRESHOLD {
            ConstraintType::Coordinated
        } else {
            ConstraintType::ParallelOk
        }
    }
}

impl std::fmt::Display for ConstraintType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConstraintType::Sequential => write!(f, "sequential"),
            ConstraintType::Coordinated => write!(f, "coordinated"),
            ConstraintType::ParallelOk => write!(f, "parallel_ok"),
        }
    }
}

/// A scored relationship between two tasks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationEdge {
    pub task_a: TaskId,
    pub task_b: TaskId,
    /// Correlation strength in [0, 1]; symmetric by construction.
    pub strength: f64,
    pub constraint: ConstraintType,
}

impl CorrelationEdge {
    /// Create an edge, classifying the constraint from the strength.
    pub fn new(task_a: TaskId, task_b: TaskId, strength: f64) -> Self {
        let strength = strength.clamp(0.0, 1.0);
        Self {
            task_a,
            task_b,
            strength,
            constraint: ConstraintType::classify(strength),
        }
    }

    /// Whether this edge involves the given task.
    pub fn involves(&self, id: TaskId) -> bool {
        self.task_a == id || self.task_b == id
    }
}

/// Symmetric collection of correlation edges for one planning cycle.
#[derive(Debug, Clone, Default)]
pub struct CorrelationMatrix {
    edges: HashMap<(TaskId, TaskId), CorrelationEdge>,
}

impl CorrelationMatrix {
    pub fn new() -> Self {
        Self::default()
    }

    /// Canonical unordered key for a pair.
    fn key(a: TaskId, b: TaskId) -> (TaskId, TaskId) {
        if a <= b {
            (a, b)
        } else {
            (b, a)
        }
    }

    /// Record an edge. The pair is stored once regardless of argument order.
    pub fn insert(&mut self, edge: CorrelationEdge) {
        let key = Self::key(edge.task_a, edge.task_b);
        self.edges.insert(key, edge);
    }

    /// Correlation strength between two tasks, 0.0 if no edge was recorded.
    pub fn strength(&self, a: TaskId, b: TaskId) -> f64 {
        self.edges
            .get(&Self::key(a, b))
            .map(|e| e.strength)
            .unwrap_or(0.0)
    }

    /// Constraint between two tasks, ParallelOk if no edge was recorded.
    pub fn constraint(&self, a: TaskId, b: TaskId) -> ConstraintType {
        self.edges
            .get(&Self::key(a, b))
            .map(|e| e.constraint)
            .unwrap_or(ConstraintType::ParallelOk)
    }

    /// All recorded edges.
    pub fn edges(&self) -> impl Iterator<Item = &CorrelationEdge> {
        self.edges.values()
    }

    /// Edges classified Sequential; these become hard ordering constraints.
    pub fn sequential_edges(&self) -> impl Iterator<Item = &CorrelationEdge> {
        self.edges
            .values()
            .filter(|e| e.constraint == ConstraintType::Sequential)
    }

    /// Edges classified Coordinated.
    pub fn coordinated_edges(&self) -> impl Iterator<Item = &CorrelationEdge> {
        self.edges
            .values()
            .filter(|e| e.constraint == ConstraintType::Coordinated)
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }
}
