//! Core data model for the remediation orchestrator.

pub mod correlation;
pub mod finding;
pub mod plan;
pub mod task;

pub use correlation::{ConstraintType, CorrelationEdge, CorrelationMatrix};
pub use finding::{Asset, Environment, Finding, FindingCategory, Severity};
pub use plan::{OrderingConstraint, Plan, PlanId, RiskLevel, Strategy};
pub use task::{RemediationTask, TaskId, TaskKind, TaskState};
