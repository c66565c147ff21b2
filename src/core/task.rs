//! Remediation task model.
//!
//! Tasks are the schedulable units of work derived from findings. Each task
//! carries the scores computed by the task factory (WSJF priority, ranking
//! weight, risk reduction) and tracks its execution state. State transitions
//! are monotonic: Planned → Running → {Succeeded, Failed}; RolledBack is
//! reachable only from a terminal state, during an abort.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;
use uuid::Uuid;

use crate::core::finding::FindingCategory;

/// Unique identifier for a remediation task within a planning cycle.
///
/// Uses UUID v4 for generation and provides a short form display
/// for human-readable output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub Uuid);

impl TaskId {
    /// Create a new unique task identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Return first 8 characters of the UUID for display.
    pub fn short(&self) -> String {
        self.0.to_string()[..8].to_string()
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for TaskId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Closed set of task kinds.
///
/// Each kind maps to one handler behind the remediation executor contract;
/// adding a kind is a compile-time-checked extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// Fix a security misconfiguration or exposure.
    SecurityRemediation,
    /// Verify and restore a compliance control.
    ComplianceCheck,
    /// Patching and housekeeping work.
    Maintenance,
}

impl TaskKind {
    /// Derive the task kind from the originating finding's category.
    pub fn from_category(category: FindingCategory) -> Self {
        match category {
            FindingCategory::Compliance => TaskKind::ComplianceCheck,
            FindingCategory::Maintenance => TaskKind::Maintenance,
            _ => TaskKind::SecurityRemediation,
        }
    }
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskKind::SecurityRemediation => write!(f, "security_remediation"),
            TaskKind::ComplianceCheck => write!(f, "compliance_check"),
            TaskKind::Maintenance => write!(f, "maintenance"),
        }
    }
}

/// Task execution state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum TaskState {
    /// Task created by the factory, not yet dispatched.
    Planned,
    /// Task is currently executing its remediation call.
    Running,
    /// Remediation applied successfully.
    Succeeded,
    /// Remediation call failed.
    Failed {
        /// Error message describing the failure.
        error: String,
    },
    /// A previously terminal task whose change was reversed during an abort.
    RolledBack,
}

impl Default for TaskState {
    fn default() -> Self {
        Self::Planned
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskState::Planned => write!(f, "planned"),
            TaskState::Running => write!(f, "running"),
            TaskState::Succeeded => write!(f, "succeeded"),
            TaskState::Failed { error } => write!(f, "failed: {}", error),
            TaskState::RolledBack => write!(f, "rolled_back"),
        }
    }
}

/// A single schedulable remediation task.
///
/// Created once per planning cycle from a finding and its asset record,
/// discarded after the run that consumes it completes. Persisting the
/// outcome is the remediation collaborator's job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemediationTask {
    /// Unique identifier for this task.
    pub id: TaskId,
    /// What kind of work this task performs.
    pub kind: TaskKind,
    /// Identifier of the originating finding.
    pub finding_id: String,
    /// ARN of the asset the task acts on.
    pub asset_arn: String,
    /// Owning service of the asset, used for correlation.
    pub service: String,
    /// Region of the asset, used for correlation.
    pub region: String,
    /// Category of the originating finding.
    pub category: FindingCategory,
    /// Resource subtype of the finding, e.g. "s3-bucket".
    pub resource_type: String,
    /// WSJF-style priority.
    pub priority: f64,
    /// Blended ranking weight, distinct from priority.
    pub weight: f64,
    /// Estimated wall-clock duration of the remediation call.
    pub estimated_duration: Duration,
    /// Risk reduction expected from completing this task, 0-10 scale.
    pub risk_reduction: f64,
    /// Whether this task may run concurrently with others.
    pub parallelizable: bool,
    /// Named approvals this task requires before execution.
    pub required_approvals: BTreeSet<String>,
    /// Current execution state.
    pub state: TaskState,
    /// When the task started execution.
    pub started_at: Option<DateTime<Utc>>,
    /// When the task reached a terminal state.
    pub finished_at: Option<DateTime<Utc>>,
}

impl RemediationTask {
    /// Start the task execution.
    ///
    /// Transitions state to Running and records the start time.
    pub fn start(&mut self) {
        self.state = TaskState::Running;
        self.started_at = Some(Utc::now());
    }

    /// Mark the task as successfully completed.
    pub fn succeed(&mut self) {
        self.state = TaskState::Succeeded;
        self.finished_at = Some(Utc::now());
    }

    /// Mark the task as failed with an error message.
    pub fn fail(&mut self, error: &str) {
        self.state = TaskState::Failed {
            error: error.to_string(),
        };
        self.finished_at = Some(Utc::now());
    }

    /// Mark the task as rolled back.
    ///
    /// Only terminal tasks can be rolled back; returns false (and leaves the
    /// state untouched) otherwise.
    pub fn roll_back(&mut self) -> bool {
        if !self.is_finished() {
            return false;
        }
        self.state = TaskState::RolledBack;
        true
    }

    /// Check if the task is in a terminal state (Succeeded or Failed).
    pub fn is_finished(&self) -> bool {
        matches!(
            self.state,
            TaskState::Succeeded | TaskState::Failed { .. }
        )
    }

    /// High-priority tasks get extra scrutiny in validation and drive the
    /// hybrid strategy's sequential prefix.
    pub fn is_high_priority(&self) -> bool {
        self.priority > 8.0
    }
}
