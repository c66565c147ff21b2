//! Collaborator contracts the orchestrator depends on.
//!
//! Everything behind these traits is an external concern: the graph-backed
//! finding/asset store, the remediation content generator, approval
//! bookkeeping, and host resource accounting. The orchestrator only plans
//! and executes work derived from them.

pub mod guard;
pub mod store;

use async_trait::async_trait;

use crate::core::finding::{Asset, Finding, FindingCategory, Severity};
use crate::core::task::RemediationTask;
use crate::error::Result;

pub use guard::{BreakerState, GuardedExecutor};
pub use store::JsonFindingStore;

/// Filter for querying findings from the store.
#[derive(Debug, Clone, Default)]
pub struct FindingFilter {
    /// Only findings at or above this severity.
    pub min_severity: Option<Severity>,
    /// Only findings first seen within this many days.
    pub max_age_days: Option<i64>,
    /// Only findings in these categories.
    pub categories: Option<Vec<FindingCategory>>,
}

/// The graph-backed finding/asset store.
#[async_trait]
pub trait FindingStore: Send + Sync {
    async fn query_findings(&self, filter: &FindingFilter) -> Result<Vec<Finding>>;

    /// Resolve an asset by ARN. `None` when the asset is not (yet) in the
    /// graph; the factory skips such findings rather than failing.
    async fn get_asset(&self, arn: &str) -> Result<Option<Asset>>;

    async fn get_asset_dependencies(&self, arn: &str) -> Result<Vec<Asset>>;

    async fn get_asset_dependents(&self, arn: &str) -> Result<Vec<Asset>>;

    async fn update_finding(&self, finding: &Finding) -> Result<()>;
}

/// Result of one remediation call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemediationOutcome {
    /// Whether a change was actually applied.
    pub applied: bool,
    /// Opaque undo token when the change is reversible.
    pub undo_token: Option<String>,
}

/// The remediation executor collaborator.
///
/// How remediation content is generated (Terraform, API calls) is out of
/// scope; the engine only needs the apply/undo surface. Errors from `apply`
/// carry text the engine substring-matches for critical-error classification.
#[async_trait]
pub trait RemediationExecutor: Send + Sync {
    async fn apply(&self, task: &RemediationTask) -> Result<RemediationOutcome>;

    /// Reverse a previously applied change. Invoked only during rollback.
    async fn undo(&self, token: &str) -> Result<()>;
}

/// Approval bookkeeping collaborator.
#[async_trait]
pub trait ApprovalGate: Send + Sync {
    /// Whether the task's required approvals are all granted.
    async fn approvals_satisfied(&self, task: &RemediationTask) -> Result<bool>;
}

/// Host resource accounting consulted by the self-healing probe.
#[async_trait]
pub trait ResourceProbe: Send + Sync {
    /// Memory pressure in [0, 1].
    async fn memory_pressure(&self) -> f64;

    /// Force reclamation of cached resources. Best-effort.
    async fn reclaim(&self) -> Result<()>;
}
