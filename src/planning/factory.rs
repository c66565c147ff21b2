//! Task factory: findings + asset metadata → schedulable tasks.
//!
//! Priority uses a WSJF-style formula; the ranking weight blends four
//! normalized contributions with the configured coefficients; and
//! parallelizability is a deterministic classification. Findings that do not
//! resolve to an asset are skipped and logged, never an error.

use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::time::Duration;

use crate::collab::FindingStore;
use crate::config::WeightCoefficients;
use crate::core::finding::{Asset, Environment, Finding, FindingCategory, Severity};
use crate::core::task::{RemediationTask, TaskId, TaskKind, TaskState};
use crate::error::Result;
use crate::{wlog_debug, wlog_warn};

/// Age at which time criticality stops growing, in days.
pub const AGE_CAP_DAYS: i64 = 30;

/// Effort assumed for resource subtypes with no table entry.
pub const DEFAULT_EFFORT: f64 = 3.0;

/// Fraction of the risk score credited as direct risk-reduction value.
const RISK_REDUCTION_FACTOR: f64 = 0.8;

/// Largest attainable priority numerator: risk 10 + time criticality
/// 10 x 2 + risk-reduction value 8. Divides the raw WSJF sum so priority
/// lands on a 0-10 scale at unit effort.
const MAX_PRIORITY_NUMERATOR: f64 = 38.0;

/// Top of the priority scale, reached only by an aged critical finding on
/// a unit-effort resource.
const PRIORITY_SCALE: f64 = 10.0;

/// Fixed effort lookup by resource subtype.
///
/// Cheap, self-contained resources (object storage, trail/recorder
/// configuration) score low effort; broad network resources score high.
const EFFORT_TABLE: &[(&str, f64)] = &[
    ("s3-bucket", 1.0),
    ("s3-bucket-policy", 1.0),
    ("cloudtrail-trail", 1.5),
    ("config-recorder", 1.5),
    ("kms-key", 2.0),
    ("iam-policy", 3.0),
    ("iam-role", 3.0),
    ("rds-instance", 4.0),
    ("security-group", 5.0),
    ("network-acl", 6.0),
    ("vpc", 8.0),
];

/// Low-blast-radius resource subtypes that are safe to remediate concurrently.
const PARALLEL_SAFE_RESOURCES: &[&str] = &[
    "s3-bucket",
    "s3-bucket-policy",
    "cloudtrail-trail",
    "config-recorder",
];

/// Approval required for critical findings on production assets.
pub const PRODUCTION_CRITICAL_APPROVAL: &str = "security-lead";

/// Converts findings into tasks with computed priority, weight, and
/// parallelizability.
pub struct TaskFactory {
    weights: WeightCoefficients,
}

impl TaskFactory {
    pub fn new(weights: WeightCoefficients) -> Self {
        Self { weights }
    }

    /// Build one task per eligible finding.
    ///
    /// Findings whose asset is not resolvable in the store are skipped with
    /// a warning; an unresolvable asset is an ingestion lag, not a failure.
    pub async fn build_tasks(
        &self,
        findings: &[Finding],
        store: &dyn FindingStore,
    ) -> Result<Vec<RemediationTask>> {
        let now = Utc::now();
        let mut tasks = Vec::with_capacity(findings.len());

        for finding in findings {
            let asset = match store.get_asset(&finding.asset_arn).await? {
                Some(asset) => asset,
                None => {
                    wlog_warn!(
                        "Skipping finding {}: asset {} not resolvable",
                        finding.id,
                        finding.asset_arn
                    );
                    continue;
                }
            };
            tasks.push(self.build_task(finding, &asset, now));
        }

        wlog_debug!(
            "TaskFactory built {} tasks from {} findings",
            tasks.len(),
            findings.len()
        );
        Ok(tasks)
    }

    /// Build a single task from a finding and its resolved asset.
    pub fn build_task(
        &self,
        finding: &Finding,
        asset: &Asset,
        now: DateTime<Utc>,
    ) -> RemediationTask {
        let effort = effort_for(&finding.resource_type);
        RemediationTask {
            required_approvals: required_approvals(finding, asset),
            id: TaskId::new(),
            kind: TaskKind::from_category(finding.category),
            finding_id: finding.id.clone(),
            asset_arn: asset.arn.clone(),
            service: asset.service.clone(),
            region: asset.region.clone(),
            category: finding.category,
            resource_type: finding.resource_type.clone(),
            priority: priority(finding, now),
            weight: self.weight(finding, asset, now),
            estimated_duration: estimated_duration(effort),
            risk_reduction: RISK_REDUCTION_FACTOR * finding.risk_score,
            parallelizable: is_parallelizable(finding),
            state: TaskState::Planned,
            started_at: None,
            finished_at: None,
        }
    }

    /// Ranking weight: blend of normalized risk, urgency, criticality, and
    /// business impact. Distinct from priority; used for ranking and batch
    /// grouping.
    pub fn weight(&self, finding: &Finding, asset: &Asset, now: DateTime<Utc>) -> f64 {
        let risk = (finding.risk_score / 10.0).clamp(0.0, 1.0);
        let urgency = finding.severity.normalized() * age_multiplier(finding.age_days(now)) / 2.0;
        self.weights.risk * risk
            + self.weights.urgency * urgency
            + self.weights.criticality * asset.criticality_normalized()
            + self.weights.business_impact * asset.business_impact()
    }
}

/// WSJF-style priority: (value + time criticality + risk reduction value) / effort,
/// rescaled to 0-10 so downstream high-priority cutoffs compare against the
/// same scale as severity and risk scores.
///
/// `effort == 0` is defined as priority 0 to guard division by zero.
pub fn priority(finding: &Finding, now: DateTime<Utc>) -> f64 {
    let effort = effort_for(&finding.resource_type);
    if effort == 0.0 {
        return 0.0;
    }
    let value = finding.risk_score;
    let time_criticality = finding.severity.score() * age_multiplier(finding.age_days(now));
    let risk_reduction_value = RISK_REDUCTION_FACTOR * finding.risk_score;
    let numerator = value + time_criticality + risk_reduction_value;
    PRIORITY_SCALE * numerator / (MAX_PRIORITY_NUMERATOR * effort)
}

/// Non-linear age multiplier: grows from 1.0 to 2.0 over the first 30 days,
/// capped thereafter.
pub fn age_multiplier(age_days: i64) -> f64 {
    1.0 + (age_days.clamp(0, AGE_CAP_DAYS) as f64) / AGE_CAP_DAYS as f64
}

/// Fixed effort lookup with a mid-range default for unknown subtypes.
pub fn effort_for(resource_type: &str) -> f64 {
    EFFORT_TABLE
        .iter()
        .find(|(name, _)| *name == resource_type)
        .map(|(_, effort)| *effort)
        .unwrap_or(DEFAULT_EFFORT)
}

/// Deterministic parallelizability classification.
///
/// Configuration-category findings and the low-blast-radius allow-list are
/// parallelizable; everything else runs alone.
pub fn is_parallelizable(finding: &Finding) -> bool {
    finding.category == FindingCategory::Configuration
        || PARALLEL_SAFE_RESOURCES.contains(&finding.resource_type.as_str())
}

/// Approval policy: critical findings on production assets need sign-off.
pub fn required_approvals(finding: &Finding, asset: &Asset) -> BTreeSet<String> {
    let mut approvals = BTreeSet::new();
    if finding.severity == Severity::Critical && asset.environment == Environment::Production {
        approvals.insert(PRODUCTION_CRITICAL_APPROVAL.to_string());
    }
    approvals
}

fn estimated_duration(effort: f64) -> Duration {
    // Heuristic: one effort point is about a minute of remediation-call time.
    Duration::from_secs_f64(effort * 60.0)
}
