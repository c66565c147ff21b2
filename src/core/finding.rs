//! Security finding and asset model.
//!
//! Findings are the raw input to the planning pipeline: each one carries a
//! severity, a category, and a numeric risk score computed upstream. Assets
//! give the finding its blast-radius context (criticality, environment,
//! exposure). How findings are scored for risk is out of scope here; the
//! risk score is treated as a given input.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Severity assigned to a finding by the upstream scanner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
}

impl Severity {
    /// Numeric score on the same 0-10 scale as risk scores.
    pub fn score(&self) -> f64 {
        match self {
            Severity::Critical => 10.0,
            Severity::High => 7.5,
            Severity::Medium => 5.0,
            Severity::Low => 2.5,
        }
    }

    /// Score normalized to [0, 1].
    pub fn normalized(&self) -> f64 {
        self.score() / 10.0
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Critical => write!(f, "critical"),
            Severity::High => write!(f, "high"),
            Severity::Medium => write!(f, "medium"),
            Severity::Low => write!(f, "low"),
        }
    }
}

/// Broad category of a finding.
///
/// Categories drive parallelizability classification and the task kind a
/// finding is converted into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingCategory {
    /// Misconfigured resources (public buckets, disabled encryption, etc.).
    Configuration,
    /// IAM policies, roles, and permission issues.
    AccessControl,
    /// Security groups, ACLs, and exposure paths.
    Network,
    /// Data-at-rest and data-in-transit protection gaps.
    DataProtection,
    /// Missing or misconfigured audit trails.
    Logging,
    /// Framework-mapped compliance gaps.
    Compliance,
    /// Patching and housekeeping work.
    Maintenance,
}

impl std::fmt::Display for FindingCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FindingCategory::Configuration => "configuration",
            FindingCategory::AccessControl => "access_control",
            FindingCategory::Network => "network",
            FindingCategory::DataProtection => "data_protection",
            FindingCategory::Logging => "logging",
            FindingCategory::Compliance => "compliance",
            FindingCategory::Maintenance => "maintenance",
        };
        write!(f, "{}", s)
    }
}

/// A security finding produced by upstream ingestion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    /// Identifier assigned by the finding store.
    pub id: String,
    /// Short human-readable summary.
    pub title: String,
    pub severity: Severity,
    pub category: FindingCategory,
    /// Resource subtype, e.g. "s3-bucket", "security-group", "iam-policy".
    pub resource_type: String,
    /// Upstream risk score on a 0-10 scale.
    pub risk_score: f64,
    /// ARN of the affected asset.
    pub asset_arn: String,
    /// When the finding was first observed.
    pub first_seen: DateTime<Utc>,
}

impl Finding {
    /// Age of the finding in whole days at `now`, never negative.
    pub fn age_days(&self, now: DateTime<Utc>) -> i64 {
        (now - self.first_seen).num_days().max(0)
    }
}

/// Deployment environment of an asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    Production,
    Staging,
    Development,
}

/// A cloud asset referenced by findings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Asset {
    /// Full ARN, the asset's identity in the graph store.
    pub arn: String,
    /// Owning service, e.g. "s3", "iam", "ec2".
    pub service: String,
    pub region: String,
    pub environment: Environment,
    /// Criticality on a 0-10 scale assigned by asset inventory.
    pub criticality: f64,
    /// Whether the asset is reachable from the public internet.
    pub public_exposure: bool,
    /// Whether the asset holds sensitive data.
    pub sensitive_data: bool,
}

impl Asset {
    /// Criticality normalized to [0, 1].
    pub fn criticality_normalized(&self) -> f64 {
        (self.criticality / 10.0).clamp(0.0, 1.0)
    }

    /// Business-impact score in [0, 1] from environment and data flags.
    ///
    /// Production placement dominates, public exposure and sensitive data
    /// add the remainder.
    pub fn business_impact(&self) -> f64 {
        let mut score: f64 = match self.environment {
            Environment::Production => 0.5,
            Environment::Staging => 0.25,
            Environment::Development => 0.1,
        };
        if self.public_exposure {
            score += 0.3;
        }
        if self.sensitive_data {
            score += 0.2;
        }
        score.min(1.0)
    }
}
