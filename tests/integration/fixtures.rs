//! Test fixtures for integration tests.
//!
//! Provides helpers for:
//! - Seeding findings documents and in-memory stores
//! - Instrumented remediation executors
//! - Scripted approval gates and resource probes

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use tokio::sync::mpsc;

use warden::collab::{
    ApprovalGate, JsonFindingStore, RemediationExecutor, RemediationOutcome, ResourceProbe,
};
use warden::collab::store::FindingsDocument;
use warden::core::finding::{Asset, Environment, Finding, FindingCategory, Severity};
use warden::core::task::RemediationTask;
use warden::execution::EngineEvent;
use warden::{Error, Result};

/// A finding with sensible defaults, two days old.
pub fn finding(id: &str, arn: &str, resource_type: &str) -> Finding {
    Finding {
        id: id.to_string(),
        title: format!("finding {}", id),
        severity: Severity::Medium,
        category: FindingCategory::Configuration,
        resource_type: resource_type.to_string(),
        risk_score: 5.0,
        asset_arn: arn.to_string(),
        first_seen: Utc::now() - ChronoDuration::days(2),
    }
}

/// A development-tier asset with no exposure flags.
pub fn asset(arn: &str, service: &str) -> Asset {
    Asset {
        arn: arn.to_string(),
        service: service.to_string(),
        region: "us-east-1".to_string(),
        environment: Environment::Development,
        criticality: 3.0,
        public_exposure: false,
        sensitive_data: false,
    }
}

/// A store seeded with `n` independent s3-bucket findings, one asset each.
pub fn bucket_store(n: usize) -> JsonFindingStore {
    let doc = FindingsDocument {
        findings: (0..n)
            .map(|i| {
                finding(
                    &format!("f-{}", i),
                    &format!("arn:aws:s3:::bucket-{}", i),
                    "s3-bucket",
                )
            })
            .collect(),
        assets: (0..n)
            .map(|i| asset(&format!("arn:aws:s3:::bucket-{}", i), "s3"))
            .collect(),
        dependencies: Vec::new(),
    };
    JsonFindingStore::from_document(doc)
}

/// A store whose findings all target distinct security groups, which are
/// neither Configuration-category nor on the parallel-safe allow-list.
pub fn security_group_store(n: usize) -> JsonFindingStore {
    let doc = FindingsDocument {
        findings: (0..n)
            .map(|i| {
                let mut f = finding(
                    &format!("f-{}", i),
                    &format!("arn:aws:ec2:sg/sg-{}", i),
                    "security-group",
                );
                f.category = FindingCategory::Network;
                f
            })
            .collect(),
        assets: (0..n)
            .map(|i| asset(&format!("arn:aws:ec2:sg/sg-{}", i), "ec2"))
            .collect(),
        dependencies: Vec::new(),
    };
    JsonFindingStore::from_document(doc)
}

/// Remediation executor that records everything it is asked to do.
///
/// Behaviors are keyed by finding id so tests stay independent of the
/// generated task ids.
#[derive(Default)]
pub struct InstrumentedExecutor {
    /// Finding ids that fail, with the error text to return.
    pub failures: HashMap<String, String>,
    /// Finding ids that return an undo token on success.
    pub tokens: HashMap<String, String>,
    /// Artificial latency per remediation call.
    pub delay: Option<Duration>,
    current: AtomicUsize,
    max_observed: AtomicUsize,
    applied: Mutex<Vec<String>>,
    undone: Mutex<Vec<String>>,
}

impl InstrumentedExecutor {
    pub fn succeeding() -> Self {
        Self::default()
    }

    pub fn with_failure(mut self, finding_id: &str, error: &str) -> Self {
        self.failures
            .insert(finding_id.to_string(), error.to_string());
        self
    }

    pub fn with_token(mut self, finding_id: &str, token: &str) -> Self {
        self.tokens
            .insert(finding_id.to_string(), token.to_string());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Highest number of concurrently running remediation calls observed.
    pub fn max_in_flight(&self) -> usize {
        self.max_observed.load(Ordering::SeqCst)
    }

    /// Finding ids of all apply calls, in completion order.
    pub fn applied(&self) -> Vec<String> {
        self.applied.lock().unwrap().clone()
    }

    /// Undo tokens in the order they were invoked.
    pub fn undone(&self) -> Vec<String> {
        self.undone.lock().unwrap().clone()
    }
}

#[async_trait]
impl RemediationExecutor for InstrumentedExecutor {
    async fn apply(&self, task: &RemediationTask) -> Result<RemediationOutcome> {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_observed.fetch_max(now, Ordering::SeqCst);

        tokio::time::sleep(self.delay.unwrap_or(Duration::from_millis(5))).await;

        self.current.fetch_sub(1, Ordering::SeqCst);
        self.applied.lock().unwrap().push(task.finding_id.clone());

        if let Some(error) = self.failures.get(&task.finding_id) {
            return Err(Error::Remediation(error.clone()));
        }
        Ok(RemediationOutcome {
            applied: true,
            undo_token: self.tokens.get(&task.finding_id).cloned(),
        })
    }

    async fn undo(&self, token: &str) -> Result<()> {
        self.undone.lock().unwrap().push(token.to_string());
        Ok(())
    }
}

/// Approval gate satisfied by a fixed set of granted approval names.
pub struct StaticGate {
    granted: HashSet<String>,
}

impl StaticGate {
    pub fn granting(names: &[&str]) -> Self {
        Self {
            granted: names.iter().map(|n| n.to_string()).collect(),
        }
    }

    pub fn deny_all() -> Self {
        Self {
            granted: HashSet::new(),
        }
    }
}

#[async_trait]
impl ApprovalGate for StaticGate {
    async fn approvals_satisfied(&self, task: &RemediationTask) -> Result<bool> {
        Ok(task
            .required_approvals
            .iter()
            .all(|name| self.granted.contains(name)))
    }
}

/// Resource probe reporting a fixed memory pressure.
pub struct FixedProbe {
    pub pressure: f64,
    reclaims: AtomicUsize,
}

impl FixedProbe {
    pub fn at(pressure: f64) -> Self {
        Self {
            pressure,
            reclaims: AtomicUsize::new(0),
        }
    }

    pub fn reclaim_count(&self) -> usize {
        self.reclaims.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ResourceProbe for FixedProbe {
    async fn memory_pressure(&self) -> f64 {
        self.pressure
    }

    async fn reclaim(&self) -> Result<()> {
        self.reclaims.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Drain every event currently buffered on the receiver.
pub fn drain_events(rx: &mut mpsc::Receiver<EngineEvent>) -> Vec<EngineEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
