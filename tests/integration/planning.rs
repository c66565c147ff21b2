//! Planning pipeline integration tests: findings in, selected plan out.

use std::sync::Arc;

use tokio::sync::mpsc;

use warden::collab::store::FindingsDocument;
use warden::collab::JsonFindingStore;
use warden::core::finding::{Environment, Severity};
use warden::core::task::TaskId;
use warden::{Orchestrator, OrchestratorConfig};

use crate::fixtures::{asset, bucket_store, finding, InstrumentedExecutor, StaticGate};

fn config() -> OrchestratorConfig {
    OrchestratorConfig {
        step_delay_ms: 0,
        ..Default::default()
    }
}

fn orchestrator(store: JsonFindingStore, config: OrchestratorConfig) -> Orchestrator {
    let (tx, _rx) = mpsc::channel(64);
    Orchestrator::new(
        config,
        Arc::new(store),
        Arc::new(InstrumentedExecutor::succeeding()),
        tx,
    )
}

#[tokio::test]
async fn test_pipeline_derives_one_task_per_finding() {
    let orch = orchestrator(bucket_store(3), config());

    let outcome = orch.plan_cycle().await.unwrap();
    assert_eq!(outcome.tasks.len(), 3);
    assert_eq!(outcome.plan.tasks.len(), 3);
    assert!(outcome.plan.fitness > 0.0);
}

#[tokio::test]
async fn test_batches_cover_every_task_exactly_once() {
    let orch = orchestrator(bucket_store(6), config());

    let outcome = orch.plan_cycle().await.unwrap();
    let batched: Vec<TaskId> = outcome
        .plan
        .batches
        .iter()
        .flatten()
        .copied()
        .collect();
    assert_eq!(batched.len(), outcome.plan.tasks.len());
    for id in &outcome.plan.tasks {
        assert_eq!(batched.iter().filter(|b| *b == id).count(), 1);
    }
    assert!(!outcome.plan.has_duplicates());
}

#[tokio::test]
async fn test_same_asset_findings_get_ordering_constraint() {
    // Two findings on one bucket share asset, service, region, and category,
    // which is well past the sequential threshold.
    let arn = "arn:aws:s3:::shared-bucket";
    let mut high = finding("f-high", arn, "s3-bucket");
    high.severity = Severity::High;
    let mut low = finding("f-low", arn, "s3-bucket");
    low.severity = Severity::Low;

    let store = JsonFindingStore::from_document(FindingsDocument {
        findings: vec![high, low],
        assets: vec![asset(arn, "s3")],
        dependencies: Vec::new(),
    });
    let orch = orchestrator(store, config());

    let outcome = orch.plan_cycle().await.unwrap();
    assert_eq!(outcome.plan.constraints.len(), 1);

    let constraint = outcome.plan.constraints[0];
    let before = outcome
        .tasks
        .iter()
        .find(|t| t.id == constraint.before)
        .unwrap();
    // The higher-priority remediation goes first.
    assert_eq!(before.finding_id, "f-high");
}

#[tokio::test]
async fn test_denied_approvals_exclude_tasks_from_plan() {
    // One critical production finding needs sign-off the gate will not give.
    let mut doc = FindingsDocument {
        findings: vec![
            finding("f-critical", "arn:aws:iam::role/admin", "iam-role"),
            finding("f-a", "arn:aws:s3:::bucket-a", "s3-bucket"),
            finding("f-b", "arn:aws:s3:::bucket-b", "s3-bucket"),
        ],
        assets: vec![
            asset("arn:aws:iam::role/admin", "iam"),
            asset("arn:aws:s3:::bucket-a", "s3"),
            asset("arn:aws:s3:::bucket-b", "s3"),
        ],
        dependencies: Vec::new(),
    };
    doc.findings[0].severity = Severity::Critical;
    doc.assets[0].environment = Environment::Production;

    let store = JsonFindingStore::from_document(doc);
    let orch = orchestrator(store, config()).with_gate(Arc::new(StaticGate::deny_all()));

    let outcome = orch.plan_cycle().await.unwrap();
    assert_eq!(outcome.excluded, 1);
    assert_eq!(outcome.plan.tasks.len(), 2);
    assert!(outcome.tasks.iter().all(|t| t.finding_id != "f-critical"));
}

#[tokio::test]
async fn test_granted_approvals_keep_tasks_in_plan() {
    let mut doc = FindingsDocument {
        findings: vec![finding("f-critical", "arn:aws:iam::role/admin", "iam-role")],
        assets: vec![asset("arn:aws:iam::role/admin", "iam")],
        dependencies: Vec::new(),
    };
    doc.findings[0].severity = Severity::Critical;
    doc.assets[0].environment = Environment::Production;

    let store = JsonFindingStore::from_document(doc);
    let orch =
        orchestrator(store, config()).with_gate(Arc::new(StaticGate::granting(&["security-lead"])));

    let outcome = orch.plan_cycle().await.unwrap();
    assert_eq!(outcome.excluded, 0);
    assert_eq!(outcome.plan.tasks.len(), 1);
}

#[tokio::test]
async fn test_batch_sizes_respect_concurrency_limit() {
    let cfg = OrchestratorConfig {
        max_concurrent_tasks: 4,
        step_delay_ms: 0,
        ..Default::default()
    };
    let orch = orchestrator(bucket_store(8), cfg);

    let outcome = orch.plan_cycle().await.unwrap();
    for batch in &outcome.plan.batches {
        assert!(batch.len() <= 4);
    }
}

#[tokio::test]
async fn test_constraints_are_acyclic() {
    // Several findings on one asset produce a fully connected sequential
    // cluster; priority orientation must keep the relation acyclic.
    let arn = "arn:aws:s3:::hot-bucket";
    let store = JsonFindingStore::from_document(FindingsDocument {
        findings: (0..4)
            .map(|i| {
                let mut f = finding(&format!("f-{}", i), arn, "s3-bucket");
                f.risk_score = 3.0 + i as f64;
                f
            })
            .collect(),
        assets: vec![asset(arn, "s3")],
        dependencies: Vec::new(),
    });
    let orch = orchestrator(store, config());

    let outcome = orch.plan_cycle().await.unwrap();
    assert!(!outcome.plan.constraints.is_empty());
    assert!(outcome.plan.check_constraint_cycles().is_ok());
}
