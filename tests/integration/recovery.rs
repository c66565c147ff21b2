//! Abort, rollback, and circuit-breaker recovery tests.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use warden::collab::store::FindingsDocument;
use warden::collab::{GuardedExecutor, JsonFindingStore};
use warden::execution::EngineEvent;
use warden::{Error, Orchestrator, OrchestratorConfig};

use crate::fixtures::{asset, drain_events, finding, InstrumentedExecutor};

fn config() -> OrchestratorConfig {
    OrchestratorConfig {
        step_delay_ms: 0,
        ..Default::default()
    }
}

/// Security-group findings with strictly decreasing risk, so execution
/// order is deterministic: f-0 first, then f-1, and so on.
fn ordered_sg_store(n: usize) -> JsonFindingStore {
    JsonFindingStore::from_document(FindingsDocument {
        findings: (0..n)
            .map(|i| {
                let mut f = finding(
                    &format!("f-{}", i),
                    &format!("arn:aws:ec2:sg/sg-{}", i),
                    "security-group",
                );
                f.category = warden::core::finding::FindingCategory::Network;
                f.risk_score = 8.0 - i as f64;
                f
            })
            .collect(),
        assets: (0..n)
            .map(|i| asset(&format!("arn:aws:ec2:sg/sg-{}", i), "ec2"))
            .collect(),
        dependencies: Vec::new(),
    })
}

#[tokio::test]
async fn test_critical_failure_aborts_and_rolls_back_lifo() {
    // Two applied changes, then a critical error: both must be undone in
    // reverse order of application.
    let executor = Arc::new(
        InstrumentedExecutor::succeeding()
            .with_token("f-0", "undo-0")
            .with_token("f-1", "undo-1")
            .with_failure("f-2", "iam: permission denied"),
    );
    let (tx, mut rx) = mpsc::channel(256);
    let mut orch = Orchestrator::new(config(), Arc::new(ordered_sg_store(3)), executor.clone(), tx);

    let err = orch.run_cycle().await.unwrap_err();
    match err {
        Error::Aborted {
            reason,
            report,
            rolled_back,
        } => {
            assert!(reason.contains("critical error"));
            assert!(rolled_back);
            assert!(report.aborted);
            assert!(report.rolled_back);
            assert_eq!(report.tasks_executed, 3);
            assert_eq!(
                report.tasks_executed,
                report.tasks_succeeded + report.tasks_failed
            );
        }
        other => panic!("expected Aborted, got {}", other),
    }

    assert_eq!(executor.undone(), vec!["undo-1".to_string(), "undo-0".to_string()]);
    let events = drain_events(&mut rx);
    assert!(events
        .iter()
        .any(|e| matches!(e, EngineEvent::RollbackComplete { undone: 2, failed: 0 })));
}

#[tokio::test]
async fn test_failure_fraction_abort() {
    // Non-critical failures alone trip the abort once three tasks have
    // executed and more than half failed.
    let executor = InstrumentedExecutor::succeeding()
        .with_failure("f-0", "backend 500")
        .with_failure("f-1", "backend 500")
        .with_failure("f-2", "backend 500");
    let (tx, _rx) = mpsc::channel(256);
    let mut orch = Orchestrator::new(config(), Arc::new(ordered_sg_store(5)), Arc::new(executor), tx);

    let err = orch.run_cycle().await.unwrap_err();
    match err {
        Error::Aborted { reason, report, .. } => {
            assert!(reason.contains("failure fraction"));
            assert!(report.tasks_executed >= 3);
            assert!(report.tasks_executed < 5, "abort must stop further dispatch");
        }
        other => panic!("expected Aborted, got {}", other),
    }
}

#[tokio::test]
async fn test_rollback_disabled_leaves_changes_in_place() {
    let executor = Arc::new(
        InstrumentedExecutor::succeeding()
            .with_token("f-0", "undo-0")
            .with_failure("f-1", "resource not found"),
    );
    let cfg = OrchestratorConfig {
        rollback_enabled: false,
        step_delay_ms: 0,
        ..Default::default()
    };
    let (tx, _rx) = mpsc::channel(256);
    let mut orch = Orchestrator::new(cfg, Arc::new(ordered_sg_store(2)), executor.clone(), tx);

    let err = orch.run_cycle().await.unwrap_err();
    match err {
        Error::Aborted { rolled_back, report, .. } => {
            assert!(!rolled_back);
            assert!(!report.rolled_back);
        }
        other => panic!("expected Aborted, got {}", other),
    }
    assert!(executor.undone().is_empty());
}

#[tokio::test]
async fn test_circuit_breaker_short_circuits_failing_backend() {
    // Every call hits a failing backend; after two consecutive failures the
    // breaker opens and the third task fails without reaching the backend.
    let inner = Arc::new(
        InstrumentedExecutor::succeeding()
            .with_failure("f-0", "backend 500")
            .with_failure("f-1", "backend 500")
            .with_failure("f-2", "backend 500")
            .with_failure("f-3", "backend 500"),
    );
    let guarded = Arc::new(GuardedExecutor::with_settings(
        Arc::clone(&inner),
        "remediation-backend",
        2,
        Duration::from_secs(60),
    ));
    let (tx, _rx) = mpsc::channel(256);
    let mut orch = Orchestrator::new(config(), Arc::new(ordered_sg_store(4)), guarded, tx);

    let err = orch.run_cycle().await.unwrap_err();
    assert!(matches!(err, Error::Aborted { .. }));
    // Only the first two calls reached the backend.
    assert_eq!(inner.applied().len(), 2);
}

#[tokio::test]
async fn test_coherence_decays_across_failures() {
    let executor = InstrumentedExecutor::succeeding()
        .with_failure("f-1", "backend 500")
        .with_failure("f-3", "backend 500");
    let (tx, _rx) = mpsc::channel(256);
    let mut orch = Orchestrator::new(config(), Arc::new(ordered_sg_store(5)), Arc::new(executor), tx);

    // Two failures in five stay under the abort fraction.
    let report = orch.run_cycle().await.unwrap();
    assert_eq!(report.tasks_failed, 2);
    assert!(report.coherence < 1.0);
}
