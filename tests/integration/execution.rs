//! End-to-end execution tests: full cycles through the orchestrator.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use warden::execution::EngineEvent;
use warden::{Orchestrator, OrchestratorConfig};

use crate::fixtures::{
    bucket_store, drain_events, security_group_store, FixedProbe, InstrumentedExecutor,
};

fn config() -> OrchestratorConfig {
    OrchestratorConfig {
        step_delay_ms: 0,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_full_cycle_succeeds() {
    let (tx, _rx) = mpsc::channel(256);
    let mut orch = Orchestrator::new(
        config(),
        Arc::new(bucket_store(4)),
        Arc::new(InstrumentedExecutor::succeeding()),
        tx,
    );

    let report = orch.run_cycle().await.unwrap();
    assert_eq!(report.tasks_executed, 4);
    assert_eq!(report.tasks_succeeded, 4);
    assert_eq!(report.tasks_failed, 0);
    assert_eq!(report.outcomes.len(), 4);
    assert!(!report.aborted);
    assert!((report.coherence - 1.0).abs() < 1e-9);
    assert!(report.risk_reduction_achieved > 0.0);
}

#[tokio::test]
async fn test_counters_consistent_with_partial_failures() {
    let executor = InstrumentedExecutor::succeeding().with_failure("f-1", "transient timeout");
    let (tx, _rx) = mpsc::channel(256);
    let mut orch = Orchestrator::new(config(), Arc::new(bucket_store(5)), Arc::new(executor), tx);

    let report = orch.run_cycle().await.unwrap();
    assert_eq!(report.tasks_executed, 5);
    assert_eq!(report.tasks_failed, 1);
    assert_eq!(
        report.tasks_executed,
        report.tasks_succeeded + report.tasks_failed
    );
    // One decay against four recoveries leaves coherence below 1.
    assert!(report.coherence < 1.0);
}

#[tokio::test]
async fn test_task_lifecycle_events_emitted() {
    let (tx, mut rx) = mpsc::channel(256);
    let mut orch = Orchestrator::new(
        config(),
        Arc::new(bucket_store(3)),
        Arc::new(InstrumentedExecutor::succeeding()),
        tx,
    );

    orch.run_cycle().await.unwrap();
    let events = drain_events(&mut rx);

    let started = events
        .iter()
        .filter(|e| matches!(e, EngineEvent::TaskStarted { .. }))
        .count();
    let completed = events
        .iter()
        .filter(|e| matches!(e, EngineEvent::TaskCompleted { .. }))
        .count();
    assert_eq!(started, 3);
    assert_eq!(completed, 3);
    assert!(events
        .iter()
        .any(|e| matches!(e, EngineEvent::ExecutionComplete { .. })));
}

#[tokio::test]
async fn test_concurrency_bounded_end_to_end() {
    let cfg = OrchestratorConfig {
        max_concurrent_tasks: 4,
        step_delay_ms: 0,
        ..Default::default()
    };
    let executor = Arc::new(
        InstrumentedExecutor::succeeding().with_delay(Duration::from_millis(25)),
    );
    let (tx, _rx) = mpsc::channel(256);
    let mut orch = Orchestrator::new(cfg, Arc::new(bucket_store(8)), executor.clone(), tx);

    let report = orch.run_cycle().await.unwrap();
    assert_eq!(report.tasks_executed, 8);
    assert!(
        executor.max_in_flight() <= 4,
        "observed {} concurrent remediation calls",
        executor.max_in_flight()
    );
}

#[tokio::test]
async fn test_self_healing_reclaims_under_memory_pressure() {
    // Sequential security-group work gives the engine probe points between
    // batches; a probe pinned above the pressure threshold must trigger at
    // least one reclamation.
    let cfg = OrchestratorConfig {
        step_delay_ms: 0,
        probe_interval_ms: 0,
        ..Default::default()
    };
    let probe = Arc::new(FixedProbe::at(0.95));
    let (tx, mut rx) = mpsc::channel(256);
    let mut orch = Orchestrator::new(
        cfg,
        Arc::new(security_group_store(4)),
        Arc::new(InstrumentedExecutor::succeeding()),
        tx,
    )
    .with_probe(probe.clone());

    orch.run_cycle().await.unwrap();

    assert!(probe.reclaim_count() >= 1);
    let events = drain_events(&mut rx);
    assert!(events
        .iter()
        .any(|e| matches!(e, EngineEvent::SelfHealingAction { .. })));
}

#[tokio::test]
async fn test_repeated_cycles_accumulate_strategy_stats() {
    let (tx, _rx) = mpsc::channel(256);
    let mut orch = Orchestrator::new(
        config(),
        Arc::new(bucket_store(3)),
        Arc::new(InstrumentedExecutor::succeeding()),
        tx,
    );

    orch.run_cycle().await.unwrap();
    orch.run_cycle().await.unwrap();

    let total_runs: u32 = orch.strategy_stats().values().map(|s| s.runs).sum();
    assert_eq!(total_runs, 2);
}
