use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;

use warden::collab::{
    GuardedExecutor, JsonFindingStore, RemediationExecutor, RemediationOutcome,
};
use warden::core::task::RemediationTask;
use warden::execution::EngineEvent;
use warden::{wlog_info, Error, Orchestrator, OrchestratorConfig, Result};

/// Warden - autonomous cloud security remediation orchestrator
#[derive(Parser, Debug)]
#[command(name = "warden")]
#[command(version, about, long_about = None)]
#[command(after_help = "ENVIRONMENT:\n    WARDEN_DEBUG=1     Enable debug logging (alternative to --debug)")]
struct Cli {
    /// Enable debug logging (writes to ~/.warden/warden.log)
    #[arg(short = 'd', long)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, Clone)]
enum Command {
    /// Derive tasks from a findings document and print the selected plan
    Plan {
        /// Path to a findings JSON document
        findings: PathBuf,
    },

    /// Plan and execute a full remediation cycle
    Run {
        /// Path to a findings JSON document
        findings: PathBuf,

        /// Simulate remediation calls without applying changes
        #[arg(long)]
        dry_run: bool,

        /// Simulated fraction of remediation calls that fail, 0.0 to 1.0
        #[arg(long, value_name = "FRACTION")]
        failure_rate: Option<f64>,

        /// Override the configured concurrency limit
        #[arg(long, value_name = "N")]
        max_concurrent: Option<usize>,

        /// Approve high-impact tasks without an approval gate
        #[arg(long)]
        auto_approve: bool,
    },
}

/// Simulated remediation backend for plan rehearsal.
///
/// Failures are deterministic for a given findings document: a finding fails
/// when its id hashes below the failure-rate cutoff, so reruns reproduce the
/// same outcome pattern.
struct SimulatedExecutor {
    failure_rate: f64,
    dry_run: bool,
}

impl SimulatedExecutor {
    fn new(failure_rate: f64, dry_run: bool) -> Self {
        Self {
            failure_rate: failure_rate.clamp(0.0, 1.0),
            dry_run,
        }
    }

    fn fails(&self, finding_id: &str) -> bool {
        let mut hasher = DefaultHasher::new();
        finding_id.hash(&mut hasher);
        let bucket = (hasher.finish() % 1000) as f64 / 1000.0;
        bucket < self.failure_rate
    }
}

#[async_trait]
impl RemediationExecutor for SimulatedExecutor {
    async fn apply(&self, task: &RemediationTask) -> Result<RemediationOutcome> {
        tokio::time::sleep(Duration::from_millis(50)).await;
        if self.fails(&task.finding_id) {
            return Err(Error::Remediation(format!(
                "simulated failure remediating {}",
                task.finding_id
            )));
        }
        if self.dry_run {
            return Ok(RemediationOutcome {
                applied: false,
                undo_token: None,
            });
        }
        Ok(RemediationOutcome {
            applied: true,
            undo_token: Some(format!("undo-{}", task.finding_id)),
        })
    }

    async fn undo(&self, token: &str) -> Result<()> {
        tokio::time::sleep(Duration::from_millis(20)).await;
        wlog_info!("simulated undo: {}", token);
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    warden::log::init_with_debug(cli.debug);

    match cli.command {
        Command::Plan { findings } => run_plan(&findings).await,
        Command::Run {
            findings,
            dry_run,
            failure_rate,
            max_concurrent,
            auto_approve,
        } => run_cycle(&findings, dry_run, failure_rate, max_concurrent, auto_approve).await,
    }
}

async fn run_plan(findings: &PathBuf) -> Result<()> {
    let config = OrchestratorConfig::load()?;
    let store = Arc::new(JsonFindingStore::load(findings)?);
    let executor = Arc::new(SimulatedExecutor::new(0.0, true));
    let (event_tx, _event_rx) = mpsc::channel(256);

    let orchestrator = Orchestrator::new(config, store, executor, event_tx);
    let outcome = orchestrator.plan_cycle().await?;

    println!(
        "Selected {} plan {} (fitness {:.3}, risk level {:?})",
        outcome.plan.strategy,
        outcome.plan.id.short(),
        outcome.plan.fitness,
        outcome.plan.risk_level
    );
    println!(
        "  {} tasks in {} batches, {} ordering constraints, {} excluded for approvals",
        outcome.plan.tasks.len(),
        outcome.plan.batches.len(),
        outcome.plan.constraints.len(),
        outcome.excluded
    );
    println!(
        "  estimated duration {:?}, estimated risk reduction {:.1}",
        outcome.plan.estimated_duration, outcome.plan.estimated_risk_reduction
    );

    let by_id: std::collections::HashMap<_, _> =
        outcome.tasks.iter().map(|t| (t.id, t)).collect();
    for (i, batch) in outcome.plan.batches.iter().enumerate() {
        println!("  batch {}:", i + 1);
        for id in batch {
            if let Some(task) = by_id.get(id) {
                println!(
                    "    {} {} priority {:.1} ({} on {})",
                    task.id.short(),
                    task.kind,
                    task.priority,
                    task.resource_type,
                    task.asset_arn
                );
            }
        }
    }
    Ok(())
}

async fn run_cycle(
    findings: &PathBuf,
    dry_run: bool,
    failure_rate: Option<f64>,
    max_concurrent: Option<usize>,
    auto_approve: bool,
) -> Result<()> {
    let mut config = OrchestratorConfig::load()?;
    if let Some(limit) = max_concurrent {
        config.max_concurrent_tasks = limit.max(1);
    }
    if auto_approve {
        config.auto_approval = true;
    }

    let store = Arc::new(JsonFindingStore::load(findings)?);
    let simulated = Arc::new(SimulatedExecutor::new(failure_rate.unwrap_or(0.0), dry_run));
    let executor = Arc::new(GuardedExecutor::new(simulated, "simulated"));
    let (event_tx, mut event_rx) = mpsc::channel(256);

    let printer = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            print_event(&event);
        }
    });

    let mut orchestrator = Orchestrator::new(config, store, executor, event_tx);
    let result = orchestrator.run_cycle().await;
    drop(orchestrator);
    let _ = printer.await;

    match result {
        Ok(report) => {
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Err(Error::Aborted {
            reason,
            report,
            rolled_back,
        }) => {
            eprintln!("run aborted: {}", reason);
            if rolled_back {
                eprintln!("applied changes were rolled back");
            }
            println!("{}", serde_json::to_string_pretty(&report)?);
            Err(Error::Aborted {
                reason,
                report,
                rolled_back,
            })
        }
        Err(err) => Err(err),
    }
}

fn print_event(event: &EngineEvent) {
    match event {
        EngineEvent::PlanningComplete {
            plan_id,
            strategy,
            task_count,
            fitness,
        } => println!(
            "plan {} selected: {} strategy, {} tasks, fitness {:.3}",
            plan_id.short(),
            strategy,
            task_count,
            fitness
        ),
        EngineEvent::TaskStarted { task_id } => {
            println!("task {} started", task_id.short())
        }
        EngineEvent::TaskCompleted {
            task_id,
            duration,
            risk_reduction,
        } => println!(
            "task {} completed in {:?} (risk -{:.1})",
            task_id.short(),
            duration,
            risk_reduction
        ),
        EngineEvent::TaskFailed {
            task_id,
            error,
            critical,
        } => println!(
            "task {} failed{}: {}",
            task_id.short(),
            if *critical { " (critical)" } else { "" },
            error
        ),
        EngineEvent::SelfHealingAction { action, detail } => {
            println!("self-healing: {} ({})", action, detail)
        }
        EngineEvent::RollbackComplete { undone, failed } => {
            println!("rollback complete: {} undone, {} failed", undone, failed)
        }
        EngineEvent::ExecutionComplete { report } => println!(
            "run {} complete: {}/{} tasks succeeded",
            report.run_id.short(),
            report.tasks_succeeded,
            report.tasks_executed
        ),
        EngineEvent::ExecutionError { error } => println!("execution error: {}", error),
    }
}
