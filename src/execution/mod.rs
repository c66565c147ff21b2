//! Execution layer: the engine state machine and its run-scoped helpers.

pub mod context;
pub mod engine;
pub mod events;
pub mod healing;
pub mod rollback;

pub use context::{RunContext, RunId, RunReport, TaskOutcome};
pub use engine::{EnginePhase, ExecutionEngine, StrategyStats};
pub use events::EngineEvent;
pub use healing::{HealingConfig, Mitigation, SelfHealingCoordinator};
pub use rollback::{RollbackManager, UnwindSummary};
