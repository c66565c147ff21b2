pub mod collab;
pub mod config;
pub mod core;
pub mod error;
pub mod log;
pub mod orchestrator;

// Planning pipeline and execution engine
pub mod execution;
pub mod planning;

pub use config::OrchestratorConfig;
pub use error::{Error, Result};
pub use orchestrator::{Orchestrator, PlanningOutcome};
