use thiserror::Error;

use crate::execution::context::RunReport;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("No home directory")]
    NoHomeDir,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Planning error: {0}")]
    Planning(String),

    #[error("Circuit breaker open for {service}")]
    CircuitOpen { service: String },

    #[error("Remediation failed: {0}")]
    Remediation(String),

    #[error("Invalid phase transition from {from} to {to}")]
    InvalidPhaseTransition { from: String, to: String },

    #[error("Execution aborted: {reason}")]
    Aborted {
        reason: String,
        /// Partial results up to the abort point.
        report: Box<RunReport>,
        /// Whether rollback ran before the error was raised.
        rolled_back: bool,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
