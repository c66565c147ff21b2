//! Orchestrator configuration.
//!
//! All knobs are optional with stated defaults and can be overridden from
//! `~/.warden/warden.toml`. The weight tables used by task ranking and plan
//! fitness scoring live here as named configuration rather than constants
//! buried in the planning code; nothing beyond the internal self-consistency
//! of the ranking depends on their specific values.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::{wlog_debug, Error, Result};

/// Coefficients blended into a task's ranking weight.
///
/// Each contribution is normalized to [0, 1] before weighting.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct WeightCoefficients {
    /// Contribution of the finding's risk score.
    pub risk: f64,
    /// Contribution of urgency (severity scaled by finding age).
    pub urgency: f64,
    /// Contribution of asset criticality.
    pub criticality: f64,
    /// Contribution of the business-impact flags (environment, exposure, sensitivity).
    pub business_impact: f64,
}

impl Default for WeightCoefficients {
    fn default() -> Self {
        Self {
            risk: 0.4,
            urgency: 0.3,
            criticality: 0.2,
            business_impact: 0.1,
        }
    }
}

/// Weights of the fitness function used to rank candidate plans.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct FitnessWeights {
    /// Weight of normalized total risk reduction.
    pub risk_reduction: f64,
    /// Weight of resource efficiency (parallelizable fraction).
    pub resource_efficiency: f64,
    /// Weight of time-to-value (lower estimated duration scores higher).
    pub time_to_value: f64,
    /// Weight of compliance impact (fraction of compliance/security tasks).
    pub compliance_impact: f64,
    /// Weight of cost (lower total duration scores higher).
    pub cost: f64,
}

impl Default for FitnessWeights {
    fn default() -> Self {
        Self {
            risk_reduction: 0.3,
            resource_efficiency: 0.2,
            time_to_value: 0.2,
            compliance_impact: 0.15,
            cost: 0.15,
        }
    }
}

/// Construction-time configuration for the remediation orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Maximum number of remediation tasks in flight at once.
    pub max_concurrent_tasks: usize,
    /// Safe mode gates high-impact tasks on approvals and paces sequential dispatch.
    pub safe_mode: bool,
    /// Auto-approval override for safe-mode validation.
    pub auto_approval: bool,
    /// Whether an aborted run unwinds its rollback stack.
    pub rollback_enabled: bool,
    /// Minimum strength at which an otherwise-unconstrained correlation is
    /// still recorded for reporting.
    pub correlation_threshold: f64,
    /// Only findings younger than this horizon are planned.
    pub planning_horizon_days: i64,
    /// Cap on pairwise correlation comparisons; beyond it detection is best-effort.
    pub correlation_pair_cap: usize,
    /// Inter-task delay for safe-mode sequential dispatch, in milliseconds.
    pub step_delay_ms: u64,
    /// Interval between self-healing probes, in milliseconds.
    pub probe_interval_ms: u64,
    /// Task ranking coefficients.
    pub weights: WeightCoefficients,
    /// Plan fitness weights.
    pub fitness: FitnessWeights,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: 5,
            safe_mode: true,
            auto_approval: false,
            rollback_enabled: true,
            correlation_threshold: 0.75,
            planning_horizon_days: 30,
            correlation_pair_cap: 10_000,
            step_delay_ms: 250,
            probe_interval_ms: 500,
            weights: WeightCoefficients::default(),
            fitness: FitnessWeights::default(),
        }
    }
}

impl OrchestratorConfig {
    pub fn warden_dir() -> Result<PathBuf> {
        Ok(dirs::home_dir().ok_or(Error::NoHomeDir)?.join(".warden"))
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::warden_dir()?.join("warden.toml"))
    }

    /// Step delay as a [`Duration`].
    pub fn step_delay(&self) -> Duration {
        Duration::from_millis(self.step_delay_ms)
    }

    /// Probe interval as a [`Duration`].
    pub fn probe_interval(&self) -> Duration {
        Duration::from_millis(self.probe_interval_ms)
    }

    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        wlog_debug!("OrchestratorConfig::load path={}", path.display());
        if !path.exists() {
            wlog_debug!("Config file not found, using defaults");
            return Ok(Self::default());
        }
        let config: Self = toml::from_str(&fs::read_to_string(&path)?)?;
        wlog_debug!(
            "Config loaded: max_concurrent_tasks={}, safe_mode={}, rollback_enabled={}",
            config.max_concurrent_tasks,
            config.safe_mode,
            config.rollback_enabled
        );
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let warden_dir = Self::warden_dir()?;
        if !warden_dir.exists() {
            fs::create_dir_all(&warden_dir)?;
        }
        let path = Self::config_path()?;
        fs::write(&path, toml::to_string_pretty(self)?)?;
        wlog_debug!("Config saved to {}", path.display());
        Ok(())
    }
}
