//! In-run self-healing.
//!
//! During Executing the engine periodically probes resource health and
//! applies at most one local mitigation per detection: forced reclamation on
//! memory pressure, or a smaller future batch size on latency degradation.
//! Mitigation failures are swallowed and logged; self-healing never
//! escalates to run failure. This is distinct from rollback, which reverses
//! applied changes.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::collab::ResourceProbe;
use crate::{wlog_debug, wlog_warn};

/// Default memory pressure above which reclamation is forced.
pub const DEFAULT_MEMORY_PRESSURE_THRESHOLD: f64 = 0.85;

/// Default factor over the expected task latency that counts as degradation.
pub const DEFAULT_LATENCY_DEGRADATION_FACTOR: f64 = 2.0;

/// Configuration for the self-healing coordinator.
#[derive(Debug, Clone)]
pub struct HealingConfig {
    /// Memory pressure in [0, 1] above which reclamation is forced.
    pub memory_pressure_threshold: f64,
    /// Recent average latency beyond `factor × expected` counts as degraded.
    pub latency_degradation_factor: f64,
    /// Batch size is never reduced below this.
    pub min_batch_size: usize,
}

impl Default for HealingConfig {
    fn default() -> Self {
        Self {
            memory_pressure_threshold: DEFAULT_MEMORY_PRESSURE_THRESHOLD,
            latency_degradation_factor: DEFAULT_LATENCY_DEGRADATION_FACTOR,
            min_batch_size: 1,
        }
    }
}

/// A mitigation applied by one detection.
#[derive(Debug, Clone, PartialEq)]
pub enum Mitigation {
    /// Forced reclamation of cached resources.
    ReclaimMemory { pressure: f64 },
    /// Reduced concurrency for future batches.
    ReduceBatchSize { from: usize, to: usize },
}

impl Mitigation {
    pub fn name(&self) -> &'static str {
        match self {
            Mitigation::ReclaimMemory { .. } => "reclaim_memory",
            Mitigation::ReduceBatchSize { .. } => "reduce_batch_size",
        }
    }

    pub fn detail(&self) -> String {
        match self {
            Mitigation::ReclaimMemory { pressure } => {
                format!("memory pressure {:.2}", pressure)
            }
            Mitigation::ReduceBatchSize { from, to } => {
                format!("batch size {} -> {}", from, to)
            }
        }
    }
}

/// Probes resource health and applies local mitigations during a run.
///
/// Shares the effective batch limit with the engine through an atomic; the
/// engine reads it when chunking each batch, so a reduction takes effect on
/// the next dispatch without any locking.
pub struct SelfHealingCoordinator {
    config: HealingConfig,
    probe: Arc<dyn ResourceProbe>,
    batch_limit: Arc<AtomicUsize>,
    /// Expected per-task latency, from the plan's duration estimates.
    expected_latency: Duration,
}

impl SelfHealingCoordinator {
    pub fn new(
        config: HealingConfig,
        probe: Arc<dyn ResourceProbe>,
        batch_limit: Arc<AtomicUsize>,
        expected_latency: Duration,
    ) -> Self {
        Self {
            config,
            probe,
            batch_limit,
            expected_latency,
        }
    }

    /// Current effective batch limit.
    pub fn batch_limit(&self) -> usize {
        self.batch_limit.load(Ordering::Relaxed)
    }

    /// Run one detection cycle; applies and returns at most one mitigation.
    ///
    /// Memory pressure is checked first. A reclamation failure is logged and
    /// the mitigation is still reported as taken; nothing here escalates.
    pub async fn check(&self, recent_avg_latency: Option<Duration>) -> Option<Mitigation> {
        let pressure = self.probe.memory_pressure().await;
        if pressure > self.config.memory_pressure_threshold {
            if let Err(err) = self.probe.reclaim().await {
                wlog_warn!("forced reclamation failed: {} (ignored)", err);
            }
            wlog_debug!("self-healing: reclaimed memory at pressure {:.2}", pressure);
            return Some(Mitigation::ReclaimMemory { pressure });
        }

        if let Some(avg) = recent_avg_latency {
            let degraded = avg.as_secs_f64()
                > self.expected_latency.as_secs_f64() * self.config.latency_degradation_factor;
            if degraded {
                let from = self.batch_limit.load(Ordering::Relaxed);
                let to = (from / 2).max(self.config.min_batch_size);
                if to < from {
                    self.batch_limit.store(to, Ordering::Relaxed);
                    wlog_debug!("self-healing: batch size reduced {} -> {}", from, to);
                    return Some(Mitigation::ReduceBatchSize { from, to });
                }
            }
        }

        None
    }
}
