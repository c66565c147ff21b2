//! Pairwise correlation detection between tasks.
//!
//! Correlation strength sums independent contributions (shared asset,
//! service, region, category, and asset-graph dependency relations), capped
//! at 1.0, and is classified into an ordering constraint. The number of
//! pairwise comparisons is capped for scale: beyond the cap detection is
//! best-effort and some true correlations may be missed. That is a
//! deliberate tradeoff, not a defect.

use std::collections::{HashMap, HashSet};

use crate::collab::FindingStore;
use crate::core::correlation::{ConstraintType, CorrelationEdge, CorrelationMatrix};
use crate::core::task::RemediationTask;
use crate::error::Result;
use crate::{wlog_debug, wlog_trace, wlog_warn};

/// Strength contribution for tasks on the same asset.
pub const SAME_ASSET: f64 = 0.6;
/// Strength contribution for tasks in the same service.
pub const SAME_SERVICE: f64 = 0.3;
/// Strength contribution for tasks in the same region.
pub const SAME_REGION: f64 = 0.2;
/// Strength contribution for findings of the same category.
pub const SAME_CATEGORY: f64 = 0.2;
/// Strength contribution for an explicit asset-graph dependency relation.
pub const ASSET_DEPENDENCY: f64 = 0.5;

/// Computes pairwise correlation between tasks.
pub struct CorrelationDetector {
    /// Cap on pairwise comparisons.
    pair_cap: usize,
    /// Minimum strength at which an otherwise-unconstrained edge is still
    /// recorded (informational).
    record_threshold: f64,
}

impl CorrelationDetector {
    pub fn new(pair_cap: usize, record_threshold: f64) -> Self {
        Self {
            pair_cap,
            record_threshold,
        }
    }

    /// Build the correlation matrix for one planning cycle.
    ///
    /// The dependency neighborhood of each distinct asset is fetched once
    /// from the store before the pairwise sweep.
    pub async fn correlate(
        &self,
        tasks: &[RemediationTask],
        store: &dyn FindingStore,
    ) -> Result<CorrelationMatrix> {
        let neighborhoods = self.fetch_neighborhoods(tasks, store).await?;

        let mut matrix = CorrelationMatrix::new();
        let mut comparisons = 0usize;
        let mut capped = false;

        'outer: for (i, a) in tasks.iter().enumerate() {
            for b in tasks.iter().skip(i + 1) {
                if comparisons >= self.pair_cap {
                    capped = true;
                    break 'outer;
                }
                comparisons += 1;

                let strength = self.pair_strength(a, b, &neighborhoods);
                wlog_trace!(
                    "correlation {} <-> {} = {:.2}",
                    a.id.short(),
                    b.id.short(),
                    strength
                );

                let edge = CorrelationEdge::new(a.id, b.id, strength);
                let worth_recording = edge.constraint != ConstraintType::ParallelOk
                    || edge.strength >= self.record_threshold;
                if worth_recording && edge.strength > 0.0 {
                    matrix.insert(edge);
                }
            }
        }

        if capped {
            wlog_warn!(
                "Correlation detection capped at {} comparisons for {} tasks; \
                 detection is best-effort beyond the cap",
                self.pair_cap,
                tasks.len()
            );
        }
        wlog_debug!(
            "Correlation matrix: {} edges from {} comparisons",
            matrix.len(),
            comparisons
        );
        Ok(matrix)
    }

    /// Sum of condition-gated contributions for one pair, capped at 1.0.
    fn pair_strength(
        &self,
        a: &RemediationTask,
        b: &RemediationTask,
        neighborhoods: &HashMap<String, HashSet<String>>,
    ) -> f64 {
        let mut strength = 0.0;
        if a.asset_arn == b.asset_arn {
            strength += SAME_ASSET;
        }
        if a.service == b.service {
            strength += SAME_SERVICE;
        }
        if a.region == b.region {
            strength += SAME_REGION;
        }
        if a.category == b.category {
            strength += SAME_CATEGORY;
        }
        let related = neighborhoods
            .get(&a.asset_arn)
            .map(|n| n.contains(&b.asset_arn))
            .unwrap_or(false);
        if related {
            strength += ASSET_DEPENDENCY;
        }
        strength.min(1.0)
    }

    /// Fetch the dependency/dependent neighborhood of each distinct asset.
    ///
    /// The relation is symmetrized so a pair matches regardless of which
    /// side the graph edge was declared on.
    async fn fetch_neighborhoods(
        &self,
        tasks: &[RemediationTask],
        store: &dyn FindingStore,
    ) -> Result<HashMap<String, HashSet<String>>> {
        let mut neighborhoods: HashMap<String, HashSet<String>> = HashMap::new();
        let arns: HashSet<&str> = tasks.iter().map(|t| t.asset_arn.as_str()).collect();

        for arn in arns {
            let mut related = HashSet::new();
            for asset in store.get_asset_dependencies(arn).await? {
                related.insert(asset.arn);
            }
            for asset in store.get_asset_dependents(arn).await? {
                related.insert(asset.arn);
            }
            for other in &related {
                neighborhoods
                    .entry(other.clone())
                    .or_default()
                    .insert(arn.to_string());
            }
            neighborhoods.entry(arn.to_string()).or_default().extend(related);
        }
        Ok(neighborhoods)
    }
}
