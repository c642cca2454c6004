//! The channel selection algorithm (§4.2).

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use bridge_metrics::MetricsManager;
use rand::Rng;

use crate::channel::{ChannelCandidate, ChannelStatus};

/// `NoChannelAvailable` (§4.2): every candidate was excluded, inactive, or
/// breaker-rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("no channel available")]
pub struct NoChannelAvailable;

/// Selects channels for one family, consulting per-channel breaker state
/// and trace affinity.
pub struct Scheduler {
    affinity: bridge_affinity::TraceAffinityMap,
    metrics: Arc<MetricsManager>,
    multi_channel_mode: bool,
}

impl Scheduler {
    pub fn new(
        affinity: bridge_affinity::TraceAffinityMap,
        metrics: Arc<MetricsManager>,
        multi_channel_mode: bool,
    ) -> Self {
        Self {
            affinity,
            metrics,
            multi_channel_mode,
        }
    }

    /// `Select(family, traceId, excludedIndices)` (§4.2). `candidates` is
    /// the configured channel list for the family; the caller is
    /// responsible for passing the right family's list and `MetricsManager`.
    pub fn select(
        &self,
        candidates: &[ChannelCandidate],
        trace_id: Option<&str>,
        excluded: &HashSet<usize>,
    ) -> Result<usize, NoChannelAvailable> {
        let now = Instant::now();

        // Step 1: active, not excluded, breaker admits.
        let mut pool: Vec<&ChannelCandidate> = candidates
            .iter()
            .filter(|c| c.status == ChannelStatus::Active)
            .filter(|c| !excluded.contains(&c.index))
            .filter(|c| self.would_admit(c.index))
            .collect();

        if pool.is_empty() {
            return Err(NoChannelAvailable);
        }

        // Step 2: a live promotion overrides both the rest of the priority
        // partitioning and trace affinity.
        let promoted: Vec<&ChannelCandidate> =
            pool.iter().copied().filter(|c| c.is_promoted(now)).collect();
        let skip_affinity = !promoted.is_empty();
        if skip_affinity {
            pool = promoted;
        }

        // Step 3: trace affinity, unless a promotion is in play.
        if !skip_affinity {
            if let Some(trace_id) = trace_id {
                if let Some(affined) = self.affinity.get(trace_id) {
                    if pool.iter().any(|c| c.index == affined) {
                        self.affinity.put(trace_id.to_string(), affined);
                        return Ok(affined);
                    }
                }
            }
        }

        let chosen = if !self.multi_channel_mode {
            // Step 6: single-channel mode collapses to "first by index".
            pool.iter().map(|c| c.index).min().expect("pool is non-empty")
        } else {
            // Step 4: highest-priority non-empty partition (ascending = higher priority).
            let top_priority = pool.iter().map(|c| c.priority).min().expect("pool is non-empty");
            let partition: Vec<&ChannelCandidate> = pool
                .iter()
                .copied()
                .filter(|c| c.priority == top_priority)
                .collect();

            // Step 5: weighted random by 1 / (1 + recentFailureRate), lowest index tie-break.
            self.weighted_pick(&partition)
        };

        // Promotions intentionally override stickiness (§4.2 step 2); don't
        // let a promoted pick clobber the trace's prior affinity, so it
        // reverts once the promotion expires (§8 Scenario 3).
        if !skip_affinity {
            if let Some(trace_id) = trace_id {
                self.affinity.put(trace_id.to_string(), chosen);
            }
        }
        Ok(chosen)
    }

    /// The number of trace-affinity entries currently tracked, including
    /// any not yet swept past expiry (§4.5 `Size()`, surfaced at §6
    /// `GET /api/scheduler/stats`).
    pub fn affinity_size(&self) -> usize {
        self.affinity.size()
    }

    /// Whether this scheduler is operating in multi-channel mode for its
    /// family (§6 `GET /api/scheduler/stats`).
    pub fn multi_channel_mode(&self) -> bool {
        self.multi_channel_mode
    }

    /// Evicts expired trace-affinity entries (§4.5). Exposed so the
    /// binary can drive the sweep on a timer without the scheduler itself
    /// needing to own a background task.
    pub fn sweep_affinity(&self) {
        self.affinity.sweep();
    }

    fn would_admit(&self, index: usize) -> bool {
        match self.metrics.get(index) {
            Some(metrics) => metrics.circuit().would_admit(),
            None => true,
        }
    }

    fn failure_rate(&self, index: usize) -> f64 {
        match self.metrics.get(index) {
            Some(metrics) => metrics.calculate_failure_rate(),
            None => 0.0,
        }
    }

    fn weighted_pick(&self, partition: &[&ChannelCandidate]) -> usize {
        let mut sorted: Vec<&ChannelCandidate> = partition.to_vec();
        sorted.sort_by_key(|c| c.index);

        let weights: Vec<f64> = sorted
            .iter()
            .map(|c| 1.0 / (1.0 + self.failure_rate(c.index)))
            .collect();
        let total: f64 = weights.iter().sum();
        if total <= 0.0 {
            return sorted[0].index;
        }

        let mut roll = rand::rng().random_range(0.0..total);
        for (candidate, weight) in sorted.iter().zip(weights.iter()) {
            if roll < *weight {
                return candidate.index;
            }
            roll -= weight;
        }
        // Floating point rounding can leave a sliver unconsumed; fall back
        // to the lowest index, matching the tie-break rule.
        sorted[0].index
    }
}
