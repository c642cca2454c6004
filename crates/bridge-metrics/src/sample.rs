//! A single recorded call outcome (§3 `recentCalls`).

use std::time::{Duration, Instant};

/// Outcome of one completed call, as kept in a channel's recent-calls ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure,
    Cancelled,
}

/// One entry in a channel's bounded `recentCalls` ring.
#[derive(Debug, Clone, Copy)]
pub struct CallSample {
    pub outcome: Outcome,
    pub at: Instant,
    pub latency: Duration,
}
