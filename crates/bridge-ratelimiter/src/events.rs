//! Events emitted by a channel's rate limiter (§4.3).

use bridge_core::ResilienceEvent;
use std::time::{Duration, Instant};

/// Observability events for one channel's token bucket.
#[derive(Debug, Clone)]
pub enum RateLimiterEvent {
    /// A permit was granted immediately.
    PermitAcquired {
        channel_name: String,
        timestamp: Instant,
        wait_duration: Duration,
    },
    /// A request was enqueued to wait for the next refill.
    PermitQueued {
        channel_name: String,
        timestamp: Instant,
    },
    /// A permit was granted after waiting in the queue.
    PermitAcquiredAfterWait {
        channel_name: String,
        timestamp: Instant,
        wait_duration: Duration,
    },
    /// A request was rejected (bucket empty and queueing disabled, queue
    /// full, or the queue wait exceeded `queueTimeout`).
    PermitRejected {
        channel_name: String,
        timestamp: Instant,
    },
    /// `ClearChannel` dropped the bucket and cancelled its waiters.
    ChannelCleared {
        channel_name: String,
        timestamp: Instant,
    },
}

impl ResilienceEvent for RateLimiterEvent {
    fn event_type(&self) -> &'static str {
        match self {
            RateLimiterEvent::PermitAcquired { .. } => "permit_acquired",
            RateLimiterEvent::PermitQueued { .. } => "permit_queued",
            RateLimiterEvent::PermitAcquiredAfterWait { .. } => "permit_acquired_after_wait",
            RateLimiterEvent::PermitRejected { .. } => "permit_rejected",
            RateLimiterEvent::ChannelCleared { .. } => "channel_cleared",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            RateLimiterEvent::PermitAcquired { timestamp, .. }
            | RateLimiterEvent::PermitQueued { timestamp, .. }
            | RateLimiterEvent::PermitAcquiredAfterWait { timestamp, .. }
            | RateLimiterEvent::PermitRejected { timestamp, .. }
            | RateLimiterEvent::ChannelCleared { timestamp, .. } => *timestamp,
        }
    }

    fn pattern_name(&self) -> &str {
        match self {
            RateLimiterEvent::PermitAcquired { channel_name, .. }
            | RateLimiterEvent::PermitQueued { channel_name, .. }
            | RateLimiterEvent::PermitAcquiredAfterWait { channel_name, .. }
            | RateLimiterEvent::PermitRejected { channel_name, .. }
            | RateLimiterEvent::ChannelCleared { channel_name, .. } => channel_name,
        }
    }
}
