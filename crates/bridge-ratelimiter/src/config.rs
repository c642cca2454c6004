//! Configuration for one channel's rate limiter (§4.3).

use crate::events::RateLimiterEvent;
use bridge_core::EventListeners;
use std::time::Duration;

/// Token-bucket parameters and queueing policy for one channel.
pub struct RateLimiterConfig {
    pub(crate) rpm: u32,
    pub(crate) queue_enabled: bool,
    pub(crate) queue_timeout: Duration,
    pub(crate) queue_capacity: usize,
    pub(crate) event_listeners: EventListeners<RateLimiterEvent>,
    pub(crate) name: String,
}

impl RateLimiterConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> RateLimiterConfigBuilder {
        RateLimiterConfigBuilder::new()
    }
}

/// Builder for [`RateLimiterConfig`].
pub struct RateLimiterConfigBuilder {
    rpm: u32,
    queue_enabled: bool,
    queue_timeout: Duration,
    queue_capacity: usize,
    event_listeners: EventListeners<RateLimiterEvent>,
    name: String,
}

impl RateLimiterConfigBuilder {
    /// Creates a new builder with defaults.
    ///
    /// Defaults:
    /// - rpm: 60
    /// - queue_enabled: false
    /// - queue_timeout: 2s
    /// - queue_capacity: 100
    pub fn new() -> Self {
        Self {
            rpm: 60,
            queue_enabled: false,
            queue_timeout: Duration::from_secs(2),
            queue_capacity: 100,
            event_listeners: EventListeners::new(),
            name: String::from("<unnamed>"),
        }
    }

    /// Sets the requests-per-minute admission rate (the bucket's capacity
    /// and the numerator of its continuous refill rate).
    pub fn rpm(mut self, rpm: u32) -> Self {
        self.rpm = rpm;
        self
    }

    /// Enables the bounded wait queue for requests that find the bucket
    /// empty. When disabled, an empty bucket rejects immediately.
    pub fn queue_enabled(mut self, enabled: bool) -> Self {
        self.queue_enabled = enabled;
        self
    }

    /// Sets how long a queued request waits for a refill before resolving
    /// as `Rejected`.
    pub fn queue_timeout(mut self, timeout: Duration) -> Self {
        self.queue_timeout = timeout;
        self
    }

    /// Sets the hard cap on the number of requests waiting in the queue at
    /// once. Exceeding it returns `Rejected`, never `Queued` (§4.3).
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Gives this limiter a human-readable name for observability.
    pub fn name<N: Into<String>>(mut self, name: N) -> Self {
        self.name = name.into();
        self
    }

    /// Registers a callback for permit-rejected events.
    pub fn on_permit_rejected<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        use bridge_core::events::FnListener;
        self.event_listeners
            .add(FnListener::new(move |event: &RateLimiterEvent| {
                if matches!(event, RateLimiterEvent::PermitRejected { .. }) {
                    f();
                }
            }));
        self
    }

    /// Registers a callback invoked whenever a permit is granted, with the
    /// duration the caller waited for it (`Duration::ZERO` for immediate
    /// admission).
    pub fn on_permit_acquired<F>(mut self, f: F) -> Self
    where
        F: Fn(Duration) + Send + Sync + 'static,
    {
        use bridge_core::events::FnListener;
        self.event_listeners
            .add(FnListener::new(move |event: &RateLimiterEvent| match event {
                RateLimiterEvent::PermitAcquired { wait_duration, .. }
                | RateLimiterEvent::PermitAcquiredAfterWait { wait_duration, .. } => {
                    f(*wait_duration)
                }
                _ => {}
            }));
        self
    }

    /// Builds the immutable configuration.
    pub fn build(self) -> RateLimiterConfig {
        RateLimiterConfig {
            rpm: self.rpm,
            queue_enabled: self.queue_enabled,
            queue_timeout: self.queue_timeout,
            queue_capacity: self.queue_capacity,
            event_listeners: self.event_listeners,
            name: self.name,
        }
    }
}

impl Default for RateLimiterConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
