//! Per-channel rate limiting (§4.3).
//!
//! Each channel owns one [`ChannelRateLimiter`]: a continuous-refill token
//! bucket with an optional bounded FIFO wait queue. [`RateLimiterRegistry`]
//! holds one limiter per channel index within a family, built lazily from a
//! per-channel [`RateLimiterConfig`].
//!
//! ```
//! use bridge_ratelimiter::{Admission, ChannelRateLimiter, RateLimiterConfig};
//!
//! let limiter = ChannelRateLimiter::new(
//!     RateLimiterConfig::builder().name("primary").rpm(60).build(),
//! );
//! match limiter.try_acquire() {
//!     Admission::Admitted => {}
//!     Admission::Queued(_handle) => {
//!         // await _handle.resolve() in an async context
//!     }
//!     Admission::Rejected => {}
//! }
//! ```

mod bucket;
mod config;
pub mod events;
mod registry;

pub use config::{RateLimiterConfig, RateLimiterConfigBuilder};
pub use events::RateLimiterEvent;
pub use registry::RateLimiterRegistry;

use bucket::TokenBucket;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::Mutex as AsyncMutex;
use tokio::time::sleep;

/// Outcome of a non-blocking admission check (§4.3).
pub enum Admission {
    /// A token was available; proceed immediately.
    Admitted,
    /// The bucket was empty but queueing is enabled and the queue has
    /// room. Await [`QueuedPermit::resolve`] to find out whether a token
    /// freed up before `queueTimeout`.
    Queued(QueuedPermit),
    /// The bucket was empty and queueing is disabled, or the queue was
    /// already at capacity.
    Rejected,
}

/// A pending wait for a token, returned by [`ChannelRateLimiter::try_acquire`]
/// when the caller should queue.
pub struct QueuedPermit {
    limiter: Arc<ChannelRateLimiterInner>,
    deadline: Instant,
}

impl QueuedPermit {
    /// Waits (FIFO relative to other queued callers on this channel) until
    /// a token frees up or `queueTimeout` elapses.
    pub async fn resolve(self) -> bool {
        // `queue_gate` is a tokio mutex, which grants access in FIFO
        // order, so waiters are served in the order they queued.
        let _gate = self.limiter.queue_gate.lock().await;
        let started = Instant::now();
        loop {
            let acquired = {
                let mut bucket = self.limiter.bucket.lock().unwrap();
                bucket.try_take()
            };
            if acquired {
                self.limiter.queue_len.fetch_sub(1, Ordering::SeqCst);
                self.limiter.emit(RateLimiterEvent::PermitAcquiredAfterWait {
                    channel_name: self.limiter.config.name.clone(),
                    timestamp: Instant::now(),
                    wait_duration: started.elapsed(),
                });
                return true;
            }

            let now = Instant::now();
            if now >= self.deadline {
                self.limiter.queue_len.fetch_sub(1, Ordering::SeqCst);
                self.limiter.emit(RateLimiterEvent::PermitRejected {
                    channel_name: self.limiter.config.name.clone(),
                    timestamp: now,
                });
                return false;
            }

            let wait = {
                let mut bucket = self.limiter.bucket.lock().unwrap();
                bucket.time_until_next_token()
            }
            .min(self.deadline - now);
            sleep(wait.max(Duration::from_millis(1))).await;
        }
    }
}

struct ChannelRateLimiterInner {
    config: RateLimiterConfig,
    bucket: Mutex<TokenBucket>,
    queue_gate: AsyncMutex<()>,
    queue_len: AtomicUsize,
}

impl ChannelRateLimiterInner {
    fn emit(&self, event: RateLimiterEvent) {
        self.config.event_listeners.emit(&event);
    }
}

/// A channel's token bucket plus its bounded wait queue.
#[derive(Clone)]
pub struct ChannelRateLimiter {
    inner: Arc<ChannelRateLimiterInner>,
}

impl ChannelRateLimiter {
    /// Builds a new limiter from the given configuration.
    pub fn new(config: RateLimiterConfig) -> Self {
        let bucket = Mutex::new(TokenBucket::new(config.rpm));
        Self {
            inner: Arc::new(ChannelRateLimiterInner {
                config,
                bucket,
                queue_gate: AsyncMutex::new(()),
                queue_len: AtomicUsize::new(0),
            }),
        }
    }

    /// `TryAcquire` (§4.3): a non-blocking admission check.
    pub fn try_acquire(&self) -> Admission {
        {
            let mut bucket = self.inner.bucket.lock().unwrap();
            if bucket.try_take() {
                self.inner.emit(RateLimiterEvent::PermitAcquired {
                    channel_name: self.inner.config.name.clone(),
                    timestamp: Instant::now(),
                    wait_duration: Duration::ZERO,
                });
                return Admission::Admitted;
            }
        }

        if !self.inner.config.queue_enabled {
            self.inner.emit(RateLimiterEvent::PermitRejected {
                channel_name: self.inner.config.name.clone(),
                timestamp: Instant::now(),
            });
            return Admission::Rejected;
        }

        let queued = self.inner.queue_len.fetch_add(1, Ordering::SeqCst) + 1;
        if queued > self.inner.config.queue_capacity {
            self.inner.queue_len.fetch_sub(1, Ordering::SeqCst);
            self.inner.emit(RateLimiterEvent::PermitRejected {
                channel_name: self.inner.config.name.clone(),
                timestamp: Instant::now(),
            });
            return Admission::Rejected;
        }

        self.inner.emit(RateLimiterEvent::PermitQueued {
            channel_name: self.inner.config.name.clone(),
            timestamp: Instant::now(),
        });
        Admission::Queued(QueuedPermit {
            limiter: Arc::clone(&self.inner),
            deadline: Instant::now() + self.inner.config.queue_timeout,
        })
    }

    /// `Release` (§4.3): a documented no-op, since RPM counts attempts, not
    /// concurrency.
    pub fn release(&self) {}

    /// The configured name, for observability.
    pub fn name(&self) -> &str {
        &self.inner.config.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admits_while_tokens_remain() {
        let limiter = ChannelRateLimiter::new(RateLimiterConfig::builder().rpm(60).build());
        assert!(matches!(limiter.try_acquire(), Admission::Admitted));
    }

    #[test]
    fn rejects_when_queueing_disabled_and_bucket_empty() {
        let limiter = ChannelRateLimiter::new(RateLimiterConfig::builder().rpm(1).build());
        assert!(matches!(limiter.try_acquire(), Admission::Admitted));
        assert!(matches!(limiter.try_acquire(), Admission::Rejected));
    }

    #[tokio::test]
    async fn queues_and_resolves_once_refilled() {
        let limiter = ChannelRateLimiter::new(
            RateLimiterConfig::builder()
                .rpm(6000)
                .queue_enabled(true)
                .queue_timeout(Duration::from_millis(200))
                .build(),
        );
        for _ in 0..6000 {
            assert!(matches!(limiter.try_acquire(), Admission::Admitted));
        }
        match limiter.try_acquire() {
            Admission::Queued(handle) => assert!(handle.resolve().await),
            _ => panic!("expected Queued"),
        }
    }

    #[tokio::test]
    async fn queue_capacity_caps_concurrent_waiters() {
        let limiter = ChannelRateLimiter::new(
            RateLimiterConfig::builder()
                .rpm(1)
                .queue_enabled(true)
                .queue_capacity(1)
                .queue_timeout(Duration::from_secs(5))
                .build(),
        );
        assert!(matches!(limiter.try_acquire(), Admission::Admitted));
        assert!(matches!(limiter.try_acquire(), Admission::Queued(_)));
        assert!(matches!(limiter.try_acquire(), Admission::Rejected));
    }

    #[tokio::test]
    async fn queue_wait_exceeding_timeout_rejects() {
        let limiter = ChannelRateLimiter::new(
            RateLimiterConfig::builder()
                .rpm(1)
                .queue_enabled(true)
                .queue_timeout(Duration::from_millis(10))
                .build(),
        );
        assert!(matches!(limiter.try_acquire(), Admission::Admitted));
        match limiter.try_acquire() {
            Admission::Queued(handle) => assert!(!handle.resolve().await),
            _ => panic!("expected Queued"),
        }
    }
}
