//! Channel metrics and the circuit breaker state each channel carries
//! (§3 "Channel Metrics", §4.1 "Metrics Manager").
//!
//! [`MetricsManager`] holds one [`ChannelMetrics`] per channel index within
//! a family. Each [`ChannelMetrics`] owns the counters, bounded recent-call
//! ring, and [`bridge_circuitbreaker::Circuit`] for its channel.
//!
//! ```
//! use bridge_circuitbreaker::CircuitBreakerConfig;
//! use bridge_metrics::{ChannelIdentity, MetricsManager};
//! use std::time::Duration;
//!
//! let manager = MetricsManager::new();
//! let metrics = manager.get_or_insert_with(
//!     0,
//!     || ChannelIdentity { id: "chan-1".into(), name: "primary".into() },
//!     || CircuitBreakerConfig::builder().name("primary").build(),
//! );
//! metrics.record_attempt();
//! metrics.record_success(Duration::from_millis(42));
//! assert_eq!(metrics.success_count(), 1);
//! ```

mod channel;
mod manager;
mod sample;
mod windows;

pub use channel::{ChannelIdentity, ChannelMetrics};
pub use manager::MetricsManager;
pub use sample::{CallSample, Outcome};
pub use windows::{AllWindowStats, WindowStats};
