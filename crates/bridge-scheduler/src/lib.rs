//! Channel data model and selection algorithm (§3 "Channel", §4.2
//! "Channel Scheduler").
//!
//! [`Scheduler`] picks a channel index for one request: it filters by
//! status, exclusion and breaker admission, honors a live promotion or
//! trace affinity, then partitions by priority and breaks ties by a
//! failure-rate-weighted random pick.
//!
//! ```
//! use bridge_affinity::TraceAffinityMap;
//! use bridge_metrics::MetricsManager;
//! use bridge_scheduler::{ChannelCandidate, ChannelStatus, Scheduler};
//! use std::collections::HashSet;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let scheduler = Scheduler::new(
//!     TraceAffinityMap::new(Duration::from_secs(60)),
//!     Arc::new(MetricsManager::new()),
//!     true,
//! );
//! let candidates = vec![ChannelCandidate {
//!     index: 0,
//!     status: ChannelStatus::Active,
//!     priority: 0,
//!     promotion_until: None,
//! }];
//! let chosen = scheduler.select(&candidates, None, &HashSet::new()).unwrap();
//! assert_eq!(chosen, 0);
//! ```

mod channel;
mod scheduler;

pub use channel::{ChannelCandidate, ChannelStatus};
pub use scheduler::{NoChannelAvailable, Scheduler};
