//! Per-channel usage quota accounting (§3 "Usage Record", §4.4 "Usage
//! Manager").
//!
//! Each channel accumulates `(inputTokens, outputTokens, cost)` against an
//! optional soft and hard cap. Crossing the hard cap suspends the channel
//! until an admin `ResetUsage` call. [`UsageManager`] holds one
//! [`UsageRecord`] per channel index, the same shape the Messages,
//! Responses and Gemini families each use independently.
//!
//! `CheckAdmission`+`RecordUsage` are exposed as a combined Reserve/Commit/
//! Rollback sequence (§5) so admitting an attempt and charging for it stay
//! atomic across the upstream call in between.
//!
//! ```
//! use bridge_usage::{UsageCaps, UsageManager, UsageAdmission};
//!
//! let manager = UsageManager::new();
//! let caps = || UsageCaps { soft_cap_cost: Some(8.0), hard_cap_cost: Some(10.0) };
//! let reservation = manager.reserve(0, caps).unwrap();
//! reservation.commit(1000, 500, 9.5);
//! assert_eq!(manager.check_admission(0, caps), UsageAdmission::Admitted);
//! ```

mod manager;
mod record;

pub use manager::{UsageManager, UsageReservation};
pub use record::{UsageAdmission, UsageCaps, UsageRecord, UsageStatus};
