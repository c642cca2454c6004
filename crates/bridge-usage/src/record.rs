//! One channel's cumulative usage and its soft/hard caps (§3 "Usage Record").

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Instant;

/// Soft/hard spend caps for one channel. `None` means unbounded.
#[derive(Debug, Clone, Copy, Default)]
pub struct UsageCaps {
    /// Above this cumulative cost, `CheckAdmission` still admits but the
    /// channel is reported as near-exhausted.
    pub soft_cap_cost: Option<f64>,
    /// Above this cumulative cost, `CheckAdmission` fails closed and the
    /// channel is suspended until reset.
    pub hard_cap_cost: Option<f64>,
}

/// Result of `CheckAdmission(index)` (§4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageAdmission {
    Admitted,
    Exhausted,
}

/// A point-in-time snapshot returned by `GetStatus(index)` (§6).
#[derive(Debug, Clone, Copy)]
pub struct UsageStatus {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost: f64,
    pub suspended: bool,
    pub soft_cap_cost: Option<f64>,
    pub hard_cap_cost: Option<f64>,
}

/// Cumulative usage for one channel since its last reset.
pub struct UsageRecord {
    caps: UsageCaps,
    input_tokens: AtomicU64,
    output_tokens: AtomicU64,
    cost_millis: AtomicU64,
    suspended: AtomicBool,
    in_flight: AtomicU64,
    reset_at: Mutex<Instant>,
}

// Cost is accumulated as an integer count of thousandths of a currency unit
// so concurrent `fetch_add`s stay exact; `f64` addition would drift.
const COST_SCALE: f64 = 1000.0;

impl UsageRecord {
    pub fn new(caps: UsageCaps) -> Self {
        Self {
            caps,
            input_tokens: AtomicU64::new(0),
            output_tokens: AtomicU64::new(0),
            cost_millis: AtomicU64::new(0),
            suspended: AtomicBool::new(false),
            in_flight: AtomicU64::new(0),
            reset_at: Mutex::new(Instant::now()),
        }
    }

    /// `CheckAdmission(index)` (§4.4): fails closed once the channel is
    /// suspended at its hard cap.
    pub fn check_admission(&self) -> UsageAdmission {
        if self.suspended.load(Ordering::SeqCst) {
            UsageAdmission::Exhausted
        } else {
            UsageAdmission::Admitted
        }
    }

    /// `Reserve()` (§5 "combined Reserve/Commit/Rollback sequence"): the
    /// atomic admission half. Marks an attempt in flight so a caller must
    /// follow up with exactly one of `commit`/`rollback` — never record
    /// usage without first reserving against the channel's cap.
    pub fn reserve(&self) -> UsageAdmission {
        if self.suspended.load(Ordering::SeqCst) {
            return UsageAdmission::Exhausted;
        }
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        UsageAdmission::Admitted
    }

    /// `Commit(input, output, cost)`: the reserved attempt succeeded:
    /// charge the usage and clear the in-flight marker. Suspends the
    /// channel once the hard cap is crossed.
    pub fn commit(&self, input_tokens: u64, output_tokens: u64, cost: f64) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.input_tokens.fetch_add(input_tokens, Ordering::SeqCst);
        self.output_tokens
            .fetch_add(output_tokens, Ordering::SeqCst);
        let added = (cost * COST_SCALE).round() as u64;
        let total_millis = self.cost_millis.fetch_add(added, Ordering::SeqCst) + added;

        if let Some(hard) = self.caps.hard_cap_cost {
            if total_millis as f64 / COST_SCALE >= hard {
                self.suspended.store(true, Ordering::SeqCst);
            }
        }
    }

    /// `Rollback()`: the reserved attempt did not happen (the channel was
    /// excluded before or failed after reservation) — clears the
    /// in-flight marker without charging anything.
    pub fn rollback(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }

    /// The number of reservations currently open (§6 observability; not
    /// itself part of any admission decision).
    pub fn in_flight(&self) -> u64 {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// `ResetUsage(index)` (§4.4): zeroes accumulated usage, lifts
    /// suspension, and bumps the reset epoch.
    pub fn reset(&self) {
        self.input_tokens.store(0, Ordering::SeqCst);
        self.output_tokens.store(0, Ordering::SeqCst);
        self.cost_millis.store(0, Ordering::SeqCst);
        self.suspended.store(false, Ordering::SeqCst);
        *self.reset_at.lock().unwrap() = Instant::now();
    }

    /// `GetStatus(index)` (§4.4).
    pub fn status(&self) -> UsageStatus {
        UsageStatus {
            input_tokens: self.input_tokens.load(Ordering::SeqCst),
            output_tokens: self.output_tokens.load(Ordering::SeqCst),
            cost: self.cost_millis.load(Ordering::SeqCst) as f64 / COST_SCALE,
            suspended: self.suspended.load(Ordering::SeqCst),
            soft_cap_cost: self.caps.soft_cap_cost,
            hard_cap_cost: self.caps.hard_cap_cost,
        }
    }

    pub fn reset_at(&self) -> Instant {
        *self.reset_at.lock().unwrap()
    }

    /// Whether cumulative cost is at or above the soft cap (reported, not
    /// enforced: `CheckAdmission` still admits).
    pub fn over_soft_cap(&self) -> bool {
        match self.caps.soft_cap_cost {
            Some(soft) => self.status().cost >= soft,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admits_below_hard_cap() {
        let record = UsageRecord::new(UsageCaps {
            soft_cap_cost: None,
            hard_cap_cost: Some(10.0),
        });
        assert_eq!(record.reserve(), UsageAdmission::Admitted);
        record.commit(100, 50, 5.0);
        assert_eq!(record.check_admission(), UsageAdmission::Admitted);
    }

    #[test]
    fn suspends_at_hard_cap() {
        let record = UsageRecord::new(UsageCaps {
            soft_cap_cost: None,
            hard_cap_cost: Some(10.0),
        });
        record.reserve();
        record.commit(100, 50, 9.0);
        assert_eq!(record.check_admission(), UsageAdmission::Admitted);
        record.reserve();
        record.commit(10, 10, 1.5);
        assert_eq!(record.check_admission(), UsageAdmission::Exhausted);
        assert!(record.status().suspended);
    }

    #[test]
    fn reset_clears_suspension_and_counters() {
        let record = UsageRecord::new(UsageCaps {
            soft_cap_cost: None,
            hard_cap_cost: Some(1.0),
        });
        record.reserve();
        record.commit(10, 10, 2.0);
        assert_eq!(record.check_admission(), UsageAdmission::Exhausted);
        record.reset();
        assert_eq!(record.check_admission(), UsageAdmission::Admitted);
        let status = record.status();
        assert_eq!(status.input_tokens, 0);
        assert_eq!(status.cost, 0.0);
    }

    #[test]
    fn reports_soft_cap_without_suspending() {
        let record = UsageRecord::new(UsageCaps {
            soft_cap_cost: Some(1.0),
            hard_cap_cost: Some(10.0),
        });
        record.reserve();
        record.commit(10, 10, 1.5);
        assert!(record.over_soft_cap());
        assert_eq!(record.check_admission(), UsageAdmission::Admitted);
    }

    #[test]
    fn reserve_fails_closed_once_suspended() {
        let record = UsageRecord::new(UsageCaps {
            soft_cap_cost: None,
            hard_cap_cost: Some(1.0),
        });
        record.reserve();
        record.commit(10, 10, 2.0);
        assert_eq!(record.reserve(), UsageAdmission::Exhausted);
        assert_eq!(record.in_flight(), 0);
    }

    #[test]
    fn rollback_clears_in_flight_without_charging() {
        let record = UsageRecord::new(UsageCaps {
            soft_cap_cost: None,
            hard_cap_cost: Some(10.0),
        });
        record.reserve();
        assert_eq!(record.in_flight(), 1);
        record.rollback();
        assert_eq!(record.in_flight(), 0);
        let status = record.status();
        assert_eq!(status.input_tokens, 0);
        assert_eq!(status.cost, 0.0);
    }
}
