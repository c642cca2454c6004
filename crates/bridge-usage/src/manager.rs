//! Registry of [`UsageRecord`] for one channel family, keyed by channel
//! index (§4.4).

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::record::{UsageAdmission, UsageCaps, UsageRecord, UsageStatus};

/// Holds one [`UsageRecord`] per channel index, built lazily from the
/// channel's currently configured caps.
///
/// The same shape serves the Messages, Responses and Gemini families
/// (§4.4 "parallel method families"): the caller owns one `UsageManager`
/// per family.
pub struct UsageManager {
    records: RwLock<HashMap<usize, Arc<UsageRecord>>>,
}

impl UsageManager {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
        }
    }

    fn get_or_insert_with(&self, index: usize, caps: impl FnOnce() -> UsageCaps) -> Arc<UsageRecord> {
        if let Some(record) = self.records.read().unwrap().get(&index) {
            return Arc::clone(record);
        }
        let mut records = self.records.write().unwrap();
        Arc::clone(
            records
                .entry(index)
                .or_insert_with(|| Arc::new(UsageRecord::new(caps()))),
        )
    }

    /// `CheckAdmission(index)` (§4.4).
    pub fn check_admission(&self, index: usize, caps: impl FnOnce() -> UsageCaps) -> UsageAdmission {
        self.get_or_insert_with(index, caps).check_admission()
    }

    /// `Reserve(index)` (§5): the combined Reserve/Commit/Rollback
    /// sequence's admission half. On success the caller holds the
    /// returned [`UsageReservation`] across the attempt and resolves it
    /// with exactly one of `commit`/`rollback`; dropping it unresolved
    /// rolls back automatically.
    pub fn reserve(
        &self,
        index: usize,
        caps: impl FnOnce() -> UsageCaps,
    ) -> Result<UsageReservation, UsageAdmission> {
        let record = self.get_or_insert_with(index, caps);
        match record.reserve() {
            UsageAdmission::Admitted => Ok(UsageReservation {
                record,
                settled: false,
            }),
            UsageAdmission::Exhausted => Err(UsageAdmission::Exhausted),
        }
    }

    /// `ResetUsage(index)` (§4.4).
    pub fn reset_usage(&self, index: usize) {
        if let Some(record) = self.records.read().unwrap().get(&index) {
            record.reset();
        }
    }

    /// `GetStatus(index)` (§4.4).
    pub fn status(&self, index: usize, caps: impl FnOnce() -> UsageCaps) -> UsageStatus {
        self.get_or_insert_with(index, caps).status()
    }

    /// Drops the record for a channel index removed from config, same
    /// reconciliation rationale as `bridge_metrics::MetricsManager`.
    pub fn remove(&self, index: usize) {
        self.records.write().unwrap().remove(&index);
    }
}

impl Default for UsageManager {
    fn default() -> Self {
        Self::new()
    }
}

/// An open Reserve/Commit/Rollback sequence (§5) for one attempt against one
/// channel. Held across the upstream call so admission and charging stay
/// atomic from the caller's perspective; dropping it without resolving
/// rolls back, mirroring `bridge_ratelimiter::QueuedPermit`.
pub struct UsageReservation {
    record: Arc<UsageRecord>,
    settled: bool,
}

impl UsageReservation {
    /// The attempt succeeded: charge the usage and close the reservation.
    pub fn commit(mut self, input_tokens: u64, output_tokens: u64, cost: f64) {
        self.settled = true;
        self.record.commit(input_tokens, output_tokens, cost);
    }

    /// The attempt was abandoned before or after the call: close the
    /// reservation without charging anything.
    pub fn rollback(mut self) {
        self.settled = true;
        self.record.rollback();
    }
}

impl Drop for UsageReservation {
    fn drop(&mut self) {
        if !self.settled {
            self.record.rollback();
        }
    }
}
