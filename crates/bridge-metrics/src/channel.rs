//! Per-channel metrics record (§3 "Channel Metrics", §4.1).

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use bridge_circuitbreaker::{Circuit, CircuitBreakerConfig, CircuitState};

use crate::sample::{CallSample, Outcome};
use crate::windows::{compute, AllWindowStats};

/// `(channelID, channelName)` snapshot used to detect a config-index reuse
/// (§3 "Lifecycle" reconciliation).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelIdentity {
    pub id: String,
    pub name: String,
}

const DEFAULT_RECENT_CALLS_CAPACITY: usize = 256;

/// One channel's counters, recent-call ring, and circuit breaker.
pub struct ChannelMetrics {
    identity: Mutex<ChannelIdentity>,
    request_count: AtomicU64,
    success_count: AtomicU64,
    failure_count: AtomicU64,
    consecutive_failures: AtomicU32,
    recent_calls: Mutex<VecDeque<CallSample>>,
    recent_calls_capacity: usize,
    last_success_at: Mutex<Option<Instant>>,
    last_failure_at: Mutex<Option<Instant>>,
    circuit_broken_at: Mutex<Option<Instant>>,
    circuit: Circuit,
}

impl ChannelMetrics {
    /// Creates a fresh record for a channel that has never been admitted
    /// to before, with its circuit breaker built from `config`.
    pub fn new(identity: ChannelIdentity, config: CircuitBreakerConfig) -> Self {
        Self {
            identity: Mutex::new(identity),
            request_count: AtomicU64::new(0),
            success_count: AtomicU64::new(0),
            failure_count: AtomicU64::new(0),
            consecutive_failures: AtomicU32::new(0),
            recent_calls: Mutex::new(VecDeque::with_capacity(DEFAULT_RECENT_CALLS_CAPACITY)),
            recent_calls_capacity: DEFAULT_RECENT_CALLS_CAPACITY,
            last_success_at: Mutex::new(None),
            last_failure_at: Mutex::new(None),
            circuit_broken_at: Mutex::new(None),
            circuit: Circuit::new(config),
        }
    }

    /// The identity this record was created for, for reconciliation.
    pub fn identity(&self) -> ChannelIdentity {
        self.identity.lock().unwrap().clone()
    }

    /// The breaker backing this channel, for scheduler admission checks.
    pub fn circuit(&self) -> &Circuit {
        &self.circuit
    }

    pub fn request_count(&self) -> u64 {
        self.request_count.load(Ordering::SeqCst)
    }

    pub fn success_count(&self) -> u64 {
        self.success_count.load(Ordering::SeqCst)
    }

    pub fn failure_count(&self) -> u64 {
        self.failure_count.load(Ordering::SeqCst)
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::SeqCst)
    }

    pub fn last_success_at(&self) -> Option<Instant> {
        *self.last_success_at.lock().unwrap()
    }

    pub fn last_failure_at(&self) -> Option<Instant> {
        *self.last_failure_at.lock().unwrap()
    }

    pub fn circuit_broken_at(&self) -> Option<Instant> {
        *self.circuit_broken_at.lock().unwrap()
    }

    pub fn circuit_state(&self) -> CircuitState {
        self.circuit.state()
    }

    /// `RecordAttempt(index)` (§4.1): counts the call before its outcome is
    /// known.
    pub fn record_attempt(&self) {
        self.request_count.fetch_add(1, Ordering::SeqCst);
    }

    /// `RecordSuccess(index, latency)` (§4.1).
    pub fn record_success(&self, latency: Duration) {
        let now = Instant::now();
        self.success_count.fetch_add(1, Ordering::SeqCst);
        self.consecutive_failures.store(0, Ordering::SeqCst);
        *self.last_success_at.lock().unwrap() = Some(now);
        self.push_sample(CallSample {
            outcome: Outcome::Success,
            at: now,
            latency,
        });
        self.circuit.record_success();
        self.sync_circuit_broken_at();
    }

    /// `RecordFailure(index, latency, kind)` (§4.1). `weight` comes from
    /// `PipelineError::breaker_weight` (§7): a reduced weight for
    /// caller-error statuses, full weight otherwise.
    pub fn record_failure(&self, latency: Duration, weight: f64) {
        let now = Instant::now();
        self.failure_count.fetch_add(1, Ordering::SeqCst);
        self.consecutive_failures.fetch_add(1, Ordering::SeqCst);
        *self.last_failure_at.lock().unwrap() = Some(now);
        self.push_sample(CallSample {
            outcome: Outcome::Failure,
            at: now,
            latency,
        });
        self.circuit.record_failure(weight);
        self.sync_circuit_broken_at();
    }

    /// `RecordCancelled` (§5 cancellation invariant): does not count toward
    /// the breaker, but still closes out the in-flight marker opened by
    /// `record_attempt`.
    pub fn record_cancelled(&self) {
        self.push_sample(CallSample {
            outcome: Outcome::Cancelled,
            at: Instant::now(),
            latency: Duration::ZERO,
        });
    }

    fn push_sample(&self, sample: CallSample) {
        let mut calls = self.recent_calls.lock().unwrap();
        calls.push_back(sample);
        while calls.len() > self.recent_calls_capacity {
            calls.pop_front();
        }
    }

    fn sync_circuit_broken_at(&self) {
        let mut broken_at = self.circuit_broken_at.lock().unwrap();
        match (self.circuit.state(), *broken_at) {
            (CircuitState::Closed, _) => *broken_at = None,
            (_, None) => *broken_at = Some(Instant::now()),
            _ => {}
        }
    }

    /// `CalculateFailureRate(index)` (§4.1): 0 when the window has fewer
    /// than the configured minimum sample count.
    pub fn calculate_failure_rate(&self) -> f64 {
        self.circuit.failure_rate().unwrap_or(0.0)
    }

    /// `GetAllTimeWindowStats(index)` (§4.1).
    pub fn all_time_window_stats(&self) -> AllWindowStats {
        let calls = self.recent_calls.lock().unwrap();
        let samples: Vec<_> = calls.iter().copied().collect();
        compute(&samples, Instant::now())
    }

    /// A manual admin resume (§4.1 FSM "Any -> manual resume -> Closed").
    pub fn manual_resume(&self) {
        self.circuit.manual_resume();
        self.consecutive_failures.store(0, Ordering::SeqCst);
        *self.circuit_broken_at.lock().unwrap() = None;
    }

    /// A full reset of accumulated counters and samples, keeping the
    /// breaker's configuration but returning it to `Closed`.
    pub fn reset(&self) {
        self.request_count.store(0, Ordering::SeqCst);
        self.success_count.store(0, Ordering::SeqCst);
        self.failure_count.store(0, Ordering::SeqCst);
        self.consecutive_failures.store(0, Ordering::SeqCst);
        self.recent_calls.lock().unwrap().clear();
        *self.last_success_at.lock().unwrap() = None;
        *self.last_failure_at.lock().unwrap() = None;
        *self.circuit_broken_at.lock().unwrap() = None;
        self.circuit.manual_resume();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics() -> ChannelMetrics {
        ChannelMetrics::new(
            ChannelIdentity {
                id: "chan-1".into(),
                name: "primary".into(),
            },
            CircuitBreakerConfig::builder()
                .name("primary")
                .consecutive_failure_limit(3)
                .minimum_number_of_calls(100)
                .build(),
        )
    }

    #[test]
    fn counters_satisfy_the_invariant() {
        let m = metrics();
        m.record_attempt();
        m.record_success(Duration::from_millis(5));
        m.record_attempt();
        m.record_failure(Duration::from_millis(5), 1.0);
        assert!(m.success_count() + m.failure_count() <= m.request_count());
        assert_eq!(m.request_count(), 2);
    }

    #[test]
    fn consecutive_failures_reset_on_success() {
        let m = metrics();
        m.record_failure(Duration::from_millis(1), 1.0);
        m.record_failure(Duration::from_millis(1), 1.0);
        assert_eq!(m.consecutive_failures(), 2);
        m.record_success(Duration::from_millis(1));
        assert_eq!(m.consecutive_failures(), 0);
    }

    #[test]
    fn circuit_broken_at_tracks_state() {
        let m = metrics();
        for _ in 0..3 {
            m.record_failure(Duration::from_millis(1), 1.0);
        }
        assert_eq!(m.circuit_state(), CircuitState::Open);
        assert!(m.circuit_broken_at().is_some());
        m.manual_resume();
        assert_eq!(m.circuit_state(), CircuitState::Closed);
        assert!(m.circuit_broken_at().is_none());
    }

    #[test]
    fn cancelled_does_not_affect_breaker_or_counts() {
        let m = metrics();
        m.record_attempt();
        m.record_cancelled();
        assert_eq!(m.success_count(), 0);
        assert_eq!(m.failure_count(), 0);
        assert_eq!(m.circuit_state(), CircuitState::Closed);
    }
}
