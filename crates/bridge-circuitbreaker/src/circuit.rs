//! The breaker finite state machine (§4.1).

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::config::{CircuitBreakerConfig, SlidingWindowType};
use crate::events::CircuitBreakerEvent;

/// The three states a channel's breaker can be in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum CircuitState {
    /// Calls are permitted; outcomes feed the sliding window.
    Closed,
    /// Calls are rejected until `wait_duration_in_open` elapses.
    Open,
    /// A limited number of trial calls are permitted to probe recovery.
    HalfOpen,
}

#[derive(Debug, Clone, Copy)]
struct Outcome {
    success: bool,
    weight: f64,
    at: Instant,
}

/// Internal mutable state, guarded by a single mutex per channel.
struct Inner {
    state: CircuitState,
    window: VecDeque<Outcome>,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    half_open_permits_issued: usize,
}

/// One channel's circuit breaker.
///
/// Grounded on the teacher's `CircuitBreaker<S, Req, Res, Err>`, but dropped
/// to a plain state holder: this workspace has no `tower::Service` to wrap,
/// so admission and outcome recording are driven directly by the scheduler
/// and request pipeline instead of by a `Service::call` future.
pub struct Circuit {
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
}

impl Circuit {
    /// Builds a new breaker in the `Closed` state.
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                window: VecDeque::new(),
                consecutive_failures: 0,
                opened_at: None,
                half_open_permits_issued: 0,
            }),
        }
    }

    /// The configured name of this breaker, for observability.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// The current state, without side effects.
    pub fn state(&self) -> CircuitState {
        let mut inner = self.inner.lock().unwrap();
        self.maybe_transition_to_half_open(&mut inner);
        inner.state
    }

    /// Reports whether a call would currently be admitted, without
    /// consuming a half-open probe slot. Used by the scheduler to build a
    /// candidate set (§4.2 step 1) before committing to one channel with
    /// [`Circuit::try_acquire`].
    pub fn would_admit(&self) -> bool {
        let mut inner = self.inner.lock().unwrap();
        self.maybe_transition_to_half_open(&mut inner);
        match inner.state {
            CircuitState::Closed => true,
            CircuitState::Open => false,
            CircuitState::HalfOpen => {
                inner.half_open_permits_issued < self.config.permitted_calls_in_half_open
            }
        }
    }

    /// Attempts to admit a call (§4.1 "Closed/HalfOpen -> permitted").
    ///
    /// Returns `true` if the caller may proceed, `false` if the breaker is
    /// open (or half-open with no permits left) and the call must be
    /// rejected without being attempted.
    pub fn try_acquire(&self) -> bool {
        let mut inner = self.inner.lock().unwrap();
        self.maybe_transition_to_half_open(&mut inner);

        let permitted = match inner.state {
            CircuitState::Closed => true,
            CircuitState::Open => false,
            CircuitState::HalfOpen => {
                if inner.half_open_permits_issued < self.config.permitted_calls_in_half_open {
                    inner.half_open_permits_issued += 1;
                    true
                } else {
                    false
                }
            }
        };

        let event = if permitted {
            CircuitBreakerEvent::CallPermitted {
                channel_name: self.config.name.clone(),
                timestamp: Instant::now(),
                state: inner.state,
            }
        } else {
            CircuitBreakerEvent::CallRejected {
                channel_name: self.config.name.clone(),
                timestamp: Instant::now(),
            }
        };
        drop(inner);
        self.config.event_listeners.emit(&event);
        permitted
    }

    /// Records a successful call at full weight.
    pub fn record_success(&self) {
        self.record_outcome(true, 1.0);
    }

    /// Records a failed call at the given weight (§7 breaker weighting: a
    /// reduced weight for caller-error statuses, full weight otherwise).
    pub fn record_failure(&self, weight: f64) {
        self.record_outcome(false, weight);
    }

    fn record_outcome(&self, success: bool, weight: f64) {
        let mut inner = self.inner.lock().unwrap();
        self.maybe_transition_to_half_open(&mut inner);

        let now = Instant::now();
        inner.window.push_back(Outcome {
            success,
            weight,
            at: now,
        });
        self.trim_window(&mut inner, now);

        if success {
            inner.consecutive_failures = 0;
        } else {
            inner.consecutive_failures += 1;
        }

        let state_before = inner.state;
        let event = if success {
            CircuitBreakerEvent::SuccessRecorded {
                channel_name: self.config.name.clone(),
                timestamp: now,
                state: state_before,
            }
        } else {
            CircuitBreakerEvent::FailureRecorded {
                channel_name: self.config.name.clone(),
                timestamp: now,
                state: state_before,
            }
        };

        match state_before {
            CircuitState::HalfOpen if !success => self.transition(&mut inner, CircuitState::Open),
            CircuitState::HalfOpen if success => {
                if inner.half_open_permits_issued >= self.config.permitted_calls_in_half_open {
                    self.transition(&mut inner, CircuitState::Closed);
                }
            }
            CircuitState::Closed => {
                if self.should_open(&inner) {
                    self.transition(&mut inner, CircuitState::Open);
                }
            }
            _ => {}
        }

        drop(inner);
        self.config.event_listeners.emit(&event);
    }

    /// Zeroes failure counters and forces `Closed` regardless of current
    /// state (§4.1 "Any -> manual resume -> admin op -> Closed").
    pub fn manual_resume(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.window.clear();
        inner.consecutive_failures = 0;
        inner.half_open_permits_issued = 0;
        inner.opened_at = None;
        let now = Instant::now();
        let was = inner.state;
        inner.state = CircuitState::Closed;
        drop(inner);
        if was != CircuitState::Closed {
            self.config.event_listeners.emit(&CircuitBreakerEvent::StateTransition {
                channel_name: self.config.name.clone(),
                timestamp: now,
                from_state: was,
                to_state: CircuitState::Closed,
            });
        }
        self.config.event_listeners.emit(&CircuitBreakerEvent::ManualResume {
            channel_name: self.config.name.clone(),
            timestamp: now,
        });
    }

    /// The failure rate over the current window, or `None` if there are
    /// fewer than `minimum_number_of_calls` samples (§4.1 guard).
    pub fn failure_rate(&self) -> Option<f64> {
        let mut inner = self.inner.lock().unwrap();
        self.trim_window(&mut inner, Instant::now());
        self.compute_failure_rate(&inner)
    }

    fn compute_failure_rate(&self, inner: &Inner) -> Option<f64> {
        if inner.window.len() < self.config.minimum_number_of_calls {
            return None;
        }
        let total_weight: f64 = inner.window.iter().map(|o| o.weight).sum();
        if total_weight <= 0.0 {
            return Some(0.0);
        }
        let failed_weight: f64 = inner
            .window
            .iter()
            .filter(|o| !o.success)
            .map(|o| o.weight)
            .sum();
        Some(failed_weight / total_weight)
    }

    fn should_open(&self, inner: &Inner) -> bool {
        if inner.consecutive_failures >= self.config.consecutive_failure_limit {
            return true;
        }
        match self.compute_failure_rate(inner) {
            Some(rate) => rate >= self.config.failure_rate_threshold,
            None => false,
        }
    }

    fn trim_window(&self, inner: &mut Inner, now: Instant) {
        match self.config.sliding_window_type {
            SlidingWindowType::CountBased => {
                while inner.window.len() > self.config.sliding_window_size {
                    inner.window.pop_front();
                }
            }
            SlidingWindowType::TimeBased => {
                let cutoff = self
                    .config
                    .sliding_window_duration
                    .unwrap_or(Duration::from_secs(60));
                while let Some(front) = inner.window.front() {
                    if now.duration_since(front.at) > cutoff {
                        inner.window.pop_front();
                    } else {
                        break;
                    }
                }
            }
        }
    }

    fn maybe_transition_to_half_open(&self, inner: &mut Inner) {
        if inner.state == CircuitState::Open {
            if let Some(opened_at) = inner.opened_at {
                if opened_at.elapsed() >= self.config.wait_duration_in_open {
                    self.transition(inner, CircuitState::HalfOpen);
                    inner.half_open_permits_issued = 0;
                }
            }
        }
    }

    fn transition(&self, inner: &mut Inner, to: CircuitState) {
        let from = inner.state;
        if from == to {
            return;
        }
        inner.state = to;
        if to == CircuitState::Open {
            inner.opened_at = Some(Instant::now());
        }
        let event = CircuitBreakerEvent::StateTransition {
            channel_name: self.config.name.clone(),
            timestamp: Instant::now(),
            from_state: from,
            to_state: to,
        };
        self.config.event_listeners.emit(&event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn breaker(consecutive_limit: u32, min_calls: usize, rate: f64) -> Circuit {
        let config = CircuitBreakerConfig::builder()
            .name("test")
            .consecutive_failure_limit(consecutive_limit)
            .minimum_number_of_calls(min_calls)
            .failure_rate_threshold(rate)
            .wait_duration_in_open(Duration::from_millis(20))
            .permitted_calls_in_half_open(1)
            .build();
        Circuit::new(config)
    }

    #[test]
    fn starts_closed_and_admits() {
        let c = breaker(5, 2, 0.5);
        assert_eq!(c.state(), CircuitState::Closed);
        assert!(c.try_acquire());
    }

    #[test]
    fn opens_after_consecutive_failure_limit() {
        let c = breaker(3, 100, 0.99);
        for _ in 0..3 {
            c.record_failure(1.0);
        }
        assert_eq!(c.state(), CircuitState::Open);
        assert!(!c.try_acquire());
    }

    #[test]
    fn opens_on_failure_rate_once_minimum_calls_reached() {
        let c = breaker(100, 4, 0.5);
        c.record_success();
        c.record_failure(1.0);
        c.record_failure(1.0);
        assert_eq!(c.state(), CircuitState::Closed, "below minimum_number_of_calls");
        c.record_failure(1.0);
        assert_eq!(c.state(), CircuitState::Open);
    }

    #[test]
    fn half_open_single_failure_reopens() {
        let c = breaker(1, 100, 0.5);
        c.record_failure(1.0);
        assert_eq!(c.state(), CircuitState::Open);
        std::thread::sleep(Duration::from_millis(30));
        assert!(c.try_acquire());
        assert_eq!(c.state(), CircuitState::HalfOpen);
        c.record_failure(1.0);
        assert_eq!(c.state(), CircuitState::Open);
    }

    #[test]
    fn half_open_success_closes() {
        let c = breaker(1, 100, 0.5);
        c.record_failure(1.0);
        std::thread::sleep(Duration::from_millis(30));
        assert!(c.try_acquire());
        c.record_success();
        assert_eq!(c.state(), CircuitState::Closed);
    }

    #[test]
    fn would_admit_does_not_consume_the_half_open_slot() {
        let c = breaker(1, 100, 0.5);
        c.record_failure(1.0);
        std::thread::sleep(Duration::from_millis(30));
        assert!(c.would_admit());
        assert!(c.would_admit(), "peeking twice must not exhaust the probe");
        assert!(c.try_acquire());
        assert!(!c.try_acquire(), "the single half-open permit is now spent");
    }

    #[test]
    fn manual_resume_forces_closed_and_clears_counters() {
        let c = breaker(1, 100, 0.5);
        c.record_failure(1.0);
        assert_eq!(c.state(), CircuitState::Open);
        c.manual_resume();
        assert_eq!(c.state(), CircuitState::Closed);
        assert!(c.try_acquire());
    }

    #[test]
    fn reduced_weight_failures_count_less_toward_rate() {
        let c = breaker(100, 2, 0.5);
        c.record_failure(0.2);
        c.record_success();
        assert_eq!(c.state(), CircuitState::Closed);
        assert!(c.failure_rate().unwrap() < 0.5);
    }

    #[test]
    fn listener_observes_state_transition() {
        let count = Arc::new(AtomicUsize::new(0));
        let count2 = count.clone();
        let config = CircuitBreakerConfig::builder()
            .name("observed")
            .consecutive_failure_limit(1)
            .minimum_number_of_calls(100)
            .on_state_transition(move |_from, _to| {
                count2.fetch_add(1, Ordering::SeqCst);
            })
            .build();
        let c = Circuit::new(config);
        c.record_failure(1.0);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
