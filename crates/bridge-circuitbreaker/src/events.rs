//! Events emitted by the circuit breaker FSM.

use bridge_core::ResilienceEvent;
use std::time::Instant;

use crate::CircuitState;

/// Observability events for one channel's breaker.
#[derive(Debug, Clone)]
pub enum CircuitBreakerEvent {
    /// A call was permitted through (state at time of permission).
    CallPermitted {
        channel_name: String,
        timestamp: Instant,
        state: CircuitState,
    },
    /// A call was rejected because the circuit was open.
    CallRejected {
        channel_name: String,
        timestamp: Instant,
    },
    /// A success was recorded.
    SuccessRecorded {
        channel_name: String,
        timestamp: Instant,
        state: CircuitState,
    },
    /// A failure was recorded.
    FailureRecorded {
        channel_name: String,
        timestamp: Instant,
        state: CircuitState,
    },
    /// The breaker transitioned between states.
    StateTransition {
        channel_name: String,
        timestamp: Instant,
        from_state: CircuitState,
        to_state: CircuitState,
    },
    /// An admin operation manually reset the breaker to Closed.
    ManualResume {
        channel_name: String,
        timestamp: Instant,
    },
}

impl ResilienceEvent for CircuitBreakerEvent {
    fn event_type(&self) -> &'static str {
        match self {
            CircuitBreakerEvent::CallPermitted { .. } => "call_permitted",
            CircuitBreakerEvent::CallRejected { .. } => "call_rejected",
            CircuitBreakerEvent::SuccessRecorded { .. } => "success_recorded",
            CircuitBreakerEvent::FailureRecorded { .. } => "failure_recorded",
            CircuitBreakerEvent::StateTransition { .. } => "state_transition",
            CircuitBreakerEvent::ManualResume { .. } => "manual_resume",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            CircuitBreakerEvent::CallPermitted { timestamp, .. }
            | CircuitBreakerEvent::CallRejected { timestamp, .. }
            | CircuitBreakerEvent::SuccessRecorded { timestamp, .. }
            | CircuitBreakerEvent::FailureRecorded { timestamp, .. }
            | CircuitBreakerEvent::StateTransition { timestamp, .. }
            | CircuitBreakerEvent::ManualResume { timestamp, .. } => *timestamp,
        }
    }

    fn pattern_name(&self) -> &str {
        match self {
            CircuitBreakerEvent::CallPermitted { channel_name, .. }
            | CircuitBreakerEvent::CallRejected { channel_name, .. }
            | CircuitBreakerEvent::SuccessRecorded { channel_name, .. }
            | CircuitBreakerEvent::FailureRecorded { channel_name, .. }
            | CircuitBreakerEvent::StateTransition { channel_name, .. }
            | CircuitBreakerEvent::ManualResume { channel_name, .. } => channel_name,
        }
    }
}
