//! Per-channel circuit breaker (§4.1).
//!
//! Each channel owns one [`Circuit`], built from a [`CircuitBreakerConfig`].
//! The scheduler consults [`Circuit::state`]/[`Circuit::try_acquire`] when
//! filtering candidates and the request pipeline reports outcomes back via
//! [`Circuit::record_success`]/[`Circuit::record_failure`].
//!
//! ## States
//! - **Closed**: normal operation, calls are admitted and their outcomes
//!   feed the sliding window.
//! - **Open**: calls are rejected until `wait_duration_in_open` elapses.
//! - **Half-Open**: a limited number of trial calls probe recovery.
//!
//! ```
//! use bridge_circuitbreaker::{Circuit, CircuitBreakerConfig, CircuitState};
//!
//! let config = CircuitBreakerConfig::builder()
//!     .name("anthropic-primary")
//!     .failure_rate_threshold(0.5)
//!     .sliding_window_size(20)
//!     .minimum_number_of_calls(10)
//!     .build();
//! let circuit = Circuit::new(config);
//! assert_eq!(circuit.state(), CircuitState::Closed);
//! assert!(circuit.try_acquire());
//! circuit.record_success();
//! ```

mod circuit;
mod config;
pub mod events;

pub use circuit::{Circuit, CircuitState};
pub use config::{CircuitBreakerConfig, CircuitBreakerConfigBuilder, SlidingWindowType};
pub use events::CircuitBreakerEvent;
