//! Core infrastructure shared by every `llm-bridge` crate.
//!
//! - [`events`] — the observability event system every pattern crate emits into.
//! - [`error`] — the pipeline's error kinds (§7 of the design).
//! - [`family`] — the `Family` enum and `PerFamily<T>`, so Messages/Responses/Gemini
//!   share one set of types instead of three near-duplicated copies.

pub mod error;
pub mod events;
pub mod family;

pub use error::{PipelineError, UpstreamStatusWeight};
pub use events::{EventListener, EventListeners, ResilienceEvent};
pub use family::{Family, PerFamily};
