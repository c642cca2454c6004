//! `llm-bridge`: the Request Pipeline (§4.7), outbound wire adapters (§6),
//! the admin JSON API (§6), and configuration loading, as a library so
//! integration tests can drive the pipeline directly against a mock
//! upstream.

pub mod admin;
pub mod config;
pub mod outbound;
pub mod pipeline;
pub mod proxy;
pub mod state;
