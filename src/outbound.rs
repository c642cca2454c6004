//! Outbound wire adapters (§6 "Outbound wire"): per-service-type auth
//! header and base-URL resolution, plus a per-request `reqwest::Client`
//! builder that honours a channel's `insecureSkipVerify` and
//! `responseHeaderTimeoutSecs` (§5 "Timeouts").

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

use crate::config::{ChannelConfig, ServiceType};

/// The outbound request this channel's service type wants: a full target
/// URL and the headers that carry auth plus the resolved user-agent.
pub struct OutboundRequest {
    pub url: String,
    pub headers: HeaderMap,
}

/// Resolves auth header, base-URL normalization and the `/v1/models`
/// path heuristic for one channel (§6).
pub fn resolve(channel: &ChannelConfig, path: &str, user_agent: &str) -> OutboundRequest {
    let api_key = channel.api_keys.first().map(String::as_str).unwrap_or_default();
    let mut headers = HeaderMap::new();
    headers.insert(
        HeaderName::from_static("user-agent"),
        HeaderValue::from_str(user_agent).unwrap_or_else(|_| HeaderValue::from_static("llm-bridge")),
    );

    let base = channel.base_url.trim_end_matches('/');
    match channel.service_type {
        ServiceType::Gemini => {
            if let Ok(value) = HeaderValue::from_str(api_key) {
                headers.insert(HeaderName::from_static("x-goog-api-key"), value);
            }
            let base = normalize_gemini_base(base);
            OutboundRequest {
                url: format!("{base}{path}"),
                headers,
            }
        }
        ServiceType::Composite => OutboundRequest {
            url: String::new(),
            headers,
        },
        _ => {
            if let Ok(value) = HeaderValue::from_str(&format!("Bearer {api_key}")) {
                headers.insert(HeaderName::from_static("authorization"), value);
            }
            OutboundRequest {
                url: format!("{base}{path}"),
                headers,
            }
        }
    }
}

/// `/v1/models` path heuristic (§6): append `/v1/models` unless the base
/// URL already carries a `/v1` (or deeper) prefix, in which case the
/// existing prefix is reused.
pub fn models_path(channel: &ChannelConfig) -> String {
    let base = channel.base_url.trim_end_matches('/');
    if has_v1_segment(base) {
        String::new()
    } else {
        "/v1/models".to_string()
    }
}

fn has_v1_segment(base: &str) -> bool {
    base.split('/').any(|segment| segment.starts_with("v1"))
}

/// Base URL normalised to include `/v1beta` when no `/v1*` segment is
/// already present (§6 "gemini").
fn normalize_gemini_base(base: &str) -> String {
    if has_v1_segment(base) {
        base.to_string()
    } else {
        format!("{base}/v1beta")
    }
}

/// Strips the `models/` prefix Gemini returns on model names (§6).
pub fn strip_gemini_model_prefix(name: &str) -> &str {
    name.strip_prefix("models/").unwrap_or(name)
}

/// Builds the `reqwest::Client` used for one outbound attempt, applying
/// the channel's per-request TLS and header-timeout settings (§5
/// "Suspension points": outbound HTTP calls subject to
/// `responseHeaderTimeoutSecs`).
pub fn client_for(channel: &ChannelConfig, base: &reqwest::Client) -> reqwest::Client {
    if !channel.insecure_skip_verify && channel.response_header_timeout_secs == 60 {
        return base.clone();
    }
    reqwest::Client::builder()
        .danger_accept_invalid_certs(channel.insecure_skip_verify)
        .timeout(Duration::from_secs(channel.response_header_timeout_secs))
        .build()
        .unwrap_or_else(|_| base.clone())
}
