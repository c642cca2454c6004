//! The Request Pipeline (§4.7): orchestrates selection, admission,
//! forwarding, content filtering and outcome recording across bounded
//! retry attempts.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use bridge_contentfilter::{check_body, check_stream};
use bridge_core::{Family, PipelineError, UpstreamStatusWeight};
use bridge_usage::UsageAdmission;
use bytes::Bytes;
use reqwest::header::HeaderMap;

use crate::config::ChannelConfig;
use crate::outbound;
use crate::state::{AppState, FamilyState};

/// The terminal result handed back to the client (§7 "User-visible
/// behaviour").
pub struct PipelineOutcome {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl PipelineOutcome {
    fn synthetic_error(status: u16, message: &str) -> Self {
        let body = serde_json::json!({ "error": { "message": message, "type": "bridge_error" } });
        Self {
            status,
            headers: HeaderMap::new(),
            body: Bytes::from(body.to_string()),
        }
    }
}

/// One inbound request's full lifecycle against one family's channels.
pub struct PipelineRequest<'a> {
    pub family: Family,
    pub trace_id: Option<String>,
    pub method: reqwest::Method,
    pub path: String,
    pub body: Bytes,
    pub headers: HeaderMap,
    pub is_stream: bool,
    pub state: &'a AppState,
}

/// Runs the §4.7 control loop: select a channel, check admission, forward,
/// record the outcome, and retry on another channel on failure — up to
/// `max_attempts` — exactly as described by the component design.
pub async fn run(req: PipelineRequest<'_>) -> PipelineOutcome {
    let family_state = req.state.family(req.family);
    let mut excluded: HashSet<usize> = HashSet::new();
    let mut last_error: Option<(u16, Bytes)> = None;

    for _attempt in 0..family_state.max_attempts.max(1) {
        let candidates = family_state.candidates();
        let idx = match family_state
            .scheduler
            .select(&candidates, req.trace_id.as_deref(), &excluded)
        {
            Ok(idx) => idx,
            Err(_) => {
                return last_error
                    .map(|(status, body)| PipelineOutcome {
                        status,
                        headers: HeaderMap::new(),
                        body,
                    })
                    .unwrap_or_else(|| {
                        PipelineOutcome::synthetic_error(503, "no channel available")
                    });
            }
        };

        let Some(channel) = family_state.channel(idx) else {
            excluded.insert(idx);
            continue;
        };

        let caps = FamilyState::usage_caps_for(&channel);
        let reservation = match family_state.usage.reserve(idx, || caps) {
            Ok(reservation) => reservation,
            Err(UsageAdmission::Exhausted) => {
                tracing::warn!(channel = %channel.name, "quota exhausted, excluding channel");
                family_state.suspend_channel(idx);
                excluded.insert(idx);
                continue;
            }
            Err(UsageAdmission::Admitted) => unreachable!("reserve only errors when exhausted"),
        };

        let limiter = family_state
            .rate_limiters
            .get_or_insert_with(idx, || family_state.rate_limiter_config_for(&channel));
        match limiter.try_acquire() {
            bridge_ratelimiter::Admission::Admitted => {}
            bridge_ratelimiter::Admission::Queued(permit) => {
                if !permit.resolve().await {
                    excluded.insert(idx);
                    continue;
                }
            }
            bridge_ratelimiter::Admission::Rejected => {
                excluded.insert(idx);
                continue;
            }
        }

        let metrics = family_state.metrics.get_or_insert_with(
            idx,
            || bridge_metrics::ChannelIdentity {
                id: channel.id.clone(),
                name: channel.name.clone(),
            },
            || family_state.breaker_config_for(&channel.name),
        );
        metrics.record_attempt();

        let started = Instant::now();
        let attempt_result = forward_once(req.state, &req.method, &req.path, &req.body, &req.headers, &channel, req.is_stream).await;
        let latency = started.elapsed();

        match attempt_result {
            Err(transport_err) => {
                tracing::warn!(channel = %channel.name, error = %transport_err, "upstream transport error");
                record_failure(&metrics, latency, &PipelineError::UpstreamTransport(transport_err.clone()), req.state.reduced_4xx_breaker_weight);
                last_error = Some((502, Bytes::from(
                    serde_json::json!({ "error": { "message": transport_err, "type": "upstream_transport" } }).to_string(),
                )));
                excluded.insert(idx);
                continue;
            }
            Ok(response) => {
                let status = response.status;
                if !(200..300).contains(&status) {
                    let err = PipelineError::UpstreamStatus(status);
                    record_failure(&metrics, latency, &err, req.state.reduced_4xx_breaker_weight);
                    last_error = Some((status, response.body));
                    excluded.insert(idx);
                    continue;
                }

                let (filtered_body, filter_match) = inspect_content(req.state, req.is_stream, &response.body, family_state);
                if let Some((keyword, status_code)) = filter_match {
                    tracing::warn!(channel = %channel.name, %keyword, status_code, "content filter matched, retrying on another channel");
                    let rule = bridge_core::error::MatchedRule { keyword, status_code };
                    let err = PipelineError::ContentFilterMatched(rule);
                    record_failure(&metrics, latency, &err, req.state.reduced_4xx_breaker_weight);
                    last_error = Some((status_code, filtered_body));
                    excluded.insert(idx);
                    continue;
                }

                metrics.record_success(latency);
                let (input_tokens, output_tokens) = extract_token_usage(&filtered_body);
                reservation.commit(input_tokens, output_tokens, 0.0);

                return PipelineOutcome {
                    status,
                    headers: response.headers,
                    body: filtered_body,
                };
            }
        }
    }

    last_error
        .map(|(status, body)| PipelineOutcome { status, headers: HeaderMap::new(), body })
        .unwrap_or_else(|| PipelineOutcome::synthetic_error(503, "max attempts exhausted"))
}

fn record_failure(metrics: &bridge_metrics::ChannelMetrics, latency: Duration, err: &PipelineError, reduced_4xx_weight: f64) {
    match err.breaker_weight(reduced_4xx_weight) {
        UpstreamStatusWeight::Weighted(weight) => metrics.record_failure(latency, weight),
        UpstreamStatusWeight::Excluded => metrics.record_cancelled(),
    }
}

struct UpstreamResponse {
    status: u16,
    headers: HeaderMap,
    body: Bytes,
}

async fn forward_once(
    state: &AppState,
    method: &reqwest::Method,
    path: &str,
    body: &Bytes,
    inbound_headers: &HeaderMap,
    channel: &ChannelConfig,
    _is_stream: bool,
) -> Result<UpstreamResponse, String> {
    if !channel.service_type.is_selectable_leaf() {
        return Err("composite channel has no direct upstream".to_string());
    }

    let outbound = outbound::resolve(channel, path, &state.user_agent);
    let client = outbound::client_for(channel, &state.http_client);

    let mut request = client.request(method.clone(), &outbound.url).headers(outbound.headers);
    if let Some(content_type) = inbound_headers.get(reqwest::header::CONTENT_TYPE) {
        request = request.header(reqwest::header::CONTENT_TYPE, content_type);
    }
    request = request.body(body.clone());

    let response = request.send().await.map_err(|e| e.to_string())?;
    let status = response.status().as_u16();
    let mut headers = HeaderMap::new();
    if let Some(ct) = response.headers().get(reqwest::header::CONTENT_TYPE) {
        headers.insert(reqwest::header::CONTENT_TYPE, ct.clone());
    }
    let bytes = response.bytes().await.map_err(|e| e.to_string())?;
    Ok(UpstreamResponse { status, headers, body: bytes })
}

/// Runs the content filter over a successful response (§4.6, §9 "Buffered
/// SSE memory pressure"): skips filtering and passes the body through
/// unmodified once it exceeds the configured buffer cap, bumping the
/// overflow counter so operators can observe the condition.
fn inspect_content(
    state: &AppState,
    is_stream: bool,
    body: &Bytes,
    family_state: &FamilyState,
) -> (Bytes, Option<(String, u16)>) {
    if body.len() > state.max_content_filter_buffer_bytes {
        state
            .filter_buffer_overflow_count
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        return (body.clone(), None);
    }

    let filter = family_state.content_filter.read().unwrap();
    if is_stream {
        let (result, buffered) = check_stream(body, &filter);
        if result.matched {
            (body.clone(), Some((result.keyword.unwrap(), result.status_code.unwrap())))
        } else {
            (Bytes::from(buffered), None)
        }
    } else {
        let result = check_body(body, &filter);
        if result.matched {
            (body.clone(), Some((result.keyword.unwrap(), result.status_code.unwrap())))
        } else {
            (body.clone(), None)
        }
    }
}

/// Best-effort token usage extraction from a non-streaming upstream body's
/// `usage` object (OpenAI/Anthropic-shaped). Streaming responses and
/// bodies without a `usage` object record zero tokens; the spec leaves
/// per-provider usage accounting to the adapter layer this core does not
/// implement (§1 Non-goals: "transformation between LLM request/response
/// schemas").
fn extract_token_usage(body: &Bytes) -> (u64, u64) {
    let Ok(value) = serde_json::from_slice::<serde_json::Value>(body) else {
        return (0, 0);
    };
    let Some(usage) = value.get("usage") else {
        return (0, 0);
    };
    let input = usage
        .get("input_tokens")
        .or_else(|| usage.get("prompt_tokens"))
        .and_then(serde_json::Value::as_u64)
        .unwrap_or(0);
    let output = usage
        .get("output_tokens")
        .or_else(|| usage.get("completion_tokens"))
        .and_then(serde_json::Value::as_u64)
        .unwrap_or(0);
    (input, output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_anthropic_style_usage() {
        let body = Bytes::from(r#"{"usage":{"input_tokens":12,"output_tokens":34}}"#);
        assert_eq!(extract_token_usage(&body), (12, 34));
    }

    #[test]
    fn extracts_openai_style_usage() {
        let body = Bytes::from(r#"{"usage":{"prompt_tokens":5,"completion_tokens":7}}"#);
        assert_eq!(extract_token_usage(&body), (5, 7));
    }

    #[test]
    fn missing_usage_is_zero() {
        let body = Bytes::from(r#"{"content":[]}"#);
        assert_eq!(extract_token_usage(&body), (0, 0));
    }
}
