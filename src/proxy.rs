//! Client-facing endpoints (§6 "Inbound"): `/v1/messages`, `/v1/responses`,
//! and the Gemini family's `generateContent`-shaped paths, each handing its
//! body straight to the request pipeline.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, Method, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::Router;

use bridge_core::Family;
use tracing::Instrument;

use crate::config::ServiceType;
use crate::outbound;
use crate::pipeline::{self, PipelineRequest};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/v1/messages", any(messages))
        .route("/v1/responses", any(responses))
        .route("/v1beta/models/:model", any(gemini))
        .route("/v1beta/models/:model/:action", any(gemini))
        .route("/v1/models", axum::routing::get(list_models))
}

async fn messages(State(state): State<Arc<AppState>>, method: Method, headers: HeaderMap, body: Bytes) -> Response {
    forward(state, Family::Messages, method, "/v1/messages".to_string(), headers, body).await
}

async fn responses(State(state): State<Arc<AppState>>, method: Method, headers: HeaderMap, body: Bytes) -> Response {
    forward(state, Family::Responses, method, "/v1/responses".to_string(), headers, body).await
}

async fn gemini(
    State(state): State<Arc<AppState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let path = uri.path().to_string();
    forward(state, Family::Gemini, method, path, headers, body).await
}

/// Extracts the trace affinity key (§4.5) from `x-trace-id`, falling back
/// to `x-request-id` so deployments that only set the latter still get
/// affinity.
fn trace_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-trace-id")
        .or_else(|| headers.get("x-request-id"))
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// The per-request correlation ID (§3 "Request ID propagation"): the
/// caller's `x-request-id` if set, else a freshly generated one, so every
/// attempt across a request's channel retries lands in the same
/// `tracing` span regardless of whether the caller supplied an ID.
fn request_id(headers: &HeaderMap) -> String {
    headers
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
}

/// Whether the caller is asking for a streamed response (§4.6 "Buffered
/// SSE"): an explicit SSE `Accept` header, or a JSON body's `"stream":
/// true` field.
fn is_stream(headers: &HeaderMap, body: &Bytes) -> bool {
    if let Some(accept) = headers.get(axum::http::header::ACCEPT) {
        if accept.to_str().unwrap_or_default().contains("text/event-stream") {
            return true;
        }
    }
    serde_json::from_slice::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("stream").and_then(serde_json::Value::as_bool))
        .unwrap_or(false)
}

async fn forward(
    state: Arc<AppState>,
    family: Family,
    method: Method,
    path: String,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request_id = request_id(&headers);
    let span = tracing::info_span!("request", request_id = %request_id, %family, %path);

    let trace_id = trace_id(&headers);
    let is_stream = is_stream(&headers, &body);

    let outcome = pipeline::run(PipelineRequest {
        family,
        trace_id,
        method,
        path,
        body,
        headers,
        is_stream,
        state: &state,
    })
    .instrument(span)
    .await;

    let status = axum::http::StatusCode::from_u16(outcome.status).unwrap_or(axum::http::StatusCode::BAD_GATEWAY);
    let mut response = (status, outcome.body).into_response();
    *response.headers_mut() = outcome.headers;
    response
}

/// `GET /v1/models` (§6 "Outbound wire" `/v1/models` heuristic): picks a
/// channel from the Messages family via the ordinary scheduler and forwards
/// a model-listing call, stripping Gemini's `models/` name prefix from the
/// response so callers see bare model names regardless of upstream dialect.
async fn list_models(State(state): State<Arc<AppState>>) -> Response {
    let family_state = state.family(Family::Messages);
    let candidates = family_state.candidates();
    let Ok(idx) = family_state.scheduler.select(&candidates, None, &std::collections::HashSet::new()) else {
        return (
            axum::http::StatusCode::SERVICE_UNAVAILABLE,
            axum::response::Json(serde_json::json!({ "error": { "message": "no channel available", "type": "bridge_error" } })),
        )
            .into_response();
    };
    let Some(channel) = family_state.channel(idx) else {
        return axum::http::StatusCode::SERVICE_UNAVAILABLE.into_response();
    };

    let models_suffix = outbound::models_path(&channel);
    let path = if models_suffix.is_empty() { "/models".to_string() } else { models_suffix };
    let outbound_req = outbound::resolve(&channel, &path, &state.user_agent);

    let response = match state.http_client.get(&outbound_req.url).headers(outbound_req.headers).send().await {
        Ok(response) => response,
        Err(err) => {
            return (
                axum::http::StatusCode::BAD_GATEWAY,
                axum::response::Json(serde_json::json!({ "error": { "message": err.to_string(), "type": "upstream_transport" } })),
            )
                .into_response()
        }
    };
    let status = axum::http::StatusCode::from_u16(response.status().as_u16()).unwrap_or(axum::http::StatusCode::BAD_GATEWAY);
    let mut body: serde_json::Value = match response.json().await {
        Ok(body) => body,
        Err(_) => serde_json::json!({}),
    };
    if channel.service_type == ServiceType::Gemini {
        strip_model_name_prefixes(&mut body);
    }
    (status, axum::response::Json(body)).into_response()
}

/// Strips the `models/` prefix from every `name` field under a Gemini
/// `{"models": [...]}` listing (§6).
fn strip_model_name_prefixes(body: &mut serde_json::Value) {
    if let Some(models) = body.get_mut("models").and_then(serde_json::Value::as_array_mut) {
        for model in models {
            if let Some(name) = model.get("name").and_then(serde_json::Value::as_str).map(str::to_string) {
                model["name"] = serde_json::Value::String(outbound::strip_gemini_model_prefix(&name).to_string());
            }
        }
    }
}
