//! The admin JSON API (§6 "Admin JSON API"): thin JSON CRUD over the
//! channel/scheduler/usage state the core maintains. Response shapes use
//! camelCase keys and RFC3339 timestamps; mutating endpoints return
//! `{success, message}` on success and `{error}` on failure, per spec.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use axum::Router;
use bridge_circuitbreaker::CircuitState;
use serde::Serialize;
use serde_json::json;

use bridge_core::Family;

use crate::state::{AppState, FamilyState};

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/channels/metrics", get(messages_metrics))
        .route("/api/channels/:id/resume", post(messages_resume))
        .route("/api/channels/:id/promotion", post(messages_promotion))
        .route("/api/channels/:id/usage", get(messages_usage))
        .route("/api/channels/:id/usage/reset", post(messages_usage_reset))
        .route("/api/responses/channels/metrics", get(responses_metrics))
        .route("/api/responses/channels/:id/resume", post(responses_resume))
        .route("/api/responses/channels/:id/promotion", post(responses_promotion))
        .route("/api/responses/channels/:id/usage", get(responses_usage))
        .route("/api/responses/channels/:id/usage/reset", post(responses_usage_reset))
        .route("/api/gemini/channels/metrics", get(gemini_metrics))
        .route("/api/gemini/channels/:id/resume", post(gemini_resume))
        .route("/api/gemini/channels/:id/promotion", post(gemini_promotion))
        .route("/api/gemini/channels/:id/usage", get(gemini_usage))
        .route("/api/gemini/channels/:id/usage/reset", post(gemini_usage_reset))
        .route("/api/scheduler/stats", get(scheduler_stats))
        .route("/api/status", get(status))
        .route("/healthz", get(healthz))
}

/// Process-level liveness info: version and uptime, independent of any
/// one family's state.
async fn status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "uptimeSecs": state.started_at.elapsed().as_secs(),
    }))
}

/// Generates the three concrete per-family handlers axum needs (it can't
/// resolve a `Family` value through its extractor-based `Handler` blanket
/// impls, so each family gets its own named `async fn` calling into the
/// shared implementation below).
macro_rules! per_family_handlers {
    ($messages:ident, $responses:ident, $gemini:ident => $shared:ident $(, $arg:ident: $ty:ty)*) => {
        async fn $messages(State(state): State<Arc<AppState>>, $($arg: $ty),*) -> impl IntoResponse {
            $shared(state, Family::Messages, $($arg),*).await
        }
        async fn $responses(State(state): State<Arc<AppState>>, $($arg: $ty),*) -> impl IntoResponse {
            $shared(state, Family::Responses, $($arg),*).await
        }
        async fn $gemini(State(state): State<Arc<AppState>>, $($arg: $ty),*) -> impl IntoResponse {
            $shared(state, Family::Gemini, $($arg),*).await
        }
    };
}

per_family_handlers!(messages_metrics, responses_metrics, gemini_metrics => metrics_impl);
per_family_handlers!(messages_resume, responses_resume, gemini_resume => resume_impl, id: Path<String>);
per_family_handlers!(messages_promotion, responses_promotion, gemini_promotion => promotion_impl, id: Path<String>, body: Json<PromotionBody>);
per_family_handlers!(messages_usage, responses_usage, gemini_usage => usage_impl, id: Path<String>);
per_family_handlers!(messages_usage_reset, responses_usage_reset, gemini_usage_reset => usage_reset_impl, id: Path<String>);

async fn healthz() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

fn find_index(family_state: &FamilyState, id: &str) -> Option<usize> {
    family_state
        .channels
        .read()
        .unwrap()
        .iter()
        .find(|c| c.id == id)
        .map(|c| c.index)
}

fn rfc3339(instant: Option<std::time::Instant>, now_instant: std::time::Instant, now_epoch: u64) -> Option<String> {
    let instant = instant?;
    let delta = now_instant.checked_duration_since(instant).unwrap_or_default();
    let epoch = now_epoch.saturating_sub(delta.as_secs()) as i64;
    let dt = chrono::DateTime::<chrono::Utc>::from_timestamp(epoch, 0)?;
    Some(dt.to_rfc3339_opts(chrono::SecondsFormat::Secs, true))
}

#[derive(Serialize)]
struct ChannelMetricsView {
    id: String,
    name: String,
    index: usize,
    request_count: u64,
    success_count: u64,
    failure_count: u64,
    consecutive_failures: u32,
    success_rate: f64,
    error_rate: f64,
    circuit_state: &'static str,
    circuit_broken_at: Option<String>,
    last_success_at: Option<String>,
    last_failure_at: Option<String>,
    time_windows: serde_json::Value,
}

async fn metrics_impl(state: Arc<AppState>, family: Family) -> impl IntoResponse {
    let family_state = state.family(family);
    family_state.reconcile();
    let now_instant = std::time::Instant::now();
    let now_epoch = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0);

    let channels = family_state.channels.read().unwrap().clone();
    let views: Vec<ChannelMetricsView> = channels
        .iter()
        .map(|channel| {
            let metrics = family_state.metrics.get_or_insert_with(
                channel.index,
                || bridge_metrics::ChannelIdentity {
                    id: channel.id.clone(),
                    name: channel.name.clone(),
                },
                || family_state.breaker_config_for(&channel.name),
            );
            let total = metrics.request_count();
            let windows = metrics.all_time_window_stats();
            ChannelMetricsView {
                id: channel.id.clone(),
                name: channel.name.clone(),
                index: channel.index,
                request_count: total,
                success_count: metrics.success_count(),
                failure_count: metrics.failure_count(),
                consecutive_failures: metrics.consecutive_failures(),
                success_rate: if total == 0 { 0.0 } else { metrics.success_count() as f64 / total as f64 },
                error_rate: if total == 0 { 0.0 } else { metrics.failure_count() as f64 / total as f64 },
                circuit_state: circuit_state_str(metrics.circuit_state()),
                circuit_broken_at: rfc3339(metrics.circuit_broken_at(), now_instant, now_epoch),
                last_success_at: rfc3339(metrics.last_success_at(), now_instant, now_epoch),
                last_failure_at: rfc3339(metrics.last_failure_at(), now_instant, now_epoch),
                time_windows: json!({
                    "oneMinute": { "count": windows.one_minute.count, "failures": windows.one_minute.failures },
                    "fiveMinutes": { "count": windows.five_minutes.count, "failures": windows.five_minutes.failures },
                    "oneHour": { "count": windows.one_hour.count, "failures": windows.one_hour.failures },
                }),
            }
        })
        .collect();

    Json(json!({ "channels": views }))
}

fn circuit_state_str(state: CircuitState) -> &'static str {
    match state {
        CircuitState::Closed => "closed",
        CircuitState::Open => "open",
        CircuitState::HalfOpen => "half_open",
    }
}

async fn resume_impl(state: Arc<AppState>, family: Family, Path(id): Path<String>) -> impl IntoResponse {
    let family_state = state.family(family);
    let Some(index) = find_index(family_state, &id) else {
        return (StatusCode::NOT_FOUND, Json(json!({ "error": "channel not found" }))).into_response();
    };
    if let Some(metrics) = family_state.metrics.get(index) {
        metrics.manual_resume();
    }
    (StatusCode::OK, Json(json!({ "success": true, "message": "channel resumed" }))).into_response()
}

#[derive(serde::Deserialize)]
struct PromotionBody {
    duration: i64,
}

async fn promotion_impl(
    state: Arc<AppState>,
    family: Family,
    Path(id): Path<String>,
    Json(body): Json<PromotionBody>,
) -> impl IntoResponse {
    let family_state = state.family(family);
    {
        let mut channels = family_state.channels.write().unwrap();
        let Some(channel) = channels.iter_mut().find(|c| c.id == id) else {
            return (StatusCode::NOT_FOUND, Json(json!({ "error": "channel not found" }))).into_response();
        };
        if body.duration <= 0 {
            channel.promotion_until_epoch = None;
        } else {
            let now = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0);
            channel.promotion_until_epoch = Some(now + body.duration as u64);
        }
    }
    state.persist_config();
    (StatusCode::OK, Json(json!({ "success": true, "message": "promotion updated" }))).into_response()
}

async fn usage_impl(state: Arc<AppState>, family: Family, Path(id): Path<String>) -> impl IntoResponse {
    let family_state = state.family(family);
    let Some(index) = find_index(family_state, &id) else {
        return (StatusCode::NOT_FOUND, Json(json!({ "error": "channel not found" }))).into_response();
    };
    let Some(channel) = family_state.channel(index) else {
        return (StatusCode::NOT_FOUND, Json(json!({ "error": "channel not found" }))).into_response();
    };
    let caps = FamilyState::usage_caps_for(&channel);
    let status = family_state.usage.status(channel.index, || caps);
    (
        StatusCode::OK,
        Json(json!({
            "inputTokens": status.input_tokens,
            "outputTokens": status.output_tokens,
            "cost": status.cost,
            "suspended": status.suspended,
            "softCapCost": status.soft_cap_cost,
            "hardCapCost": status.hard_cap_cost,
        })),
    )
        .into_response()
}

async fn usage_reset_impl(state: Arc<AppState>, family: Family, Path(id): Path<String>) -> impl IntoResponse {
    let family_state = state.family(family);
    let Some(index) = find_index(family_state, &id) else {
        return (StatusCode::NOT_FOUND, Json(json!({ "error": "channel not found" }))).into_response();
    };
    family_state.usage.reset_usage(index);
    {
        let mut channels = family_state.channels.write().unwrap();
        if let Some(channel) = channels.iter_mut().find(|c| c.index == index) {
            if channel.status == crate::config::ChannelStatus::Suspended {
                channel.status = crate::config::ChannelStatus::Active;
            }
        }
    }
    (StatusCode::OK, Json(json!({ "success": true, "message": "usage reset" }))).into_response()
}

#[derive(serde::Deserialize)]
struct SchedulerStatsQuery {
    #[serde(rename = "type")]
    family_type: String,
}

async fn scheduler_stats(State(state): State<Arc<AppState>>, Query(query): Query<SchedulerStatsQuery>) -> impl IntoResponse {
    let family = match query.family_type.as_str() {
        "messages" => Family::Messages,
        "responses" => Family::Responses,
        "gemini" => Family::Gemini,
        other => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": format!("unknown scheduler type {other}") })),
            )
                .into_response()
        }
    };
    let family_state = state.family(family);
    let active_count = family_state
        .channels
        .read()
        .unwrap()
        .iter()
        .filter(|c| c.status == crate::config::ChannelStatus::Active)
        .count();

    (
        StatusCode::OK,
        Json(json!({
            "multiChannelMode": family_state.scheduler.multi_channel_mode(),
            "activeCount": active_count,
            "affinitySize": family_state.scheduler.affinity_size(),
            "affinityTtlSecs": family_state.affinity_ttl.as_secs(),
            "failureRateThreshold": family_state.failure_rate_threshold(),
            "recoveryTimeSecs": family_state.recovery_time().as_secs(),
        })),
    )
        .into_response()
}
