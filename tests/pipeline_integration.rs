//! End-to-end pipeline tests (§4.7) against a mock upstream, covering the
//! success path, retry-on-failure across channels, and content-filter
//! rejection — the behaviours unit tests on the individual crates can't
//! exercise together.

use std::collections::HashMap;

use llm_bridge::config::{
    BridgeConfig, ChannelConfig, ChannelStatus, FamilyConfig, FilterRuleConfig, ServiceType,
};
use llm_bridge::pipeline::{self, PipelineRequest};
use llm_bridge::state::AppState;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn channel(index: usize, base_url: String, rpm: u32) -> ChannelConfig {
    ChannelConfig {
        index,
        id: format!("chan-{index}"),
        name: format!("channel {index}"),
        base_url,
        service_type: ServiceType::Openai,
        api_keys: vec!["secret".into()],
        priority: 0,
        rate_limit_rpm: rpm,
        queue_enabled: false,
        queue_timeout_secs: 2,
        status: ChannelStatus::Active,
        promotion_until_epoch: None,
        model_mapping: HashMap::new(),
        insecure_skip_verify: false,
        response_header_timeout_secs: 60,
        soft_cap_cost: None,
        hard_cap_cost: None,
    }
}

fn config_with_channels(channels: Vec<ChannelConfig>) -> BridgeConfig {
    BridgeConfig {
        messages: FamilyConfig {
            channels,
            ..FamilyConfig::default()
        },
        ..BridgeConfig::default()
    }
}

async fn request(state: &AppState) -> pipeline::PipelineOutcome {
    pipeline::run(PipelineRequest {
        family: bridge_core::Family::Messages,
        trace_id: None,
        method: reqwest::Method::POST,
        path: "/v1/messages".to_string(),
        body: bytes::Bytes::from(r#"{"model":"test","messages":[]}"#),
        headers: reqwest::header::HeaderMap::new(),
        is_stream: false,
        state,
    })
    .await
}

#[tokio::test]
async fn successful_request_returns_upstream_body() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "content": "hello",
            "usage": {"input_tokens": 3, "output_tokens": 5},
        })))
        .mount(&upstream)
        .await;

    let config = config_with_channels(vec![channel(0, upstream.uri(), 60)]);
    let state = AppState::new(config, "unused.toml".into()).unwrap();

    let outcome = request(&state).await;
    assert_eq!(outcome.status, 200);
    let body: serde_json::Value = serde_json::from_slice(&outcome.body).unwrap();
    assert_eq!(body["content"], "hello");

    let metrics = state.messages.metrics.get_or_insert_with(
        0,
        || bridge_metrics::ChannelIdentity {
            id: "chan-0".into(),
            name: "channel 0".into(),
        },
        || state.messages.breaker_config_for("channel 0"),
    );
    assert_eq!(metrics.success_count(), 1);
}

#[tokio::test]
async fn failing_channel_is_excluded_and_retried_on_another() {
    let bad_upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&bad_upstream)
        .await;

    let good_upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"content": "ok"})))
        .mount(&good_upstream)
        .await;

    let mut bad = channel(0, bad_upstream.uri(), 60);
    bad.priority = 10;
    let mut good = channel(1, good_upstream.uri(), 60);
    good.priority = 10;

    let config = config_with_channels(vec![bad, good]);
    let state = AppState::new(config, "unused.toml".into()).unwrap();

    let outcome = request(&state).await;
    assert_eq!(outcome.status, 200);
    let body: serde_json::Value = serde_json::from_slice(&outcome.body).unwrap();
    assert_eq!(body["content"], "ok");
}

#[tokio::test]
async fn content_filter_match_rewrites_status_and_body() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "content": [{"type": "text", "text": "this contains forbidden_term in it"}],
        })))
        .mount(&upstream)
        .await;

    let mut config = config_with_channels(vec![channel(0, upstream.uri(), 60)]);
    config.messages.filter_rules = vec![FilterRuleConfig {
        keyword: "forbidden_term".to_string(),
        status_code: 451,
    }];
    config.messages.max_attempts = 1;
    let state = AppState::new(config, "unused.toml".into()).unwrap();

    let outcome = request(&state).await;
    assert_eq!(outcome.status, 451);
}

#[tokio::test]
async fn no_channels_configured_returns_service_unavailable() {
    let config = config_with_channels(vec![]);
    let state = AppState::new(config, "unused.toml".into()).unwrap();

    let outcome = request(&state).await;
    assert_eq!(outcome.status, 503);
}
