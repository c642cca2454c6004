//! Response inspection against configured keyword rules (§4.6).
//!
//! Two entry points: [`check_body`] for a complete non-streaming JSON
//! response, [`check_stream`] for a buffered SSE body. Both extract text
//! from the upstream's response shape, concatenate it, and check it
//! against a [`ContentFilter`]'s rules in order.
//!
//! ```
//! use bridge_contentfilter::{check_body, ContentFilter, ContentFilterRule};
//!
//! let filter = ContentFilter::new(
//!     vec![ContentFilterRule { keyword: "forbidden".into(), status_code: 451 }],
//!     vec![],
//! );
//! let body = br#"{"content":[{"type":"text","text":"this is forbidden content"}]}"#;
//! let result = check_body(body, &filter);
//! assert!(result.matched);
//! assert_eq!(result.status_code, Some(451));
//! ```

mod matcher;
mod rules;

pub use matcher::FilterResult;
pub use rules::{ContentFilter, ContentFilterRule, LegacyKeywordRule};

use serde_json::Value;

/// `CheckBody(bytes, filter)` (§4.6): for a non-streaming JSON response,
/// extracts text from `content[].text` and from `error`/`error.message`,
/// concatenates, then matches.
pub fn check_body(bytes: &[u8], filter: &ContentFilter) -> FilterResult {
    let text = match serde_json::from_slice::<Value>(bytes) {
        Ok(value) => extract_body_text(&value),
        Err(_) => String::new(),
    };
    matcher::match_text(&text, filter)
}

/// `CheckStream(responseBody, filter)` (§4.6): buffers the entire SSE
/// body, parses each `data: ` line as a JSON event, extracts text from
/// `content_block_delta.delta.text` and
/// `content_block_start.content_block.text`, concatenates, then matches.
/// Returns the assembled result alongside the original bytes so the
/// pipeline can replay the body downstream when nothing matched.
pub fn check_stream(response_body: &[u8], filter: &ContentFilter) -> (FilterResult, Vec<u8>) {
    let text = extract_stream_text(response_body);
    (matcher::match_text(&text, filter), response_body.to_vec())
}

fn extract_body_text(value: &Value) -> String {
    let mut parts = Vec::new();

    if let Some(content) = value.get("content").and_then(Value::as_array) {
        for block in content {
            if let Some(text) = block.get("text").and_then(Value::as_str) {
                parts.push(text.to_string());
            }
        }
    }

    if let Some(error) = value.get("error") {
        if let Some(message) = error.as_str() {
            parts.push(message.to_string());
        } else if let Some(message) = error.get("message").and_then(Value::as_str) {
            parts.push(message.to_string());
        }
    }

    parts.join(" ")
}

fn extract_stream_text(response_body: &[u8]) -> String {
    let body = String::from_utf8_lossy(response_body);
    let mut parts = Vec::new();

    for line in body.lines() {
        let Some(payload) = line.strip_prefix("data: ").or_else(|| line.strip_prefix("data:")) else {
            continue;
        };
        let payload = payload.trim();
        if payload.is_empty() || payload == "[DONE]" {
            continue;
        }
        let Ok(event) = serde_json::from_str::<Value>(payload) else {
            continue;
        };

        if let Some(text) = event
            .get("delta")
            .and_then(|delta| delta.get("text"))
            .and_then(Value::as_str)
        {
            parts.push(text.to_string());
        }
        if let Some(text) = event
            .get("content_block")
            .and_then(|block| block.get("text"))
            .and_then(Value::as_str)
        {
            parts.push(text.to_string());
        }
    }

    parts.join("")
}
