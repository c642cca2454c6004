//! The pipeline's error kinds (§7).
//!
//! Unlike the teacher's `ResilienceError<E>` — a generic wrapper built to erase
//! the identity of whichever resilience layers happen to be stacked on a
//! caller-supplied service — this pipeline always composes the same fixed set
//! of stages (scheduler, rate limiter, usage, transport, content filter), so a
//! concrete enum is clearer than a generic one. The `is_*` predicate style and
//! the `Display` impl are kept from the teacher.

/// A named content-filter rule that synthesized a failure (§4.6, §7).
#[derive(Debug, Clone, PartialEq)]
pub struct MatchedRule {
    pub keyword: String,
    pub status_code: u16,
}

/// Everything that can end one attempt at forwarding a request to a channel.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PipelineError {
    /// The scheduler had an empty candidate set for the family.
    #[error("no channel available")]
    NoChannelAvailable,

    /// Rate limiter rejected admission or a queued wait timed out.
    #[error("rate limited")]
    RateLimited,

    /// Usage manager refused admission (hard cap reached).
    #[error("quota exhausted")]
    QuotaExhausted,

    /// Network, TLS, or timeout error before any response was received.
    #[error("upstream transport error: {0}")]
    UpstreamTransport(String),

    /// A non-2xx status was returned by the upstream.
    #[error("upstream returned status {0}")]
    UpstreamStatus(u16),

    /// The content filter matched a configured rule.
    #[error("content filter matched {0:?}")]
    ContentFilterMatched(MatchedRule),

    /// The caller cancelled the request.
    #[error("request cancelled")]
    Cancelled,
}

impl PipelineError {
    pub fn is_no_channel_available(&self) -> bool {
        matches!(self, PipelineError::NoChannelAvailable)
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, PipelineError::RateLimited)
    }

    pub fn is_quota_exhausted(&self) -> bool {
        matches!(self, PipelineError::QuotaExhausted)
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, PipelineError::Cancelled)
    }

    /// Whether this outcome should be excluded and retried on another channel (§7
    /// "Propagation": everything except `Cancelled`).
    pub fn is_retryable(&self) -> bool {
        !self.is_cancelled()
    }

    /// Whether recording this outcome should count toward the breaker's failure
    /// window at all, and with what weight (§7).
    ///
    /// `UpstreamStatus(4xx, non-429)` counts at a reduced weight so caller
    /// errors don't trip the breaker as readily as upstream/server failures;
    /// `429` always counts at full weight and additionally triggers quota
    /// review (handled by the caller, not this weight).
    pub fn breaker_weight(&self, reduced_4xx_weight: f64) -> UpstreamStatusWeight {
        match self {
            PipelineError::UpstreamStatus(code) if (400..500).contains(code) && *code != 429 => {
                UpstreamStatusWeight::Weighted(reduced_4xx_weight)
            }
            PipelineError::Cancelled => UpstreamStatusWeight::Excluded,
            _ => UpstreamStatusWeight::Weighted(1.0),
        }
    }

    /// `UpstreamStatus(code)` if this is one, for building the client-visible
    /// terminal response (§7 "User-visible behaviour").
    pub fn upstream_status(&self) -> Option<u16> {
        match self {
            PipelineError::UpstreamStatus(code) => Some(*code),
            PipelineError::ContentFilterMatched(rule) => Some(rule.status_code),
            _ => None,
        }
    }
}

/// How much a recorded outcome should count toward the breaker's failure rate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UpstreamStatusWeight {
    /// Counts with the given weight (1.0 for a full failure).
    Weighted(f64),
    /// Does not count toward the breaker at all (cancellation).
    Excluded,
}
