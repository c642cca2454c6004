//! Runtime state wiring the `bridge-*` crates together per family (§2
//! "Control flow", §5 "Shared mutable state").

use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use bridge_affinity::TraceAffinityMap;
use bridge_circuitbreaker::CircuitBreakerConfig;
use bridge_contentfilter::{ContentFilter, ContentFilterRule, LegacyKeywordRule};
use bridge_core::Family;
use bridge_metrics::{ChannelIdentity, MetricsManager};
use bridge_ratelimiter::{RateLimiterConfig, RateLimiterRegistry};
use bridge_scheduler::{ChannelCandidate, ChannelStatus, Scheduler};
use bridge_usage::{UsageCaps, UsageManager};

use crate::config::{self, BridgeConfig, FamilyConfig};

/// Everything the request pipeline needs for one channel family: the
/// mutable channel list plus the family's scheduler and per-channel
/// registries. Each registry is lazily populated per channel index, so
/// admin mutations to `channels` simply change what the next lookup sees.
pub struct FamilyState {
    pub family: Family,
    pub channels: RwLock<Vec<config::ChannelConfig>>,
    pub scheduler: Scheduler,
    pub metrics: Arc<MetricsManager>,
    pub rate_limiters: RateLimiterRegistry,
    pub usage: UsageManager,
    pub content_filter: RwLock<ContentFilter>,
    pub affinity_ttl: Duration,
    pub max_attempts: u32,
    breaker_settings: RwLock<BreakerSettings>,
}

#[derive(Clone, Copy)]
struct BreakerSettings {
    failure_rate_threshold: f64,
    consecutive_failure_limit: u32,
    minimum_number_of_calls: usize,
    sliding_window_size: usize,
    recovery_time: Duration,
}

impl FamilyState {
    fn new(family: Family, config: &FamilyConfig) -> Self {
        let metrics = Arc::new(MetricsManager::new());
        let affinity_ttl = Duration::from_secs(config.affinity_ttl_secs);
        let scheduler = Scheduler::new(
            TraceAffinityMap::new(affinity_ttl),
            Arc::clone(&metrics),
            config.multi_channel_mode,
        );
        let content_filter = ContentFilter::new(
            config
                .filter_rules
                .iter()
                .map(|r| ContentFilterRule {
                    keyword: r.keyword.clone(),
                    status_code: r.status_code,
                })
                .collect(),
            config
                .legacy_filter_rules
                .iter()
                .map(|r| LegacyKeywordRule {
                    keywords: r.keywords.clone(),
                    status_code: r.status_code,
                })
                .collect(),
        );
        let state = Self {
            family,
            channels: RwLock::new(config.channels.clone()),
            scheduler,
            metrics,
            rate_limiters: RateLimiterRegistry::new(),
            usage: UsageManager::new(),
            content_filter: RwLock::new(content_filter),
            affinity_ttl,
            max_attempts: config.max_attempts,
            breaker_settings: RwLock::new(BreakerSettings {
                failure_rate_threshold: config.failure_rate_threshold,
                consecutive_failure_limit: config.consecutive_failure_limit,
                minimum_number_of_calls: config.minimum_number_of_calls,
                sliding_window_size: config.sliding_window_size,
                recovery_time: Duration::from_secs(config.recovery_time_secs),
            }),
        };
        state.reconcile();
        state
    }

    /// Re-derives the scheduler's candidate list and reconciles the
    /// metrics manager's identities against the current channel list
    /// (§3 "Lifecycle" reconciliation, §4.1 `ReconcileChannelIdentities`).
    /// Called after every admin mutation to `channels`.
    pub fn reconcile(&self) {
        tracing::debug!(family = %self.family, "reconciling channel identities");
        let channels = self.channels.read().unwrap();
        let expectations: Vec<(usize, ChannelIdentity)> = channels
            .iter()
            .map(|c| {
                (
                    c.index,
                    ChannelIdentity {
                        id: c.id.clone(),
                        name: c.name.clone(),
                    },
                )
            })
            .collect();
        self.metrics.reconcile_channel_identities(&expectations);
    }

    pub fn candidates(&self) -> Vec<ChannelCandidate> {
        let now_epoch = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        let now_instant = Instant::now();
        self.channels
            .read()
            .unwrap()
            .iter()
            .map(|c| {
                let promotion_until = c.promotion_until_epoch.and_then(|until| {
                    if until <= now_epoch {
                        None
                    } else {
                        Some(now_instant + Duration::from_secs(until - now_epoch))
                    }
                });
                ChannelCandidate {
                    index: c.index,
                    status: match c.status {
                        config::ChannelStatus::Active if c.service_type.is_selectable_leaf() => {
                            ChannelStatus::Active
                        }
                        config::ChannelStatus::Active => ChannelStatus::Disabled,
                        config::ChannelStatus::Disabled => ChannelStatus::Disabled,
                        config::ChannelStatus::Suspended => ChannelStatus::Suspended,
                    },
                    priority: c.priority,
                    promotion_until,
                }
            })
            .collect()
    }

    pub fn channel(&self, index: usize) -> Option<config::ChannelConfig> {
        self.channels.read().unwrap().iter().find(|c| c.index == index).cloned()
    }

    pub fn breaker_config_for(&self, name: &str) -> CircuitBreakerConfig {
        let settings = *self.breaker_settings.read().unwrap();
        CircuitBreakerConfig::builder()
            .name(name)
            .failure_rate_threshold(settings.failure_rate_threshold)
            .consecutive_failure_limit(settings.consecutive_failure_limit)
            .minimum_number_of_calls(settings.minimum_number_of_calls)
            .sliding_window_size(settings.sliding_window_size)
            .wait_duration_in_open(settings.recovery_time)
            .build()
    }

    pub fn recovery_time(&self) -> Duration {
        self.breaker_settings.read().unwrap().recovery_time
    }

    pub fn failure_rate_threshold(&self) -> f64 {
        self.breaker_settings.read().unwrap().failure_rate_threshold
    }

    pub fn rate_limiter_config_for(&self, channel: &config::ChannelConfig) -> RateLimiterConfig {
        RateLimiterConfig::builder()
            .name(channel.name.clone())
            .rpm(channel.rate_limit_rpm)
            .queue_enabled(channel.queue_enabled)
            .queue_timeout(Duration::from_secs(channel.queue_timeout_secs))
            .build()
    }

    pub fn usage_caps_for(channel: &config::ChannelConfig) -> UsageCaps {
        UsageCaps {
            soft_cap_cost: channel.soft_cap_cost,
            hard_cap_cost: channel.hard_cap_cost,
        }
    }

    /// Flips a channel's persisted status to `suspended` once the usage
    /// manager reports its hard cap was crossed (§4.4 "suspension
    /// propagation").
    pub fn suspend_channel(&self, index: usize) {
        let mut channels = self.channels.write().unwrap();
        if let Some(channel) = channels.iter_mut().find(|c| c.index == index) {
            channel.status = config::ChannelStatus::Suspended;
        }
    }
}

/// Every family's runtime state plus the shared outbound HTTP client and
/// config persistence path.
pub struct AppState {
    pub messages: FamilyState,
    pub responses: FamilyState,
    pub gemini: FamilyState,
    pub http_client: reqwest::Client,
    pub config: RwLock<BridgeConfig>,
    pub config_path: std::path::PathBuf,
    pub user_agent: String,
    pub reduced_4xx_breaker_weight: f64,
    pub max_content_filter_buffer_bytes: usize,
    pub filter_buffer_overflow_count: std::sync::atomic::AtomicU64,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(config: BridgeConfig, config_path: std::path::PathBuf) -> anyhow::Result<Arc<Self>> {
        let http_client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .build()?;
        let state = Arc::new(Self {
            messages: FamilyState::new(Family::Messages, &config.messages),
            responses: FamilyState::new(Family::Responses, &config.responses),
            gemini: FamilyState::new(Family::Gemini, &config.gemini),
            http_client,
            user_agent: config.user_agent.clone(),
            reduced_4xx_breaker_weight: config.reduced_4xx_breaker_weight,
            max_content_filter_buffer_bytes: config.max_content_filter_buffer_bytes,
            filter_buffer_overflow_count: std::sync::atomic::AtomicU64::new(0),
            config: RwLock::new(config),
            config_path,
            started_at: Instant::now(),
        });
        Ok(state)
    }

    pub fn family(&self, family: Family) -> &FamilyState {
        match family {
            Family::Messages => &self.messages,
            Family::Responses => &self.responses,
            Family::Gemini => &self.gemini,
        }
    }

    /// Spawns each family's trace-affinity sweeper (§4.5): a background
    /// task ticking at a quarter of the family's TTL, evicting expired
    /// entries without blocking readers (§5 "the sweeper must not block
    /// readers for more than O(1) amortised").
    pub fn spawn_sweepers(self: &Arc<Self>) {
        for family in [Family::Messages, Family::Responses, Family::Gemini] {
            let ttl = self.family(family).affinity_ttl;
            let interval = (ttl / 4).max(Duration::from_secs(1));
            let state = Arc::clone(self);
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                loop {
                    ticker.tick().await;
                    state.family(family).scheduler.sweep_affinity();
                }
            });
        }
    }

    /// Persists the current config to disk, logging (not failing) on
    /// error — admin mutations are authoritative in-memory immediately
    /// regardless of whether the write succeeds (§3 "Lifecycle").
    pub fn persist_config(&self) {
        let config = self.snapshot_config();
        if let Err(err) = config.save(&self.config_path) {
            tracing::warn!(%err, path = %self.config_path.display(), "failed to persist config");
        }
    }

    fn snapshot_config(&self) -> BridgeConfig {
        let mut config = self.config.read().unwrap().clone();
        config.messages.channels = self.messages.channels.read().unwrap().clone();
        config.responses.channels = self.responses.channels.read().unwrap().clone();
        config.gemini.channels = self.gemini.channels.read().unwrap().clone();
        config
    }
}
