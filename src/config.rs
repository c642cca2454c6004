//! On-disk configuration (§6 "Configuration surface"): channel lists per
//! family, content-filter rules, breaker thresholds, window size, recovery
//! time, affinity TTL, rate-limit queue caps, usage caps.
//!
//! Loaded once at startup from a TOML file and rewritten after every admin
//! mutation, matching the spec's "last-successfully-applied config survives
//! restart" persistence guarantee — nothing stronger (no WAL, no db) is
//! attempted.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// The upstream service dialect a channel speaks (§6 "Outbound wire").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceType {
    Openai,
    OpenaiChat,
    Openaiold,
    Responses,
    #[serde(rename = "openai-oauth")]
    OpenaiOauth,
    Claude,
    Gemini,
    /// Not a selectable leaf (§3 "Composite channel"); config validation
    /// rejects a `Composite` channel from ever being selected by the
    /// scheduler, but it is still accepted in the list so the admin API
    /// can describe one without the bridge trying to forward to it.
    Composite,
}

impl ServiceType {
    pub fn is_selectable_leaf(self) -> bool {
        !matches!(self, ServiceType::Composite)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ChannelStatus {
    #[default]
    Active,
    Disabled,
    Suspended,
}

fn default_queue_timeout_secs() -> u64 {
    2
}

fn default_response_header_timeout_secs() -> u64 {
    60
}

fn default_rpm() -> u32 {
    60
}

/// One configured upstream (§3 "Channel").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub index: usize,
    pub id: String,
    pub name: String,
    pub base_url: String,
    pub service_type: ServiceType,
    #[serde(default)]
    pub api_keys: Vec<String>,
    #[serde(default)]
    pub priority: u32,
    #[serde(default = "default_rpm")]
    pub rate_limit_rpm: u32,
    #[serde(default)]
    pub queue_enabled: bool,
    #[serde(default = "default_queue_timeout_secs")]
    pub queue_timeout_secs: u64,
    #[serde(default)]
    pub status: ChannelStatus,
    /// RFC3339 timestamp; `None`/past means no active promotion. Stored as
    /// seconds-since-epoch internally once loaded (`promotion_until_epoch`)
    /// so the hot path never reparses a string.
    #[serde(default)]
    pub promotion_until_epoch: Option<u64>,
    #[serde(default)]
    pub model_mapping: std::collections::HashMap<String, String>,
    #[serde(default)]
    pub insecure_skip_verify: bool,
    #[serde(default = "default_response_header_timeout_secs")]
    pub response_header_timeout_secs: u64,
    #[serde(default)]
    pub soft_cap_cost: Option<f64>,
    #[serde(default)]
    pub hard_cap_cost: Option<f64>,
}

/// A single content-filter rule (§3 "Content-Filter Rule").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterRuleConfig {
    pub keyword: String,
    pub status_code: u16,
}

/// The legacy `(keywords[], statusCode)` form.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LegacyFilterRuleConfig {
    pub keywords: Vec<String>,
    pub status_code: u16,
}

fn default_true() -> bool {
    true
}

fn default_failure_rate_threshold() -> f64 {
    0.5
}

fn default_consecutive_failure_limit() -> u32 {
    5
}

fn default_min_samples() -> usize {
    10
}

fn default_window_size() -> usize {
    100
}

fn default_recovery_time_secs() -> u64 {
    30
}

fn default_affinity_ttl_secs() -> u64 {
    300
}

fn default_max_attempts() -> u32 {
    3
}

fn default_reduced_4xx_weight() -> f64 {
    0.2
}

fn default_max_filter_buffer_bytes() -> usize {
    1024 * 1024
}

/// Scheduler, breaker and content-filter settings shared by every channel
/// in one family (§4.1, §4.2, §4.6, §8 "Scenarios" literal thresholds).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FamilyConfig {
    #[serde(default)]
    pub channels: Vec<ChannelConfig>,
    #[serde(default = "default_true")]
    pub multi_channel_mode: bool,
    #[serde(default = "default_failure_rate_threshold")]
    pub failure_rate_threshold: f64,
    #[serde(default = "default_consecutive_failure_limit")]
    pub consecutive_failure_limit: u32,
    #[serde(default = "default_min_samples")]
    pub minimum_number_of_calls: usize,
    #[serde(default = "default_window_size")]
    pub sliding_window_size: usize,
    #[serde(default = "default_recovery_time_secs")]
    pub recovery_time_secs: u64,
    #[serde(default = "default_affinity_ttl_secs")]
    pub affinity_ttl_secs: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default)]
    pub filter_rules: Vec<FilterRuleConfig>,
    #[serde(default)]
    pub legacy_filter_rules: Vec<LegacyFilterRuleConfig>,
}

impl Default for FamilyConfig {
    fn default() -> Self {
        Self {
            channels: Vec::new(),
            multi_channel_mode: true,
            failure_rate_threshold: default_failure_rate_threshold(),
            consecutive_failure_limit: default_consecutive_failure_limit(),
            minimum_number_of_calls: default_min_samples(),
            sliding_window_size: default_window_size(),
            recovery_time_secs: default_recovery_time_secs(),
            affinity_ttl_secs: default_affinity_ttl_secs(),
            max_attempts: default_max_attempts(),
            filter_rules: Vec::new(),
            legacy_filter_rules: Vec::new(),
        }
    }
}

fn default_listen() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_admin_listen() -> String {
    "127.0.0.1:8081".to_string()
}

fn default_user_agent() -> String {
    concat!("llm-bridge/", env!("CARGO_PKG_VERSION")).to_string()
}

/// Top-level on-disk configuration (§6 "Configuration surface").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
    #[serde(default = "default_admin_listen")]
    pub admin_listen: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_reduced_4xx_weight")]
    pub reduced_4xx_breaker_weight: f64,
    #[serde(default = "default_max_filter_buffer_bytes")]
    pub max_content_filter_buffer_bytes: usize,
    #[serde(default)]
    pub messages: FamilyConfig,
    #[serde(default)]
    pub responses: FamilyConfig,
    #[serde(default)]
    pub gemini: FamilyConfig,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            admin_listen: default_admin_listen(),
            user_agent: default_user_agent(),
            reduced_4xx_breaker_weight: default_reduced_4xx_weight(),
            max_content_filter_buffer_bytes: default_max_filter_buffer_bytes(),
            messages: FamilyConfig::default(),
            responses: FamilyConfig::default(),
            gemini: FamilyConfig::default(),
        }
    }
}

/// A rejected load or admin write (§3 "Supplemental Features: config
/// validation at load time").
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::sync::Arc<std::io::Error>,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("duplicate channel index {index} in family {family}")]
    DuplicateIndex { family: &'static str, index: usize },
    #[error("channel {id} in family {family} has rateLimitRpm <= 0")]
    NonPositiveRpm { family: &'static str, id: String },
}

impl BridgeConfig {
    /// Loads and validates a config file, normalizing any `promotionUntil`
    /// already in the past to `None` (§3 "Supplemental Features").
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            source: std::sync::Arc::new(e),
        })?;
        let mut config: BridgeConfig = toml::from_str(&text)?;
        config.normalize_and_validate()?;
        Ok(config)
    }

    /// Writes the config back to disk, the admin mutation persistence path
    /// (§6, §3 "Lifecycle"). Best-effort: callers log failures but do not
    /// fail the admin request on a write error (the in-memory state is
    /// already authoritative for this process's lifetime).
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let text = toml::to_string_pretty(self)?;
        std::fs::write(path, text).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            source: std::sync::Arc::new(e),
        })
    }

    fn normalize_and_validate(&mut self) -> Result<(), ConfigError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        for (name, family) in [
            ("messages", &mut self.messages),
            ("responses", &mut self.responses),
            ("gemini", &mut self.gemini),
        ] {
            validate_family(name, family, now)?;
        }
        Ok(())
    }
}

fn validate_family(name: &'static str, family: &mut FamilyConfig, now: u64) -> Result<(), ConfigError> {
    let mut seen = std::collections::HashSet::new();
    for channel in &mut family.channels {
        if !seen.insert(channel.index) {
            return Err(ConfigError::DuplicateIndex {
                family: name,
                index: channel.index,
            });
        }
        if channel.rate_limit_rpm == 0 {
            return Err(ConfigError::NonPositiveRpm {
                family: name,
                id: channel.id.clone(),
            });
        }
        if let Some(until) = channel.promotion_until_epoch {
            if until <= now {
                channel.promotion_until_epoch = None;
            }
        }
    }
    Ok(())
}

/// Resolves the config file path: `--config` flag, else `$LLM_BRIDGE_CONFIG`,
/// else `./llm-bridge.toml`.
pub fn resolve_config_path(flag: Option<PathBuf>) -> PathBuf {
    flag.or_else(|| std::env::var_os("LLM_BRIDGE_CONFIG").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("llm-bridge.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_channel(index: usize, rpm: u32) -> ChannelConfig {
        ChannelConfig {
            index,
            id: format!("chan-{index}"),
            name: format!("channel {index}"),
            base_url: "https://api.example.com".into(),
            service_type: ServiceType::Openai,
            api_keys: vec!["key".into()],
            priority: 0,
            rate_limit_rpm: rpm,
            queue_enabled: false,
            queue_timeout_secs: 2,
            status: ChannelStatus::Active,
            promotion_until_epoch: None,
            model_mapping: Default::default(),
            insecure_skip_verify: false,
            response_header_timeout_secs: 60,
            soft_cap_cost: None,
            hard_cap_cost: None,
        }
    }

    #[test]
    fn rejects_duplicate_indices_within_a_family() {
        let mut config = BridgeConfig::default();
        config.messages.channels = vec![sample_channel(0, 60), sample_channel(0, 60)];
        assert!(matches!(
            config.normalize_and_validate(),
            Err(ConfigError::DuplicateIndex { .. })
        ));
    }

    #[test]
    fn rejects_non_positive_rpm() {
        let mut config = BridgeConfig::default();
        config.messages.channels = vec![sample_channel(0, 0)];
        assert!(matches!(
            config.normalize_and_validate(),
            Err(ConfigError::NonPositiveRpm { .. })
        ));
    }

    #[test]
    fn past_promotion_is_normalized_to_none() {
        let mut config = BridgeConfig::default();
        let mut channel = sample_channel(0, 60);
        channel.promotion_until_epoch = Some(1);
        config.messages.channels = vec![channel];
        config.normalize_and_validate().unwrap();
        assert_eq!(config.messages.channels[0].promotion_until_epoch, None);
    }

    #[test]
    fn round_trips_through_toml() {
        let mut config = BridgeConfig::default();
        config.messages.channels = vec![sample_channel(0, 60)];
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: BridgeConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.messages.channels[0].id, "chan-0");
    }
}
