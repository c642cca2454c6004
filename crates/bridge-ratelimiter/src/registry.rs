//! A limiter per channel index within one family.

use crate::{ChannelRateLimiter, RateLimiterConfig};
use std::collections::HashMap;
use std::sync::RwLock;

/// Holds one [`ChannelRateLimiter`] per channel index, building it lazily
/// from the channel's current configuration.
pub struct RateLimiterRegistry {
    limiters: RwLock<HashMap<usize, ChannelRateLimiter>>,
}

impl RateLimiterRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            limiters: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the limiter for `index`, building it from `config` the
    /// first time it is requested.
    pub fn get_or_insert_with(
        &self,
        index: usize,
        config: impl FnOnce() -> RateLimiterConfig,
    ) -> ChannelRateLimiter {
        if let Some(limiter) = self.limiters.read().unwrap().get(&index) {
            return limiter.clone();
        }
        let mut limiters = self.limiters.write().unwrap();
        limiters
            .entry(index)
            .or_insert_with(|| ChannelRateLimiter::new(config()))
            .clone()
    }

    /// `ClearChannel(index)` (§4.3): drops the bucket so a later request
    /// rebuilds it from scratch, and cancels any of its waiters.
    pub fn clear_channel(&self, index: usize) {
        self.limiters.write().unwrap().remove(&index);
    }
}

impl Default for RateLimiterRegistry {
    fn default() -> Self {
        Self::new()
    }
}
