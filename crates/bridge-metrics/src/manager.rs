//! Registry of [`ChannelMetrics`] for one family, keyed by channel index
//! (§4.1).

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use bridge_circuitbreaker::CircuitBreakerConfig;

use crate::channel::{ChannelIdentity, ChannelMetrics};

/// Holds one [`ChannelMetrics`] per channel index, rebuilding an entry
/// whenever the channel at that index is reconfigured under a different
/// identity.
pub struct MetricsManager {
    channels: RwLock<HashMap<usize, Arc<ChannelMetrics>>>,
}

impl MetricsManager {
    /// Creates an empty manager.
    pub fn new() -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the metrics record for `index`, building it from `identity`
    /// and `config` the first time it is requested.
    pub fn get_or_insert_with(
        &self,
        index: usize,
        identity: impl FnOnce() -> ChannelIdentity,
        config: impl FnOnce() -> CircuitBreakerConfig,
    ) -> Arc<ChannelMetrics> {
        if let Some(metrics) = self.channels.read().unwrap().get(&index) {
            return Arc::clone(metrics);
        }
        let mut channels = self.channels.write().unwrap();
        Arc::clone(
            channels
                .entry(index)
                .or_insert_with(|| Arc::new(ChannelMetrics::new(identity(), config()))),
        )
    }

    /// Looks up an existing record without creating one.
    pub fn get(&self, index: usize) -> Option<Arc<ChannelMetrics>> {
        self.channels.read().unwrap().get(&index).cloned()
    }

    /// `ReconcileChannelIdentities(expectations)` (§4.1): drops any record
    /// whose channel no longer exists in `expectations`, and wipes any
    /// record whose identity no longer matches the channel now configured
    /// at that index (reused index, different channel) so its counters and
    /// breaker state don't leak onto the new channel.
    pub fn reconcile_channel_identities(&self, expectations: &[(usize, ChannelIdentity)]) {
        let expected: HashMap<usize, &ChannelIdentity> =
            expectations.iter().map(|(i, id)| (*i, id)).collect();
        let mut channels = self.channels.write().unwrap();
        channels.retain(|index, metrics| match expected.get(index) {
            Some(identity) => metrics.identity() == **identity,
            None => false,
        });
    }

    /// Number of channels currently tracked.
    pub fn len(&self) -> usize {
        self.channels.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MetricsManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(id: &str) -> ChannelIdentity {
        ChannelIdentity {
            id: id.into(),
            name: id.into(),
        }
    }

    fn config() -> CircuitBreakerConfig {
        CircuitBreakerConfig::builder().build()
    }

    #[test]
    fn builds_lazily_and_reuses() {
        let manager = MetricsManager::new();
        let a = manager.get_or_insert_with(0, || identity("a"), config);
        a.record_attempt();
        let b = manager.get_or_insert_with(0, || identity("ignored"), config);
        assert_eq!(b.request_count(), 1);
    }

    #[test]
    fn reconcile_drops_channels_outside_expectations() {
        let manager = MetricsManager::new();
        manager.get_or_insert_with(0, || identity("a"), config);
        manager.get_or_insert_with(1, || identity("b"), config);
        manager.reconcile_channel_identities(&[(0, identity("a"))]);
        assert!(manager.get(0).is_some());
        assert!(manager.get(1).is_none());
    }

    #[test]
    fn reconcile_wipes_entry_whose_identity_changed() {
        let manager = MetricsManager::new();
        let first = manager.get_or_insert_with(0, || identity("a"), config);
        first.record_attempt();
        manager.reconcile_channel_identities(&[(0, identity("different"))]);
        assert!(manager.get(0).is_none());
        let rebuilt = manager.get_or_insert_with(0, || identity("different"), config);
        assert_eq!(rebuilt.request_count(), 0);
    }
}
