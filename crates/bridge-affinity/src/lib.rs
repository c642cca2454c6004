//! TTL-bounded trace affinity map (§3 "Trace Affinity Entry", §4.5).
//!
//! Routes repeat requests carrying the same `traceId` back to the channel
//! that served the first one, for the lifetime of a uniform TTL. A
//! background sweep task evicts expired entries so the map doesn't grow
//! without bound under abandoned traces.
//!
//! ```
//! use bridge_affinity::TraceAffinityMap;
//! use std::time::Duration;
//!
//! let map = TraceAffinityMap::new(Duration::from_secs(60));
//! map.put("trace-1".to_string(), 2);
//! assert_eq!(map.get("trace-1"), Some(2));
//! ```

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

struct AffinityEntry {
    channel_index: usize,
    expires_at: Instant,
}

/// A TTL-bounded `traceId -> channelIndex` map.
pub struct TraceAffinityMap {
    entries: RwLock<HashMap<String, AffinityEntry>>,
    ttl: Duration,
}

impl TraceAffinityMap {
    /// Creates a map with a uniform TTL applied to every entry.
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// `Get(traceId)` (§4.5): returns the affined channel index, or `None`
    /// if there is no entry or it has expired.
    pub fn get(&self, trace_id: &str) -> Option<usize> {
        let entries = self.entries.read().unwrap();
        let entry = entries.get(trace_id)?;
        if Instant::now() > entry.expires_at {
            None
        } else {
            Some(entry.channel_index)
        }
    }

    /// `Put(traceId, index)` (§4.5): inserts or refreshes an entry's TTL.
    pub fn put(&self, trace_id: String, channel_index: usize) {
        let mut entries = self.entries.write().unwrap();
        entries.insert(
            trace_id,
            AffinityEntry {
                channel_index,
                expires_at: Instant::now() + self.ttl,
            },
        );
    }

    /// `Size()` (§4.5): includes entries that have expired but not yet
    /// been swept.
    pub fn size(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    /// Removes every entry whose `expires_at` has passed.
    pub fn sweep(&self) {
        let now = Instant::now();
        self.entries
            .write()
            .unwrap()
            .retain(|_, entry| entry.expires_at > now);
    }

    /// Spawns a background task that calls `sweep()` every `interval`
    /// until the returned handle is dropped or aborted.
    pub fn spawn_sweeper(self: &std::sync::Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let map = std::sync::Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                map.sweep();
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn put_then_get_returns_the_affined_channel() {
        let map = TraceAffinityMap::new(Duration::from_secs(60));
        map.put("trace-1".to_string(), 3);
        assert_eq!(map.get("trace-1"), Some(3));
    }

    #[test]
    fn missing_trace_returns_none() {
        let map = TraceAffinityMap::new(Duration::from_secs(60));
        assert_eq!(map.get("unknown"), None);
    }

    #[test]
    fn expired_entry_reads_as_absent() {
        let map = TraceAffinityMap::new(Duration::from_millis(10));
        map.put("trace-1".to_string(), 1);
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(map.get("trace-1"), None);
    }

    #[test]
    fn put_refreshes_ttl() {
        let map = TraceAffinityMap::new(Duration::from_millis(50));
        map.put("trace-1".to_string(), 1);
        std::thread::sleep(Duration::from_millis(30));
        map.put("trace-1".to_string(), 1);
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(map.get("trace-1"), Some(1));
    }

    #[test]
    fn sweep_removes_expired_entries_and_shrinks_size() {
        let map = TraceAffinityMap::new(Duration::from_millis(10));
        map.put("trace-1".to_string(), 1);
        map.put("trace-2".to_string(), 2);
        std::thread::sleep(Duration::from_millis(30));
        map.sweep();
        assert_eq!(map.size(), 0);
    }

    #[tokio::test]
    async fn background_sweeper_evicts_over_time() {
        let map = Arc::new(TraceAffinityMap::new(Duration::from_millis(10)));
        map.put("trace-1".to_string(), 1);
        let handle = map.spawn_sweeper(Duration::from_millis(5));
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(map.size(), 0);
        handle.abort();
    }
}
