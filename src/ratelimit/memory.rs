//! In-process quota store.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::trace;

use super::store::{QuotaHit, QuotaStatus, QuotaStore, StoreError};
use crate::clock::{Clock, SystemClock};

#[derive(Debug, Clone, Copy)]
struct Entry {
    count: u64,
    /// Clock time at which the entry stops counting.
    expires_at: Duration,
}

/// The default quota store: a map of expiring counters behind one lock.
///
/// Batches are applied under a single lock acquisition with no await
/// points, so `increment_all` is atomic and cancellation-safe.
#[derive(Debug)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
    clock: Arc<dyn Clock>,
}

impl MemoryStore {
    /// Create a store driven by the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Get the number of live counters.
    pub fn counter_count(&self) -> usize {
        let now = self.clock.now();
        self.entries
            .lock()
            .values()
            .filter(|e| e.expires_at > now)
            .count()
    }

    /// Clear all counters.
    ///
    /// This is primarily useful for testing.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    fn purge_expired(entries: &mut HashMap<String, Entry>, now: Duration) {
        entries.retain(|_, e| e.expires_at > now);
    }

    fn live_count(entries: &HashMap<String, Entry>, key: &str, now: Duration) -> u64 {
        entries
            .get(key)
            .filter(|e| e.expires_at > now)
            .map_or(0, |e| e.count)
    }

    fn status(
        entries: &HashMap<String, Entry>,
        hit: &QuotaHit,
        now: Duration,
        allowed: bool,
    ) -> QuotaStatus {
        let entry = entries.get(&hit.key).filter(|e| e.expires_at > now);
        QuotaStatus {
            allowed,
            remaining: hit.max_count.saturating_sub(entry.map_or(0, |e| e.count)),
            reset_in: entry.map_or(hit.expiry, |e| e.expires_at.saturating_sub(now)),
        }
    }

    fn apply(entries: &mut HashMap<String, Entry>, hit: &QuotaHit, now: Duration) {
        let entry = entries.entry(hit.key.clone()).or_insert(Entry {
            count: 0,
            expires_at: now + hit.expiry,
        });
        entry.count += 1;
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl QuotaStore for MemoryStore {
    async fn increment_and_check(
        &self,
        key: &str,
        expiry: Duration,
        max_count: u64,
    ) -> Result<QuotaStatus, StoreError> {
        let hit = QuotaHit {
            key: key.to_string(),
            expiry,
            max_count,
        };
        let mut statuses = self.increment_all(std::slice::from_ref(&hit)).await?;
        statuses
            .pop()
            .ok_or_else(|| StoreError::Backend("empty batch result".to_string()))
    }

    async fn get(&self, key: &str) -> Result<u64, StoreError> {
        let now = self.clock.now();
        Ok(Self::live_count(&self.entries.lock(), key, now))
    }

    async fn decrement(&self, key: &str) -> Result<(), StoreError> {
        let now = self.clock.now();
        let mut entries = self.entries.lock();
        if let Some(entry) = entries.get_mut(key).filter(|e| e.expires_at > now) {
            entry.count = entry.count.saturating_sub(1);
        }
        Ok(())
    }

    async fn get_many(&self, keys: &[String]) -> Result<Vec<u64>, StoreError> {
        let now = self.clock.now();
        let entries = self.entries.lock();
        Ok(keys
            .iter()
            .map(|key| Self::live_count(&entries, key, now))
            .collect())
    }

    async fn increment_all(&self, hits: &[QuotaHit]) -> Result<Vec<QuotaStatus>, StoreError> {
        let now = self.clock.now();
        let mut entries = self.entries.lock();
        Self::purge_expired(&mut entries, now);

        let allowed = hits
            .iter()
            .all(|hit| Self::live_count(&entries, &hit.key, now) < hit.max_count);

        if allowed {
            for hit in hits {
                Self::apply(&mut entries, hit, now);
            }
        }

        trace!(hits = hits.len(), allowed, "Applied quota batch");

        Ok(hits
            .iter()
            .map(|hit| Self::status(&entries, hit, now, allowed))
            .collect())
    }
}
