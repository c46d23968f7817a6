use super::RemoteStore;
use crate::core::{CacheEntry, KeyPattern, LayerError, LayerResult};
use async_trait::async_trait;
use parking_lot::RwLock;
use radix_trie::{Trie, TrieCommon};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;

/// In-process stand-in for a remote key-value service.
///
/// Behaves like the external stores (per-key TTL, glob enumeration, flush)
/// and can be switched offline to exercise outage handling. Useful for tests
/// and for running the engine without any remote infrastructure.
pub struct InMemoryStore {
    name: String,
    data: RwLock<Trie<String, CacheEntry>>,
    online: AtomicBool,
    calls: AtomicU64,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::named("in-memory")
    }

    /// Create a store that reports `name` in layer descriptors
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data: RwLock::new(Trie::new()),
            online: AtomicBool::new(true),
            calls: AtomicU64::new(0),
        }
    }

    /// Simulate the service going down or coming back
    pub fn set_online(&self, online: bool) {
        debug!("{} store online={}", self.name, online);
        self.online.store(online, Ordering::SeqCst);
    }

    /// Number of client calls received, including rejected ones
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    /// Whether a live entry exists, bypassing the availability switch
    pub fn contains_key(&self, key: &str) -> bool {
        self.data
            .read()
            .get(key)
            .is_some_and(|entry| !entry.is_expired())
    }

    /// Number of live entries, bypassing the availability switch
    pub fn len(&self) -> usize {
        self.data
            .read()
            .values()
            .filter(|entry| !entry.is_expired())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_online(&self) -> LayerResult<()> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        if self.online.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(LayerError::Unavailable(format!("{} is offline", self.name)))
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteStore for InMemoryStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn ping(&self) -> LayerResult<()> {
        self.check_online()
    }

    async fn get(&self, key: &str) -> LayerResult<Option<Vec<u8>>> {
        self.check_online()?;

        let mut data = self.data.write();
        match data.get(key) {
            Some(entry) if entry.is_expired() => {
                data.remove(key);
                Ok(None)
            }
            Some(entry) => Ok(Some(entry.data.clone())),
            None => Ok(None),
        }
    }

    async fn set_with_ttl(&self, key: &str, value: &[u8], ttl_secs: u64) -> LayerResult<bool> {
        self.check_online()?;

        let entry = CacheEntry::new(value.to_vec(), Duration::from_secs(ttl_secs));
        self.data.write().insert(key.to_string(), entry);
        Ok(true)
    }

    async fn delete(&self, key: &str) -> LayerResult<bool> {
        self.check_online()?;
        Ok(self.data.write().remove(key).is_some())
    }

    async fn flush_all(&self) -> LayerResult<bool> {
        self.check_online()?;
        *self.data.write() = Trie::new();
        Ok(true)
    }

    async fn keys_matching(&self, pattern: &KeyPattern) -> LayerResult<Vec<String>> {
        self.check_online()?;

        let prefix = pattern.literal_prefix();
        let data = self.data.read();
        let live = |(key, entry): (&String, &CacheEntry)| {
            (!entry.is_expired() && pattern.matches(key)).then(|| key.clone())
        };

        let keys = if prefix.is_empty() {
            data.iter().filter_map(live).collect()
        } else {
            data.get_raw_descendant(&prefix)
                .map(|subtrie| subtrie.iter().filter_map(live).collect())
                .unwrap_or_default()
        };

        Ok(keys)
    }
}
