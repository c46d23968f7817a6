use super::{CacheLayer, Occupancy};
use crate::core::{CacheEntry, KeyPattern, LayerDescriptor, LayerKind, LayerResult};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

/// In-process cache tier.
///
/// Capacity is a soft bound: reaching it triggers a sweep of expired
/// entries, but a write is never refused and live entries are never evicted.
pub struct LocalLayer {
    descriptor: LayerDescriptor,
    entries: RwLock<HashMap<String, CacheEntry>>,
    capacity: usize,
    default_ttl: Duration,
}

impl LocalLayer {
    /// Create a new local layer
    pub fn new(capacity: usize, default_ttl: Duration) -> Self {
        Self {
            descriptor: LayerDescriptor {
                name: "memory".to_string(),
                kind: LayerKind::Local,
                enabled: true,
                supports_pattern_delete: true,
            },
            entries: RwLock::new(HashMap::with_capacity(capacity.min(65_536))),
            capacity,
            default_ttl,
        }
    }

    /// Get a live value, dropping the entry if it has expired
    pub fn get_bytes(&self, key: &str) -> Option<Vec<u8>> {
        {
            let entries = self.entries.read();
            match entries.get(key) {
                None => {
                    debug!("Local MISS for key: {}", key);
                    return None;
                }
                Some(entry) if !entry.is_expired() => {
                    debug!("Local HIT for key: {}", key);
                    return Some(entry.data.clone());
                }
                Some(_) => {}
            }
        }

        // Re-check under the write lock: a concurrent writer may have replaced it
        let mut entries = self.entries.write();
        match entries.get(key) {
            Some(entry) if entry.is_expired() => {
                entries.remove(key);
                debug!("Local EXPIRED key removed: {}", key);
                None
            }
            Some(entry) => Some(entry.data.clone()),
            None => None,
        }
    }

    /// Insert a value, sweeping expired entries first when at capacity
    pub fn put(&self, key: &str, value: Vec<u8>, ttl: Duration) {
        let mut entries = self.entries.write();

        if entries.len() >= self.capacity {
            let removed = Self::sweep_locked(&mut entries);
            if entries.len() >= self.capacity {
                debug!(
                    "Local layer over soft capacity after sweep ({} removed, {}/{} entries)",
                    removed,
                    entries.len(),
                    self.capacity
                );
            }
        }

        let size = value.len();
        entries.insert(key.to_string(), CacheEntry::new(value, ttl));
        debug!("Local PUT: {} ({} bytes, ttl={:?})", key, size, ttl);
    }

    /// Remove a key
    pub fn remove(&self, key: &str) -> bool {
        self.entries.write().remove(key).is_some()
    }

    /// Remove every entry
    pub fn invalidate_all(&self) -> usize {
        let mut entries = self.entries.write();
        let count = entries.len();
        entries.clear();
        debug!("Local INVALIDATE ALL ({} entries)", count);
        count
    }

    /// Remove all keys matching `pattern` by linear scan
    pub fn remove_matching(&self, pattern: &KeyPattern) -> u64 {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|key, _| !pattern.matches(key));
        let removed = (before - entries.len()) as u64;
        debug!("Local INVALIDATE '{}' ({} entries)", pattern, removed);
        removed
    }

    /// Drop all expired entries, returning how many were removed
    pub fn sweep_expired(&self) -> usize {
        Self::sweep_locked(&mut self.entries.write())
    }

    fn sweep_locked(entries: &mut HashMap<String, CacheEntry>) -> usize {
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired());
        let removed = before - entries.len();
        if removed > 0 {
            debug!("Local sweep removed {} expired entries", removed);
        }
        removed
    }

    /// Number of stored entries, including expired ones not yet swept
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[async_trait]
impl CacheLayer for LocalLayer {
    fn descriptor(&self) -> &LayerDescriptor {
        &self.descriptor
    }

    fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    async fn get(&self, key: &str) -> LayerResult<Option<Vec<u8>>> {
        Ok(self.get_bytes(key))
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> LayerResult<()> {
        self.put(key, value.to_vec(), ttl);
        Ok(())
    }

    async fn delete(&self, key: &str) -> LayerResult<bool> {
        Ok(self.remove(key))
    }

    async fn clear(&self) -> LayerResult<()> {
        self.invalidate_all();
        Ok(())
    }

    async fn delete_matching(&self, pattern: &KeyPattern) -> LayerResult<u64> {
        Ok(self.remove_matching(pattern))
    }

    fn occupancy(&self) -> Option<Occupancy> {
        Some(Occupancy {
            entries: self.len(),
            capacity: self.capacity,
        })
    }
}
