use super::CacheLayer;
use crate::core::{KeyPattern, LayerDescriptor, LayerError, LayerKind, LayerResult, MAX_TTL};
use crate::remote::RemoteStore;
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Per-layer settings for a remote tier
#[derive(Debug, Clone, Copy)]
pub struct RemoteSettings {
    /// Upper bound on any single store call
    pub timeout: Duration,
    /// TTL used when promoting into this layer
    pub default_ttl: Duration,
}

/// Cache tier backed by an external key-value service.
///
/// Every store call is bounded by `timeout`; a timeout is reported the same
/// way as an unreachable backend.
pub struct RemoteLayer {
    descriptor: LayerDescriptor,
    store: Arc<dyn RemoteStore>,
    settings: RemoteSettings,
}

impl RemoteLayer {
    /// Primary tier: pattern invalidation goes through the store's enumeration
    pub fn primary(store: Arc<dyn RemoteStore>, settings: RemoteSettings) -> Self {
        Self::new(LayerKind::PrimaryRemote, store, settings)
    }

    /// Secondary tier: never enumerates keys
    pub fn secondary(store: Arc<dyn RemoteStore>, settings: RemoteSettings) -> Self {
        Self::new(LayerKind::SecondaryRemote, store, settings)
    }

    fn new(kind: LayerKind, store: Arc<dyn RemoteStore>, settings: RemoteSettings) -> Self {
        Self {
            descriptor: LayerDescriptor {
                name: store.name().to_string(),
                kind,
                enabled: true,
                supports_pattern_delete: kind == LayerKind::PrimaryRemote,
            },
            store,
            settings,
        }
    }

    /// Ping the backend once and disable the layer if it does not answer
    pub async fn probe(mut self) -> Self {
        match self.call("ping", "", self.store.ping()).await {
            Ok(()) => {
                info!(
                    "{} layer ({}) is available",
                    self.descriptor.kind, self.descriptor.name
                );
            }
            Err(e) => {
                warn!(
                    "{} layer ({}) disabled at startup: {}",
                    self.descriptor.kind, self.descriptor.name, e
                );
                self.descriptor.enabled = false;
            }
        }
        self
    }

    async fn call<T, F>(&self, operation: &str, key: &str, call: F) -> LayerResult<T>
    where
        F: Future<Output = LayerResult<T>> + Send,
    {
        let result = match tokio::time::timeout(self.settings.timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(LayerError::Timeout(self.settings.timeout)),
        };

        if let Err(ref e) = result {
            warn!(
                "{} {} failed for key '{}': {}",
                self.descriptor.kind, operation, key, e
            );
        }
        result
    }
}

/// Remote stores take whole seconds; round up so an entry never expires early
fn ttl_secs(ttl: Duration) -> u64 {
    let ttl = ttl.min(MAX_TTL);
    let secs = ttl.as_secs().saturating_add(u64::from(ttl.subsec_nanos() > 0));
    secs.max(1)
}

#[async_trait]
impl CacheLayer for RemoteLayer {
    fn descriptor(&self) -> &LayerDescriptor {
        &self.descriptor
    }

    fn default_ttl(&self) -> Duration {
        self.settings.default_ttl
    }

    async fn get(&self, key: &str) -> LayerResult<Option<Vec<u8>>> {
        self.call("get", key, self.store.get(key)).await
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> LayerResult<()> {
        let stored = self
            .call("set", key, self.store.set_with_ttl(key, value, ttl_secs(ttl)))
            .await?;
        if stored {
            Ok(())
        } else {
            Err(LayerError::Backend("write rejected".to_string()))
        }
    }

    async fn delete(&self, key: &str) -> LayerResult<bool> {
        self.call("delete", key, self.store.delete(key)).await
    }

    async fn clear(&self) -> LayerResult<()> {
        let flushed = self.call("clear", "*", self.store.flush_all()).await?;
        if flushed {
            Ok(())
        } else {
            Err(LayerError::Backend("flush rejected".to_string()))
        }
    }

    async fn delete_matching(&self, pattern: &KeyPattern) -> LayerResult<u64> {
        if !self.descriptor.supports_pattern_delete {
            return Err(LayerError::Unsupported("pattern delete"));
        }

        let keys = self
            .call("keys", pattern.as_str(), self.store.keys_matching(pattern))
            .await?;

        let mut removed = 0;
        for key in &keys {
            // Individual failures are logged by `call`; keep going with the rest
            if let Ok(true) = self.call("delete", key, self.store.delete(key)).await {
                removed += 1;
            }
        }
        Ok(removed)
    }
}
