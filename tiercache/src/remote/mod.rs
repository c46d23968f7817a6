//! Remote key-value stores backing the remote cache tiers
//!
//! Each store is a thin client over an external service offering atomic
//! single-key operations. Stores hold no cache state of their own.

pub mod memory;
pub mod redis;
pub mod synap;

pub use memory::InMemoryStore;
pub use redis::RedisStore;
pub use synap::{SynapStore, SynapStoreConfig};

use crate::core::{KeyPattern, LayerError, LayerResult};
use async_trait::async_trait;

/// Client surface of an external key-value service
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Backend name reported in layer descriptors
    fn name(&self) -> &str;

    /// Cheap round-trip used to decide availability at startup
    async fn ping(&self) -> LayerResult<()>;

    async fn get(&self, key: &str) -> LayerResult<Option<Vec<u8>>>;

    /// Store `value` with an expiry of `ttl_secs` (always at least 1)
    async fn set_with_ttl(&self, key: &str, value: &[u8], ttl_secs: u64) -> LayerResult<bool>;

    async fn delete(&self, key: &str) -> LayerResult<bool>;

    async fn flush_all(&self) -> LayerResult<bool>;

    /// Enumerate keys matching a glob; unsupported unless overridden
    async fn keys_matching(&self, _pattern: &KeyPattern) -> LayerResult<Vec<String>> {
        Err(LayerError::Unsupported("keys_matching"))
    }
}
