//! Cache Layers
//!
//! Provides the tiers the orchestrator cascades over:
//! - Local: in-process map with lazy expiry and a soft capacity
//! - Primary remote: external store with pattern enumeration (Redis)
//! - Secondary remote: external store without pattern enumeration (Synap)

pub mod local;
pub mod remote;

pub use local::LocalLayer;
pub use remote::{RemoteLayer, RemoteSettings};

use crate::core::{KeyPattern, LayerDescriptor, LayerResult};
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

/// Entry count versus configured capacity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Occupancy {
    pub entries: usize,
    pub capacity: usize,
}

impl Occupancy {
    /// Fill ratio; capacity 0 counts as full
    pub fn ratio(&self) -> f64 {
        if self.capacity == 0 {
            return 1.0;
        }
        self.entries as f64 / self.capacity as f64
    }
}

/// Capability set shared by every tier.
///
/// Implementations return [`LayerError`](crate::core::LayerError) for
/// unavailability and backend failures instead of panicking; the
/// orchestrator decides how a failure affects the overall call.
#[async_trait]
pub trait CacheLayer: Send + Sync {
    /// Static description of this layer
    fn descriptor(&self) -> &LayerDescriptor;

    /// TTL used when a value is promoted into this layer
    fn default_ttl(&self) -> Duration;

    /// Fetch the encoded bytes for a live entry
    async fn get(&self, key: &str) -> LayerResult<Option<Vec<u8>>>;

    /// Store encoded bytes, replacing any previous entry
    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> LayerResult<()>;

    /// Remove a key; `Ok(false)` when it was not present
    async fn delete(&self, key: &str) -> LayerResult<bool>;

    /// Remove every entry in this layer
    async fn clear(&self) -> LayerResult<()>;

    /// Remove every key matching `pattern`, returning how many were removed
    async fn delete_matching(&self, pattern: &KeyPattern) -> LayerResult<u64>;

    /// Current fill level, for layers that hold process memory
    fn occupancy(&self) -> Option<Occupancy> {
        None
    }
}
