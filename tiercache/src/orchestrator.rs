//! Cache Orchestrator
//!
//! Single entry point over the configured layers. Reads cascade
//! Local → PrimaryRemote → SecondaryRemote and promote hits upward; writes
//! fan out to every enabled layer. Layer failures are absorbed here: a
//! failing layer simply contributes nothing to the current call.

use crate::advisor::{Advisor, AdvisorConfig, Recommendation};
use crate::cache::{CacheLayer, LocalLayer, Occupancy, RemoteLayer, RemoteSettings};
use crate::config::{CacheConfig, RemoteConfig};
use crate::core::error::{CacheError, Result};
use crate::core::{KeyPattern, LayerDescriptor, LayerKind, Operation, OperationRecord, Outcome};
use crate::remote::{RedisStore, RemoteStore, SynapStore, SynapStoreConfig};
use crate::serializer::Serializer;
use crate::single_flight::SingleFlight;
use crate::stats::{JsonLinesSink, MetricsSink, StatsRecorder, StatsSnapshot};
use crate::warmup::{WarmupReport, WarmupScheduler, WarmupTask};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Query text plus bound parameters, hashed into a cache key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryFingerprint {
    pub sql: String,
    pub params: serde_json::Value,
}

impl QueryFingerprint {
    pub fn new(sql: impl Into<String>, params: serde_json::Value) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }

    /// `query:<sha256 hex>` over the text, a NUL separator and the JSON params
    pub fn cache_key(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.sql.as_bytes());
        hasher.update([0u8]);
        hasher.update(self.params.to_string().as_bytes());
        format!("query:{}", hex::encode(hasher.finalize().as_slice()))
    }
}

/// A remote tier as handed to the builder
enum StoreSlot {
    Store(Arc<dyn RemoteStore>),
    /// Connecting failed before a store existed
    Unreachable(&'static str),
}

/// Assembles an orchestrator from a config and explicit stores
pub struct CacheOrchestratorBuilder {
    config: CacheConfig,
    primary: Option<StoreSlot>,
    secondary: Option<StoreSlot>,
    sink: Option<Arc<dyn MetricsSink>>,
}

impl CacheOrchestratorBuilder {
    pub fn with_primary_store(mut self, store: Arc<dyn RemoteStore>) -> Self {
        self.primary = Some(StoreSlot::Store(store));
        self
    }

    pub fn with_secondary_store(mut self, store: Arc<dyn RemoteStore>) -> Self {
        self.secondary = Some(StoreSlot::Store(store));
        self
    }

    /// Overrides `monitoring.sink_path`
    pub fn with_sink(mut self, sink: Arc<dyn MetricsSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Probe the remote stores and build the orchestrator.
    ///
    /// Unreachable stores yield disabled layers, not errors. Errors come
    /// only from invalid configuration or an unopenable sink file.
    pub async fn build(self) -> Result<CacheOrchestrator> {
        let config = self.config;
        config.validate()?;

        let mut descriptors = Vec::new();
        let mut layers: Vec<Arc<dyn CacheLayer>> = Vec::new();

        let local = LocalLayer::new(config.local.capacity, config.local_ttl());
        if config.local.enabled {
            descriptors.push(local.descriptor().clone());
            layers.push(Arc::new(local));
        } else {
            let mut descriptor = local.descriptor().clone();
            descriptor.enabled = false;
            descriptors.push(descriptor);
        }

        let remotes = [
            (LayerKind::PrimaryRemote, self.primary, &config.primary_remote),
            (
                LayerKind::SecondaryRemote,
                self.secondary,
                &config.secondary_remote,
            ),
        ];
        for (kind, slot, remote_config) in remotes {
            let Some(slot) = slot else {
                continue;
            };
            let settings = RemoteSettings {
                timeout: remote_config.timeout(),
                default_ttl: config.remote_ttl(remote_config),
            };

            match slot {
                StoreSlot::Store(store) => {
                    let layer = match kind {
                        LayerKind::PrimaryRemote => RemoteLayer::primary(store, settings),
                        _ => RemoteLayer::secondary(store, settings),
                    }
                    .probe()
                    .await;

                    descriptors.push(layer.descriptor().clone());
                    if layer.descriptor().enabled {
                        layers.push(Arc::new(layer));
                    }
                }
                StoreSlot::Unreachable(name) => descriptors.push(LayerDescriptor {
                    name: name.to_string(),
                    kind,
                    enabled: false,
                    supports_pattern_delete: kind == LayerKind::PrimaryRemote,
                }),
            }
        }

        let sink = match (self.sink, &config.monitoring.sink_path) {
            (Some(sink), _) => Some(sink),
            (None, Some(path)) if config.monitoring.enabled => {
                Some(Arc::new(JsonLinesSink::open(path).await?) as Arc<dyn MetricsSink>)
            }
            _ => None,
        };

        let serializer = Serializer::new(config.cache.codec, config.compression.clone());
        let stats = StatsRecorder::new(&config.monitoring, sink);
        let advisor = Advisor::new(AdvisorConfig::from(&config.monitoring));
        let flights = config.cache.single_flight.then(SingleFlight::new);

        info!(
            "Cache orchestrator ready: {} of {} layers active ({})",
            layers.len(),
            descriptors.len(),
            descriptors
                .iter()
                .map(|d| {
                    let backend = if d.enabled { d.name.as_str() } else { "off" };
                    format!("{}={}", d.kind, backend)
                })
                .collect::<Vec<_>>()
                .join(", ")
        );

        Ok(CacheOrchestrator {
            config,
            descriptors,
            layers,
            serializer,
            stats,
            advisor,
            flights,
        })
    }
}

/// Multi-tier cache shared by many tasks through an `Arc`
pub struct CacheOrchestrator {
    config: CacheConfig,
    /// Every configured layer, including disabled ones
    descriptors: Vec<LayerDescriptor>,
    /// Enabled layers in cascade order
    layers: Vec<Arc<dyn CacheLayer>>,
    serializer: Serializer,
    stats: StatsRecorder,
    advisor: Advisor,
    flights: Option<SingleFlight>,
}

impl CacheOrchestrator {
    pub fn builder(config: CacheConfig) -> CacheOrchestratorBuilder {
        CacheOrchestratorBuilder {
            config,
            primary: None,
            secondary: None,
            sink: None,
        }
    }

    /// Build from configured endpoints: Redis for the primary tier, Synap
    /// for the secondary tier
    pub async fn connect(config: CacheConfig) -> Result<Self> {
        let primary = match &config.primary_remote.endpoint {
            Some(endpoint) => Some(connect_redis(endpoint, &config.primary_remote).await),
            None => None,
        };
        let secondary = config
            .secondary_remote
            .endpoint
            .as_deref()
            .map(|endpoint| connect_synap(endpoint, &config.secondary_remote));

        let mut builder = Self::builder(config);
        builder.primary = primary;
        builder.secondary = secondary;
        builder.build().await
    }

    /// Every configured layer, in cascade order
    pub fn layers(&self) -> &[LayerDescriptor] {
        &self.descriptors
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn serializer(&self) -> &Serializer {
        &self.serializer
    }

    /// Recorder backing `get_stats`, for latency and key reports
    pub fn stats(&self) -> &StatsRecorder {
        &self.stats
    }

    /// Read a value, promoting it into every higher layer on a lower-layer hit
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let started = Instant::now();

        for (idx, layer) in self.layers.iter().enumerate() {
            let kind = layer.descriptor().kind;
            let call_started = Instant::now();

            let bytes = match layer.get(key).await {
                Ok(Some(bytes)) => bytes,
                Ok(None) | Err(_) => {
                    self.record(key, Some(kind), Operation::Get, Outcome::Miss, call_started, 0);
                    continue;
                }
            };

            self.record(
                key,
                Some(kind),
                Operation::Get,
                Outcome::Hit,
                call_started,
                bytes.len(),
            );
            debug!("GET key={} hit in {}", key, kind);

            let value = self.serializer.decode(&bytes)?;
            self.promote(key, &bytes, &self.layers[..idx]).await;
            return Ok(Some(value));
        }

        self.record(key, None, Operation::Get, Outcome::Miss, started, 0);
        debug!("GET key={} missed every layer", key);
        Ok(None)
    }

    /// Best-effort copy into higher-priority layers with each layer's own TTL
    async fn promote(&self, key: &str, bytes: &[u8], higher: &[Arc<dyn CacheLayer>]) {
        for layer in higher {
            if let Err(e) = layer.set(key, bytes, layer.default_ttl()).await {
                debug!(
                    "Promotion of key '{}' into {} failed: {}",
                    key,
                    layer.descriptor().kind,
                    e
                );
            }
        }
    }

    /// Write a value to every enabled layer.
    ///
    /// Returns `true` if at least one layer accepted it. `ttl = None` uses
    /// `cache.default_ttl_seconds`; a zero TTL is rejected.
    pub async fn set<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> Result<bool> {
        let ttl = self.resolve_ttl(ttl)?;
        let bytes = self.serializer.encode(value)?;
        Ok(self.write_all(key, &bytes, ttl).await)
    }

    /// Write bytes already produced by `serializer()`
    pub(crate) async fn set_encoded(
        &self,
        key: &str,
        bytes: Vec<u8>,
        ttl: Option<Duration>,
    ) -> Result<bool> {
        let ttl = self.resolve_ttl(ttl)?;
        Ok(self.write_all(key, &bytes, ttl).await)
    }

    fn resolve_ttl(&self, ttl: Option<Duration>) -> Result<Duration> {
        match ttl {
            None => Ok(self.config.default_ttl()),
            Some(ttl) if ttl.is_zero() => {
                Err(CacheError::InvalidTtl("TTL must be greater than zero".to_string()))
            }
            Some(ttl) => Ok(ttl),
        }
    }

    async fn write_all(&self, key: &str, bytes: &[u8], ttl: Duration) -> bool {
        let mut accepted = false;
        for layer in &self.layers {
            let started = Instant::now();
            let result = layer.set(key, bytes, ttl).await;
            self.record(
                key,
                Some(layer.descriptor().kind),
                Operation::Set,
                Outcome::None,
                started,
                bytes.len(),
            );
            accepted |= result.is_ok();
        }

        if accepted {
            debug!("SET key={} size={} ttl={:?}", key, bytes.len(), ttl);
        } else {
            warn!("SET key={} was not accepted by any layer", key);
        }
        accepted
    }

    /// Remove a key from every layer; `true` if at least one layer completed
    /// the delete
    pub async fn delete(&self, key: &str) -> bool {
        let mut completed = false;
        for layer in &self.layers {
            let started = Instant::now();
            let result = layer.delete(key).await;
            self.record(
                key,
                Some(layer.descriptor().kind),
                Operation::Delete,
                Outcome::None,
                started,
                0,
            );
            completed |= result.is_ok();
        }
        debug!("DELETE key={} completed={}", key, completed);
        completed
    }

    /// Flush every enabled layer; `true` if at least one layer flushed
    pub async fn clear(&self) -> bool {
        let mut flushed = false;
        for layer in &self.layers {
            let started = Instant::now();
            let result = layer.clear().await;
            self.record(
                "*",
                Some(layer.descriptor().kind),
                Operation::Clear,
                Outcome::None,
                started,
                0,
            );
            flushed |= result.is_ok();
        }
        info!("Cache cleared (any layer flushed: {})", flushed);
        flushed
    }

    /// Remove keys matching a glob from every layer that supports it.
    ///
    /// The secondary remote never enumerates keys and is skipped.
    pub async fn invalidate_pattern(&self, pattern: &str) -> Result<u64> {
        let pattern = KeyPattern::parse(pattern)?;

        let mut removed = 0;
        for layer in &self.layers {
            let descriptor = layer.descriptor();
            if !descriptor.supports_pattern_delete {
                continue;
            }
            match layer.delete_matching(&pattern).await {
                Ok(count) => {
                    debug!(
                        "Pattern '{}' removed {} keys from {}",
                        pattern, count, descriptor.kind
                    );
                    removed += count;
                }
                Err(e) => warn!(
                    "Pattern '{}' invalidation failed on {}: {}",
                    pattern, descriptor.kind, e
                ),
            }
        }

        info!("Invalidated {} keys matching '{}'", removed, pattern);
        Ok(removed)
    }

    /// Return the cached value, or run `producer`, cache its result and
    /// return it.
    ///
    /// Without `cache.single_flight`, concurrent callers for the same absent
    /// key may each run the producer.
    pub async fn remember<T, E, F, Fut>(
        &self,
        key: &str,
        ttl: Option<Duration>,
        producer: F,
    ) -> std::result::Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        E: From<CacheError>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        let ttl = self.resolve_ttl(ttl)?;

        if let Some(value) = self.get(key).await? {
            return Ok(value);
        }

        let _flight = match &self.flights {
            Some(flights) => {
                let guard = flights.acquire(key).await;
                if let Some(value) = self.get(key).await? {
                    return Ok(value);
                }
                Some(guard)
            }
            None => None,
        };

        let value = producer().await?;
        let bytes = self.serializer.encode(&value)?;
        self.write_all(key, &bytes, ttl).await;
        Ok(value)
    }

    /// `remember` keyed by a query fingerprint
    pub async fn remember_query<T, E, F, Fut>(
        &self,
        fingerprint: &QueryFingerprint,
        ttl: Option<Duration>,
        executor: F,
    ) -> std::result::Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        E: From<CacheError>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        self.remember(&fingerprint.cache_key(), ttl, executor).await
    }

    pub fn get_stats(&self) -> StatsSnapshot {
        self.stats.snapshot(self.local_occupancy())
    }

    pub async fn warmup(&self, tasks: Vec<WarmupTask>) -> WarmupReport {
        WarmupScheduler::new(self).run(tasks).await
    }

    pub fn advise(&self) -> Vec<Recommendation> {
        self.advisor.advise(&self.get_stats())
    }

    fn local_occupancy(&self) -> Option<Occupancy> {
        self.layers.iter().find_map(|layer| layer.occupancy())
    }

    fn record(
        &self,
        key: &str,
        layer: Option<LayerKind>,
        operation: Operation,
        outcome: Outcome,
        started: Instant,
        byte_size: usize,
    ) {
        self.stats.record(OperationRecord::new(
            key,
            layer,
            operation,
            outcome,
            started.elapsed(),
            byte_size,
        ));
    }
}

async fn connect_redis(endpoint: &str, config: &RemoteConfig) -> StoreSlot {
    match tokio::time::timeout(config.timeout(), RedisStore::connect(endpoint)).await {
        Ok(Ok(store)) => StoreSlot::Store(Arc::new(store)),
        Ok(Err(e)) => {
            warn!("Primary remote {} unreachable: {}", endpoint, e);
            StoreSlot::Unreachable("redis")
        }
        Err(_) => {
            warn!("Primary remote {} did not answer within {:?}", endpoint, config.timeout());
            StoreSlot::Unreachable("redis")
        }
    }
}

fn connect_synap(endpoint: &str, config: &RemoteConfig) -> StoreSlot {
    let mut synap_config = SynapStoreConfig::new(endpoint).with_timeout(config.timeout());
    if let Some(token) = &config.auth_token {
        synap_config = synap_config.with_auth_token(token.clone());
    }

    match SynapStore::new(synap_config) {
        Ok(store) => StoreSlot::Store(Arc::new(store)),
        Err(e) => {
            warn!("Secondary remote {} unusable: {}", endpoint, e);
            StoreSlot::Unreachable("synap")
        }
    }
}
