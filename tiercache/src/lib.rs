pub mod advisor;
pub mod cache;
pub mod config;
pub mod core;
pub mod metrics;
pub mod orchestrator;
pub mod remote;
pub mod serializer;
pub mod stats;
pub mod warmup;

mod single_flight;

// Re-export commonly used types
pub use advisor::{Advisor, AdvisorConfig, Evidence, Recommendation, RecommendationKind};
pub use cache::{CacheLayer, LocalLayer, Occupancy, RemoteLayer, RemoteSettings};
pub use config::CacheConfig;
pub use core::{
    CacheError, KeyPattern, LayerDescriptor, LayerError, LayerKind, MAX_TTL, Operation,
    OperationRecord, Outcome, Result,
};
pub use orchestrator::{CacheOrchestrator, CacheOrchestratorBuilder, QueryFingerprint};
pub use remote::{InMemoryStore, RedisStore, RemoteStore, SynapStore, SynapStoreConfig};
pub use serializer::{Codec, CompressionAlgorithm, CompressionConfig, Serializer};
pub use stats::{
    JsonLinesSink, KeyAccess, LatencySummary, MetricsSink, StatsRecorder, StatsSnapshot,
};
pub use warmup::{WarmupReport, WarmupScheduler, WarmupTask};
