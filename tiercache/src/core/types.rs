use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

/// Longest lifetime an entry is given; larger TTLs are clamped to it
pub const MAX_TTL: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// Stored entry held by an in-process map, with expiry metadata
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Encoded payload
    pub data: Vec<u8>,
    /// When the entry was written
    pub created_at: Instant,
    /// When the entry stops being served
    pub expires_at: Instant,
}

impl CacheEntry {
    /// Create a new entry that lives for `ttl`, at most [`MAX_TTL`]
    pub fn new(data: Vec<u8>, ttl: Duration) -> Self {
        let now = Instant::now();
        let expires_at = now
            .checked_add(ttl.min(MAX_TTL))
            .unwrap_or_else(|| far_future(now));
        Self {
            data,
            created_at: now,
            expires_at,
        }
    }

    /// Check if the entry has expired
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }

    /// Remaining lifetime, zero once expired
    pub fn remaining_ttl(&self) -> Duration {
        self.expires_at.saturating_duration_since(Instant::now())
    }

    /// Size of the payload in bytes
    pub fn size(&self) -> usize {
        self.data.len()
    }
}

/// Latest instant the clock can represent, found by halving the step
fn far_future(now: Instant) -> Instant {
    let mut step = MAX_TTL;
    while !step.is_zero() {
        if let Some(later) = now.checked_add(step) {
            return later;
        }
        step /= 2;
    }
    now
}

/// The three tiers, in cascade priority order
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum LayerKind {
    Local,
    PrimaryRemote,
    SecondaryRemote,
}

impl LayerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::PrimaryRemote => "primary_remote",
            Self::SecondaryRemote => "secondary_remote",
        }
    }
}

impl fmt::Display for LayerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Static description of a layer, fixed once the orchestrator is built
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LayerDescriptor {
    /// Human-readable backend name (e.g. "memory", "redis", "synap")
    pub name: String,
    /// Tier this layer occupies
    pub kind: LayerKind,
    /// False when the backend could not be reached at startup
    pub enabled: bool,
    /// Whether `invalidate_pattern` reaches this layer
    pub supports_pattern_delete: bool,
}

/// Cache operation kinds tracked by the stats recorder
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Get,
    Set,
    Delete,
    Clear,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "get",
            Self::Set => "set",
            Self::Delete => "delete",
            Self::Clear => "clear",
        }
    }
}

/// Read outcome; writes always carry `None`
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Hit,
    Miss,
    None,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hit => "hit",
            Self::Miss => "miss",
            Self::None => "none",
        }
    }
}

/// One observed cache call. Immutable once built.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OperationRecord {
    pub key: String,
    /// `None` for the aggregate miss recorded when no layer held the key
    pub layer: Option<LayerKind>,
    pub operation: Operation,
    pub outcome: Outcome,
    pub latency_ms: f64,
    pub byte_size: usize,
    pub timestamp: DateTime<Utc>,
}

impl OperationRecord {
    /// Build a record stamped with the current wall-clock time
    pub fn new(
        key: impl Into<String>,
        layer: Option<LayerKind>,
        operation: Operation,
        outcome: Outcome,
        latency: Duration,
        byte_size: usize,
    ) -> Self {
        Self {
            key: key.into(),
            layer,
            operation,
            outcome,
            latency_ms: latency.as_secs_f64() * 1000.0,
            byte_size,
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_entry_expiry() {
        let entry = CacheEntry::new(vec![1, 2, 3], Duration::from_secs(10));
        assert!(!entry.is_expired());
        assert_eq!(entry.size(), 3);

        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(entry.is_expired());
        assert_eq!(entry.remaining_ttl(), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_entry_with_huge_ttl_is_clamped() {
        for ttl in [Duration::MAX, Duration::from_secs(u64::MAX / 2)] {
            let entry = CacheEntry::new(vec![1], ttl);
            assert!(!entry.is_expired());
            assert!(entry.remaining_ttl() <= MAX_TTL);
            assert!(entry.remaining_ttl() > MAX_TTL - Duration::from_secs(1));
        }
    }

    #[test]
    fn test_record_serializes_layer_names() {
        let record = OperationRecord::new(
            "user:1",
            Some(LayerKind::PrimaryRemote),
            Operation::Get,
            Outcome::Hit,
            Duration::from_micros(1500),
            42,
        );
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["layer"], "primary_remote");
        assert_eq!(json["operation"], "get");
        assert_eq!(json["outcome"], "hit");
        assert!((record.latency_ms - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_layer_kind_ordering() {
        assert!(LayerKind::Local < LayerKind::PrimaryRemote);
        assert!(LayerKind::PrimaryRemote < LayerKind::SecondaryRemote);
    }
}
