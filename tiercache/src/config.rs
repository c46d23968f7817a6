use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::MAX_TTL;
use crate::core::error::{CacheError, Result};
use crate::serializer::{Codec, CompressionConfig};

/// Main engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub cache: GeneralConfig,
    pub local: LocalConfig,
    pub compression: CompressionConfig,
    pub primary_remote: RemoteConfig,
    pub secondary_remote: RemoteConfig,
    pub monitoring: MonitoringConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// TTL applied when a caller does not pass one
    pub default_ttl_seconds: u64,
    /// Encoding for stored values
    pub codec: Codec,
    /// Serialize `remember` producers per key (off by default)
    pub single_flight: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalConfig {
    pub enabled: bool,
    /// Soft bound on entry count; reaching it triggers an expiry sweep
    pub capacity: usize,
    /// Promotion TTL override for this layer
    pub default_ttl_seconds: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Endpoint URL; the layer is absent when unset
    pub endpoint: Option<String>,
    /// Bound on each store call
    pub timeout_ms: u64,
    /// Promotion TTL override for this layer
    pub default_ttl_seconds: Option<u64>,
    /// Bearer token, used by the Synap HTTP store
    pub auth_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    pub enabled: bool,
    /// How long operation records stay in the rolling window
    pub window_secs: u64,
    /// Hard cap on records kept in the window
    pub max_records: usize,
    /// Append records as JSON lines to this file
    pub sink_path: Option<PathBuf>,
    /// Advisor warns below this hit rate (0.0 - 1.0)
    pub hit_rate_floor: f64,
    /// Advisor suggests more capacity at or above this local fill ratio
    pub occupancy_threshold: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            default_ttl_seconds: 3600,
            codec: Codec::Json,
            single_flight: false,
        }
    }
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity: 10_000,
            default_ttl_seconds: None,
        }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout_ms: 250,
            default_ttl_seconds: None,
            auth_token: None,
        }
    }
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            window_secs: 3600,
            max_records: 100_000,
            sink_path: None,
            hit_rate_floor: 0.7,
            occupancy_threshold: 0.9,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "json".to_string(),
        }
    }
}

impl CacheConfig {
    /// Load configuration from YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: CacheConfig = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        let ttls = [
            ("cache", Some(self.cache.default_ttl_seconds)),
            ("local", self.local.default_ttl_seconds),
            ("primary_remote", self.primary_remote.default_ttl_seconds),
            ("secondary_remote", self.secondary_remote.default_ttl_seconds),
        ];
        for (section, ttl) in ttls {
            match ttl {
                Some(0) => {
                    return Err(CacheError::Config(format!(
                        "{}.default_ttl_seconds must be greater than zero",
                        section
                    )));
                }
                Some(secs) if secs > MAX_TTL.as_secs() => {
                    return Err(CacheError::Config(format!(
                        "{}.default_ttl_seconds must not exceed {}",
                        section,
                        MAX_TTL.as_secs()
                    )));
                }
                _ => {}
            }
        }
        for (name, remote) in [
            ("primary_remote", &self.primary_remote),
            ("secondary_remote", &self.secondary_remote),
        ] {
            if remote.endpoint.is_some() && remote.timeout_ms == 0 {
                return Err(CacheError::Config(format!(
                    "{}.timeout_ms must be greater than zero",
                    name
                )));
            }
        }
        if !(0.0..=1.0).contains(&self.monitoring.hit_rate_floor) {
            return Err(CacheError::Config(
                "monitoring.hit_rate_floor must be within 0.0..=1.0".to_string(),
            ));
        }
        if self.monitoring.window_secs == 0 {
            return Err(CacheError::Config(
                "monitoring.window_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.default_ttl_seconds)
    }

    /// Promotion TTL for the local layer
    pub fn local_ttl(&self) -> Duration {
        self.local
            .default_ttl_seconds
            .map(Duration::from_secs)
            .unwrap_or_else(|| self.default_ttl())
    }

    /// Promotion TTL for a remote layer
    pub fn remote_ttl(&self, remote: &RemoteConfig) -> Duration {
        remote
            .default_ttl_seconds
            .map(Duration::from_secs)
            .unwrap_or_else(|| self.default_ttl())
    }
}

impl RemoteConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}
