//! Tuning recommendations derived from a stats snapshot.
//!
//! Advisory only: nothing here changes configuration.

use crate::config::MonitoringConfig;
use crate::stats::StatsSnapshot;
use serde::{Deserialize, Serialize};

/// Thresholds for the advisor
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AdvisorConfig {
    /// Hit rate below which reads are flagged
    pub hit_rate_floor: f64,
    /// Local fill ratio at which more capacity is suggested
    pub occupancy_threshold: f64,
}

impl Default for AdvisorConfig {
    fn default() -> Self {
        Self {
            hit_rate_floor: 0.7,
            occupancy_threshold: 0.9,
        }
    }
}

impl From<&MonitoringConfig> for AdvisorConfig {
    fn from(config: &MonitoringConfig) -> Self {
        Self {
            hit_rate_floor: config.hit_rate_floor,
            occupancy_threshold: config.occupancy_threshold,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationKind {
    CapacityIncrease,
    LowHitRate,
}

/// Figures that triggered a recommendation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Evidence {
    Occupancy {
        entries: usize,
        capacity: usize,
        ratio: f64,
    },
    HitRate {
        hits: u64,
        misses: u64,
        hit_rate: f64,
        floor: f64,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub kind: RecommendationKind,
    pub message: String,
    pub evidence: Evidence,
}

pub struct Advisor {
    config: AdvisorConfig,
}

impl Advisor {
    pub fn new(config: AdvisorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AdvisorConfig {
        &self.config
    }

    pub fn advise(&self, snapshot: &StatsSnapshot) -> Vec<Recommendation> {
        let mut recommendations = Vec::new();

        if let Some(occupancy) = snapshot.local_occupancy {
            let ratio = occupancy.ratio();
            if ratio >= self.config.occupancy_threshold {
                recommendations.push(Recommendation {
                    kind: RecommendationKind::CapacityIncrease,
                    message: format!(
                        "Local layer is {:.0}% full ({}/{} entries); consider raising local.capacity",
                        ratio * 100.0,
                        occupancy.entries,
                        occupancy.capacity
                    ),
                    evidence: Evidence::Occupancy {
                        entries: occupancy.entries,
                        capacity: occupancy.capacity,
                        ratio,
                    },
                });
            }
        }

        if snapshot.reads() > 0 && snapshot.hit_rate < self.config.hit_rate_floor {
            recommendations.push(Recommendation {
                kind: RecommendationKind::LowHitRate,
                message: format!(
                    "Hit rate {:.1}% is below {:.1}%; review TTL policy or add warmup tasks",
                    snapshot.hit_rate * 100.0,
                    self.config.hit_rate_floor * 100.0
                ),
                evidence: Evidence::HitRate {
                    hits: snapshot.hits,
                    misses: snapshot.misses,
                    hit_rate: snapshot.hit_rate,
                    floor: self.config.hit_rate_floor,
                },
            });
        }

        recommendations
    }
}
