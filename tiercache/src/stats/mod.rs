//! Operation statistics
//!
//! Every cache call produces [`OperationRecord`]s. The recorder keeps
//! process counters, a rolling window of recent records used for latency
//! percentiles and key popularity, and forwards records to the Prometheus
//! export surface and an optional [`MetricsSink`].

pub mod sink;

pub use sink::{JsonLinesSink, MetricsSink};

use crate::cache::Occupancy;
use crate::config::MonitoringConfig;
use crate::core::{LayerKind, Operation, OperationRecord, Outcome};
use crate::metrics;
use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;
use sink::SinkWriter;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;

/// Number of keys reported by `snapshot`
const SNAPSHOT_TOP_KEYS: usize = 10;

/// Latency percentiles for one (layer, operation) pair
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LatencySummary {
    pub layer: Option<LayerKind>,
    pub operation: Operation,
    pub count: usize,
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
}

/// Read count for a single key
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyAccess {
    pub key: String,
    pub reads: u64,
}

/// Point-in-time view of the recorder
#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    /// Reads satisfied by some layer
    pub hits: u64,
    /// Reads no layer could satisfy
    pub misses: u64,
    /// Per-layer write attempts
    pub sets: u64,
    pub deletes: u64,
    pub clears: u64,
    /// hits / (hits + misses), 0.0 before the first read
    pub hit_rate: f64,
    /// Records currently held in the window
    pub window_records: usize,
    pub latency: Vec<LatencySummary>,
    pub top_keys: Vec<KeyAccess>,
    /// Local layer fill level, when a local layer is enabled
    pub local_occupancy: Option<Occupancy>,
}

impl StatsSnapshot {
    pub fn reads(&self) -> u64 {
        self.hits + self.misses
    }
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
    deletes: AtomicU64,
    clears: AtomicU64,
}

/// Collects operation records for one orchestrator
pub struct StatsRecorder {
    counters: Counters,
    /// `None` when monitoring is disabled
    window: Option<Mutex<VecDeque<OperationRecord>>>,
    window_span: chrono::Duration,
    max_records: usize,
    sink: Option<SinkWriter>,
}

impl StatsRecorder {
    /// Build a recorder. The sink is ignored when monitoring is disabled.
    pub fn new(config: &MonitoringConfig, sink: Option<Arc<dyn MetricsSink>>) -> Self {
        let window_span = i64::try_from(config.window_secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .unwrap_or(chrono::Duration::MAX);

        if !config.enabled {
            debug!("Monitoring disabled, only counters are kept");
            return Self {
                counters: Counters::default(),
                window: None,
                window_span,
                max_records: 0,
                sink: None,
            };
        }

        Self {
            counters: Counters::default(),
            window: Some(Mutex::new(VecDeque::new())),
            window_span,
            max_records: config.max_records,
            sink: sink.and_then(SinkWriter::spawn),
        }
    }

    pub fn monitoring_enabled(&self) -> bool {
        self.window.is_some()
    }

    /// Account for one record
    pub fn record(&self, record: OperationRecord) {
        match (record.operation, record.outcome) {
            (Operation::Get, Outcome::Hit) => {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
            }
            (Operation::Get, Outcome::Miss) if record.layer.is_none() => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
            }
            (Operation::Get, _) => {}
            (Operation::Set, _) => {
                self.counters.sets.fetch_add(1, Ordering::Relaxed);
            }
            (Operation::Delete, _) => {
                self.counters.deletes.fetch_add(1, Ordering::Relaxed);
            }
            (Operation::Clear, _) => {
                self.counters.clears.fetch_add(1, Ordering::Relaxed);
            }
        }

        let Some(window) = &self.window else {
            return;
        };

        metrics::record_cache_op(
            record.layer.map(|l| l.as_str()).unwrap_or("all"),
            record.operation.as_str(),
            record.outcome.as_str(),
            record.latency_ms / 1000.0,
        );

        if let Some(sink) = &self.sink {
            sink.submit(record.clone());
        }

        let mut window = window.lock();
        window.push_back(record);
        self.prune(&mut window);
    }

    fn prune(&self, window: &mut VecDeque<OperationRecord>) {
        if let Some(cutoff) = Utc::now().checked_sub_signed(self.window_span) {
            while window.front().is_some_and(|r| r.timestamp < cutoff) {
                window.pop_front();
            }
        }
        while window.len() > self.max_records {
            window.pop_front();
        }
    }

    /// Fraction of reads satisfied by some layer
    pub fn hit_rate(&self) -> f64 {
        let hits = self.counters.hits.load(Ordering::Relaxed);
        let misses = self.counters.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }

    /// Most recent records, newest first
    pub fn recent(&self, count: usize) -> Vec<OperationRecord> {
        match &self.window {
            Some(window) => window.lock().iter().rev().take(count).cloned().collect(),
            None => Vec::new(),
        }
    }

    /// p50/p95/p99 per (layer, operation) over the window
    pub fn latency_report(&self) -> Vec<LatencySummary> {
        let Some(window) = &self.window else {
            return Vec::new();
        };

        let mut groups: HashMap<(Option<LayerKind>, Operation), Vec<f64>> = HashMap::new();
        for record in window.lock().iter() {
            groups
                .entry((record.layer, record.operation))
                .or_default()
                .push(record.latency_ms);
        }

        let mut report: Vec<LatencySummary> = groups
            .into_iter()
            .map(|((layer, operation), mut samples)| {
                samples.sort_by(|a, b| a.total_cmp(b));
                LatencySummary {
                    layer,
                    operation,
                    count: samples.len(),
                    p50_ms: percentile(&samples, 50.0),
                    p95_ms: percentile(&samples, 95.0),
                    p99_ms: percentile(&samples, 99.0),
                }
            })
            .collect();

        report.sort_by_key(|s| (s.layer, s.operation.as_str()));
        report
    }

    /// The `n` most-read keys over the last `lookback`, one read per cascade
    pub fn top_keys(&self, n: usize, lookback: Duration) -> Vec<KeyAccess> {
        let Some(window) = &self.window else {
            return Vec::new();
        };

        let cutoff = chrono::Duration::from_std(lookback)
            .ok()
            .and_then(|span| Utc::now().checked_sub_signed(span));

        let mut reads: HashMap<String, u64> = HashMap::new();
        for record in window.lock().iter() {
            if record.operation != Operation::Get {
                continue;
            }
            if cutoff.is_some_and(|cutoff| record.timestamp < cutoff) {
                continue;
            }
            let ends_cascade = record.outcome == Outcome::Hit
                || (record.outcome == Outcome::Miss && record.layer.is_none());
            if ends_cascade {
                *reads.entry(record.key.clone()).or_default() += 1;
            }
        }

        let mut top: Vec<KeyAccess> = reads
            .into_iter()
            .map(|(key, reads)| KeyAccess { key, reads })
            .collect();
        top.sort_by(|a, b| b.reads.cmp(&a.reads).then_with(|| a.key.cmp(&b.key)));
        top.truncate(n);
        top
    }

    /// Snapshot counters and window aggregates
    pub fn snapshot(&self, local_occupancy: Option<Occupancy>) -> StatsSnapshot {
        if let (Some(occupancy), true) = (local_occupancy, self.monitoring_enabled()) {
            metrics::set_local_entries(occupancy.entries);
        }

        let window_records = self.window.as_ref().map_or(0, |w| w.lock().len());
        let lookback = self.window_span.to_std().unwrap_or(Duration::MAX);

        StatsSnapshot {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            sets: self.counters.sets.load(Ordering::Relaxed),
            deletes: self.counters.deletes.load(Ordering::Relaxed),
            clears: self.counters.clears.load(Ordering::Relaxed),
            hit_rate: self.hit_rate(),
            window_records,
            latency: self.latency_report(),
            top_keys: self.top_keys(SNAPSHOT_TOP_KEYS, lookback),
            local_occupancy,
        }
    }
}

/// Nearest-rank percentile over sorted samples
fn percentile(sorted: &[f64], pct: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = ((pct / 100.0) * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}
