//! Cache warmup
//!
//! Runs a list of producers once, in order, writing each result through the
//! orchestrator. A failing task is reported and the rest still run.

use crate::orchestrator::CacheOrchestrator;
use crate::serializer::Serializer;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tracing::{debug, info, warn};

type EncodeFuture = Pin<Box<dyn Future<Output = Result<Vec<u8>, String>> + Send>>;
type Producer = Box<dyn FnOnce(Serializer) -> EncodeFuture + Send>;

/// One key to pre-populate
pub struct WarmupTask {
    key: String,
    ttl: Option<Duration>,
    producer: Producer,
}

impl WarmupTask {
    /// Task whose value comes from an async producer. `ttl = None` uses the
    /// configured default.
    pub fn new<T, E, F, Fut>(key: impl Into<String>, ttl: Option<Duration>, producer: F) -> Self
    where
        T: Serialize + Send + 'static,
        E: Display + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let producer: Producer = Box::new(move |serializer: Serializer| {
            Box::pin(async move {
                let value = producer().await.map_err(|e| e.to_string())?;
                serializer.encode(&value).map_err(|e| e.to_string())
            }) as EncodeFuture
        });

        Self {
            key: key.into(),
            ttl,
            producer,
        }
    }

    /// Task with a value that is already known
    pub fn ready<T>(key: impl Into<String>, ttl: Option<Duration>, value: T) -> Self
    where
        T: Serialize + Send + 'static,
    {
        Self::new(key, ttl, move || async move { Ok::<T, String>(value) })
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

impl std::fmt::Debug for WarmupTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WarmupTask")
            .field("key", &self.key)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

/// Outcome of a warmup run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarmupReport {
    pub warmed_up: usize,
    /// `"<key>: <reason>"` per failed task
    pub errors: Vec<String>,
}

/// Executes warmup tasks against one orchestrator
pub struct WarmupScheduler<'a> {
    cache: &'a CacheOrchestrator,
}

impl<'a> WarmupScheduler<'a> {
    pub fn new(cache: &'a CacheOrchestrator) -> Self {
        Self { cache }
    }

    pub async fn run(&self, tasks: Vec<WarmupTask>) -> WarmupReport {
        let total = tasks.len();
        let mut report = WarmupReport::default();

        for task in tasks {
            let WarmupTask { key, ttl, producer } = task;

            let bytes = match producer(self.cache.serializer().clone()).await {
                Ok(bytes) => bytes,
                Err(reason) => {
                    warn!("Warmup producer failed for key '{}': {}", key, reason);
                    report.errors.push(format!("{}: {}", key, reason));
                    continue;
                }
            };

            match self.cache.set_encoded(&key, bytes, ttl).await {
                Ok(true) => {
                    debug!("Warmed up key '{}'", key);
                    report.warmed_up += 1;
                }
                Ok(false) => {
                    warn!("Warmup write for key '{}' was rejected by every layer", key);
                    report
                        .errors
                        .push(format!("{}: no layer accepted the write", key));
                }
                Err(e) => report.errors.push(format!("{}: {}", key, e)),
            }
        }

        info!(
            "Warmup finished: {}/{} keys, {} errors",
            report.warmed_up,
            total,
            report.errors.len()
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheConfig;

    async fn local_only() -> CacheOrchestrator {
        CacheOrchestrator::builder(CacheConfig::default())
            .build()
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_failures_do_not_abort_run() {
        let cache = local_only().await;
        let tasks = vec![
            WarmupTask::ready("a", None, 1u32),
            WarmupTask::new("b", None, || async { Err::<u32, _>("database down") }),
            WarmupTask::new("c", Some(Duration::from_secs(30)), || async {
                Ok::<_, String>(vec!["x".to_string()])
            }),
        ];

        let report = WarmupScheduler::new(&cache).run(tasks).await;
        assert_eq!(report.warmed_up, 2);
        assert_eq!(report.errors, vec!["b: database down".to_string()]);

        assert_eq!(cache.get::<u32>("a").await.unwrap(), Some(1));
        assert_eq!(cache.get::<u32>("b").await.unwrap(), None);
        assert_eq!(
            cache.get::<Vec<String>>("c").await.unwrap(),
            Some(vec!["x".to_string()])
        );
    }

    #[tokio::test]
    async fn test_zero_ttl_is_reported() {
        let cache = local_only().await;
        let report = WarmupScheduler::new(&cache)
            .run(vec![WarmupTask::ready("k", Some(Duration::ZERO), 1u8)])
            .await;

        assert_eq!(report.warmed_up, 0);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].starts_with("k: "));
    }

    #[tokio::test]
    async fn test_empty_run() {
        let cache = local_only().await;
        let report = WarmupScheduler::new(&cache).run(Vec::new()).await;
        assert_eq!(report, WarmupReport::default());
    }
}
