//! Durable sinks for operation records
//!
//! Records are handed to a background task over a bounded channel and
//! written in batches. A full queue drops the record instead of waiting, so
//! a slow or failing sink never delays a cache call.

use crate::core::{CacheError, OperationRecord};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, info, warn};

/// Append-only destination for operation records
#[async_trait]
pub trait MetricsSink: Send + Sync {
    async fn append(&self, records: &[OperationRecord]) -> Result<(), CacheError>;
}

/// Writes one JSON object per line
pub struct JsonLinesSink {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
}

impl JsonLinesSink {
    /// Open (or create) the file in append mode
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, CacheError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        info!("Metrics sink opened at {:?}", path);
        Ok(Self {
            path,
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl MetricsSink for JsonLinesSink {
    async fn append(&self, records: &[OperationRecord]) -> Result<(), CacheError> {
        let mut writer = self.writer.lock().await;
        for record in records {
            let mut line = serde_json::to_vec(record)
                .map_err(|e| CacheError::Serialization(e.to_string()))?;
            line.push(b'\n');
            writer.write_all(&line).await?;
        }
        writer.flush().await?;
        Ok(())
    }
}

/// Records queued for the writer before new ones are dropped
pub(crate) const QUEUE_CAPACITY: usize = 8192;

/// Handle to the background task feeding a sink
#[derive(Clone)]
pub(crate) struct SinkWriter {
    tx: mpsc::Sender<OperationRecord>,
}

impl SinkWriter {
    /// Spawn the writer task on the current runtime; `None` outside a runtime
    pub(crate) fn spawn(sink: Arc<dyn MetricsSink>) -> Option<Self> {
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                warn!("No async runtime available, metrics sink disabled");
                return None;
            }
        };

        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        handle.spawn(Self::writer_loop(sink, rx));
        Some(Self { tx })
    }

    /// Queue a record without waiting; returns false if it was dropped
    /// because the queue is full or the writer has stopped
    pub(crate) fn submit(&self, record: OperationRecord) -> bool {
        match self.tx.try_send(record) {
            Ok(()) => true,
            Err(TrySendError::Full(record)) => {
                debug!("Metrics sink queue full, dropping record for '{}'", record.key);
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    async fn writer_loop(
        sink: Arc<dyn MetricsSink>,
        mut rx: mpsc::Receiver<OperationRecord>,
    ) {
        const MAX_BATCH_SIZE: usize = 512;
        let mut batch: Vec<OperationRecord> = Vec::with_capacity(MAX_BATCH_SIZE);

        while let Some(record) = rx.recv().await {
            batch.push(record);

            // Drain whatever else is already queued
            while batch.len() < MAX_BATCH_SIZE {
                match rx.try_recv() {
                    Ok(record) => batch.push(record),
                    Err(_) => break,
                }
            }

            if let Err(e) = sink.append(&batch).await {
                warn!("Metrics sink dropped {} records: {}", batch.len(), e);
            } else {
                debug!("Metrics sink wrote {} records", batch.len());
            }
            batch.clear();
        }

        debug!("Metrics sink writer stopped");
    }
}
