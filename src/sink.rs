//! Metric sinks.
//!
//! The orchestrator hands each run's batch to a [`MetricSink`] at most once,
//! and never with an empty batch.

use std::sync::Mutex;

use crate::metric::CollectedMetric;
use crate::Result;

/// Destination for collected batches
#[async_trait::async_trait]
pub trait MetricSink: Send + Sync {
    /// Publish one run's batch. Failures are reported as [`crate::Error::Publish`].
    async fn publish(&self, batch: Vec<CollectedMetric>) -> Result<()>;
}

/// Writes every metric through `tracing` at info level
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

#[async_trait::async_trait]
impl MetricSink for LogSink {
    async fn publish(&self, batch: Vec<CollectedMetric>) -> Result<()> {
        tracing::info!(count = batch.len(), "publishing metrics");
        for metric in &batch {
            tracing::info!(path = %metric.full_path, value = %metric.value, "metric");
        }
        Ok(())
    }
}

/// Keeps every published batch in memory (for tests)
#[derive(Debug, Default)]
pub struct MemorySink {
    batches: Mutex<Vec<Vec<CollectedMetric>>>,
    reject_with: Option<String>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink that records the batch and then rejects it
    pub fn rejecting(message: impl Into<String>) -> Self {
        Self {
            batches: Mutex::new(Vec::new()),
            reject_with: Some(message.into()),
        }
    }

    /// Every batch received so far
    pub fn batches(&self) -> Vec<Vec<CollectedMetric>> {
        self.batches.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn publish_count(&self) -> usize {
        self.batches.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// The most recent batch, if any
    pub fn last_batch(&self) -> Option<Vec<CollectedMetric>> {
        self.batches
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .last()
            .cloned()
    }
}

#[async_trait::async_trait]
impl MetricSink for MemorySink {
    async fn publish(&self, batch: Vec<CollectedMetric>) -> Result<()> {
        self.batches
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(batch);
        match self.reject_with {
            Some(ref message) => Err(crate::Error::Publish(message.clone())),
            None => Ok(()),
        }
    }
}
