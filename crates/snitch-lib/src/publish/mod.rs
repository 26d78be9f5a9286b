//! Metric publishing
//!
//! Points are submitted in consecutive batches of at most
//! [`MAX_BATCH_SIZE`]. Each batch is validated first; invalid or rejected
//! batches are logged and skipped, and publishing moves on to the next one.
//! There is no retry.

mod cloudwatch;

pub use cloudwatch::CloudWatchSink;

use crate::discovery::cancellable;
use crate::error::{Result, SnitchError};
use crate::models::MetricPoint;
use crate::observability::{RunLogger, SnitchMetrics};
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Most points the backend accepts in one submission
pub const MAX_BATCH_SIZE: usize = 20;

/// Dimensions every point must carry
const DIMENSIONS_PER_POINT: usize = 2;

/// Destination for metric batches
#[async_trait]
pub trait MetricsSink: Send + Sync {
    /// Submit one already-validated batch under `namespace`
    async fn put_metric_data(&self, namespace: &str, batch: &[MetricPoint]) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchStatus {
    Published,
    /// Failed validation; never submitted
    Rejected(String),
    /// Submitted, but the backend returned an error
    Failed(String),
    /// Not attempted because the run was cancelled
    Cancelled,
}

impl BatchStatus {
    /// Label used for logs and job metrics
    pub fn label(&self) -> &'static str {
        match self {
            BatchStatus::Published => "published",
            BatchStatus::Rejected(_) => "rejected",
            BatchStatus::Failed(_) => "failed",
            BatchStatus::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Position of the batch, starting at 0
    pub index: usize,
    pub size: usize,
    pub status: BatchStatus,
}

/// Per-batch results of one publish call, in submission order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishReport {
    pub batches: Vec<BatchOutcome>,
}

impl PublishReport {
    pub fn published_batches(&self) -> usize {
        self.batches
            .iter()
            .filter(|b| b.status == BatchStatus::Published)
            .count()
    }

    pub fn published_points(&self) -> usize {
        self.batches
            .iter()
            .filter(|b| b.status == BatchStatus::Published)
            .map(|b| b.size)
            .sum()
    }

    pub fn is_success(&self) -> bool {
        self.batches
            .iter()
            .all(|b| b.status == BatchStatus::Published)
    }
}

/// Check a batch against the backend's required fields before submitting
pub fn validate_batch(namespace: &str, batch: &[MetricPoint]) -> Result<()> {
    if namespace.is_empty() {
        return Err(SnitchError::InvalidBatch("namespace is empty".into()));
    }
    if batch.is_empty() {
        return Err(SnitchError::InvalidBatch("batch has no metric points".into()));
    }
    if batch.len() > MAX_BATCH_SIZE {
        return Err(SnitchError::InvalidBatch(format!(
            "batch has {} points, at most {} allowed",
            batch.len(),
            MAX_BATCH_SIZE
        )));
    }

    for (i, point) in batch.iter().enumerate() {
        if point.dimensions.len() != DIMENSIONS_PER_POINT {
            return Err(SnitchError::InvalidBatch(format!(
                "point {i} ({}) has {} dimensions, expected {}",
                point.name,
                point.dimensions.len(),
                DIMENSIONS_PER_POINT
            )));
        }
        if let Some(d) = point
            .dimensions
            .iter()
            .find(|d| d.name.is_empty() || d.value.is_empty())
        {
            return Err(SnitchError::InvalidBatch(format!(
                "point {i} ({}) has an empty dimension {:?}={:?}",
                point.name, d.name, d.value
            )));
        }
    }

    Ok(())
}

/// Submits metric points to a [`MetricsSink`] in validated batches
pub struct Publisher {
    sink: Arc<dyn MetricsSink>,
    namespace: String,
    batch_size: usize,
    cancel: CancellationToken,
    logger: RunLogger,
    metrics: SnitchMetrics,
}

impl Publisher {
    pub fn new(
        sink: Arc<dyn MetricsSink>,
        namespace: impl Into<String>,
        cancel: CancellationToken,
        logger: RunLogger,
    ) -> Self {
        Self {
            sink,
            namespace: namespace.into(),
            batch_size: MAX_BATCH_SIZE,
            cancel,
            logger,
            metrics: SnitchMetrics::new(),
        }
    }

    /// Use smaller batches; sizes above [`MAX_BATCH_SIZE`] are clamped
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.clamp(1, MAX_BATCH_SIZE);
        self
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Publish `points` batch by batch; never fails as a whole
    pub async fn publish(&self, points: &[MetricPoint]) -> PublishReport {
        tracing::info!(
            points = points.len(),
            batch_size = self.batch_size,
            namespace = %self.namespace,
            "Publishing metrics"
        );

        let mut report = PublishReport::default();
        for (index, batch) in points.chunks(self.batch_size).enumerate() {
            let status = self.publish_batch(index, batch).await;
            self.metrics.inc_batch(status.label());
            report.batches.push(BatchOutcome {
                index,
                size: batch.len(),
                status,
            });
        }
        report
    }

    async fn publish_batch(&self, index: usize, batch: &[MetricPoint]) -> BatchStatus {
        if self.cancel.is_cancelled() {
            return BatchStatus::Cancelled;
        }

        if let Err(e) = validate_batch(&self.namespace, batch) {
            self.logger
                .log_batch_rejected(index, batch.len(), &e.to_string(), &format!("{batch:?}"));
            return BatchStatus::Rejected(e.to_string());
        }

        match cancellable(&self.cancel, self.sink.put_metric_data(&self.namespace, batch)).await {
            Ok(()) => {
                self.logger.log_batch_published(index, batch.len());
                BatchStatus::Published
            }
            Err(SnitchError::Cancelled) => BatchStatus::Cancelled,
            Err(e) => {
                self.metrics.inc_api_error("PutMetricData");
                self.logger
                    .log_batch_failed(index, batch.len(), &e.to_string(), &format!("{batch:?}"));
                BatchStatus::Failed(e.to_string())
            }
        }
    }
}
