//! One measure-and-publish run

use crate::discovery::EcsApi;
use crate::measure::{MeasureConfig, MeasureReport, Measurer, DEFAULT_MAX_CONCURRENT_CLUSTERS};
use crate::models::MetricPoint;
use crate::observability::{RunLogger, SnitchMetrics};
use crate::publish::{MetricsSink, PublishReport, Publisher};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Metrics namespace; an empty one gets every batch rejected
    pub namespace: String,
    /// Submit points to the sink; otherwise only measure
    pub publish: bool,
    pub max_concurrent_clusters: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            namespace: String::new(),
            publish: false,
            max_concurrent_clusters: DEFAULT_MAX_CONCURRENT_CLUSTERS,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub measure: MeasureReport,
    /// `None` when publishing was disabled
    pub publish: Option<PublishReport>,
}

impl RunReport {
    pub fn metric_points(&self) -> Vec<MetricPoint> {
        self.measure.metric_points()
    }
}

/// Measure every cluster, then publish the points if asked to
///
/// Failures along the way are logged and kept in the report; the run
/// itself always completes.
pub async fn run(
    ecs: Arc<dyn EcsApi>,
    sink: Arc<dyn MetricsSink>,
    config: &RunConfig,
    cancel: CancellationToken,
) -> RunReport {
    let started = Instant::now();
    let logger = RunLogger::new(&config.namespace);
    let metrics = SnitchMetrics::new();
    logger.log_run_started(
        env!("CARGO_PKG_VERSION"),
        config.publish,
        config.max_concurrent_clusters,
    );

    let measurer = Measurer::new(
        ecs,
        MeasureConfig {
            max_concurrent_clusters: config.max_concurrent_clusters,
        },
        cancel.clone(),
        logger.clone(),
    );
    let measure = measurer.measure().await;

    let publish = if config.publish {
        let publisher = Publisher::new(sink, &config.namespace, cancel, logger.clone());
        Some(publisher.publish(&measure.metric_points()).await)
    } else {
        tracing::info!("Publishing disabled, metric points are not submitted");
        None
    };

    let elapsed = started.elapsed().as_secs_f64();
    metrics.observe_run_duration(elapsed);
    logger.log_run_finished(
        measure.clusters.len(),
        measure.metric_points().len(),
        publish.as_ref().map(PublishReport::published_batches),
        elapsed,
    );

    RunReport { measure, publish }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::mock::MockEcs;
    use crate::publish::mock::MockSink;
    use crate::publish::BatchStatus;

    fn config(publish: bool) -> RunConfig {
        RunConfig {
            namespace: "Testable/Namespace".to_string(),
            publish,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_run_without_publishing() {
        let ecs = Arc::new(MockEcs::fake());
        let sink = Arc::new(MockSink::default());

        let report = run(ecs, sink.clone(), &config(false), CancellationToken::new()).await;

        assert_eq!(report.metric_points().len(), 12);
        assert!(report.publish.is_none());
        assert!(sink.batch_sizes().is_empty());
    }

    #[tokio::test]
    async fn test_run_publishes_all_points() {
        let ecs = Arc::new(MockEcs::fake());
        let sink = Arc::new(MockSink::default());

        let report = run(ecs, sink.clone(), &config(true), CancellationToken::new()).await;

        let publish = report.publish.expect("publishing enabled");
        assert_eq!(publish.batches.len(), 1);
        assert_eq!(publish.batches[0].status, BatchStatus::Published);
        assert_eq!(sink.batch_sizes(), vec![12]);

        let payloads = sink.payloads.lock().unwrap();
        assert_eq!(payloads[0].0, "Testable/Namespace");
        assert_eq!(payloads[0].1.len(), report.measure.metric_points().len());
    }

    #[tokio::test]
    async fn test_run_with_failing_discovery_publishes_nothing() {
        let ecs = Arc::new(MockEcs::fake().failing("ListClusters"));
        let sink = Arc::new(MockSink::default());

        let report = run(ecs, sink.clone(), &config(true), CancellationToken::new()).await;

        assert!(report.measure.clusters.is_empty());
        assert!(!report.measure.discovery.is_complete());
        assert_eq!(report.publish.map(|p| p.batches.len()), Some(0));
        assert!(sink.batch_sizes().is_empty());
    }
}
