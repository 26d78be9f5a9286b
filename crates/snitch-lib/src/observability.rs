//! Observability for snitch runs
//!
//! Provides:
//! - Prometheus job metrics (clusters, API errors, batches, run duration)
//! - Structured JSON event logging with tracing

use anyhow::{Context, Result};
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, Encoder, Histogram,
    IntCounter, IntCounterVec, TextEncoder,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for whole-run duration (in seconds)
const RUN_DURATION_BUCKETS: &[f64] = &[0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 900.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<SnitchMetricsInner> = OnceLock::new();

struct SnitchMetricsInner {
    clusters_discovered: IntCounter,
    clusters_measured: IntCounter,
    clusters_skipped: IntCounter,
    api_errors: IntCounterVec,
    metric_points: IntCounter,
    batches: IntCounterVec,
    run_duration_seconds: Histogram,
}

impl SnitchMetricsInner {
    fn new() -> Self {
        Self {
            clusters_discovered: register_int_counter!(
                "snitch_clusters_discovered_total",
                "ECS clusters discovered"
            )
            .expect("Failed to register clusters_discovered"),

            clusters_measured: register_int_counter!(
                "snitch_clusters_measured_total",
                "ECS clusters measured and turned into metric points"
            )
            .expect("Failed to register clusters_measured"),

            clusters_skipped: register_int_counter!(
                "snitch_clusters_skipped_total",
                "ECS clusters skipped because no task footprint was observed"
            )
            .expect("Failed to register clusters_skipped"),

            api_errors: register_int_counter_vec!(
                "snitch_api_errors_total",
                "Failed ECS or CloudWatch API calls",
                &["operation"]
            )
            .expect("Failed to register api_errors"),

            metric_points: register_int_counter!(
                "snitch_metric_points_total",
                "Metric points produced by measurement"
            )
            .expect("Failed to register metric_points"),

            batches: register_int_counter_vec!(
                "snitch_metric_batches_total",
                "Metric batches handled by the publisher, by status",
                &["status"]
            )
            .expect("Failed to register batches"),

            run_duration_seconds: register_histogram!(
                "snitch_run_duration_seconds",
                "Wall-clock time of one measure-and-publish run",
                RUN_DURATION_BUCKETS.to_vec()
            )
            .expect("Failed to register run_duration_seconds"),
        }
    }
}

/// Handle to the process-wide job metrics
///
/// Clones share the same underlying counters.
#[derive(Clone)]
pub struct SnitchMetrics {
    _private: (),
}

impl Default for SnitchMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl SnitchMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(SnitchMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &SnitchMetricsInner {
        GLOBAL_METRICS.get_or_init(SnitchMetricsInner::new)
    }

    pub fn inc_clusters_discovered(&self) {
        self.inner().clusters_discovered.inc();
    }

    pub fn inc_clusters_measured(&self) {
        self.inner().clusters_measured.inc();
    }

    pub fn inc_clusters_skipped(&self) {
        self.inner().clusters_skipped.inc();
    }

    pub fn inc_api_error(&self, operation: &str) {
        self.inner()
            .api_errors
            .with_label_values(&[operation])
            .inc();
    }

    pub fn add_metric_points(&self, count: usize) {
        self.inner().metric_points.inc_by(count as u64);
    }

    pub fn inc_batch(&self, status: &str) {
        self.inner().batches.with_label_values(&[status]).inc();
    }

    pub fn observe_run_duration(&self, duration_secs: f64) {
        self.inner().run_duration_seconds.observe(duration_secs);
    }

    /// Prometheus text exposition of everything in the default registry
    pub fn render(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder
            .encode(&prometheus::gather(), &mut buffer)
            .context("Failed to encode metrics")?;
        String::from_utf8(buffer).context("Metrics exposition was not UTF-8")
    }
}

/// Structured logger for run events
///
/// Keeps the `event` field and naming consistent so log queries can
/// follow one run from start to finish.
#[derive(Clone)]
pub struct RunLogger {
    namespace: String,
}

impl RunLogger {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    pub fn log_run_started(&self, version: &str, publish: bool, max_concurrent_clusters: usize) {
        info!(
            event = "run_started",
            namespace = %self.namespace,
            version = %version,
            publish = publish,
            max_concurrent_clusters = max_concurrent_clusters,
            "Snitch run started"
        );
    }

    pub fn log_cluster_measured(
        &self,
        cluster: &str,
        cpu: u64,
        memory: u64,
        instance_types: usize,
        points: usize,
    ) {
        info!(
            event = "cluster_measured",
            cluster = %cluster,
            footprint_cpu = cpu,
            footprint_memory_mib = memory,
            instance_types = instance_types,
            metric_points = points,
            "Measured cluster capacity"
        );
    }

    pub fn log_cluster_skipped(&self, cluster: &str, reason: &str) {
        info!(
            event = "cluster_skipped",
            cluster = %cluster,
            reason = %reason,
            "Skipping cluster"
        );
    }

    pub fn log_batch_published(&self, batch: usize, size: usize) {
        info!(
            event = "batch_published",
            namespace = %self.namespace,
            batch = batch,
            size = size,
            "Published metric batch"
        );
    }

    pub fn log_batch_rejected(&self, batch: usize, size: usize, reason: &str, payload: &str) {
        warn!(
            event = "batch_rejected",
            namespace = %self.namespace,
            batch = batch,
            size = size,
            reason = %reason,
            payload = %payload,
            "Metric batch failed validation, not submitted"
        );
    }

    pub fn log_batch_failed(&self, batch: usize, size: usize, error: &str, payload: &str) {
        warn!(
            event = "batch_failed",
            namespace = %self.namespace,
            batch = batch,
            size = size,
            error = %error,
            payload = %payload,
            "Failed to publish metric batch"
        );
    }

    pub fn log_run_finished(
        &self,
        clusters: usize,
        points: usize,
        published_batches: Option<usize>,
        elapsed_secs: f64,
    ) {
        info!(
            event = "run_finished",
            namespace = %self.namespace,
            clusters = clusters,
            metric_points = points,
            published_batches = ?published_batches,
            elapsed_secs = elapsed_secs,
            "Snitch run finished"
        );
    }
}
