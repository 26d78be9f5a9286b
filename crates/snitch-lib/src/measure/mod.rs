//! Cluster capacity measurement
//!
//! Each discovered cluster is measured by its own task, bounded by a
//! semaphore. A cluster's pass has two strictly ordered phases:
//!
//! 1. Footprint: describe every running task and keep the largest CPU and
//!    the largest memory reservation seen, independently.
//! 2. Capacity: describe the ACTIVE container instances and count how many
//!    footprint-sized containers each instance type can host.
//!
//! Results come back over a channel; nothing is shared between cluster tasks.


use crate::capacity::containers_for;
use crate::discovery::{
    cancellable, discover_clusters, discover_tasks, list_container_instances, DiscoveryOutcome,
    EcsApi,
};
use crate::error::SnitchError;
use crate::ledger::ClusterResources;
use crate::models::{Footprint, MetricPoint, TaskSize};
use crate::observability::{RunLogger, SnitchMetrics};
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default cap on clusters measured at the same time
pub const DEFAULT_MAX_CONCURRENT_CLUSTERS: usize = 16;

/// Configuration for a measurement pass
#[derive(Debug, Clone)]
pub struct MeasureConfig {
    /// Maximum number of clusters measured concurrently (at least 1)
    pub max_concurrent_clusters: usize,
}

impl Default for MeasureConfig {
    fn default() -> Self {
        Self {
            max_concurrent_clusters: DEFAULT_MAX_CONCURRENT_CLUSTERS,
        }
    }
}

/// How a cluster's pass ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterStatus {
    /// Both phases ran; `points` holds the result (possibly empty)
    Measured,
    /// No usable footprint, so capacity was never measured
    Skipped,
    /// The run was cancelled mid-pass; partial results were discarded
    Cancelled,
}

/// Result of measuring one cluster
#[derive(Debug, Clone)]
pub struct ClusterOutcome {
    pub cluster: String,
    pub footprint: Footprint,
    pub status: ClusterStatus,
    pub points: Vec<MetricPoint>,
    /// Non-fatal failures seen during the pass
    pub errors: Vec<SnitchError>,
}

impl ClusterOutcome {
    fn new(cluster: &str) -> Self {
        Self {
            cluster: cluster.to_string(),
            footprint: Footprint::default(),
            status: ClusterStatus::Skipped,
            points: Vec::new(),
            errors: Vec::new(),
        }
    }
}

/// Result of measuring every discovered cluster
#[derive(Debug, Clone, Default)]
pub struct MeasureReport {
    /// How cluster discovery ended
    pub discovery: DiscoveryOutcome,
    /// One entry per dispatched cluster, in completion order
    pub clusters: Vec<ClusterOutcome>,
    /// Cluster tasks that ended without reporting (panicked)
    pub lost_tasks: usize,
}

impl MeasureReport {
    /// All metric points, concatenated across clusters
    pub fn metric_points(&self) -> Vec<MetricPoint> {
        self.clusters
            .iter()
            .flat_map(|c| c.points.iter().cloned())
            .collect()
    }

    pub fn into_metric_points(self) -> Vec<MetricPoint> {
        self.clusters.into_iter().flat_map(|c| c.points).collect()
    }

    pub fn cluster(&self, name: &str) -> Option<&ClusterOutcome> {
        self.clusters.iter().find(|c| c.cluster == name)
    }

    pub fn count(&self, status: ClusterStatus) -> usize {
        self.clusters.iter().filter(|c| c.status == status).count()
    }

    /// Number of failures recorded anywhere in the pass
    pub fn error_count(&self) -> usize {
        self.clusters.iter().map(|c| c.errors.len()).sum::<usize>()
            + usize::from(self.discovery.error.is_some())
            + self.lost_tasks
    }
}

/// Drives discovery and measurement for every cluster
#[derive(Clone)]
pub struct Measurer {
    ecs: Arc<dyn EcsApi>,
    config: MeasureConfig,
    cancel: CancellationToken,
    logger: RunLogger,
    metrics: SnitchMetrics,
}

impl Measurer {
    pub fn new(
        ecs: Arc<dyn EcsApi>,
        config: MeasureConfig,
        cancel: CancellationToken,
        logger: RunLogger,
    ) -> Self {
        Self {
            ecs,
            config,
            cancel,
            logger,
            metrics: SnitchMetrics::new(),
        }
    }

    /// Measure every cluster the credentials can see
    ///
    /// Never fails: API errors are logged and recorded in the report.
    pub async fn measure(&self) -> MeasureReport {
        let limit = Arc::new(Semaphore::new(self.config.max_concurrent_clusters.max(1)));
        let (tx, mut rx) = mpsc::unbounded_channel::<ClusterOutcome>();
        let mut clusters = discover_clusters(self.ecs.clone(), self.cancel.clone());
        let mut dispatched = 0usize;

        while let Some(cluster) = clusters.next().await {
            self.metrics.inc_clusters_discovered();

            let Ok(permit) = limit.clone().acquire_owned().await else {
                break;
            };
            let measurer = self.clone();
            let tx = tx.clone();
            tokio::spawn(async move {
                let outcome = measurer.measure_cluster(&cluster).await;
                drop(permit);
                let _ = tx.send(outcome);
            });
            dispatched += 1;
        }

        let discovery = clusters.finish().await;
        if let Some(SnitchError::Api { operation, .. }) = &discovery.error {
            self.metrics.inc_api_error(operation);
        }
        drop(tx);

        let mut outcomes = Vec::with_capacity(dispatched);
        while outcomes.len() < dispatched {
            match rx.recv().await {
                Some(outcome) => outcomes.push(outcome),
                None => break,
            }
        }

        let lost_tasks = dispatched - outcomes.len();
        if lost_tasks > 0 {
            warn!(lost = lost_tasks, "Some cluster measurements ended without a result");
        }

        MeasureReport {
            discovery,
            clusters: outcomes,
            lost_tasks,
        }
    }

    /// Measure a single cluster by name
    pub async fn measure_cluster(&self, cluster: &str) -> ClusterOutcome {
        let mut outcome = ClusterOutcome::new(cluster);

        outcome.footprint = self.measure_footprint(cluster, &mut outcome.errors).await;
        if self.cancel.is_cancelled() {
            outcome.status = ClusterStatus::Cancelled;
            return outcome;
        }
        if !outcome.footprint.is_usable() {
            self.logger
                .log_cluster_skipped(cluster, "doesn't appear to be running any tasks");
            self.metrics.inc_clusters_skipped();
            return outcome;
        }
        info!(
            cluster = %cluster,
            cpu = outcome.footprint.cpu,
            memory_mib = outcome.footprint.memory,
            "Lowest common multiple container size"
        );

        let ledger = self
            .measure_capacity(cluster, outcome.footprint, &mut outcome.errors)
            .await;
        if self.cancel.is_cancelled() {
            outcome.status = ClusterStatus::Cancelled;
            return outcome;
        }

        outcome.points = ledger.to_metric_points();
        outcome.status = ClusterStatus::Measured;
        self.logger.log_cluster_measured(
            cluster,
            outcome.footprint.cpu,
            outcome.footprint.memory,
            ledger.instance_types().count(),
            outcome.points.len(),
        );
        self.metrics.inc_clusters_measured();
        self.metrics.add_metric_points(outcome.points.len());
        outcome
    }

    /// Phase 1: independent CPU and memory maxima over all running tasks
    async fn measure_footprint(&self, cluster: &str, errors: &mut Vec<SnitchError>) -> Footprint {
        let mut footprint = Footprint::default();
        let mut batches = discover_tasks(self.ecs.clone(), cluster.to_string(), self.cancel.clone());

        while let Some(batch) = batches.next().await {
            match cancellable(&self.cancel, self.ecs.describe_tasks(cluster, &batch)).await {
                Ok(tasks) => {
                    let cohort = task_footprint(cluster, &tasks);
                    debug!(
                        cluster = %cluster,
                        tasks = tasks.len(),
                        cpu = cohort.cpu,
                        memory_mib = cohort.memory,
                        "Largest container in cohort"
                    );
                    footprint.merge(cohort);
                }
                Err(e) if e.is_cancelled() => break,
                Err(e) => {
                    warn!(cluster = %cluster, error = %e, "Failed to describe tasks");
                    self.record_error(e, errors);
                }
            }
        }

        if let Some(e) = batches.finish().await.error {
            self.record_error(e, errors);
        }

        footprint
    }

    /// Phase 2: schedulable containers per instance type
    async fn measure_capacity(
        &self,
        cluster: &str,
        footprint: Footprint,
        errors: &mut Vec<SnitchError>,
    ) -> ClusterResources {
        let mut ledger = ClusterResources::new(cluster);

        let arns = match list_container_instances(self.ecs.as_ref(), cluster, &self.cancel).await {
            Ok(arns) => arns,
            Err(e) => {
                self.record_error(e, errors);
                Vec::new()
            }
        };
        if arns.is_empty() {
            debug!(cluster = %cluster, "No active container instances");
            return ledger;
        }

        let instances = match cancellable(
            &self.cancel,
            self.ecs.describe_container_instances(cluster, &arns),
        )
        .await
        {
            Ok(instances) => instances,
            Err(e) => {
                warn!(cluster = %cluster, error = %e, "Failed to describe container instances");
                self.record_error(e, errors);
                return ledger;
            }
        };

        for instance in &instances {
            ledger.record(
                instance.instance_type(),
                footprint,
                containers_for(footprint, &instance.registered_resources),
                containers_for(footprint, &instance.remaining_resources),
            );
        }
        debug!(cluster = %cluster, ledger = ?ledger, "Collated resources by instance type");

        ledger
    }

    /// Cancellation is reported through [`ClusterStatus::Cancelled`], not here
    fn record_error(&self, error: SnitchError, errors: &mut Vec<SnitchError>) {
        if error.is_cancelled() {
            return;
        }
        if let SnitchError::Api { operation, .. } = &error {
            self.metrics.inc_api_error(operation);
        }
        errors.push(error);
    }
}

/// Largest CPU and memory among `tasks`, taken independently
///
/// Missing or non-numeric values count as zero and are logged.
pub fn task_footprint(cluster: &str, tasks: &[TaskSize]) -> Footprint {
    let mut footprint = Footprint::default();
    for task in tasks {
        footprint.observe(
            parse_units(cluster, "cpu", task.cpu.as_deref()),
            parse_units(cluster, "memory", task.memory.as_deref()),
        );
    }
    footprint
}

fn parse_units(cluster: &str, field: &str, raw: Option<&str>) -> u64 {
    let Some(raw) = raw else {
        debug!(cluster = %cluster, field = %field, "Task has no reservation for field");
        return 0;
    };

    raw.trim().parse().unwrap_or_else(|e| {
        warn!(
            cluster = %cluster,
            field = %field,
            value = %raw,
            error = %e,
            "Failed to parse task reservation, counting it as zero"
        );
        0
    })
}
