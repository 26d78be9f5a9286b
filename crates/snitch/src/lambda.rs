//! AWS Lambda handler
//!
//! Each invocation loads configuration from `SNITCH_*` variables and runs
//! one measure-and-publish pass. The event payload is ignored, so scheduled
//! events and manual test invocations behave the same.

use crate::config::{Overrides, SnitchConfig};
use anyhow::anyhow;
use lambda_runtime::{service_fn, Error, LambdaEvent};
use serde::Serialize;
use serde_json::Value;
use snitch_lib::{ClusterStatus, RunReport};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Response returned to the invoker
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvocationSummary {
    pub clusters: usize,
    pub measured: usize,
    pub skipped: usize,
    pub metric_points: usize,
    /// `None` when publishing is disabled
    pub published_batches: Option<usize>,
    pub failed_batches: Option<usize>,
    pub errors: usize,
}

impl From<&RunReport> for InvocationSummary {
    fn from(report: &RunReport) -> Self {
        Self {
            clusters: report.measure.clusters.len(),
            measured: report.measure.count(ClusterStatus::Measured),
            skipped: report.measure.count(ClusterStatus::Skipped),
            metric_points: report.metric_points().len(),
            published_batches: report.publish.as_ref().map(|p| p.published_batches()),
            failed_batches: report
                .publish
                .as_ref()
                .map(|p| p.batches.len() - p.published_batches()),
            errors: report.measure.error_count(),
        }
    }
}

/// Serve invocations until the runtime shuts the process down
pub async fn serve() -> anyhow::Result<()> {
    info!("Starting Lambda handler");
    lambda_runtime::run(service_fn(handle))
        .await
        .map_err(|e| anyhow!(e))
}

async fn handle(event: LambdaEvent<Value>) -> Result<InvocationSummary, Error> {
    let config = SnitchConfig::load(None, Overrides::default())?;
    info!(
        request_id = %event.context.request_id,
        namespace = %config.namespace,
        publish = config.publish,
        "Lambda invocation"
    );

    let (ecs, sink) = crate::aws_clients(&config).await;
    let cancel = CancellationToken::new();
    crate::spawn_cancellation(cancel.clone(), config.deadline_secs);

    let report = snitch_lib::run(ecs, sink, &config.run_config(), cancel.clone()).await;
    cancel.cancel();

    Ok(InvocationSummary::from(&report))
}
