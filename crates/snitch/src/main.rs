//! ECS Snitch - schedulable capacity reporter
//!
//! Measures, per cluster and instance type, how many containers the size of
//! the cluster's largest task still fit, and optionally publishes the counts
//! to CloudWatch.
//!
//! Runs as a flag-driven CLI, or as a Lambda function handler when started
//! by the Lambda runtime.

mod config;
mod lambda;
mod output;

use anyhow::{Context, Result};
use aws_config::{BehaviorVersion, Region};
use clap::Parser;
use snitch_lib::{AwsEcs, CloudWatchSink, SnitchMetrics};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const PERMISSIONS_HELP: &str = "\
Required IAM permissions:
  ecs:ListClusters
  ecs:ListTasks
  ecs:DescribeTasks
  ecs:ListContainerInstances
  ecs:DescribeContainerInstances
  cloudwatch:PutMetricData   (only with --publish)

Settings are read from built-in defaults, then --config, then SNITCH_*
environment variables (SNITCH_NAMESPACE, SNITCH_MAX_CONCURRENT_CLUSTERS, ...),
then flags. On the command line only -p/--publish turns publishing on; the
`publish` key and SNITCH_PUBLISH apply to Lambda invocations.

Under AWS Lambda (AWS_LAMBDA_RUNTIME_API set) flags are ignored and every
invocation reads its settings from SNITCH_* variables.";

/// Set by the Lambda execution environment
const LAMBDA_RUNTIME_API_ENV: &str = "AWS_LAMBDA_RUNTIME_API";

/// How the process was started
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Cli,
    Lambda,
}

impl RunMode {
    /// Lambda when the runtime API address is present and non-empty
    pub fn detect(runtime_api: Option<&str>) -> Self {
        match runtime_api {
            Some(api) if !api.trim().is_empty() => RunMode::Lambda,
            _ => RunMode::Cli,
        }
    }
}

/// ECS capacity snitch
#[derive(Parser)]
#[command(name = "ecs-snitch")]
#[command(author, version, about = "Report ECS schedulable capacity by instance type")]
#[command(after_long_help = PERMISSIONS_HELP)]
pub struct Cli {
    /// CloudWatch namespace for published metrics
    #[arg(long, short)]
    pub namespace: Option<String>,

    /// Publish metrics to CloudWatch (dry run otherwise)
    #[arg(long, short)]
    pub publish: bool,

    /// AWS region (defaults to the SDK's region chain)
    #[arg(long)]
    pub region: Option<String>,

    /// Maximum number of clusters measured concurrently
    #[arg(long)]
    pub max_concurrent_clusters: Option<usize>,

    /// Cancel the run after this many seconds
    #[arg(long)]
    pub deadline_secs: Option<u64>,

    /// Configuration file (toml, yaml, json)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    /// Write Prometheus job metrics to this file after the run
    #[arg(long)]
    pub metrics_file: Option<PathBuf>,

    /// Enable verbose output
    #[arg(long, short)]
    pub verbose: bool,
}

impl Cli {
    fn overrides(&self) -> config::Overrides {
        config::Overrides {
            namespace: self.namespace.clone(),
            publish: Some(self.publish),
            region: self.region.clone(),
            max_concurrent_clusters: self.max_concurrent_clusters,
            deadline_secs: self.deadline_secs,
            metrics_file: self.metrics_file.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    match RunMode::detect(std::env::var(LAMBDA_RUNTIME_API_ENV).ok().as_deref()) {
        RunMode::Lambda => {
            init_tracing(false);
            lambda::serve().await
        }
        RunMode::Cli => run_cli(Cli::parse()).await,
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with(fmt::layer().json().with_writer(std::io::stderr))
        .init();
}

async fn run_cli(cli: Cli) -> Result<()> {
    init_tracing(cli.verbose);

    let config = config::SnitchConfig::load(cli.config.as_deref(), cli.overrides())?;
    info!(
        namespace = %config.namespace,
        publish = config.publish,
        region = ?config.region,
        "Snitch configured"
    );

    let (ecs, sink) = aws_clients(&config).await;

    let cancel = CancellationToken::new();
    spawn_cancellation(cancel.clone(), config.deadline_secs);

    let report = snitch_lib::run(ecs, sink, &config.run_config(), cancel.clone()).await;
    cancel.cancel();

    output::print_report(&report, cli.format);

    if let Some(path) = &config.metrics_file {
        write_metrics_file(path)?;
    }

    Ok(())
}

/// ECS and CloudWatch clients from the SDK's default chain
async fn aws_clients(config: &config::SnitchConfig) -> (Arc<AwsEcs>, Arc<CloudWatchSink>) {
    let mut loader = aws_config::defaults(BehaviorVersion::latest());
    if let Some(region) = &config.region {
        loader = loader.region(Region::new(region.clone()));
    }
    let sdk_config = loader.load().await;
    (
        Arc::new(AwsEcs::from_conf(&sdk_config)),
        Arc::new(CloudWatchSink::from_conf(&sdk_config)),
    )
}

/// Cancel the run on Ctrl-C or once the deadline passes
fn spawn_cancellation(cancel: CancellationToken, deadline_secs: Option<u64>) {
    tokio::spawn(async move {
        let deadline = async {
            match deadline_secs {
                Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            _ = cancel.cancelled() => return,
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    warn!(error = %e, "Failed to listen for Ctrl-C");
                    return;
                }
                warn!("Interrupted, cancelling run");
            }
            _ = deadline => warn!(deadline_secs = ?deadline_secs, "Deadline reached, cancelling run"),
        }
        cancel.cancel();
    });
}

fn write_metrics_file(path: &std::path::Path) -> Result<()> {
    let text = SnitchMetrics::new().render()?;
    std::fs::write(path, text)
        .with_context(|| format!("Failed to write metrics file {}", path.display()))?;
    info!(path = %path.display(), "Wrote job metrics");
    Ok(())
}
