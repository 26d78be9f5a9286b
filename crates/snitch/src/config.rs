//! Snitch configuration
//!
//! Layered lowest to highest: built-in defaults, an optional config file,
//! `SNITCH_*` environment variables, then command-line flags.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use snitch_lib::measure::DEFAULT_MAX_CONCURRENT_CLUSTERS;
use snitch_lib::RunConfig;
use std::path::{Path, PathBuf};

/// Prefix of environment variables read into the configuration
const ENV_PREFIX: &str = "SNITCH";

/// Snitch configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SnitchConfig {
    /// CloudWatch namespace the metrics go to
    #[serde(default)]
    pub namespace: String,

    /// Submit metrics; otherwise measure only. The CLI always sets this from `-p`
    #[serde(default)]
    pub publish: bool,

    /// AWS region, falling back to the SDK's default chain
    #[serde(default)]
    pub region: Option<String>,

    /// Clusters measured at the same time
    #[serde(default = "default_max_concurrent_clusters")]
    pub max_concurrent_clusters: usize,

    /// Cancel the run after this many seconds
    #[serde(default)]
    pub deadline_secs: Option<u64>,

    /// Write Prometheus job metrics here after the run
    #[serde(default)]
    pub metrics_file: Option<PathBuf>,
}

fn default_max_concurrent_clusters() -> usize {
    DEFAULT_MAX_CONCURRENT_CLUSTERS
}

impl Default for SnitchConfig {
    fn default() -> Self {
        Self {
            namespace: String::new(),
            publish: false,
            region: None,
            max_concurrent_clusters: default_max_concurrent_clusters(),
            deadline_secs: None,
            metrics_file: None,
        }
    }
}

/// Values given on the command line; `None` leaves the lower layers alone
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub namespace: Option<String>,
    pub publish: Option<bool>,
    pub region: Option<String>,
    pub max_concurrent_clusters: Option<usize>,
    pub deadline_secs: Option<u64>,
    pub metrics_file: Option<PathBuf>,
}

impl SnitchConfig {
    /// Load configuration from file, process environment and flags
    pub fn load(file: Option<&Path>, overrides: Overrides) -> Result<Self> {
        Self::load_from(file, config::Environment::with_prefix(ENV_PREFIX), overrides)
    }

    fn load_from(
        file: Option<&Path>,
        env: config::Environment,
        overrides: Overrides,
    ) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let layered = builder
            .add_source(env.try_parsing(true))
            .build()
            .context("Failed to read configuration")?;

        let mut config: SnitchConfig = layered
            .try_deserialize()
            .context("Failed to parse configuration")?;
        config.apply(overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply(&mut self, overrides: Overrides) {
        if let Some(namespace) = overrides.namespace {
            self.namespace = namespace;
        }
        if let Some(publish) = overrides.publish {
            self.publish = publish;
        }
        if overrides.region.is_some() {
            self.region = overrides.region;
        }
        if let Some(max) = overrides.max_concurrent_clusters {
            self.max_concurrent_clusters = max;
        }
        if overrides.deadline_secs.is_some() {
            self.deadline_secs = overrides.deadline_secs;
        }
        if overrides.metrics_file.is_some() {
            self.metrics_file = overrides.metrics_file;
        }
    }

    fn validate(&self) -> Result<()> {
        if self.max_concurrent_clusters == 0 {
            bail!("max_concurrent_clusters must be at least 1");
        }
        if self.deadline_secs == Some(0) {
            bail!("deadline_secs must be at least 1 when set");
        }
        Ok(())
    }

    pub fn run_config(&self) -> RunConfig {
        RunConfig {
            namespace: self.namespace.clone(),
            publish: self.publish,
            max_concurrent_clusters: self.max_concurrent_clusters,
        }
    }
}
