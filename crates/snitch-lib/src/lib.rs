//! ECS capacity snitch library
//!
//! This crate provides the core functionality for:
//! - Discovering clusters, tasks and container instances through the ECS API
//! - Measuring each cluster's largest task footprint
//! - Counting how many footprint-sized containers fit per instance type
//! - Publishing the resulting metric points to CloudWatch in batches
//! - Job metrics and structured run logging

pub mod capacity;
pub mod discovery;
pub mod error;
pub mod ledger;
pub mod measure;
pub mod models;
pub mod observability;
pub mod publish;
pub mod runner;

pub use discovery::{AwsEcs, EcsApi};
pub use error::{Result, SnitchError};
pub use measure::{ClusterOutcome, ClusterStatus, MeasureConfig, MeasureReport, Measurer};
pub use models::*;
pub use observability::{RunLogger, SnitchMetrics};
pub use publish::{BatchOutcome, BatchStatus, CloudWatchSink, MetricsSink, PublishReport, Publisher};
pub use runner::{run, RunConfig, RunReport};
