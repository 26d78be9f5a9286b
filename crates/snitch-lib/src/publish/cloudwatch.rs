//! CloudWatch `PutMetricData` sink

use super::MetricsSink;
use crate::error::{Result, SnitchError};
use crate::models::{MetricPoint, MetricUnit};
use async_trait::async_trait;
use aws_sdk_cloudwatch::error::DisplayErrorContext;
use aws_sdk_cloudwatch::primitives::DateTime;
use aws_sdk_cloudwatch::types::{Dimension, MetricDatum, StandardUnit};
use aws_sdk_cloudwatch::Client;

/// [`MetricsSink`] over an `aws-sdk-cloudwatch` client
#[derive(Debug, Clone)]
pub struct CloudWatchSink {
    client: Client,
}

impl CloudWatchSink {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn from_conf(config: &aws_config::SdkConfig) -> Self {
        Self::new(Client::new(config))
    }
}

#[async_trait]
impl MetricsSink for CloudWatchSink {
    async fn put_metric_data(&self, namespace: &str, batch: &[MetricPoint]) -> Result<()> {
        self.client
            .put_metric_data()
            .namespace(namespace)
            .set_metric_data(Some(batch.iter().map(metric_datum).collect()))
            .send()
            .await
            .map_err(|e| SnitchError::Submission(DisplayErrorContext(&e).to_string()))?;
        Ok(())
    }
}

fn metric_datum(point: &MetricPoint) -> MetricDatum {
    MetricDatum::builder()
        .metric_name(point.name.as_str())
        .set_dimensions(Some(
            point
                .dimensions
                .iter()
                .map(|d| Dimension::builder().name(&d.name).value(&d.value).build())
                .collect(),
        ))
        .timestamp(DateTime::from_millis(point.timestamp.timestamp_millis()))
        .value(point.value as f64)
        .unit(standard_unit(point.unit))
        .build()
}

fn standard_unit(unit: MetricUnit) -> StandardUnit {
    match unit {
        MetricUnit::Count => StandardUnit::Count,
    }
}
