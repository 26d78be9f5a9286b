//! ECS API backed by the AWS SDK
//!
//! Credentials and region come from the ambient SDK configuration.

use super::{EcsApi, Page};
use crate::error::{Result, SnitchError};
use crate::models::{ContainerInstance, InstanceAttribute, ResourceValue, TaskSize};
use async_trait::async_trait;
use aws_sdk_ecs::error::DisplayErrorContext;
use aws_sdk_ecs::types::{self as ecs, ContainerInstanceStatus};
use aws_sdk_ecs::Client;
use tracing::debug;

/// [`EcsApi`] over an `aws-sdk-ecs` client
#[derive(Debug, Clone)]
pub struct AwsEcs {
    client: Client,
}

impl AwsEcs {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn from_conf(config: &aws_config::SdkConfig) -> Self {
        Self::new(Client::new(config))
    }
}

#[async_trait]
impl EcsApi for AwsEcs {
    async fn list_clusters(&self, next_token: Option<String>) -> Result<Page<String>> {
        let output = self
            .client
            .list_clusters()
            .set_next_token(next_token)
            .send()
            .await
            .map_err(|e| SnitchError::api("ListClusters", DisplayErrorContext(&e)))?;

        Ok(Page::new(
            output.cluster_arns().to_vec(),
            output.next_token().map(str::to_string),
        ))
    }

    async fn list_tasks(
        &self,
        cluster: &str,
        next_token: Option<String>,
    ) -> Result<Page<String>> {
        let output = self
            .client
            .list_tasks()
            .cluster(cluster)
            .set_next_token(next_token)
            .send()
            .await
            .map_err(|e| SnitchError::api("ListTasks", DisplayErrorContext(&e)))?;

        Ok(Page::new(
            output.task_arns().to_vec(),
            output.next_token().map(str::to_string),
        ))
    }

    async fn describe_tasks(&self, cluster: &str, tasks: &[String]) -> Result<Vec<TaskSize>> {
        let output = self
            .client
            .describe_tasks()
            .cluster(cluster)
            .set_tasks(Some(tasks.to_vec()))
            .send()
            .await
            .map_err(|e| SnitchError::api("DescribeTasks", DisplayErrorContext(&e)))?;

        log_failures(cluster, "DescribeTasks", output.failures());

        Ok(output.tasks().iter().map(task_size).collect())
    }

    async fn list_container_instances(&self, cluster: &str) -> Result<Vec<String>> {
        let output = self
            .client
            .list_container_instances()
            .cluster(cluster)
            .status(ContainerInstanceStatus::Active)
            .send()
            .await
            .map_err(|e| SnitchError::api("ListContainerInstances", DisplayErrorContext(&e)))?;

        if output.next_token().is_some() {
            debug!(cluster = %cluster, "More container instances than one page; reading the first page only");
        }

        Ok(output.container_instance_arns().to_vec())
    }

    async fn describe_container_instances(
        &self,
        cluster: &str,
        instances: &[String],
    ) -> Result<Vec<ContainerInstance>> {
        let output = self
            .client
            .describe_container_instances()
            .cluster(cluster)
            .set_container_instances(Some(instances.to_vec()))
            .send()
            .await
            .map_err(|e| {
                SnitchError::api("DescribeContainerInstances", DisplayErrorContext(&e))
            })?;

        log_failures(cluster, "DescribeContainerInstances", output.failures());

        Ok(output
            .container_instances()
            .iter()
            .map(container_instance)
            .collect())
    }
}

fn log_failures(cluster: &str, operation: &str, failures: &[ecs::Failure]) {
    for failure in failures {
        debug!(
            cluster = %cluster,
            operation = %operation,
            arn = ?failure.arn(),
            reason = ?failure.reason(),
            "ECS reported a failure for one resource"
        );
    }
}

fn task_size(task: &ecs::Task) -> TaskSize {
    TaskSize {
        task_arn: task.task_arn().map(str::to_string),
        cpu: task.cpu().map(str::to_string),
        memory: task.memory().map(str::to_string),
    }
}

fn container_instance(instance: &ecs::ContainerInstance) -> ContainerInstance {
    ContainerInstance {
        arn: instance.container_instance_arn().map(str::to_string),
        attributes: instance
            .attributes()
            .iter()
            .map(|attr| InstanceAttribute {
                name: attr.name().to_string(),
                value: attr.value().map(str::to_string),
            })
            .collect(),
        registered_resources: resource_values(instance.registered_resources()),
        remaining_resources: resource_values(instance.remaining_resources()),
    }
}

fn resource_values(resources: &[ecs::Resource]) -> Vec<ResourceValue> {
    resources
        .iter()
        .filter_map(|r| {
            r.name()
                .map(|name| ResourceValue::new(name, i64::from(r.integer_value())))
        })
        .collect()
}
