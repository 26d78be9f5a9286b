//! In-memory ECS for tests
//!
//! Pages are addressed by index; the next token is the index of the
//! following page.

use super::{EcsApi, Page};
use crate::error::{Result, SnitchError};
use crate::models::{
    resources, ContainerInstance, InstanceAttribute, ResourceValue, TaskSize,
    INSTANCE_TYPE_ATTRIBUTE,
};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

pub(crate) const INSTANCE_CPU: i64 = 8192;
pub(crate) const INSTANCE_MEMORY: i64 = 15468;
pub(crate) const EXPECTED_CPU: u64 = 2560;
pub(crate) const EXPECTED_MEMORY: u64 = 3072;

pub(crate) struct MockEcs {
    pub cluster_pages: Vec<Vec<String>>,
    pub task_pages: Vec<Vec<String>>,
    /// Returned for every DescribeTasks call unless `task_sizes_by_arn` is set
    pub task_sizes: Vec<TaskSize>,
    /// Per-ARN sizes; unknown ARNs are left out of the response
    pub task_sizes_by_arn: HashMap<String, TaskSize>,
    pub container_instance_arns: Vec<String>,
    pub container_instances: Vec<ContainerInstance>,
    /// Clusters that list no tasks at all
    pub idle_clusters: HashSet<String>,
    /// Operations that always fail
    pub failing: HashSet<&'static str>,
    /// Fail ListClusters when asked for this page index
    pub fail_cluster_page: Option<usize>,
    /// Added latency for DescribeTasks
    pub delay: Option<Duration>,
    calls: Mutex<Vec<(&'static str, String)>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockEcs {
    /// Three clusters, three tasks per cluster, three fake.2xlarge instances
    pub fn fake() -> Self {
        let registered = vec![
            ResourceValue::new(resources::CPU, INSTANCE_CPU),
            ResourceValue::new(resources::MEMORY, INSTANCE_MEMORY),
        ];
        let remaining = vec![
            ResourceValue::new(resources::CPU, INSTANCE_CPU - EXPECTED_CPU as i64),
            ResourceValue::new(resources::MEMORY, INSTANCE_MEMORY - EXPECTED_MEMORY as i64),
        ];

        Self {
            cluster_pages: vec![
                vec!["arn:aws:ecs:us-east-1:123456789012:cluster/fake-ecs-cluster".to_string()],
                vec!["arn:aws:ecs:us-east-1:123456789012:cluster/another-fake-ecs-cluster"
                    .to_string()],
                vec!["arn:aws:ecs:us-east-1:123456789012:cluster/who-even-uses-fargate"
                    .to_string()],
            ],
            task_pages: vec![vec![
                "arn:aws:ecs:us-east-1:123456789012:task/1394beef-718f-42d7-b37b-97363e9ac917"
                    .to_string(),
                "arn:aws:ecs:us-east-1:123456789012:task/6649bf9d-7b1d-4ed7-9920-e0404ed4f2e5"
                    .to_string(),
                "arn:aws:ecs:us-east-1:123456789012:task/b9cfa5da-e760-457a-8673-1b61eb668b33"
                    .to_string(),
            ]],
            task_sizes: vec![
                TaskSize::new(EXPECTED_CPU.to_string(), "1440"),
                TaskSize::new("1024", EXPECTED_MEMORY.to_string()),
                TaskSize::new("invalidCPU", "invalidMemory"),
            ],
            container_instance_arns: (0..3)
                .map(|i| format!("arn:aws:ecs:us-east-1:123456789012:container-instance/{i}"))
                .collect(),
            container_instances: (0..3)
                .map(|_| fake_instance("fake.2xlarge", registered.clone(), remaining.clone()))
                .collect(),
            task_sizes_by_arn: HashMap::new(),
            idle_clusters: HashSet::new(),
            failing: HashSet::new(),
            fail_cluster_page: None,
            delay: None,
            calls: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn failing(mut self, operation: &'static str) -> Self {
        self.failing.insert(operation);
        self
    }

    pub fn idle(mut self, cluster: &str) -> Self {
        self.idle_clusters.insert(cluster.to_string());
        self
    }

    pub fn calls(&self, operation: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(op, _)| *op == operation)
            .count()
    }

    pub fn calls_for(&self, operation: &str, cluster: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(op, c)| *op == operation && c == cluster)
            .count()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn record(&self, operation: &'static str, cluster: &str) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push((operation, cluster.to_string()));
        if self.failing.contains(operation) {
            return Err(SnitchError::api(operation, "injected failure"));
        }
        Ok(())
    }
}

pub(crate) fn fake_instance(
    instance_type: &str,
    registered: Vec<ResourceValue>,
    remaining: Vec<ResourceValue>,
) -> ContainerInstance {
    ContainerInstance {
        arn: None,
        attributes: vec![InstanceAttribute {
            name: INSTANCE_TYPE_ATTRIBUTE.to_string(),
            value: Some(instance_type.to_string()),
        }],
        registered_resources: registered,
        remaining_resources: remaining,
    }
}

fn page_at<T: Clone>(pages: &[Vec<T>], token: Option<String>) -> Page<T> {
    let index = token.and_then(|t| t.parse::<usize>().ok()).unwrap_or(0);
    let items = pages.get(index).cloned().unwrap_or_default();
    let next_token = (index + 1 < pages.len()).then(|| (index + 1).to_string());
    Page::new(items, next_token)
}

#[async_trait]
impl EcsApi for MockEcs {
    async fn list_clusters(&self, next_token: Option<String>) -> Result<Page<String>> {
        self.record("ListClusters", "")?;
        let index = next_token
            .as_deref()
            .and_then(|t| t.parse::<usize>().ok())
            .unwrap_or(0);
        if self.fail_cluster_page == Some(index) {
            return Err(SnitchError::api("ListClusters", "page failure"));
        }
        Ok(page_at(&self.cluster_pages, next_token))
    }

    async fn list_tasks(
        &self,
        cluster: &str,
        next_token: Option<String>,
    ) -> Result<Page<String>> {
        self.record("ListTasks", cluster)?;
        if self.idle_clusters.contains(cluster) {
            return Ok(Page::last(Vec::new()));
        }
        Ok(page_at(&self.task_pages, next_token))
    }

    async fn describe_tasks(&self, cluster: &str, tasks: &[String]) -> Result<Vec<TaskSize>> {
        self.record("DescribeTasks", cluster)?;

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.task_sizes_by_arn.is_empty() {
            return Ok(self.task_sizes.clone());
        }
        Ok(tasks
            .iter()
            .filter_map(|arn| self.task_sizes_by_arn.get(arn).cloned())
            .collect())
    }

    async fn list_container_instances(&self, cluster: &str) -> Result<Vec<String>> {
        self.record("ListContainerInstances", cluster)?;
        Ok(self.container_instance_arns.clone())
    }

    async fn describe_container_instances(
        &self,
        cluster: &str,
        _instances: &[String],
    ) -> Result<Vec<ContainerInstance>> {
        self.record("DescribeContainerInstances", cluster)?;
        Ok(self.container_instances.clone())
    }
}
