//! ECS resource discovery
//!
//! Clusters and task ARNs are listed page by page by a background producer
//! and handed to the consumer through a channel, so each page fetch is a
//! suspension point and the consumer sees a finite, non-restartable stream.
//! Listing errors end the stream early; they are reported through
//! [`Discovery::finish`] rather than raised.

mod aws;

#[cfg(test)]
pub(crate) mod mock;
#[cfg(test)]
mod tests;

pub use aws::AwsEcs;

use crate::error::{Result, SnitchError};
use crate::models::{ContainerInstance, TaskSize};
use async_trait::async_trait;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::Stream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Marker separating the ARN prefix from the cluster name
const CLUSTER_ARN_MARKER: &str = ":cluster/";

/// Channel depth between a page producer and its consumer
const DISCOVERY_CHANNEL_SIZE: usize = 16;

/// One page of a paginated listing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_token: Option<String>,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, next_token: Option<String>) -> Self {
        Self { items, next_token }
    }

    pub fn last(items: Vec<T>) -> Self {
        Self::new(items, None)
    }
}

/// The subset of the ECS API the snitch reads from
#[async_trait]
pub trait EcsApi: Send + Sync {
    /// List one page of cluster ARNs
    async fn list_clusters(&self, next_token: Option<String>) -> Result<Page<String>>;

    /// List one page of task ARNs in a cluster
    async fn list_tasks(&self, cluster: &str, next_token: Option<String>)
        -> Result<Page<String>>;

    /// Describe tasks by ARN (at most 100 per call)
    async fn describe_tasks(&self, cluster: &str, tasks: &[String]) -> Result<Vec<TaskSize>>;

    /// List ACTIVE container instance ARNs; first page only
    async fn list_container_instances(&self, cluster: &str) -> Result<Vec<String>>;

    /// Describe container instances by ARN (at most 100 per call)
    async fn describe_container_instances(
        &self,
        cluster: &str,
        instances: &[String],
    ) -> Result<Vec<ContainerInstance>>;
}

/// How a discovery stream ended
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveryOutcome {
    /// Pages fetched successfully
    pub pages: usize,
    /// Items handed to the consumer
    pub items: usize,
    /// Set when listing stopped because of an error or cancellation
    pub error: Option<SnitchError>,
}

impl DiscoveryOutcome {
    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }
}

/// Stream of discovered items backed by a paging task
pub struct Discovery<T> {
    rx: mpsc::Receiver<T>,
    producer: JoinHandle<DiscoveryOutcome>,
}

impl<T: Send + 'static> Discovery<T> {
    fn spawn<F, Fut>(produce: F) -> Self
    where
        F: FnOnce(mpsc::Sender<T>) -> Fut,
        Fut: Future<Output = DiscoveryOutcome> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(DISCOVERY_CHANNEL_SIZE);
        let producer = tokio::spawn(produce(tx));
        Self { rx, producer }
    }

    /// Next discovered item, or `None` once the listing has ended
    pub async fn next(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    /// Stop consuming and report how the listing went
    ///
    /// Finishing before the stream is drained cuts the listing short; the
    /// outcome then carries [`SnitchError::Cancelled`].
    pub async fn finish(mut self) -> DiscoveryOutcome {
        self.rx.close();
        match self.producer.await {
            Ok(outcome) => outcome,
            Err(e) => DiscoveryOutcome {
                error: Some(SnitchError::Task(e.to_string())),
                ..Default::default()
            },
        }
    }
}

impl<T> Stream for Discovery<T> {
    type Item = T;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        self.rx.poll_recv(cx)
    }
}

/// Run `fut` unless `cancel` fires first
pub(crate) async fn cancellable<T>(
    cancel: &CancellationToken,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(SnitchError::Cancelled),
        result = fut => result,
    }
}

/// Derive "my-cluster" from "arn:aws:ecs:us-east-1:123456789012:cluster/my-cluster"
pub fn cluster_name_from_arn(arn: &str) -> Option<&str> {
    arn.split_once(CLUSTER_ARN_MARKER)
        .map(|(_, name)| name)
        .filter(|name| !name.is_empty())
}

/// Stream the names of every cluster visible to the caller's credentials
pub fn discover_clusters(ecs: Arc<dyn EcsApi>, cancel: CancellationToken) -> Discovery<String> {
    Discovery::spawn(move |tx| async move {
        let mut outcome = DiscoveryOutcome::default();
        let mut next_token = None;

        loop {
            let page = match cancellable(&cancel, ecs.list_clusters(next_token.take())).await {
                Ok(page) => page,
                Err(e) => {
                    warn!(error = %e, "Failed to list clusters, stopping discovery");
                    outcome.error = Some(e);
                    break;
                }
            };
            outcome.pages += 1;

            if page.items.is_empty() {
                break;
            }

            for arn in &page.items {
                let Some(name) = cluster_name_from_arn(arn) else {
                    warn!(arn = %arn, "Skipping cluster ARN without a cluster name");
                    continue;
                };
                if tx.send(name.to_string()).await.is_err() {
                    debug!("Cluster consumer went away");
                    outcome.error = Some(SnitchError::Cancelled);
                    return outcome;
                }
                outcome.items += 1;
            }

            match page.next_token {
                Some(token) => next_token = Some(token),
                None => break,
            }
        }

        outcome
    })
}

/// Stream a cluster's task ARNs, one batch per listed page
pub fn discover_tasks(
    ecs: Arc<dyn EcsApi>,
    cluster: String,
    cancel: CancellationToken,
) -> Discovery<Vec<String>> {
    Discovery::spawn(move |tx| async move {
        let mut outcome = DiscoveryOutcome::default();
        let mut next_token = None;

        loop {
            let page =
                match cancellable(&cancel, ecs.list_tasks(&cluster, next_token.take())).await {
                    Ok(page) => page,
                    Err(e) => {
                        warn!(cluster = %cluster, error = %e, "Failed to list tasks");
                        outcome.error = Some(e);
                        break;
                    }
                };
            outcome.pages += 1;

            if page.items.is_empty() {
                break;
            }

            let count = page.items.len();
            if tx.send(page.items).await.is_err() {
                debug!(cluster = %cluster, "Task consumer went away");
                outcome.error = Some(SnitchError::Cancelled);
                return outcome;
            }
            outcome.items += count;

            match page.next_token {
                Some(token) => next_token = Some(token),
                None => break,
            }
        }

        outcome
    })
}

/// ACTIVE container instance ARNs of a cluster
///
/// Only the first page is read, so clusters with more than 100 container
/// instances are undercounted. Callers treat an error as an empty list.
pub async fn list_container_instances(
    ecs: &dyn EcsApi,
    cluster: &str,
    cancel: &CancellationToken,
) -> Result<Vec<String>> {
    cancellable(cancel, ecs.list_container_instances(cluster))
        .await
        .inspect_err(|e| warn!(cluster = %cluster, error = %e, "Failed to list container instances"))
}
