//! Discovery stream tests against the in-memory ECS

use super::mock::MockEcs;
use super::*;
use tokio_stream::StreamExt;

#[test]
fn test_cluster_name_from_arn() {
    assert_eq!(
        cluster_name_from_arn("arn:aws:ecs:ca-central-1:123456789012:cluster/my-cluster"),
        Some("my-cluster")
    );
    assert_eq!(cluster_name_from_arn("arn:aws:ecs:us-east-1:1:service/x"), None);
    assert_eq!(cluster_name_from_arn("arn:aws:ecs:us-east-1:1:cluster/"), None);
}

#[tokio::test]
async fn test_discover_clusters_pages_through_all_clusters() {
    let ecs = Arc::new(MockEcs::fake());
    let mut clusters = discover_clusters(ecs.clone(), CancellationToken::new());

    let mut names = Vec::new();
    while let Some(name) = clusters.next().await {
        names.push(name);
    }
    let outcome = clusters.finish().await;

    assert_eq!(
        names,
        vec!["fake-ecs-cluster", "another-fake-ecs-cluster", "who-even-uses-fargate"]
    );
    assert_eq!(outcome.pages, 3);
    assert_eq!(outcome.items, 3);
    assert!(outcome.is_complete());
    assert_eq!(ecs.calls("ListClusters"), 3);
}

#[tokio::test]
async fn test_discover_clusters_error_keeps_partial_results() {
    let mut mock = MockEcs::fake();
    mock.fail_cluster_page = Some(1);
    let ecs = Arc::new(mock);

    let mut clusters = discover_clusters(ecs, CancellationToken::new());
    let mut names = Vec::new();
    while let Some(name) = clusters.next().await {
        names.push(name);
    }
    let outcome = clusters.finish().await;

    assert_eq!(names, vec!["fake-ecs-cluster"]);
    assert_eq!(outcome.pages, 1);
    assert!(matches!(
        outcome.error,
        Some(SnitchError::Api { operation: "ListClusters", .. })
    ));
}

#[tokio::test]
async fn test_discover_clusters_skips_malformed_arns() {
    let mut mock = MockEcs::fake();
    mock.cluster_pages = vec![vec![
        "not-an-arn".to_string(),
        "arn:aws:ecs:us-east-1:123456789012:cluster/good".to_string(),
    ]];

    let names: Vec<String> = discover_clusters(Arc::new(mock), CancellationToken::new())
        .collect()
        .await;

    assert_eq!(names, vec!["good"]);
}

#[tokio::test]
async fn test_discover_clusters_cancelled() {
    let cancel = CancellationToken::new();
    cancel.cancel();

    let ecs = Arc::new(MockEcs::fake());
    let mut clusters = discover_clusters(ecs.clone(), cancel);
    assert!(clusters.next().await.is_none());

    let outcome = clusters.finish().await;
    assert_eq!(outcome.error, Some(SnitchError::Cancelled));
    assert_eq!(ecs.calls("ListClusters"), 0);
}

#[tokio::test]
async fn test_discover_tasks_emits_one_batch_per_page() {
    let mut mock = MockEcs::fake();
    mock.task_pages = vec![
        vec!["t1".to_string(), "t2".to_string()],
        vec!["t3".to_string()],
    ];
    let ecs = Arc::new(mock);

    let mut batches = discover_tasks(ecs.clone(), "fake-ecs-cluster".into(), CancellationToken::new());
    assert_eq!(batches.next().await, Some(vec!["t1".to_string(), "t2".to_string()]));
    assert_eq!(batches.next().await, Some(vec!["t3".to_string()]));
    assert_eq!(batches.next().await, None);

    let outcome = batches.finish().await;
    assert_eq!(outcome.items, 3);
    assert!(outcome.is_complete());
    assert_eq!(ecs.calls_for("ListTasks", "fake-ecs-cluster"), 2);
}

#[tokio::test]
async fn test_discover_tasks_stops_on_empty_page() {
    let mut mock = MockEcs::fake();
    mock.task_pages = vec![vec!["t1".to_string()], vec![], vec!["never".to_string()]];
    let ecs = Arc::new(mock);

    let batches: Vec<Vec<String>> = discover_tasks(ecs.clone(), "c".into(), CancellationToken::new())
        .collect()
        .await;

    assert_eq!(batches, vec![vec!["t1".to_string()]]);
    assert_eq!(ecs.calls("ListTasks"), 2);
}

#[tokio::test]
async fn test_discover_tasks_error_ends_stream() {
    let ecs = Arc::new(MockEcs::fake().failing("ListTasks"));
    let mut batches = discover_tasks(ecs, "c".into(), CancellationToken::new());

    assert!(batches.next().await.is_none());
    let outcome = batches.finish().await;
    assert!(!outcome.is_complete());
    assert_eq!(outcome.pages, 0);
}

#[tokio::test]
async fn test_list_container_instances() {
    let ecs = MockEcs::fake();
    let cancel = CancellationToken::new();

    let arns = list_container_instances(&ecs, "fake-ecs-cluster", &cancel)
        .await
        .unwrap();
    assert_eq!(arns, ecs.container_instance_arns);

    let failing = MockEcs::fake().failing("ListContainerInstances");
    let result = list_container_instances(&failing, "fake-ecs-cluster", &cancel).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_finish_before_draining_stops_producer() {
    let mut mock = MockEcs::fake();
    mock.cluster_pages = (0..100)
        .map(|i| vec![format!("arn:aws:ecs:us-east-1:1:cluster/c{i}")])
        .collect();
    let ecs = Arc::new(mock);

    let mut clusters = discover_clusters(ecs.clone(), CancellationToken::new());
    assert_eq!(clusters.next().await.as_deref(), Some("c0"));

    let outcome = clusters.finish().await;
    assert!(!outcome.is_complete());
    assert_eq!(outcome.error, Some(SnitchError::Cancelled));
    assert!(ecs.calls("ListClusters") < 100);
}

#[tokio::test]
async fn test_drained_task_listing_is_complete() {
    let ecs = Arc::new(MockEcs::fake());
    let mut batches = discover_tasks(ecs, "fake-ecs-cluster".into(), CancellationToken::new());
    while batches.next().await.is_some() {}

    let outcome = batches.finish().await;
    assert!(outcome.is_complete());
    assert_eq!(outcome.items, 3);
}
