use super::*;
use crate::async_ops::AsyncReconciler;
use crate::store::memory::MemoryObjectStore;
use crate::test_utils::{
    create_test_azure_cluster, create_test_cluster, TEST_CLUSTER_NAME, TEST_LOCATION, TEST_RESOURCE_GROUP,
    TEST_SUBSCRIPTION,
};
use azure_client::{MockAzureClient, MockVerb, ResourceGroup, ResourceKind, ResourceRef, TypedBody};
use crds::{AZURE_CLUSTER_FINALIZER, PAUSED_ANNOTATION};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use std::collections::BTreeMap;

fn config() -> Config {
    Config {
        operation_timeout: Duration::from_secs(5),
        poll_interval: Duration::from_millis(1),
        ..Default::default()
    }
}

fn reconciler(client: &MockAzureClient, store: &MemoryObjectStore, config: Config) -> Reconciler {
    let metrics = Arc::new(Metrics::new().unwrap());
    let engine = Arc::new(AsyncReconciler::new(Arc::new(client.clone()), metrics.clone()));
    Reconciler::new(
        Arc::new(store.clone()),
        ClusterOrchestrator::azure_cluster(engine),
        metrics,
        config,
        CancellationToken::new(),
    )
}

fn azure_cluster() -> AzureCluster {
    create_test_azure_cluster(TEST_CLUSTER_NAME, "default")
}

fn deletion_time() -> Time {
    serde_json::from_value(serde_json::json!("2024-01-01T00:00:00Z")).unwrap()
}

fn store() -> MemoryObjectStore {
    MemoryObjectStore::with_cluster(create_test_cluster(TEST_CLUSTER_NAME, "default"))
}

#[tokio::test]
async fn test_provisions_and_adds_finalizer() {
    let client = MockAzureClient::new();
    let store = store();

    let action = reconciler(&client, &store, config())
        .reconcile(&azure_cluster())
        .await
        .unwrap();

    assert_eq!(action, Action::await_change());
    assert_eq!(store.patch_count(), 1);
    let patched = store.last_patched().unwrap();
    assert!(patched.finalizers().iter().any(|f| f == AZURE_CLUSTER_FINALIZER));
    let status = patched.status.unwrap();
    assert_eq!(status.phase, ClusterPhase::Ready);
    assert!(status.ready);
    assert_eq!(store.event_reasons(), vec![REASON_PROVISIONED.to_string()]);
}

#[tokio::test]
async fn test_paused_cluster_is_not_touched() {
    let client = MockAzureClient::new();
    let store = store();
    let mut paused = azure_cluster();
    paused.metadata.annotations = Some(BTreeMap::from([(PAUSED_ANNOTATION.to_string(), "true".to_string())]));

    let action = reconciler(&client, &store, config()).reconcile(&paused).await.unwrap();

    assert_eq!(action, Action::await_change());
    assert!(client.calls().is_empty());
    assert_eq!(store.patch_count(), 0);
}

#[tokio::test]
async fn test_missing_owner_waits() {
    let client = MockAzureClient::new();
    let store = MemoryObjectStore::default();

    let action = reconciler(&client, &store, config())
        .reconcile(&azure_cluster())
        .await
        .unwrap();

    assert_eq!(action, Action::await_change());
    assert!(client.calls().is_empty());
}

#[tokio::test]
async fn test_long_running_operation_requeues() {
    let client = MockAzureClient::new();
    client.set_long_running(TEST_RESOURCE_GROUP, 100);
    let store = store();
    let impatient = Config {
        operation_timeout: Duration::ZERO,
        not_done_requeue: Duration::from_secs(10),
        ..config()
    };

    let action = reconciler(&client, &store, impatient)
        .reconcile(&azure_cluster())
        .await
        .unwrap();

    // 10s base plus up to 5s of jitter
    let requeues: Vec<Action> = (10_000..=15_000)
        .map(|ms| Action::requeue(Duration::from_millis(ms)))
        .collect();
    assert!(requeues.contains(&action));
    let status = store.last_patched().unwrap().status.unwrap();
    assert_eq!(status.phase, ClusterPhase::Provisioning);
    assert_eq!(status.long_running_operation_states.len(), 1);
    assert!(store.event_reasons().is_empty());
}

#[tokio::test]
async fn test_delete_removes_finalizer() {
    let client = MockAzureClient::new();
    let store = store();
    let reconciler = reconciler(&client, &store, config());
    reconciler.reconcile(&azure_cluster()).await.unwrap();
    let mut deleting = store.last_patched().unwrap();
    deleting.metadata.deletion_timestamp = Some(deletion_time());
    client.reset_calls();

    let action = reconciler.reconcile(&deleting).await.unwrap();

    assert_eq!(action, Action::await_change());
    // the owned group takes everything in it along
    assert_eq!(client.count(MockVerb::Delete), 1);
    let patched = store.last_patched().unwrap();
    assert!(patched.finalizers().is_empty());
    assert_eq!(patched.status.unwrap().phase, ClusterPhase::Deleted);
    assert!(store.event_reasons().contains(&REASON_DELETED.to_string()));
}

#[tokio::test]
async fn test_delete_inside_unowned_group_removes_network_resources() {
    let client = MockAzureClient::new();
    let group = ResourceRef::new(ResourceKind::ResourceGroup, TEST_SUBSCRIPTION, TEST_RESOURCE_GROUP, TEST_RESOURCE_GROUP);
    client.insert(
        &group,
        ResourceGroup {
            location: TEST_LOCATION.into(),
            ..Default::default()
        }
        .into_body(),
    );
    let store = store();
    let reconciler = reconciler(&client, &store, config());
    reconciler.reconcile(&azure_cluster()).await.unwrap();
    let mut deleting = store.last_patched().unwrap();
    deleting.metadata.deletion_timestamp = Some(deletion_time());
    client.reset_calls();

    let action = reconciler.reconcile(&deleting).await.unwrap();

    assert_eq!(action, Action::await_change());
    let patched = store.last_patched().unwrap();
    assert!(patched.finalizers().is_empty());
    assert_eq!(patched.status.as_ref().unwrap().phase, ClusterPhase::Deleted);
    // the group survives; what the cluster put in it does not
    assert!(client.contains(&group));
    let network = |kind, name: String| ResourceRef::new(kind, TEST_SUBSCRIPTION, TEST_RESOURCE_GROUP, name);
    assert!(!client.contains(&network(ResourceKind::VirtualNetwork, format!("{}-vnet", TEST_CLUSTER_NAME))));
    assert!(!client.contains(&network(ResourceKind::SecurityGroup, format!("{}-node-nsg", TEST_CLUSTER_NAME))));
    assert!(!client.contains(&network(
        ResourceKind::RouteTable,
        format!("{}-node-routetable", TEST_CLUSTER_NAME)
    )));
    assert!(client.calls_of(MockVerb::Delete).iter().all(|c| c.resource.kind != ResourceKind::ResourceGroup));
}

#[tokio::test]
async fn test_deleting_without_finalizer_is_ignored() {
    let client = MockAzureClient::new();
    let store = store();
    let mut deleting = azure_cluster();
    deleting.metadata.deletion_timestamp = Some(deletion_time());

    let action = reconciler(&client, &store, config()).reconcile(&deleting).await.unwrap();

    assert_eq!(action, Action::await_change());
    assert!(client.calls().is_empty());
}

#[tokio::test]
async fn test_terminal_failure_is_returned_with_event() {
    let client = MockAzureClient::new();
    client.fail_with_status(MockVerb::Put, TEST_RESOURCE_GROUP, 400);
    let store = store();

    let err = reconciler(&client, &store, config())
        .reconcile(&azure_cluster())
        .await
        .unwrap_err();

    assert!(matches!(err, ControllerError::Reconcile(_)));
    assert_eq!(store.event_reasons(), vec![REASON_FAILED.to_string()]);
    let status = store.last_patched().unwrap().status.unwrap();
    assert_eq!(status.phase, ClusterPhase::Failed);
    assert!(status.failure_message.is_some());
}

#[tokio::test]
async fn test_transient_failure_requeues_with_hint() {
    let client = MockAzureClient::new();
    client.fail_with_status(MockVerb::Put, TEST_RESOURCE_GROUP, 503);
    let store = store();

    let action = reconciler(&client, &store, config())
        .reconcile(&azure_cluster())
        .await
        .unwrap();

    assert_ne!(action, Action::await_change());
    assert_eq!(store.event_reasons(), vec![REASON_TRANSIENT.to_string()]);
    let status = store.last_patched().unwrap().status.unwrap();
    assert_eq!(status.phase, ClusterPhase::Provisioning);
}

#[test]
fn test_error_policy_backs_off() {
    let client = MockAzureClient::new();
    let store = store();
    let reconciler = reconciler(&client, &store, config());
    let err = ControllerError::InvalidConfig("boom".into());
    let cluster = azure_cluster();

    let delays: Vec<Action> = (0..3).map(|_| reconciler.error_policy(&cluster, &err)).collect();

    assert_eq!(
        delays,
        vec![
            Action::requeue(Duration::from_secs(60)),
            Action::requeue(Duration::from_secs(60)),
            Action::requeue(Duration::from_secs(120)),
        ]
    );
    reconciler.reset_backoff(&key_of(&cluster));
    assert_eq!(reconciler.error_policy(&cluster, &err), Action::requeue(Duration::from_secs(60)));
}

#[test]
fn test_cancel_in_flight_cancels_registered_token() {
    let client = MockAzureClient::new();
    let store = store();
    let reconciler = reconciler(&client, &store, config());
    let cluster = azure_cluster();
    let token = CancellationToken::new();
    reconciler.in_flight.lock().unwrap().insert(key_of(&cluster), token.clone());

    reconciler.cancel_in_flight(&cluster);

    assert!(token.is_cancelled());
    assert!(reconciler.in_flight.lock().unwrap().is_empty());
}

#[test]
fn test_jitter_stays_within_half_again() {
    for _ in 0..50 {
        let delay = jitter(Duration::from_secs(10));
        assert!(delay >= Duration::from_secs(10) && delay <= Duration::from_secs(15));
    }
    assert_eq!(jitter(Duration::ZERO), Duration::ZERO);
}
