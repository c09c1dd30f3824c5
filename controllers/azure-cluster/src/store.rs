//! Object store seam between the reconciler and the Kubernetes API.
//!
//! The engine reads the owner `Cluster`, writes the AzureCluster back once
//! per pass and publishes events through this trait, so tests can run the
//! full reconcile against an in-memory store.

use crate::error::ControllerError;
use crds::{AzureCluster, Cluster};
use kube::api::{Patch, PatchParams};
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::{Api, Client, Resource, ResourceExt};
use serde_json::json;
use tracing::{debug, warn};

/// Controller name reported on events
const REPORTER: &str = "azure-cluster-controller";

/// Event severity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// Expected lifecycle progress
    Normal,
    /// Something needs attention
    Warning,
}

/// An event to publish on an AzureCluster
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterEvent {
    /// Severity
    pub kind: EventKind,
    /// Short CamelCase reason
    pub reason: String,
    /// Human-readable note
    pub note: String,
}

impl ClusterEvent {
    /// Normal event
    pub fn normal(reason: &str, note: impl Into<String>) -> Self {
        Self {
            kind: EventKind::Normal,
            reason: reason.to_string(),
            note: note.into(),
        }
    }

    /// Warning event
    pub fn warning(reason: &str, note: impl Into<String>) -> Self {
        Self {
            kind: EventKind::Warning,
            reason: reason.to_string(),
            note: note.into(),
        }
    }
}

/// Access to the Kubernetes objects the engine reads and writes
#[async_trait::async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch a Cluster; `None` when it does not exist
    async fn get_cluster(&self, namespace: &str, name: &str) -> Result<Option<Cluster>, ControllerError>;

    /// Write back the changes between `original` and `updated`.
    ///
    /// Status is patched first, then metadata and spec. A missing object is
    /// not an error.
    async fn patch_azure_cluster(
        &self,
        original: &AzureCluster,
        updated: &AzureCluster,
    ) -> Result<(), ControllerError>;

    /// Publish an event on the AzureCluster
    async fn publish_event(&self, azure_cluster: &AzureCluster, event: ClusterEvent) -> Result<(), ControllerError>;
}

/// Whether metadata or spec differ and need the main-resource patch
fn needs_object_patch(original: &AzureCluster, updated: &AzureCluster) -> bool {
    original.metadata.annotations != updated.metadata.annotations
        || original.metadata.finalizers != updated.metadata.finalizers
        || serde_json::to_value(&original.spec).ok() != serde_json::to_value(&updated.spec).ok()
}

/// Merge patch for the status subresource.
///
/// A merge patch leaves keys it does not mention untouched, so a cleared
/// failure message is sent as an explicit null.
fn status_patch(updated: &AzureCluster) -> Result<serde_json::Value, ControllerError> {
    let mut status = serde_json::to_value(&updated.status)?;
    if let Some(fields) = status.as_object_mut() {
        fields
            .entry("failureMessage")
            .or_insert(serde_json::Value::Null);
    }
    Ok(json!({ "status": status }))
}

/// Kubernetes-backed store
pub struct KubeObjectStore {
    client: Client,
    recorder: Recorder,
}

impl KubeObjectStore {
    /// Create a store using the given client
    pub fn new(client: Client) -> Self {
        let reporter = Reporter {
            controller: REPORTER.to_string(),
            instance: std::env::var("POD_NAME").ok(),
        };
        Self {
            recorder: Recorder::new(client.clone(), reporter),
            client,
        }
    }

    fn azure_clusters(&self, namespace: &str) -> Api<AzureCluster> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

fn ignore_not_found(result: Result<AzureCluster, kube::Error>) -> Result<(), ControllerError> {
    match result {
        Ok(_) => Ok(()),
        Err(kube::Error::Api(ae)) if ae.code == 404 => {
            debug!("AzureCluster disappeared before patch, ignoring");
            Ok(())
        }
        Err(e) => Err(ControllerError::Kube(e)),
    }
}

#[async_trait::async_trait]
impl ObjectStore for KubeObjectStore {
    async fn get_cluster(&self, namespace: &str, name: &str) -> Result<Option<Cluster>, ControllerError> {
        let api: Api<Cluster> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn patch_azure_cluster(
        &self,
        original: &AzureCluster,
        updated: &AzureCluster,
    ) -> Result<(), ControllerError> {
        let namespace = updated.namespace().unwrap_or_default();
        let name = updated.name_any();
        let api = self.azure_clusters(&namespace);

        if original.status != updated.status {
            let patch = status_patch(updated)?;
            ignore_not_found(
                api.patch_status(&name, &PatchParams::default(), &Patch::Merge(&patch))
                    .await,
            )?;
        }

        if needs_object_patch(original, updated) {
            let patch = json!({
                "metadata": {
                    "annotations": updated.metadata.annotations,
                    "finalizers": updated.metadata.finalizers.clone().unwrap_or_default(),
                },
                "spec": updated.spec,
            });
            ignore_not_found(
                api.patch(&name, &PatchParams::default(), &Patch::Merge(&patch))
                    .await,
            )?;
        }
        Ok(())
    }

    async fn publish_event(&self, azure_cluster: &AzureCluster, event: ClusterEvent) -> Result<(), ControllerError> {
        let type_ = match event.kind {
            EventKind::Normal => EventType::Normal,
            EventKind::Warning => EventType::Warning,
        };
        let reference = azure_cluster.object_ref(&());
        if let Err(e) = self
            .recorder
            .publish(
                &Event {
                    type_,
                    reason: event.reason.clone(),
                    note: Some(event.note),
                    action: "Reconcile".to_string(),
                    secondary: None,
                },
                &reference,
            )
            .await
        {
            warn!("Failed to publish {} event: {}", event.reason, e);
        }
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{create_test_azure_cluster, TEST_CLUSTER_NAME};
    use crds::{AzureClusterStatus, ClusterPhase};

    fn with_status(failure_message: Option<&str>) -> AzureCluster {
        let mut azure_cluster = create_test_azure_cluster(TEST_CLUSTER_NAME, "default");
        azure_cluster.status = Some(AzureClusterStatus {
            phase: ClusterPhase::Ready,
            failure_message: failure_message.map(str::to_string),
            ..Default::default()
        });
        azure_cluster
    }

    #[test]
    fn test_status_patch_clears_failure_message() {
        let patch = status_patch(&with_status(None)).unwrap();

        let status = patch["status"].as_object().unwrap();
        assert_eq!(status.get("failureMessage"), Some(&serde_json::Value::Null));
        assert_eq!(status["phase"], json!("Ready"));
    }

    #[test]
    fn test_status_patch_keeps_failure_message() {
        let patch = status_patch(&with_status(Some("vnet broke"))).unwrap();

        assert_eq!(patch["status"]["failureMessage"], json!("vnet broke"));
    }

    #[test]
    fn test_object_patch_needed_only_for_metadata_or_spec() {
        let original = with_status(None);
        let mut updated = with_status(Some("vnet broke"));
        assert!(!needs_object_patch(&original, &updated));

        updated.metadata.finalizers = Some(vec![crds::AZURE_CLUSTER_FINALIZER.to_string()]);
        assert!(needs_object_patch(&original, &updated));
    }
}
