//! Cluster scope.
//!
//! One `ClusterScope` lives for exactly one reconcile pass. It bundles the
//! owner `Cluster` with a staged copy of the `AzureCluster`; services read
//! desired state from it and record conditions, persisted futures and
//! last-applied annotations on the staged copy. [`ClusterScope::close`]
//! writes the result back once at the end of the pass.

use crate::error::{ControllerError, ErrorClass, ReconcileError};
use crate::store::ObjectStore;
use crds::{
    ApiEndpoint, AzureCluster, AzureClusterStatus, Cluster, ClusterPhase, Condition,
    ConditionSeverity, Future, FutureType, NetworkSpec, Tags, AZURE_CLUSTER_FINALIZER,
    CREATING_REASON, DELETED_REASON, DELETING_REASON, DELETION_FAILED_REASON, FAILED_REASON,
    PROGRAMMER_ERROR_REASON, TRANSIENT_FAILURE_REASON, UPDATING_REASON,
};
use kube::ResourceExt;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

/// Request-scoped view of one AzureCluster and its owner Cluster
#[derive(Debug, Clone)]
pub struct ClusterScope {
    original: AzureCluster,
    azure_cluster: AzureCluster,
    cluster: Cluster,
    subscription_id: String,
    vnet_managed: Option<bool>,
    group_managed: Option<bool>,
}

impl ClusterScope {
    /// Build a scope for one pass.
    ///
    /// The subscription comes from the AzureCluster, falling back to the
    /// controller default.
    pub fn new(
        cluster: Cluster,
        azure_cluster: AzureCluster,
        default_subscription_id: Option<&str>,
    ) -> Result<Self, ControllerError> {
        let subscription_id = azure_cluster
            .spec
            .subscription_id
            .as_deref()
            .filter(|s| !s.is_empty())
            .or(default_subscription_id)
            .map(str::to_string)
            .ok_or_else(|| {
                ControllerError::InvalidConfig(format!(
                    "AzureCluster {} has no subscriptionID and AZURE_SUBSCRIPTION_ID is not set",
                    azure_cluster.name_any()
                ))
            })?;

        Ok(Self {
            azure_cluster: azure_cluster.clone(),
            original: azure_cluster,
            cluster,
            subscription_id,
            vnet_managed: None,
            group_managed: None,
        })
    }

    // ------------------------------------------------------------------
    // Identity and desired state

    /// Owner Cluster name, used in ownership tags
    pub fn cluster_name(&self) -> String {
        self.cluster.name_any()
    }

    /// AzureCluster name
    pub fn name(&self) -> String {
        self.azure_cluster.name_any()
    }

    /// AzureCluster namespace
    pub fn namespace(&self) -> String {
        self.azure_cluster.namespace().unwrap_or_default()
    }

    /// Subscription all resources live in
    pub fn subscription_id(&self) -> &str {
        &self.subscription_id
    }

    /// Cluster resource group
    pub fn resource_group(&self) -> &str {
        &self.azure_cluster.spec.resource_group
    }

    /// Resource group of the VNet
    pub fn vnet_resource_group(&self) -> &str {
        self.azure_cluster.vnet_resource_group()
    }

    /// Azure region
    pub fn location(&self) -> &str {
        &self.azure_cluster.spec.location
    }

    /// User tags applied to every created resource
    pub fn additional_tags(&self) -> &Tags {
        &self.azure_cluster.spec.additional_tags
    }

    /// Network layout, including ids written back during this pass
    pub fn network_spec(&self) -> &NetworkSpec {
        &self.azure_cluster.spec.network_spec
    }

    /// Whether the AzureCluster is being deleted
    pub fn is_deleting(&self) -> bool {
        self.azure_cluster.metadata.deletion_timestamp.is_some()
    }

    // ------------------------------------------------------------------
    // Managed-ness, cached for the pass

    /// Cached VNet managed-ness, once determined
    pub fn vnet_managed(&self) -> Option<bool> {
        self.vnet_managed
    }

    /// Record whether the VNet is managed by this cluster
    pub fn set_vnet_managed(&mut self, managed: bool) {
        self.vnet_managed = Some(managed);
    }

    /// Cached resource-group managed-ness, once determined
    pub fn group_managed(&self) -> Option<bool> {
        self.group_managed
    }

    /// Record whether the resource group is managed by this cluster
    pub fn set_group_managed(&mut self, managed: bool) {
        self.group_managed = Some(managed);
    }

    // ------------------------------------------------------------------
    // Spec write-back

    /// Record the id and address space of the VNet
    pub fn set_vnet_details(&mut self, id: Option<String>, cidr_blocks: Vec<String>) {
        let vnet = &mut self.azure_cluster.spec.network_spec.vnet;
        if id.is_some() {
            vnet.id = id;
        }
        if !cidr_blocks.is_empty() {
            vnet.cidr_blocks = cidr_blocks;
        }
    }

    /// Record the id of a subnet
    pub fn set_subnet_id(&mut self, name: &str, id: String) {
        if let Some(subnet) = self
            .azure_cluster
            .spec
            .network_spec
            .subnets
            .iter_mut()
            .find(|s| s.name == name)
        {
            subnet.id = Some(id);
        }
    }

    /// Control plane endpoint, if known
    pub fn control_plane_endpoint(&self) -> Option<&ApiEndpoint> {
        self.azure_cluster
            .spec
            .control_plane_endpoint
            .as_ref()
            .filter(|e| !e.host.is_empty())
    }

    /// Record the control plane endpoint
    pub fn set_control_plane_endpoint(&mut self, endpoint: ApiEndpoint) {
        self.azure_cluster.spec.control_plane_endpoint = Some(endpoint);
    }

    // ------------------------------------------------------------------
    // Status

    fn status_mut(&mut self) -> &mut AzureClusterStatus {
        self.azure_cluster
            .status
            .get_or_insert_with(AzureClusterStatus::default)
    }

    /// Staged status
    pub fn status(&self) -> AzureClusterStatus {
        self.azure_cluster.status.clone().unwrap_or_default()
    }

    /// Set the lifecycle phase
    pub fn set_phase(&mut self, phase: ClusterPhase) {
        self.status_mut().phase = phase;
    }

    /// Set readiness and the failure message together
    pub fn set_ready(&mut self, ready: bool, failure_message: Option<String>) {
        let status = self.status_mut();
        status.ready = ready;
        status.failure_message = failure_message;
    }

    /// Upsert a condition
    pub fn set_condition(&mut self, condition: Condition) {
        crds::set_condition(&mut self.status_mut().conditions, condition);
    }

    /// Record the outcome of a create-or-update pass of one service
    pub fn update_put_status(&mut self, condition_type: &str, service: &str, err: Option<&ReconcileError>) {
        self.update_status(condition_type, service, err, CREATING_REASON);
    }

    /// Record the outcome of a patch pass of one service
    pub fn update_patch_status(&mut self, condition_type: &str, service: &str, err: Option<&ReconcileError>) {
        self.update_status(condition_type, service, err, UPDATING_REASON);
    }

    /// Record the outcome of a delete pass of one service
    pub fn update_delete_status(&mut self, condition_type: &str, service: &str, err: Option<&ReconcileError>) {
        let condition = match err {
            None => Condition::false_condition(
                condition_type,
                DELETED_REASON,
                ConditionSeverity::Info,
                format!("{} successfully deleted", service),
            ),
            Some(e) if e.is_operation_not_done() => Condition::false_condition(
                condition_type,
                DELETING_REASON,
                ConditionSeverity::Info,
                e.to_string(),
            ),
            Some(e) => Condition::false_condition(
                condition_type,
                DELETION_FAILED_REASON,
                ConditionSeverity::Error,
                e.to_string(),
            ),
        };
        self.set_condition(condition);
    }

    fn update_status(
        &mut self,
        condition_type: &str,
        service: &str,
        err: Option<&ReconcileError>,
        in_progress_reason: &str,
    ) {
        let condition = match err.map(|e| (e.class(), e)) {
            None => Condition::true_condition(condition_type),
            Some((ErrorClass::NotDone, e)) => Condition::false_condition(
                condition_type,
                in_progress_reason,
                ConditionSeverity::Info,
                e.to_string(),
            ),
            Some((ErrorClass::Transient, e)) => Condition::false_condition(
                condition_type,
                TRANSIENT_FAILURE_REASON,
                ConditionSeverity::Warning,
                e.to_string(),
            ),
            Some((ErrorClass::Programmer, e)) => Condition::false_condition(
                condition_type,
                PROGRAMMER_ERROR_REASON,
                ConditionSeverity::Error,
                e.to_string(),
            ),
            Some((ErrorClass::Terminal, e)) => Condition::false_condition(
                condition_type,
                FAILED_REASON,
                ConditionSeverity::Error,
                e.to_string(),
            ),
        };
        debug!("{}: {} -> {:?}", service, condition_type, condition.status);
        self.set_condition(condition);
    }

    // ------------------------------------------------------------------
    // Future store

    /// Persisted future for a resource, service and verb
    pub fn long_running_operation_state(
        &self,
        name: &str,
        service: &str,
        type_: FutureType,
    ) -> Option<Future> {
        self.azure_cluster.status.as_ref().and_then(|s| {
            s.long_running_operation_states
                .iter()
                .find(|f| f.matches(name, service, type_))
                .cloned()
        })
    }

    /// Persist a future, replacing one for the same resource, service and verb
    pub fn set_long_running_operation_state(&mut self, future: Future) {
        let states = &mut self.status_mut().long_running_operation_states;
        match states
            .iter_mut()
            .find(|f| f.matches(&future.name, &future.service_name, future.type_))
        {
            Some(existing) => *existing = future,
            None => states.push(future),
        }
    }

    /// Forget a persisted future
    pub fn delete_long_running_operation_state(&mut self, name: &str, service: &str, type_: FutureType) {
        self.status_mut()
            .long_running_operation_states
            .retain(|f| !f.matches(name, service, type_));
    }

    // ------------------------------------------------------------------
    // Annotations

    /// Decode a JSON annotation; absent means the default value
    pub fn annotation_json<T: DeserializeOwned + Default>(&self, key: &str) -> Result<T, ReconcileError> {
        match self.azure_cluster.annotations().get(key) {
            None => Ok(T::default()),
            Some(raw) if raw.is_empty() => Ok(T::default()),
            Some(raw) => serde_json::from_str(raw).map_err(|e| {
                ReconcileError::Terminal(format!("failed to decode annotation {}: {}", key, e))
            }),
        }
    }

    /// Store a value as a JSON annotation
    pub fn update_annotation_json<T: Serialize>(&mut self, key: &str, value: &T) -> Result<(), ReconcileError> {
        let raw = serde_json::to_string(value).map_err(|e| {
            ReconcileError::Programmer(format!("failed to encode annotation {}: {}", key, e))
        })?;
        self.azure_cluster
            .annotations_mut()
            .insert(key.to_string(), raw);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Finalizer

    /// Whether the AzureCluster carries the controller finalizer
    pub fn has_finalizer(&self) -> bool {
        self.azure_cluster
            .finalizers()
            .iter()
            .any(|f| f == AZURE_CLUSTER_FINALIZER)
    }

    /// Add the controller finalizer
    pub fn add_finalizer(&mut self) {
        if !self.has_finalizer() {
            self.azure_cluster
                .finalizers_mut()
                .push(AZURE_CLUSTER_FINALIZER.to_string());
        }
    }

    /// Remove the controller finalizer
    pub fn remove_finalizer(&mut self) {
        self.azure_cluster
            .finalizers_mut()
            .retain(|f| f != AZURE_CLUSTER_FINALIZER);
    }

    // ------------------------------------------------------------------
    // Write-back

    /// Whether anything was staged since the scope was opened
    pub fn has_changes(&self) -> bool {
        self.original.status != self.azure_cluster.status
            || self.original.metadata.annotations != self.azure_cluster.metadata.annotations
            || self.original.metadata.finalizers != self.azure_cluster.metadata.finalizers
            || serde_json::to_value(&self.original.spec).ok()
                != serde_json::to_value(&self.azure_cluster.spec).ok()
    }

    /// Write everything staged during the pass back to the API server
    pub async fn close(self, store: &dyn ObjectStore) -> Result<(), ControllerError> {
        if !self.has_changes() {
            debug!("AzureCluster {}/{} unchanged", self.namespace(), self.name());
            return Ok(());
        }
        store
            .patch_azure_cluster(&self.original, &self.azure_cluster)
            .await
            .inspect_err(|e| {
                warn!(
                    "Failed to write back AzureCluster {}/{}: {}",
                    self.namespace(),
                    self.name(),
                    e
                );
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{OperationNotDoneError, ResourceAction};
    use crate::store::memory::MemoryObjectStore;
    use crate::test_utils::{create_test_azure_cluster, create_test_cluster, test_scope};
    use crds::{get_condition, ConditionStatus, SECURITY_GROUPS_READY_CONDITION};
    use std::collections::BTreeMap;
    use std::time::Duration;

    fn future(name: &str, type_: FutureType) -> Future {
        Future {
            type_,
            resource_kind: "SecurityGroup".into(),
            resource_group: "my-rg".into(),
            service_name: "securitygroups".into(),
            name: name.into(),
            data: "token".into(),
        }
    }

    fn condition(scope: &ClusterScope) -> Condition {
        get_condition(&scope.status().conditions, SECURITY_GROUPS_READY_CONDITION)
            .cloned()
            .unwrap()
    }

    #[test]
    fn test_subscription_falls_back_to_default() {
        let mut azure_cluster = create_test_azure_cluster("my-cluster", "default");
        azure_cluster.spec.subscription_id = None;
        let cluster = create_test_cluster("my-cluster", "default");

        let scope = ClusterScope::new(cluster.clone(), azure_cluster.clone(), Some("fallback")).unwrap();
        assert_eq!(scope.subscription_id(), "fallback");

        assert!(matches!(
            ClusterScope::new(cluster, azure_cluster, None),
            Err(ControllerError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_put_status_mapping() {
        let mut scope = test_scope();

        scope.update_put_status(SECURITY_GROUPS_READY_CONDITION, "securitygroups", None);
        assert_eq!(condition(&scope).status, ConditionStatus::True);

        let not_done = ReconcileError::OperationNotDone(OperationNotDoneError::new(future("nsg", FutureType::Put)));
        scope.update_put_status(SECURITY_GROUPS_READY_CONDITION, "securitygroups", Some(&not_done));
        let c = condition(&scope);
        assert_eq!(c.status, ConditionStatus::False);
        assert_eq!(c.severity, Some(ConditionSeverity::Info));
        assert_eq!(c.reason.as_deref(), Some(CREATING_REASON));
        assert_eq!(c.message.as_deref(), Some("PUT on my-rg/nsg is not done yet"));

        let transient = ReconcileError::transient("throttled", Duration::from_secs(5));
        scope.update_put_status(SECURITY_GROUPS_READY_CONDITION, "securitygroups", Some(&transient));
        assert_eq!(condition(&scope).severity, Some(ConditionSeverity::Warning));
        assert_eq!(condition(&scope).reason.as_deref(), Some(TRANSIENT_FAILURE_REASON));

        let terminal = ReconcileError::Terminal("boom".into()).for_resource(
            ResourceAction::Create,
            "my-rg",
            "nsg",
            "securitygroups",
        );
        scope.update_put_status(SECURITY_GROUPS_READY_CONDITION, "securitygroups", Some(&terminal));
        let c = condition(&scope);
        assert_eq!(c.severity, Some(ConditionSeverity::Error));
        assert_eq!(c.reason.as_deref(), Some(FAILED_REASON));
        assert_eq!(
            c.message.as_deref(),
            Some("failed to create resource my-rg/nsg (service: securitygroups): boom")
        );
    }

    #[test]
    fn test_delete_status_mapping() {
        let mut scope = test_scope();
        scope.update_delete_status(SECURITY_GROUPS_READY_CONDITION, "securitygroups", None);
        assert_eq!(condition(&scope).reason.as_deref(), Some(DELETED_REASON));

        let not_done = ReconcileError::OperationNotDone(OperationNotDoneError::new(future("nsg", FutureType::Delete)));
        scope.update_delete_status(SECURITY_GROUPS_READY_CONDITION, "securitygroups", Some(&not_done));
        assert_eq!(condition(&scope).reason.as_deref(), Some(DELETING_REASON));

        let failed = ReconcileError::Terminal("in use".into());
        scope.update_delete_status(SECURITY_GROUPS_READY_CONDITION, "securitygroups", Some(&failed));
        assert_eq!(condition(&scope).reason.as_deref(), Some(DELETION_FAILED_REASON));
        assert_eq!(condition(&scope).severity, Some(ConditionSeverity::Error));
    }

    #[test]
    fn test_future_store() {
        let mut scope = test_scope();
        scope.set_long_running_operation_state(future("nsg", FutureType::Put));
        scope.set_long_running_operation_state(future("nsg", FutureType::Delete));

        let mut replacement = future("nsg", FutureType::Put);
        replacement.data = "newer".into();
        scope.set_long_running_operation_state(replacement);

        assert_eq!(scope.status().long_running_operation_states.len(), 2);
        assert_eq!(
            scope
                .long_running_operation_state("nsg", "securitygroups", FutureType::Put)
                .map(|f| f.data),
            Some("newer".to_string())
        );

        scope.delete_long_running_operation_state("nsg", "securitygroups", FutureType::Put);
        assert!(scope.long_running_operation_state("nsg", "securitygroups", FutureType::Put).is_none());
        assert!(scope.long_running_operation_state("nsg", "securitygroups", FutureType::Delete).is_some());
    }

    #[test]
    fn test_annotation_json_round_trip() {
        let mut scope = test_scope();
        let empty: BTreeMap<String, String> = scope.annotation_json("example.com/bag").unwrap();
        assert!(empty.is_empty());

        let bag = BTreeMap::from([("a".to_string(), "1".to_string())]);
        scope.update_annotation_json("example.com/bag", &bag).unwrap();
        let read: BTreeMap<String, String> = scope.annotation_json("example.com/bag").unwrap();
        assert_eq!(read, bag);
    }

    #[tokio::test]
    async fn test_close_patches_once_and_only_on_change() {
        let store = MemoryObjectStore::default();

        test_scope().close(&store).await.unwrap();
        assert_eq!(store.patch_count(), 0);

        let mut scope = test_scope();
        scope.set_phase(ClusterPhase::Provisioning);
        scope.add_finalizer();
        scope.close(&store).await.unwrap();
        assert_eq!(store.patch_count(), 1);

        let patched = store.last_patched().unwrap();
        assert_eq!(patched.status.as_ref().unwrap().phase, ClusterPhase::Provisioning);
        assert!(patched.finalizers().iter().any(|f| f == AZURE_CLUSTER_FINALIZER));
    }
}
