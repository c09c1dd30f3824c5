//! AzureCluster CRD
//!
//! Infrastructure object describing the Azure resources backing a Cluster
//! API cluster.

use crate::conditions::Condition;
use crate::long_running::Future;
use crate::network::NetworkSpec;
use crate::tags::Tags;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "infrastructure.cluster.x-k8s.io",
    version = "v1beta1",
    kind = "AzureCluster",
    namespaced,
    status = "AzureClusterStatus",
    shortname = "azc",
    printcolumn = r#"{"name":"Ready","type":"boolean","jsonPath":".status.ready"}"#,
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Resource Group","type":"string","jsonPath":".spec.resourceGroup"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct AzureClusterSpec {
    /// Subscription the resources live in (falls back to the controller default)
    #[serde(rename = "subscriptionID", default, skip_serializing_if = "Option::is_none")]
    pub subscription_id: Option<String>,

    /// Resource group holding the cluster resources
    pub resource_group: String,

    /// Azure region
    pub location: String,

    /// Tags applied to every resource in addition to the ownership tags
    #[serde(default)]
    pub additional_tags: Tags,

    /// Network configuration
    #[serde(default)]
    pub network_spec: NetworkSpec,

    /// Endpoint used to reach the API server, set once the load balancer exists
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub control_plane_endpoint: Option<ApiEndpoint>,
}

/// Host and port of the API server
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ApiEndpoint {
    /// DNS name or address
    pub host: String,
    /// Port
    pub port: i32,
}

/// Top-level lifecycle phase
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
pub enum ClusterPhase {
    /// First reconcile attempted
    #[default]
    Initializing,
    /// At least one operation still in flight
    Provisioning,
    /// All services converged
    Ready,
    /// A service failed terminally
    Failed,
    /// Delete in progress
    Deleting,
    /// All resources removed
    Deleted,
}

impl ClusterPhase {
    /// Phase name as written to status
    pub fn as_str(&self) -> &'static str {
        match self {
            ClusterPhase::Initializing => "Initializing",
            ClusterPhase::Provisioning => "Provisioning",
            ClusterPhase::Ready => "Ready",
            ClusterPhase::Failed => "Failed",
            ClusterPhase::Deleting => "Deleting",
            ClusterPhase::Deleted => "Deleted",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AzureClusterStatus {
    /// Infrastructure is fully provisioned
    #[serde(default)]
    pub ready: bool,

    /// Lifecycle phase
    #[serde(default)]
    pub phase: ClusterPhase,

    /// Message of the last terminal failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_message: Option<String>,

    /// Per-service readiness conditions
    #[serde(default)]
    pub conditions: Vec<Condition>,

    /// In-flight long-running operations
    #[serde(default)]
    pub long_running_operation_states: Vec<Future>,
}

impl AzureCluster {
    /// VNet resource group, defaulting to the cluster resource group
    pub fn vnet_resource_group(&self) -> &str {
        self.spec
            .network_spec
            .vnet
            .resource_group
            .as_deref()
            .filter(|rg| !rg.is_empty())
            .unwrap_or(&self.spec.resource_group)
    }
}
