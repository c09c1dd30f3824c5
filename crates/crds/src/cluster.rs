//! Cluster API `Cluster` CRD
//!
//! Only the fields the infrastructure controller reads are modeled.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[kube(
    group = "cluster.x-k8s.io",
    version = "v1beta1",
    kind = "Cluster",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSpec {
    /// Reconciliation of the cluster and its infrastructure is suspended
    #[serde(default)]
    pub paused: bool,

    /// Reference to the infrastructure object (an AzureCluster)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub infrastructure_ref: Option<InfrastructureReference>,
}

/// Typed reference to an infrastructure object
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct InfrastructureReference {
    /// API version of the referent
    #[serde(default)]
    pub api_version: String,

    /// Kind of the referent
    pub kind: String,

    /// Name of the referent
    pub name: String,

    /// Namespace of the referent (defaults to the Cluster namespace)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

impl Cluster {
    /// Name of the referenced AzureCluster, if the infrastructure ref points at one
    pub fn azure_cluster_ref(&self) -> Option<&InfrastructureReference> {
        self.spec
            .infrastructure_ref
            .as_ref()
            .filter(|r| r.kind == "AzureCluster")
    }
}
