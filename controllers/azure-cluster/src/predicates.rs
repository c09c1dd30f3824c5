//! Event predicates.
//!
//! Decide whether an AzureCluster event should be reconciled at all, and map
//! `Cluster` events back to the AzureCluster they reference.

use crds::{AzureCluster, Cluster, PAUSED_ANNOTATION};
use kube::ResourceExt;
use kube_runtime::reflector::ObjectRef;
use std::fmt;

/// Why a reconcile was skipped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The owner Cluster or the AzureCluster itself is paused
    Paused,
    /// No owner Cluster has been set or it does not exist yet
    NoOwner,
    /// The owner Cluster does not reference its infrastructure yet
    NoInfrastructureRef,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Paused => write!(f, "reconciliation is paused"),
            SkipReason::NoOwner => write!(f, "owner Cluster is not set yet"),
            SkipReason::NoInfrastructureRef => write!(f, "owner Cluster has no infrastructureRef"),
        }
    }
}

/// Name of the owning Cluster, from the owner reference of kind `Cluster`
pub fn owner_cluster_name(azure_cluster: &AzureCluster) -> Option<String> {
    azure_cluster
        .owner_references()
        .iter()
        .find(|r| r.kind == "Cluster" && r.api_version.starts_with("cluster.x-k8s.io/"))
        .map(|r| r.name.clone())
}

/// Whether the AzureCluster carries the pause annotation
pub fn has_paused_annotation(azure_cluster: &AzureCluster) -> bool {
    azure_cluster.annotations().contains_key(PAUSED_ANNOTATION)
}

/// Reason to skip reconciling `azure_cluster`, given its owner if one was found
pub fn skip_reason(azure_cluster: &AzureCluster, owner: Option<&Cluster>) -> Option<SkipReason> {
    if has_paused_annotation(azure_cluster) {
        return Some(SkipReason::Paused);
    }
    let Some(cluster) = owner else {
        return Some(SkipReason::NoOwner);
    };
    if cluster.spec.paused {
        return Some(SkipReason::Paused);
    }
    if cluster.spec.infrastructure_ref.is_none() {
        return Some(SkipReason::NoInfrastructureRef);
    }
    None
}

/// Map a Cluster to the AzureCluster its infrastructureRef points at
pub fn cluster_to_azure_cluster(cluster: Cluster) -> Option<ObjectRef<AzureCluster>> {
    let reference = cluster.azure_cluster_ref()?;
    let namespace = reference
        .namespace
        .clone()
        .or_else(|| cluster.namespace())?;
    Some(ObjectRef::new(&reference.name).within(&namespace))
}
