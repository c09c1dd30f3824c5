//! Well-known tags, annotations and finalizers
//!
//! Azure resources created by the controller are stamped with an owner tag
//! naming the cluster. Resources lacking that tag are treated as user-owned
//! (unmanaged) and are never mutated.

use std::collections::BTreeMap;

/// Azure resource tags
pub type Tags = BTreeMap<String, String>;

/// Prefix of the per-cluster ownership tag key
pub const CLUSTER_TAG_PREFIX: &str = "sigs.k8s.io_cluster-api-provider-azure_cluster_";

/// Value of the ownership tag for resources whose lifecycle the controller manages
pub const RESOURCE_LIFECYCLE_OWNED: &str = "owned";

/// Value of the ownership tag for resources that are shared with other clusters
pub const RESOURCE_LIFECYCLE_SHARED: &str = "shared";

/// Tag key recording the resource name
pub const NAME_TAG: &str = "Name";

/// Tag key recording the role the resource plays in the cluster
pub const ROLE_TAG: &str = "sigs.k8s.io_cluster-api-provider-azure_role";

/// Role tag value for shared cluster infrastructure
pub const COMMON_ROLE: &str = "common";

/// Annotation holding the last-applied security rules (map of NSG name to rule map)
pub const SECURITY_RULE_LAST_APPLIED_ANNOTATION: &str =
    "sigs.k8s.io/cluster-api-provider-azure-last-applied-security-rules";

/// Annotation holding the last-applied resource group tags
pub const RG_TAGS_LAST_APPLIED_ANNOTATION: &str =
    "sigs.k8s.io/cluster-api-provider-azure-last-applied-tags-rg";

/// Annotation marking an object as paused
pub const PAUSED_ANNOTATION: &str = "cluster.x-k8s.io/paused";

/// Finalizer placed on AzureCluster objects
pub const AZURE_CLUSTER_FINALIZER: &str = "azurecluster.infrastructure.cluster.x-k8s.io";

/// Ownership tag key for a cluster
pub fn cluster_tag_key(cluster_name: &str) -> String {
    format!("{}{}", CLUSTER_TAG_PREFIX, cluster_name)
}

/// Parameters for building the standard tag set of a resource
#[derive(Debug, Clone, Default)]
pub struct BuildParams<'a> {
    /// Owning cluster name
    pub cluster_name: &'a str,
    /// Resource name, stored under the `Name` tag
    pub name: Option<&'a str>,
    /// Resource role
    pub role: Option<&'a str>,
    /// Ownership lifecycle (`owned` when unset)
    pub lifecycle: Option<&'a str>,
    /// User-supplied tags merged underneath the generated ones
    pub additional: Option<&'a Tags>,
}

/// Build the tag set stamped on every resource the controller creates.
///
/// Generated keys win over user-supplied additional tags.
pub fn build(params: BuildParams<'_>) -> Tags {
    let mut tags = params.additional.cloned().unwrap_or_default();
    tags.insert(
        cluster_tag_key(params.cluster_name),
        params.lifecycle.unwrap_or(RESOURCE_LIFECYCLE_OWNED).to_string(),
    );
    if let Some(name) = params.name {
        tags.insert(NAME_TAG.to_string(), name.to_string());
    }
    if let Some(role) = params.role {
        tags.insert(ROLE_TAG.to_string(), role.to_string());
    }
    tags
}

/// Whether the tags mark the resource as owned by the given cluster
pub fn has_owned(tags: Option<&Tags>, cluster_name: &str) -> bool {
    tags.and_then(|t| t.get(&cluster_tag_key(cluster_name)))
        .is_some_and(|v| v == RESOURCE_LIFECYCLE_OWNED)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_owner_tags() {
        let tags = build(BuildParams {
            cluster_name: "my-cluster",
            name: Some("test-nsg"),
            ..Default::default()
        });
        assert_eq!(tags.len(), 2);
        assert_eq!(
            tags.get("sigs.k8s.io_cluster-api-provider-azure_cluster_my-cluster"),
            Some(&"owned".to_string())
        );
        assert_eq!(tags.get("Name"), Some(&"test-nsg".to_string()));
    }

    #[test]
    fn test_generated_tags_override_additional() {
        let mut additional = Tags::new();
        additional.insert("Name".into(), "user".into());
        additional.insert("team".into(), "infra".into());
        let tags = build(BuildParams {
            cluster_name: "c",
            name: Some("vnet"),
            role: Some(COMMON_ROLE),
            additional: Some(&additional),
            ..Default::default()
        });
        assert_eq!(tags.get("Name"), Some(&"vnet".to_string()));
        assert_eq!(tags.get("team"), Some(&"infra".to_string()));
        assert_eq!(tags.get(ROLE_TAG), Some(&"common".to_string()));
    }

    #[test]
    fn test_has_owned() {
        let owned = build(BuildParams { cluster_name: "a", ..Default::default() });
        assert!(has_owned(Some(&owned), "a"));
        assert!(!has_owned(Some(&owned), "b"));
        assert!(!has_owned(None, "a"));

        let shared = build(BuildParams {
            cluster_name: "a",
            lifecycle: Some(RESOURCE_LIFECYCLE_SHARED),
            ..Default::default()
        });
        assert!(!has_owned(Some(&shared), "a"));
    }
}
