//! Test utilities for unit testing the reconciliation engine
//!
//! This module provides helpers for creating test clusters and scopes.

use crate::scope::ClusterScope;
use crds::*;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};

/// Subscription used by test clusters
pub const TEST_SUBSCRIPTION: &str = "00000000-0000-0000-0000-000000000001";
/// Resource group used by test clusters
pub const TEST_RESOURCE_GROUP: &str = "my-rg";
/// Owner Cluster name used by test clusters
pub const TEST_CLUSTER_NAME: &str = "my-cluster";
/// Location used by test clusters
pub const TEST_LOCATION: &str = "westeurope";

/// Helper to create a test Cluster referencing an AzureCluster of the same name
pub fn create_test_cluster(name: &str, namespace: &str) -> Cluster {
    Cluster {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            uid: Some(format!("{}-uid", name)),
            ..Default::default()
        },
        spec: ClusterSpec {
            paused: false,
            infrastructure_ref: Some(InfrastructureReference {
                api_version: "infrastructure.cluster.x-k8s.io/v1beta1".to_string(),
                kind: "AzureCluster".to_string(),
                name: name.to_string(),
                namespace: Some(namespace.to_string()),
            }),
        },
    }
}

/// Helper to create a test AzureCluster owned by a Cluster of the same name.
///
/// The network has a control plane subnet and a node subnet, each with its
/// own NSG; the node subnet also has a route table. No API server load
/// balancer is configured.
pub fn create_test_azure_cluster(name: &str, namespace: &str) -> AzureCluster {
    AzureCluster {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            owner_references: Some(vec![OwnerReference {
                api_version: "cluster.x-k8s.io/v1beta1".to_string(),
                kind: "Cluster".to_string(),
                name: name.to_string(),
                uid: format!("{}-uid", name),
                ..Default::default()
            }]),
            ..Default::default()
        },
        spec: AzureClusterSpec {
            subscription_id: Some(TEST_SUBSCRIPTION.to_string()),
            resource_group: TEST_RESOURCE_GROUP.to_string(),
            location: TEST_LOCATION.to_string(),
            additional_tags: Tags::new(),
            network_spec: NetworkSpec {
                vnet: VnetSpec {
                    name: format!("{}-vnet", name),
                    cidr_blocks: vec!["10.0.0.0/8".to_string()],
                    ..Default::default()
                },
                subnets: vec![
                    SubnetSpec {
                        role: SubnetRole::ControlPlane,
                        name: format!("{}-controlplane-subnet", name),
                        cidr_blocks: vec!["10.0.0.0/16".to_string()],
                        security_group: SecurityGroupSpec {
                            name: format!("{}-controlplane-nsg", name),
                            security_rules: vec![test_rule("allow_apiserver", 2201, "6443")],
                            ..Default::default()
                        },
                        ..Default::default()
                    },
                    SubnetSpec {
                        role: SubnetRole::Node,
                        name: format!("{}-node-subnet", name),
                        cidr_blocks: vec!["10.1.0.0/16".to_string()],
                        security_group: SecurityGroupSpec {
                            name: format!("{}-node-nsg", name),
                            ..Default::default()
                        },
                        route_table: Some(RouteTableSpec {
                            name: format!("{}-node-routetable", name),
                        }),
                        ..Default::default()
                    },
                ],
                api_server_lb: None,
                private_endpoints: Vec::new(),
            },
            control_plane_endpoint: None,
        },
        status: None,
    }
}

/// Helper to create an inbound TCP allow rule for a destination port
pub fn test_rule(name: &str, priority: i32, port: &str) -> SecurityRule {
    SecurityRule {
        name: name.to_string(),
        description: Some(format!("{} rule", name)),
        protocol: SecurityRuleProtocol::Tcp,
        direction: SecurityRuleDirection::Inbound,
        priority,
        source: Some("*".to_string()),
        source_ports: Some("*".to_string()),
        destination: Some("*".to_string()),
        destination_ports: Some(port.to_string()),
        action: SecurityRuleAccess::Allow,
    }
}

/// Scope over the default test cluster
pub fn test_scope() -> ClusterScope {
    scope_for(create_test_azure_cluster(TEST_CLUSTER_NAME, "default"))
}

/// Scope over a customized test AzureCluster
pub fn scope_for(azure_cluster: AzureCluster) -> ClusterScope {
    let cluster = create_test_cluster(TEST_CLUSTER_NAME, "default");
    match ClusterScope::new(cluster, azure_cluster, None) {
        Ok(scope) => scope,
        Err(e) => panic!("test AzureCluster must carry a subscription: {}", e),
    }
}
