//! Route table service.
//!
//! Route tables are create-only: an existing table is never updated.

use super::virtual_networks::vnet_is_managed;
use crate::async_ops::OperationContext;
use crate::error::ReconcileError;
use crate::scope::ClusterScope;
use crate::service::ServiceStrategy;
use crate::spec::{ResourceSpec, existing_as};
use async_trait::async_trait;
use azure_client::{AzureClientTrait, ResourceBody, ResourceKind, RouteTable, TypedBody};
use crds::{BuildParams, COMMON_ROLE, ROUTE_TABLES_READY_CONDITION, Tags};

/// Service name
pub const SERVICE_NAME: &str = "routetables";

/// Desired route table
#[derive(Debug, Clone)]
pub struct RouteTableSpec {
    name: String,
    resource_group: String,
    location: String,
    cluster_name: String,
    additional_tags: Tags,
}

impl ResourceSpec for RouteTableSpec {
    fn kind(&self) -> ResourceKind {
        ResourceKind::RouteTable
    }

    fn resource_name(&self) -> &str {
        &self.name
    }

    fn resource_group_name(&self) -> &str {
        &self.resource_group
    }

    fn parameters(&self, existing: Option<&ResourceBody>) -> Result<Option<ResourceBody>, ReconcileError> {
        if let Some(existing) = existing {
            existing_as::<RouteTable>(existing, &self.name)?;
            return Ok(None);
        }
        Ok(Some(
            RouteTable {
                location: self.location.clone(),
                tags: Some(crds::build(BuildParams {
                    cluster_name: &self.cluster_name,
                    name: Some(&self.name),
                    role: Some(COMMON_ROLE),
                    additional: Some(&self.additional_tags),
                    ..Default::default()
                })),
                ..Default::default()
            }
            .into_body(),
        ))
    }
}

/// Strategy for the route tables attached to cluster subnets
#[derive(Debug, Default)]
pub struct RouteTables;

#[async_trait]
impl ServiceStrategy for RouteTables {
    type Spec = RouteTableSpec;

    fn name(&self) -> &'static str {
        SERVICE_NAME
    }

    fn condition_type(&self) -> &'static str {
        ROUTE_TABLES_READY_CONDITION
    }

    async fn is_managed(
        &self,
        scope: &mut ClusterScope,
        ctx: &OperationContext,
        client: &dyn AzureClientTrait,
    ) -> Result<bool, ReconcileError> {
        vnet_is_managed(scope, ctx, client).await
    }

    fn specs(&self, scope: &ClusterScope) -> Result<Vec<RouteTableSpec>, ReconcileError> {
        let mut specs: Vec<RouteTableSpec> = Vec::new();
        for table in scope
            .network_spec()
            .subnets
            .iter()
            .filter_map(|s| s.route_table.as_ref())
        {
            if table.name.is_empty() || specs.iter().any(|s| s.name == table.name) {
                continue;
            }
            specs.push(RouteTableSpec {
                name: table.name.clone(),
                resource_group: scope.resource_group().to_string(),
                location: scope.location().to_string(),
                cluster_name: scope.cluster_name(),
                additional_tags: scope.additional_tags().clone(),
            });
        }
        Ok(specs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::async_ops::AsyncReconciler;
    use crate::metrics::Metrics;
    use crate::service::{ResourceService, Service};
    use crate::test_utils::{
        TEST_CLUSTER_NAME, TEST_RESOURCE_GROUP, TEST_SUBSCRIPTION, create_test_azure_cluster, scope_for,
        test_scope,
    };
    use azure_client::{MockAzureClient, MockVerb, ResourceRef};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    fn service(client: &MockAzureClient) -> ResourceService<RouteTables> {
        let reconciler = AsyncReconciler::new(Arc::new(client.clone()), Arc::new(Metrics::new().unwrap()));
        ResourceService::new(Arc::new(reconciler), RouteTables)
    }

    fn ctx() -> OperationContext {
        OperationContext::new(Duration::from_secs(60), CancellationToken::new())
    }

    fn table_ref(name: &str) -> ResourceRef {
        ResourceRef::new(ResourceKind::RouteTable, TEST_SUBSCRIPTION, TEST_RESOURCE_GROUP, name)
    }

    #[tokio::test]
    async fn test_creates_missing_route_table() {
        let client = MockAzureClient::new();
        let mut scope = test_scope();

        service(&client).reconcile(&mut scope, &ctx()).await.unwrap();

        let body = client.resource(&table_ref("my-cluster-node-routetable")).unwrap();
        assert!(crds::has_owned(body.tags(), TEST_CLUSTER_NAME));
        assert_eq!(client.count(MockVerb::Put), 1);
    }

    #[tokio::test]
    async fn test_existing_route_table_is_not_updated() {
        let client = MockAzureClient::new();
        client.insert(&table_ref("my-cluster-node-routetable"), RouteTable::default().into_body());
        let mut scope = test_scope();

        service(&client).reconcile(&mut scope, &ctx()).await.unwrap();

        assert_eq!(client.count(MockVerb::Put), 0);
    }

    #[test]
    fn test_shared_route_table_yields_one_spec() {
        let mut azure_cluster = create_test_azure_cluster(TEST_CLUSTER_NAME, "default");
        let shared = azure_cluster.spec.network_spec.subnets[1].route_table.clone();
        azure_cluster.spec.network_spec.subnets[0].route_table = shared;

        let specs = RouteTables.specs(&scope_for(azure_cluster)).unwrap();
        assert_eq!(specs.len(), 1);
    }
}
