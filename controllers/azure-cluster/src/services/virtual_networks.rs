//! Virtual network service.
//!
//! A VNet that already exists without this cluster's owner tag is adopted:
//! its id and address space are written back to the scope and the VNet,
//! together with the subnets, NSGs and route tables inside it, is treated as
//! unmanaged.

use super::observe;
use crate::async_ops::OperationContext;
use crate::error::ReconcileError;
use crate::scope::ClusterScope;
use crate::service::ServiceStrategy;
use crate::spec::{ResourceSpec, existing_as};
use async_trait::async_trait;
use azure_client::{
    AddressSpace, AzureClientTrait, ResourceBody, ResourceKind, ResourceRef, TypedBody, VirtualNetwork,
    VirtualNetworkProperties,
};
use crds::{BuildParams, COMMON_ROLE, Tags, VNET_READY_CONDITION};
use tracing::info;

/// Service name
pub const SERVICE_NAME: &str = "virtualnetwork";

/// Desired virtual network
#[derive(Debug, Clone)]
pub struct VnetSpec {
    name: String,
    resource_group: String,
    location: String,
    cidr_blocks: Vec<String>,
    cluster_name: String,
    tags: Tags,
}

impl ResourceSpec for VnetSpec {
    fn kind(&self) -> ResourceKind {
        ResourceKind::VirtualNetwork
    }

    fn resource_name(&self) -> &str {
        &self.name
    }

    fn resource_group_name(&self) -> &str {
        &self.resource_group
    }

    fn parameters(&self, existing: Option<&ResourceBody>) -> Result<Option<ResourceBody>, ReconcileError> {
        if let Some(existing) = existing {
            existing_as::<VirtualNetwork>(existing, &self.name)?;
            return Ok(None);
        }
        Ok(Some(
            VirtualNetwork {
                location: self.location.clone(),
                tags: Some(crds::build(BuildParams {
                    cluster_name: &self.cluster_name,
                    name: Some(&self.name),
                    role: Some(COMMON_ROLE),
                    additional: Some(&self.tags),
                    ..Default::default()
                })),
                properties: VirtualNetworkProperties {
                    address_space: Some(AddressSpace {
                        address_prefixes: self.cidr_blocks.clone(),
                    }),
                    ..Default::default()
                },
                ..Default::default()
            }
            .into_body(),
        ))
    }
}

fn address_prefixes(vnet: &VirtualNetwork) -> Vec<String> {
    vnet.properties
        .address_space
        .as_ref()
        .map(|a| a.address_prefixes.clone())
        .unwrap_or_default()
}

/// Whether the cluster VNet is managed, cached on the scope.
///
/// Adopting an unmanaged VNet records its id and address space.
pub(crate) async fn vnet_is_managed(
    scope: &mut ClusterScope,
    ctx: &OperationContext,
    client: &dyn AzureClientTrait,
) -> Result<bool, ReconcileError> {
    if let Some(managed) = scope.vnet_managed() {
        return Ok(managed);
    }
    let name = scope.network_spec().vnet.name.clone();
    let reference = ResourceRef::new(
        ResourceKind::VirtualNetwork,
        scope.subscription_id(),
        scope.vnet_resource_group(),
        &name,
    );
    let managed = match observe(ctx, client, &reference, SERVICE_NAME).await? {
        None => true,
        Some(body) if crds::has_owned(body.tags(), &scope.cluster_name()) => true,
        Some(body) => {
            let vnet = existing_as::<VirtualNetwork>(&body, &name)?;
            info!("Adopting existing VNet {} as unmanaged", reference.display_name());
            scope.set_vnet_details(vnet.id.clone(), address_prefixes(vnet));
            false
        }
    };
    scope.set_vnet_managed(managed);
    Ok(managed)
}

/// Strategy for the cluster VNet
#[derive(Debug, Default)]
pub struct VirtualNetworks;

#[async_trait]
impl ServiceStrategy for VirtualNetworks {
    type Spec = VnetSpec;

    fn name(&self) -> &'static str {
        SERVICE_NAME
    }

    fn condition_type(&self) -> &'static str {
        VNET_READY_CONDITION
    }

    async fn is_managed(
        &self,
        scope: &mut ClusterScope,
        ctx: &OperationContext,
        client: &dyn AzureClientTrait,
    ) -> Result<bool, ReconcileError> {
        vnet_is_managed(scope, ctx, client).await
    }

    fn specs(&self, scope: &ClusterScope) -> Result<Vec<VnetSpec>, ReconcileError> {
        let vnet = &scope.network_spec().vnet;
        let mut tags = scope.additional_tags().clone();
        tags.extend(vnet.tags.clone());
        Ok(vec![VnetSpec {
            name: vnet.name.clone(),
            resource_group: scope.vnet_resource_group().to_string(),
            location: scope.location().to_string(),
            cidr_blocks: vnet.cidr_blocks.clone(),
            cluster_name: scope.cluster_name(),
            tags,
        }])
    }

    fn on_applied(
        &self,
        scope: &mut ClusterScope,
        spec: &VnetSpec,
        result: Option<&ResourceBody>,
    ) -> Result<(), ReconcileError> {
        if let Some(body) = result {
            let vnet = existing_as::<VirtualNetwork>(body, &spec.name)?;
            scope.set_vnet_details(vnet.id.clone(), address_prefixes(vnet));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::async_ops::AsyncReconciler;
    use crate::metrics::Metrics;
    use crate::service::{ResourceService, Service};
    use crate::test_utils::{TEST_RESOURCE_GROUP, TEST_SUBSCRIPTION, test_scope};
    use azure_client::{MockAzureClient, MockVerb};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    fn vnet_ref() -> ResourceRef {
        ResourceRef::new(
            ResourceKind::VirtualNetwork,
            TEST_SUBSCRIPTION,
            TEST_RESOURCE_GROUP,
            "my-cluster-vnet",
        )
    }

    fn service(client: &MockAzureClient) -> ResourceService<VirtualNetworks> {
        let reconciler = AsyncReconciler::new(Arc::new(client.clone()), Arc::new(Metrics::new().unwrap()));
        ResourceService::new(Arc::new(reconciler), VirtualNetworks)
    }

    fn ctx() -> OperationContext {
        OperationContext::new(Duration::from_secs(60), CancellationToken::new())
    }

    #[tokio::test]
    async fn test_creates_vnet_and_records_id() {
        let client = MockAzureClient::new();
        let mut scope = test_scope();

        service(&client).reconcile(&mut scope, &ctx()).await.unwrap();

        let vnet = &scope.network_spec().vnet;
        assert_eq!(vnet.id.as_deref(), Some(vnet_ref().id().as_str()));
        assert_eq!(vnet.cidr_blocks, vec!["10.0.0.0/8".to_string()]);
        assert_eq!(scope.vnet_managed(), Some(true));
        assert_eq!(client.count(MockVerb::Put), 1);
    }

    #[tokio::test]
    async fn test_adopts_foreign_vnet() {
        let client = MockAzureClient::new();
        client.insert(
            &vnet_ref(),
            VirtualNetwork {
                location: "westeurope".into(),
                properties: VirtualNetworkProperties {
                    address_space: Some(AddressSpace {
                        address_prefixes: vec!["192.168.0.0/16".into()],
                    }),
                    ..Default::default()
                },
                ..Default::default()
            }
            .into_body(),
        );
        let mut scope = test_scope();

        service(&client).reconcile(&mut scope, &ctx()).await.unwrap();

        assert_eq!(scope.vnet_managed(), Some(false));
        assert_eq!(client.count(MockVerb::Put), 0);
        let vnet = &scope.network_spec().vnet;
        assert_eq!(vnet.cidr_blocks, vec!["192.168.0.0/16".to_string()]);
        assert!(vnet.id.is_some());
    }
}
