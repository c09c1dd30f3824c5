//! Subnet service.
//!
//! Subnets are children of the cluster VNet and are deleted with it.
//! An existing subnet is updated only when its address space or its NSG
//! or route table association differs from the declared one.

use super::same_id;
use super::virtual_networks::vnet_is_managed;
use crate::async_ops::OperationContext;
use crate::error::ReconcileError;
use crate::scope::ClusterScope;
use crate::service::ServiceStrategy;
use crate::spec::{ResourceSpec, existing_as};
use async_trait::async_trait;
use azure_client::{
    AzureClientTrait, ResourceBody, ResourceKind, ResourceRef, SubResource, Subnet, SubnetProperties, TypedBody,
};
use crds::SUBNETS_READY_CONDITION;

/// Service name
pub const SERVICE_NAME: &str = "subnets";

/// Desired subnet inside the cluster VNet
#[derive(Debug, Clone)]
pub struct SubnetSpec {
    name: String,
    resource_group: String,
    vnet_name: String,
    cidr_blocks: Vec<String>,
    security_group_id: Option<String>,
    route_table_id: Option<String>,
}

impl SubnetSpec {
    fn is_current(&self, subnet: &Subnet) -> bool {
        let props = &subnet.properties;
        let mut observed = props.prefixes();
        let mut desired = self.cidr_blocks.clone();
        observed.sort();
        desired.sort();
        observed == desired
            && same_id(
                props.network_security_group.as_ref().map(|s| s.id.as_str()),
                self.security_group_id.as_deref(),
            )
            && same_id(
                props.route_table.as_ref().map(|s| s.id.as_str()),
                self.route_table_id.as_deref(),
            )
    }
}

impl ResourceSpec for SubnetSpec {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Subnet
    }

    fn resource_name(&self) -> &str {
        &self.name
    }

    fn resource_group_name(&self) -> &str {
        &self.resource_group
    }

    fn owner_resource_name(&self) -> Option<&str> {
        Some(&self.vnet_name)
    }

    fn parameters(&self, existing: Option<&ResourceBody>) -> Result<Option<ResourceBody>, ReconcileError> {
        let mut subnet = match existing {
            Some(existing) => {
                let subnet = existing_as::<Subnet>(existing, &self.name)?;
                if self.is_current(subnet) {
                    return Ok(None);
                }
                subnet.clone()
            }
            None => Subnet::default(),
        };

        let props: &mut SubnetProperties = &mut subnet.properties;
        match self.cidr_blocks.as_slice() {
            [single] => {
                props.address_prefix = Some(single.clone());
                props.address_prefixes = None;
            }
            many => {
                props.address_prefix = None;
                props.address_prefixes = Some(many.to_vec());
            }
        }
        props.network_security_group = self.security_group_id.clone().map(SubResource::new);
        props.route_table = self.route_table_id.clone().map(SubResource::new);
        props.provisioning_state = None;
        Ok(Some(subnet.into_body()))
    }
}

/// Strategy for the subnets of the cluster VNet
#[derive(Debug, Default)]
pub struct Subnets;

#[async_trait]
impl ServiceStrategy for Subnets {
    type Spec = SubnetSpec;

    fn name(&self) -> &'static str {
        SERVICE_NAME
    }

    fn condition_type(&self) -> &'static str {
        SUBNETS_READY_CONDITION
    }

    fn delete_is_noop(&self) -> bool {
        true
    }

    async fn is_managed(
        &self,
        scope: &mut ClusterScope,
        ctx: &OperationContext,
        client: &dyn AzureClientTrait,
    ) -> Result<bool, ReconcileError> {
        vnet_is_managed(scope, ctx, client).await
    }

    fn specs(&self, scope: &ClusterScope) -> Result<Vec<SubnetSpec>, ReconcileError> {
        let sub = scope.subscription_id();
        let rg = scope.resource_group();
        let id_of = |kind, name: &str| ResourceRef::new(kind, sub, rg, name).id();

        Ok(scope
            .network_spec()
            .subnets
            .iter()
            .map(|subnet| SubnetSpec {
                name: subnet.name.clone(),
                resource_group: scope.vnet_resource_group().to_string(),
                vnet_name: scope.network_spec().vnet.name.clone(),
                cidr_blocks: subnet.cidr_blocks.clone(),
                security_group_id: Some(&subnet.security_group.name)
                    .filter(|name| !name.is_empty())
                    .map(|name| id_of(ResourceKind::SecurityGroup, name)),
                route_table_id: subnet
                    .route_table
                    .as_ref()
                    .filter(|table| !table.name.is_empty())
                    .map(|table| id_of(ResourceKind::RouteTable, &table.name)),
            })
            .collect())
    }

    fn on_applied(
        &self,
        scope: &mut ClusterScope,
        spec: &SubnetSpec,
        result: Option<&ResourceBody>,
    ) -> Result<(), ReconcileError> {
        if let Some(id) = result.and_then(ResourceBody::id) {
            scope.set_subnet_id(&spec.name, id.to_string());
        }
        Ok(())
    }
}
