//! Private endpoint service.

use super::same_id;
use crate::async_ops::OperationContext;
use crate::error::ReconcileError;
use crate::scope::ClusterScope;
use crate::service::ServiceStrategy;
use crate::spec::{ResourceSpec, existing_as};
use async_trait::async_trait;
use azure_client::{
    AzureClientTrait, PrivateEndpoint, PrivateEndpointProperties, PrivateLinkServiceConnection,
    PrivateLinkServiceConnectionProperties, ResourceBody, ResourceKind, ResourceRef, SubResource, TypedBody,
};
use crds::{BuildParams, PRIVATE_ENDPOINTS_READY_CONDITION, Tags};

/// Service name
pub const SERVICE_NAME: &str = "privateendpoints";

/// Desired private endpoint
#[derive(Debug, Clone)]
pub struct PrivateEndpointSpec {
    name: String,
    resource_group: String,
    location: String,
    cluster_name: String,
    subnet_id: String,
    custom_network_interface_name: Option<String>,
    connections: Vec<PrivateLinkServiceConnection>,
    additional_tags: Tags,
}

impl PrivateEndpointSpec {
    fn is_current(&self, endpoint: &PrivateEndpoint) -> bool {
        let props = &endpoint.properties;
        let observed = &props.private_link_service_connections;
        same_id(props.subnet.as_ref().map(|s| s.id.as_str()), Some(&self.subnet_id))
            && observed.len() == self.connections.len()
            && self.connections.iter().all(|want| {
                observed.iter().any(|have| {
                    have.name == want.name
                        && same_id(
                            Some(&have.properties.private_link_service_id),
                            Some(&want.properties.private_link_service_id),
                        )
                        && have.properties.group_ids == want.properties.group_ids
                })
            })
    }
}

impl ResourceSpec for PrivateEndpointSpec {
    fn kind(&self) -> ResourceKind {
        ResourceKind::PrivateEndpoint
    }

    fn resource_name(&self) -> &str {
        &self.name
    }

    fn resource_group_name(&self) -> &str {
        &self.resource_group
    }

    fn parameters(&self, existing: Option<&ResourceBody>) -> Result<Option<ResourceBody>, ReconcileError> {
        let existing = existing
            .map(|body| existing_as::<PrivateEndpoint>(body, &self.name))
            .transpose()?;
        if existing.is_some_and(|endpoint| self.is_current(endpoint)) {
            return Ok(None);
        }
        Ok(Some(
            PrivateEndpoint {
                etag: existing.and_then(|endpoint| endpoint.etag.clone()),
                location: self.location.clone(),
                tags: Some(crds::build(BuildParams {
                    cluster_name: &self.cluster_name,
                    name: Some(&self.name),
                    additional: Some(&self.additional_tags),
                    ..Default::default()
                })),
                properties: PrivateEndpointProperties {
                    subnet: Some(SubResource::new(self.subnet_id.clone())),
                    private_link_service_connections: self.connections.clone(),
                    custom_network_interface_name: self.custom_network_interface_name.clone(),
                    provisioning_state: None,
                },
                ..Default::default()
            }
            .into_body(),
        ))
    }
}

/// Strategy for private endpoints placed in cluster subnets
#[derive(Debug, Default)]
pub struct PrivateEndpoints;

#[async_trait]
impl ServiceStrategy for PrivateEndpoints {
    type Spec = PrivateEndpointSpec;

    fn name(&self) -> &'static str {
        SERVICE_NAME
    }

    fn condition_type(&self) -> &'static str {
        PRIVATE_ENDPOINTS_READY_CONDITION
    }

    async fn is_managed(
        &self,
        _scope: &mut ClusterScope,
        _ctx: &OperationContext,
        _client: &dyn AzureClientTrait,
    ) -> Result<bool, ReconcileError> {
        Ok(true)
    }

    fn specs(&self, scope: &ClusterScope) -> Result<Vec<PrivateEndpointSpec>, ReconcileError> {
        let network = scope.network_spec();
        network
            .private_endpoints
            .iter()
            .map(|endpoint| {
                if !network.subnets.iter().any(|s| s.name == endpoint.subnet) {
                    return Err(ReconcileError::Terminal(format!(
                        "private endpoint {} references unknown subnet {}",
                        endpoint.name, endpoint.subnet
                    )));
                }
                let subnet_id = ResourceRef::new(
                    ResourceKind::Subnet,
                    scope.subscription_id(),
                    scope.vnet_resource_group(),
                    &endpoint.subnet,
                )
                .with_parent(&network.vnet.name)
                .id();
                Ok(PrivateEndpointSpec {
                    name: endpoint.name.clone(),
                    resource_group: scope.resource_group().to_string(),
                    location: endpoint
                        .location
                        .clone()
                        .unwrap_or_else(|| scope.location().to_string()),
                    cluster_name: scope.cluster_name(),
                    subnet_id,
                    custom_network_interface_name: endpoint.custom_network_interface_name.clone(),
                    connections: endpoint
                        .private_link_service_connections
                        .iter()
                        .map(|c| PrivateLinkServiceConnection {
                            name: c.name.clone(),
                            properties: PrivateLinkServiceConnectionProperties {
                                private_link_service_id: c.private_link_service_id.clone(),
                                group_ids: c.group_ids.clone(),
                                request_message: c.request_message.clone(),
                            },
                        })
                        .collect(),
                    additional_tags: scope.additional_tags().clone(),
                })
            })
            .collect()
    }
}
