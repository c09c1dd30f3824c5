//! Public IP service.
//!
//! Public IPs back the frontends of a public API server load balancer. Once
//! an address exists it also provides the cluster's control plane endpoint.

use crate::async_ops::OperationContext;
use crate::error::ReconcileError;
use crate::scope::ClusterScope;
use crate::service::ServiceStrategy;
use crate::spec::{ResourceSpec, existing_as};
use async_trait::async_trait;
use azure_client::{
    AzureClientTrait, DnsSettings, PublicIpAddress, PublicIpAddressProperties, ResourceBody, ResourceKind, Sku,
    TypedBody,
};
use crds::{ApiEndpoint, BuildParams, LoadBalancerType, PUBLIC_IPS_READY_CONDITION, Tags};
use tracing::info;

/// Service name
pub const SERVICE_NAME: &str = "publicips";

/// Desired public IP address
#[derive(Debug, Clone)]
pub struct PublicIpSpec {
    name: String,
    resource_group: String,
    location: String,
    cluster_name: String,
    dns_name: Option<String>,
    additional_tags: Tags,
    api_server_port: i32,
}

impl PublicIpSpec {
    /// Leftmost label of the DNS name, which Azure expects as the domain label
    fn domain_name_label(&self) -> Option<String> {
        self.dns_name
            .as_deref()
            .and_then(|dns| dns.split('.').next())
            .filter(|label| !label.is_empty())
            .map(str::to_lowercase)
    }
}

impl ResourceSpec for PublicIpSpec {
    fn kind(&self) -> ResourceKind {
        ResourceKind::PublicIpAddress
    }

    fn resource_name(&self) -> &str {
        &self.name
    }

    fn resource_group_name(&self) -> &str {
        &self.resource_group
    }

    fn parameters(&self, existing: Option<&ResourceBody>) -> Result<Option<ResourceBody>, ReconcileError> {
        if let Some(existing) = existing {
            existing_as::<PublicIpAddress>(existing, &self.name)?;
            return Ok(None);
        }
        Ok(Some(
            PublicIpAddress {
                location: self.location.clone(),
                tags: Some(crds::build(BuildParams {
                    cluster_name: &self.cluster_name,
                    name: Some(&self.name),
                    additional: Some(&self.additional_tags),
                    ..Default::default()
                })),
                sku: Some(Sku {
                    name: "Standard".to_string(),
                }),
                properties: PublicIpAddressProperties {
                    public_ip_allocation_method: Some("Static".to_string()),
                    public_ip_address_version: Some("IPv4".to_string()),
                    dns_settings: self.domain_name_label().map(|label| DnsSettings {
                        domain_name_label: Some(label),
                        fqdn: None,
                    }),
                    ..Default::default()
                },
                ..Default::default()
            }
            .into_body(),
        ))
    }
}

/// Strategy for the public IPs of the API server load balancer
#[derive(Debug, Default)]
pub struct PublicIps;

#[async_trait]
impl ServiceStrategy for PublicIps {
    type Spec = PublicIpSpec;

    fn name(&self) -> &'static str {
        SERVICE_NAME
    }

    fn condition_type(&self) -> &'static str {
        PUBLIC_IPS_READY_CONDITION
    }

    async fn is_managed(
        &self,
        _scope: &mut ClusterScope,
        _ctx: &OperationContext,
        _client: &dyn AzureClientTrait,
    ) -> Result<bool, ReconcileError> {
        Ok(true)
    }

    fn specs(&self, scope: &ClusterScope) -> Result<Vec<PublicIpSpec>, ReconcileError> {
        let Some(lb) = scope.network_spec().api_server_lb.as_ref() else {
            return Ok(Vec::new());
        };
        if lb.lb_type != LoadBalancerType::Public {
            return Ok(Vec::new());
        }
        Ok(lb
            .frontend_ips
            .iter()
            .filter_map(|frontend| frontend.public_ip.as_ref())
            .map(|ip| PublicIpSpec {
                name: ip.name.clone(),
                resource_group: scope.resource_group().to_string(),
                location: scope.location().to_string(),
                cluster_name: scope.cluster_name(),
                dns_name: ip.dns_name.clone(),
                additional_tags: scope.additional_tags().clone(),
                api_server_port: lb.api_server_port,
            })
            .collect())
    }

    fn on_applied(
        &self,
        scope: &mut ClusterScope,
        spec: &PublicIpSpec,
        result: Option<&ResourceBody>,
    ) -> Result<(), ReconcileError> {
        if scope.control_plane_endpoint().is_some() {
            return Ok(());
        }
        let Some(body) = result else {
            return Ok(());
        };
        let ip = existing_as::<PublicIpAddress>(body, &spec.name)?;
        let host = ip
            .properties
            .dns_settings
            .as_ref()
            .and_then(|dns| dns.fqdn.clone())
            .or_else(|| spec.dns_name.clone())
            .or_else(|| ip.properties.ip_address.clone());
        if let Some(host) = host {
            info!("Control plane endpoint is {}:{}", host, spec.api_server_port);
            scope.set_control_plane_endpoint(ApiEndpoint {
                host,
                port: spec.api_server_port,
            });
        }
        Ok(())
    }
}
