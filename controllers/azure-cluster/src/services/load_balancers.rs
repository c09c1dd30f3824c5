//! API server load balancer service.
//!
//! The load balancer gets one frontend per declared frontend IP, a single
//! backend pool, an HTTPS probe against `/readyz` and a TCP rule forwarding
//! the API server port. An existing load balancer is only rewritten when one
//! of those named components is missing.

use crate::async_ops::OperationContext;
use crate::error::ReconcileError;
use crate::scope::ClusterScope;
use crate::service::ServiceStrategy;
use crate::spec::{ResourceSpec, existing_as};
use async_trait::async_trait;
use azure_client::{
    AzureClientTrait, BackendAddressPool, FrontendIpConfiguration, FrontendIpConfigurationProperties,
    LoadBalancer, LoadBalancerProperties, LoadBalancingRule, LoadBalancingRuleProperties, Probe,
    ProbeProperties, ResourceBody, ResourceKind, ResourceRef, Sku, SubResource, TypedBody,
};
use crds::{ApiEndpoint, BuildParams, LOAD_BALANCERS_READY_CONDITION, LoadBalancerType, SubnetRole, Tags};
use tracing::info;

/// Service name
pub const SERVICE_NAME: &str = "loadbalancers";

const PROBE_NAME: &str = "HTTPSProbe";
const RULE_NAME: &str = "LBRuleHTTPS";
const PROBE_INTERVAL_SECONDS: i32 = 15;
const PROBE_COUNT: i32 = 4;

/// One frontend, resolved to the resource it is bound to
#[derive(Debug, Clone)]
enum Frontend {
    Public {
        name: String,
        public_ip_id: String,
    },
    Internal {
        name: String,
        subnet_id: String,
        private_ip_address: Option<String>,
    },
}

impl Frontend {
    fn name(&self) -> &str {
        match self {
            Frontend::Public { name, .. } | Frontend::Internal { name, .. } => name,
        }
    }

    fn configuration(&self) -> FrontendIpConfiguration {
        let properties = match self {
            Frontend::Public { public_ip_id, .. } => FrontendIpConfigurationProperties {
                public_ip_address: Some(SubResource::new(public_ip_id.clone())),
                ..Default::default()
            },
            Frontend::Internal {
                subnet_id,
                private_ip_address,
                ..
            } => FrontendIpConfigurationProperties {
                subnet: Some(SubResource::new(subnet_id.clone())),
                private_ip_address: private_ip_address.clone(),
                private_ip_allocation_method: Some(
                    if private_ip_address.is_some() { "Static" } else { "Dynamic" }.to_string(),
                ),
                ..Default::default()
            },
        };
        FrontendIpConfiguration {
            name: self.name().to_string(),
            properties,
        }
    }
}

/// Desired API server load balancer
#[derive(Debug, Clone)]
pub struct LoadBalancerSpec {
    name: String,
    resource_group: String,
    location: String,
    cluster_name: String,
    id: String,
    frontends: Vec<Frontend>,
    idle_timeout_in_minutes: Option<i32>,
    api_server_port: i32,
    additional_tags: Tags,
}

impl LoadBalancerSpec {
    fn backend_pool_name(&self) -> String {
        format!("{}-backendPool", self.name)
    }

    fn child_id(&self, collection: &str, name: &str) -> SubResource {
        SubResource::new(format!("{}/{}/{}", self.id, collection, name))
    }

    fn has_components(&self, lb: &LoadBalancer) -> bool {
        let props = &lb.properties;
        let pool = self.backend_pool_name();
        self.frontends.iter().all(|f| {
            props
                .frontend_ip_configurations
                .iter()
                .any(|c| c.name.eq_ignore_ascii_case(f.name()))
        }) && props
            .backend_address_pools
            .iter()
            .any(|p| p.name.eq_ignore_ascii_case(&pool))
            && props.probes.iter().any(|p| p.name.eq_ignore_ascii_case(PROBE_NAME))
            && props
                .load_balancing_rules
                .iter()
                .any(|r| r.name.eq_ignore_ascii_case(RULE_NAME))
    }

    fn desired_properties(&self) -> LoadBalancerProperties {
        let pool = self.backend_pool_name();
        let rules = self
            .frontends
            .first()
            .map(|frontend| LoadBalancingRule {
                name: RULE_NAME.to_string(),
                properties: LoadBalancingRuleProperties {
                    protocol: "Tcp".to_string(),
                    frontend_port: self.api_server_port,
                    backend_port: self.api_server_port,
                    idle_timeout_in_minutes: self.idle_timeout_in_minutes,
                    frontend_ip_configuration: Some(
                        self.child_id("frontendIPConfigurations", frontend.name()),
                    ),
                    backend_address_pool: Some(self.child_id("backendAddressPools", &pool)),
                    probe: Some(self.child_id("probes", PROBE_NAME)),
                },
            })
            .into_iter()
            .collect();
        LoadBalancerProperties {
            frontend_ip_configurations: self.frontends.iter().map(Frontend::configuration).collect(),
            backend_address_pools: vec![BackendAddressPool { name: pool }],
            load_balancing_rules: rules,
            probes: vec![Probe {
                name: PROBE_NAME.to_string(),
                properties: ProbeProperties {
                    protocol: "Https".to_string(),
                    port: self.api_server_port,
                    request_path: Some("/readyz".to_string()),
                    interval_in_seconds: Some(PROBE_INTERVAL_SECONDS),
                    number_of_probes: Some(PROBE_COUNT),
                },
            }],
            provisioning_state: None,
        }
    }
}

impl ResourceSpec for LoadBalancerSpec {
    fn kind(&self) -> ResourceKind {
        ResourceKind::LoadBalancer
    }

    fn resource_name(&self) -> &str {
        &self.name
    }

    fn resource_group_name(&self) -> &str {
        &self.resource_group
    }

    fn parameters(&self, existing: Option<&ResourceBody>) -> Result<Option<ResourceBody>, ReconcileError> {
        let existing = existing
            .map(|body| existing_as::<LoadBalancer>(body, &self.name))
            .transpose()?;
        if existing.is_some_and(|lb| self.has_components(lb)) {
            return Ok(None);
        }
        Ok(Some(
            LoadBalancer {
                etag: existing.and_then(|lb| lb.etag.clone()),
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
                properties: self.desired_properties(),
                ..Default::default()
            }
            .into_body(),
        ))
    }
}

/// Strategy for the API server load balancer
#[derive(Debug, Default)]
pub struct LoadBalancers;

#[async_trait]
impl ServiceStrategy for LoadBalancers {
    type Spec = LoadBalancerSpec;

    fn name(&self) -> &'static str {
        SERVICE_NAME
    }

    fn condition_type(&self) -> &'static str {
        LOAD_BALANCERS_READY_CONDITION
    }

    async fn is_managed(
        &self,
        _scope: &mut ClusterScope,
        _ctx: &OperationContext,
        _client: &dyn AzureClientTrait,
    ) -> Result<bool, ReconcileError> {
        Ok(true)
    }

    fn specs(&self, scope: &ClusterScope) -> Result<Vec<LoadBalancerSpec>, ReconcileError> {
        let Some(lb) = scope.network_spec().api_server_lb.as_ref() else {
            return Ok(Vec::new());
        };
        let sub = scope.subscription_id();
        let rg = scope.resource_group();

        let mut frontends = Vec::with_capacity(lb.frontend_ips.len());
        for frontend in &lb.frontend_ips {
            let resolved = match lb.lb_type {
                LoadBalancerType::Public => {
                    let Some(ip) = frontend.public_ip.as_ref() else {
                        return Err(ReconcileError::Terminal(format!(
                            "public load balancer {} frontend {} has no public IP",
                            lb.name, frontend.name
                        )));
                    };
                    Frontend::Public {
                        name: frontend.name.clone(),
                        public_ip_id: ResourceRef::new(ResourceKind::PublicIpAddress, sub, rg, &ip.name).id(),
                    }
                }
                LoadBalancerType::Internal => {
                    let Some(subnet) = scope
                        .network_spec()
                        .subnets
                        .iter()
                        .find(|s| s.role == SubnetRole::ControlPlane)
                    else {
                        return Err(ReconcileError::Terminal(format!(
                            "internal load balancer {} needs a control plane subnet",
                            lb.name
                        )));
                    };
                    Frontend::Internal {
                        name: frontend.name.clone(),
                        subnet_id: ResourceRef::new(
                            ResourceKind::Subnet,
                            sub,
                            scope.vnet_resource_group(),
                            &subnet.name,
                        )
                        .with_parent(&scope.network_spec().vnet.name)
                        .id(),
                        private_ip_address: frontend.private_ip_address.clone(),
                    }
                }
            };
            frontends.push(resolved);
        }

        Ok(vec![LoadBalancerSpec {
            name: lb.name.clone(),
            resource_group: rg.to_string(),
            location: scope.location().to_string(),
            cluster_name: scope.cluster_name(),
            id: ResourceRef::new(ResourceKind::LoadBalancer, sub, rg, &lb.name).id(),
            frontends,
            idle_timeout_in_minutes: lb.idle_timeout_in_minutes,
            api_server_port: lb.api_server_port,
            additional_tags: scope.additional_tags().clone(),
        }])
    }

    fn on_applied(
        &self,
        scope: &mut ClusterScope,
        spec: &LoadBalancerSpec,
        _result: Option<&ResourceBody>,
    ) -> Result<(), ReconcileError> {
        if scope.control_plane_endpoint().is_some() {
            return Ok(());
        }
        let private_ip = spec.frontends.iter().find_map(|f| match f {
            Frontend::Internal {
                private_ip_address: Some(ip),
                ..
            } => Some(ip.clone()),
            _ => None,
        });
        if let Some(host) = private_ip {
            info!("Control plane endpoint is {}:{}", host, spec.api_server_port);
            scope.set_control_plane_endpoint(ApiEndpoint {
                host,
                port: spec.api_server_port,
            });
        }
        Ok(())
    }
}
