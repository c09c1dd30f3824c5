//! Azure Resource Manager data models
//!
//! Request and response bodies for the resource kinds the controller manages.
//! Only the properties the controller reads or writes are modeled; ARM ignores
//! read-only fields (`id`, `etag`, `provisioningState`) sent back on PUT.

use crate::resource::ResourceKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Resource tags
pub type Tags = BTreeMap<String, String>;

/// Reference to another ARM resource by ID
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct SubResource {
    /// ARM resource ID
    pub id: String,
}

impl SubResource {
    /// Reference by ID
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// SKU of a public IP or load balancer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Sku {
    /// SKU name (e.g. `Standard`)
    pub name: String,
}

// ---------------------------------------------------------------------------
// Resource groups

/// `Microsoft.Resources/resourceGroups`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ResourceGroup {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub location: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Tags>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<ResourceGroupProperties>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ResourceGroupProperties {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provisioning_state: Option<String>,
}

// ---------------------------------------------------------------------------
// Virtual networks and subnets

/// `Microsoft.Network/virtualNetworks`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct VirtualNetwork {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    #[serde(default)]
    pub location: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Tags>,
    #[serde(default)]
    pub properties: VirtualNetworkProperties,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct VirtualNetworkProperties {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address_space: Option<AddressSpace>,
    /// Subnets are managed through their own endpoint; sent back unchanged on PUT
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subnets: Option<Vec<Subnet>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provisioning_state: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct AddressSpace {
    #[serde(default)]
    pub address_prefixes: Vec<String>,
}

/// `Microsoft.Network/virtualNetworks/subnets`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Subnet {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    #[serde(default)]
    pub properties: SubnetProperties,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct SubnetProperties {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address_prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address_prefixes: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_security_group: Option<SubResource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route_table: Option<SubResource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_endpoint_network_policies: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provisioning_state: Option<String>,
}

impl SubnetProperties {
    /// All address prefixes regardless of which field ARM populated
    pub fn prefixes(&self) -> Vec<String> {
        match (&self.address_prefixes, &self.address_prefix) {
            (Some(prefixes), _) if !prefixes.is_empty() => prefixes.clone(),
            (_, Some(prefix)) => vec![prefix.clone()],
            _ => Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Route tables

/// `Microsoft.Network/routeTables`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct RouteTable {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    #[serde(default)]
    pub location: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Tags>,
    #[serde(default)]
    pub properties: RouteTableProperties,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct RouteTableProperties {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disable_bgp_route_propagation: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provisioning_state: Option<String>,
}

// ---------------------------------------------------------------------------
// Network security groups

/// `Microsoft.Network/networkSecurityGroups`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct SecurityGroup {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    #[serde(default)]
    pub location: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Tags>,
    #[serde(default)]
    pub properties: SecurityGroupProperties,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct SecurityGroupProperties {
    #[serde(default)]
    pub security_rules: Vec<SecurityRule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provisioning_state: Option<String>,
}

/// A security rule inside an NSG
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct SecurityRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    #[serde(default)]
    pub properties: SecurityRuleProperties,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct SecurityRuleProperties {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// `Tcp`, `Udp`, `Icmp` or `*`
    #[serde(default)]
    pub protocol: String,
    /// `Inbound` or `Outbound`
    #[serde(default)]
    pub direction: String,
    /// `Allow` or `Deny`
    #[serde(default)]
    pub access: String,
    #[serde(default)]
    pub priority: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_address_prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_port_range: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_address_prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_port_range: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provisioning_state: Option<String>,
}

// ---------------------------------------------------------------------------
// Public IPs

/// `Microsoft.Network/publicIPAddresses`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct PublicIpAddress {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    #[serde(default)]
    pub location: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Tags>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sku: Option<Sku>,
    #[serde(default)]
    pub properties: PublicIpAddressProperties,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct PublicIpAddressProperties {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_ip_allocation_method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_ip_address_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dns_settings: Option<DnsSettings>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provisioning_state: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct DnsSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain_name_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fqdn: Option<String>,
}

// ---------------------------------------------------------------------------
// Load balancers

/// `Microsoft.Network/loadBalancers`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct LoadBalancer {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    #[serde(default)]
    pub location: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Tags>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sku: Option<Sku>,
    #[serde(default)]
    pub properties: LoadBalancerProperties,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct LoadBalancerProperties {
    #[serde(default)]
    pub frontend_ip_configurations: Vec<FrontendIpConfiguration>,
    #[serde(default)]
    pub backend_address_pools: Vec<BackendAddressPool>,
    #[serde(default)]
    pub load_balancing_rules: Vec<LoadBalancingRule>,
    #[serde(default)]
    pub probes: Vec<Probe>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provisioning_state: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct FrontendIpConfiguration {
    pub name: String,
    #[serde(default)]
    pub properties: FrontendIpConfigurationProperties,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct FrontendIpConfigurationProperties {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_ip_address: Option<SubResource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subnet: Option<SubResource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_ip_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_ip_allocation_method: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct BackendAddressPool {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct LoadBalancingRule {
    pub name: String,
    #[serde(default)]
    pub properties: LoadBalancingRuleProperties,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct LoadBalancingRuleProperties {
    #[serde(default)]
    pub protocol: String,
    #[serde(default)]
    pub frontend_port: i32,
    #[serde(default)]
    pub backend_port: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idle_timeout_in_minutes: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frontend_ip_configuration: Option<SubResource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend_address_pool: Option<SubResource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probe: Option<SubResource>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Probe {
    pub name: String,
    #[serde(default)]
    pub properties: ProbeProperties,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProbeProperties {
    #[serde(default)]
    pub protocol: String,
    #[serde(default)]
    pub port: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval_in_seconds: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number_of_probes: Option<i32>,
}

// ---------------------------------------------------------------------------
// Private endpoints

/// `Microsoft.Network/privateEndpoints`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct PrivateEndpoint {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    #[serde(default)]
    pub location: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Tags>,
    #[serde(default)]
    pub properties: PrivateEndpointProperties,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct PrivateEndpointProperties {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subnet: Option<SubResource>,
    #[serde(default)]
    pub private_link_service_connections: Vec<PrivateLinkServiceConnection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_network_interface_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provisioning_state: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct PrivateLinkServiceConnection {
    pub name: String,
    #[serde(default)]
    pub properties: PrivateLinkServiceConnectionProperties,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct PrivateLinkServiceConnectionProperties {
    #[serde(default)]
    pub private_link_service_id: String,
    #[serde(default)]
    pub group_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_message: Option<String>,
}

// ---------------------------------------------------------------------------
// Tags

/// Operation of a tags PATCH
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TagsOperation {
    /// Add or overwrite the given keys
    Merge,
    /// Replace the whole tag bag
    Replace,
    /// Remove the given keys
    Delete,
}

/// `Microsoft.Resources/tags` at resource-group scope
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct TagsResource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Present only on PATCH requests
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation: Option<TagsOperation>,
    #[serde(default)]
    pub properties: TagsProperties,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct TagsProperties {
    #[serde(default)]
    pub tags: Tags,
}

// ---------------------------------------------------------------------------
// Tagged body

/// A resource body of any managed kind
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceBody {
    ResourceGroup(ResourceGroup),
    VirtualNetwork(VirtualNetwork),
    Subnet(Subnet),
    RouteTable(RouteTable),
    SecurityGroup(SecurityGroup),
    PublicIpAddress(PublicIpAddress),
    LoadBalancer(LoadBalancer),
    PrivateEndpoint(PrivateEndpoint),
    Tags(TagsResource),
}

/// Conversion between a concrete model and [`ResourceBody`]
pub trait TypedBody: Sized {
    /// Kind carried by this model
    const KIND: ResourceKind;

    /// Borrow the model out of a body of the same kind
    fn from_body(body: &ResourceBody) -> Option<&Self>;

    /// Wrap the model
    fn into_body(self) -> ResourceBody;
}

macro_rules! typed_body {
    ($($variant:ident => $ty:ty),+ $(,)?) => {
        $(
            impl TypedBody for $ty {
                const KIND: ResourceKind = ResourceKind::$variant;

                fn from_body(body: &ResourceBody) -> Option<&Self> {
                    match body {
                        ResourceBody::$variant(inner) => Some(inner),
                        _ => None,
                    }
                }

                fn into_body(self) -> ResourceBody {
                    ResourceBody::$variant(self)
                }
            }

            impl From<$ty> for ResourceBody {
                fn from(value: $ty) -> Self {
                    ResourceBody::$variant(value)
                }
            }
        )+

        impl ResourceBody {
            /// Resource kind of the body
            pub fn kind(&self) -> ResourceKind {
                match self {
                    $(ResourceBody::$variant(_) => ResourceKind::$variant,)+
                }
            }

            /// Decode an ARM JSON body of the given kind
            pub fn from_json(
                kind: ResourceKind,
                value: serde_json::Value,
            ) -> Result<Self, serde_json::Error> {
                Ok(match kind {
                    $(ResourceKind::$variant => ResourceBody::$variant(serde_json::from_value(value)?),)+
                })
            }

            /// Encode as an ARM JSON body
            pub fn to_json(&self) -> Result<serde_json::Value, serde_json::Error> {
                match self {
                    $(ResourceBody::$variant(inner) => serde_json::to_value(inner),)+
                }
            }
        }
    };
}

typed_body! {
    ResourceGroup => ResourceGroup,
    VirtualNetwork => VirtualNetwork,
    Subnet => Subnet,
    RouteTable => RouteTable,
    SecurityGroup => SecurityGroup,
    PublicIpAddress => PublicIpAddress,
    LoadBalancer => LoadBalancer,
    PrivateEndpoint => PrivateEndpoint,
    Tags => TagsResource,
}

impl ResourceBody {
    /// Borrow the concrete model, if the body is of that kind
    pub fn as_typed<T: TypedBody>(&self) -> Option<&T> {
        T::from_body(self)
    }

    /// Entity tag used for `If-Match`
    pub fn etag(&self) -> Option<&str> {
        match self {
            ResourceBody::VirtualNetwork(b) => b.etag.as_deref(),
            ResourceBody::Subnet(b) => b.etag.as_deref(),
            ResourceBody::RouteTable(b) => b.etag.as_deref(),
            ResourceBody::SecurityGroup(b) => b.etag.as_deref(),
            ResourceBody::PublicIpAddress(b) => b.etag.as_deref(),
            ResourceBody::LoadBalancer(b) => b.etag.as_deref(),
            ResourceBody::PrivateEndpoint(b) => b.etag.as_deref(),
            ResourceBody::ResourceGroup(_) | ResourceBody::Tags(_) => None,
        }
    }

    /// ARM resource ID, once assigned by the service
    pub fn id(&self) -> Option<&str> {
        match self {
            ResourceBody::ResourceGroup(b) => b.id.as_deref(),
            ResourceBody::VirtualNetwork(b) => b.id.as_deref(),
            ResourceBody::Subnet(b) => b.id.as_deref(),
            ResourceBody::RouteTable(b) => b.id.as_deref(),
            ResourceBody::SecurityGroup(b) => b.id.as_deref(),
            ResourceBody::PublicIpAddress(b) => b.id.as_deref(),
            ResourceBody::LoadBalancer(b) => b.id.as_deref(),
            ResourceBody::PrivateEndpoint(b) => b.id.as_deref(),
            ResourceBody::Tags(b) => b.id.as_deref(),
        }
    }

    /// Resource tags (the tag bag itself for the tags sub-resource)
    pub fn tags(&self) -> Option<&Tags> {
        match self {
            ResourceBody::ResourceGroup(b) => b.tags.as_ref(),
            ResourceBody::VirtualNetwork(b) => b.tags.as_ref(),
            ResourceBody::RouteTable(b) => b.tags.as_ref(),
            ResourceBody::SecurityGroup(b) => b.tags.as_ref(),
            ResourceBody::PublicIpAddress(b) => b.tags.as_ref(),
            ResourceBody::LoadBalancer(b) => b.tags.as_ref(),
            ResourceBody::PrivateEndpoint(b) => b.tags.as_ref(),
            ResourceBody::Tags(b) => Some(&b.properties.tags),
            ResourceBody::Subnet(_) => None,
        }
    }

    /// `properties.provisioningState`, if the body carries one
    pub fn provisioning_state(&self) -> Option<&str> {
        match self {
            ResourceBody::ResourceGroup(b) => {
                b.properties.as_ref().and_then(|p| p.provisioning_state.as_deref())
            }
            ResourceBody::VirtualNetwork(b) => b.properties.provisioning_state.as_deref(),
            ResourceBody::Subnet(b) => b.properties.provisioning_state.as_deref(),
            ResourceBody::RouteTable(b) => b.properties.provisioning_state.as_deref(),
            ResourceBody::SecurityGroup(b) => b.properties.provisioning_state.as_deref(),
            ResourceBody::PublicIpAddress(b) => b.properties.provisioning_state.as_deref(),
            ResourceBody::LoadBalancer(b) => b.properties.provisioning_state.as_deref(),
            ResourceBody::PrivateEndpoint(b) => b.properties.provisioning_state.as_deref(),
            ResourceBody::Tags(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_security_group() {
        let value = serde_json::json!({
            "id": "/subscriptions/s/resourceGroups/rg/providers/Microsoft.Network/networkSecurityGroups/nsg",
            "name": "nsg",
            "etag": "W/\"abc\"",
            "location": "westeurope",
            "properties": {
                "provisioningState": "Succeeded",
                "securityRules": [{
                    "name": "allow_ssh",
                    "properties": {
                        "protocol": "Tcp",
                        "direction": "Inbound",
                        "access": "Allow",
                        "priority": 100,
                        "destinationPortRange": "22",
                        "provisioningState": "Succeeded"
                    }
                }]
            }
        });
        let body = ResourceBody::from_json(ResourceKind::SecurityGroup, value).unwrap();
        assert_eq!(body.kind(), ResourceKind::SecurityGroup);
        assert_eq!(body.etag(), Some("W/\"abc\""));
        assert_eq!(body.provisioning_state(), Some("Succeeded"));

        let nsg = body.as_typed::<SecurityGroup>().unwrap();
        assert_eq!(nsg.properties.security_rules.len(), 1);
        assert_eq!(
            nsg.properties.security_rules[0].properties.destination_port_range.as_deref(),
            Some("22")
        );
        assert!(body.as_typed::<VirtualNetwork>().is_none());
    }

    #[test]
    fn test_tags_patch_encodes_operation() {
        let mut tags = Tags::new();
        tags.insert("env".into(), "prod".into());
        let body = TagsResource {
            operation: Some(TagsOperation::Replace),
            properties: TagsProperties { tags },
            ..Default::default()
        }
        .into_body();
        let json = body.to_json().unwrap();
        assert_eq!(json["operation"], "Replace");
        assert_eq!(json["properties"]["tags"]["env"], "prod");
    }

    #[test]
    fn test_subnet_prefixes() {
        let props = SubnetProperties {
            address_prefix: Some("10.0.0.0/24".into()),
            ..Default::default()
        };
        assert_eq!(props.prefixes(), vec!["10.0.0.0/24".to_string()]);
    }
}
