//! Network specification types
//!
//! Desired-state description of the cluster network embedded in the
//! AzureCluster spec.

use crate::tags::Tags;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Cluster network configuration
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NetworkSpec {
    /// Virtual network
    #[serde(default)]
    pub vnet: VnetSpec,

    /// Subnets inside the virtual network
    #[serde(default)]
    pub subnets: Vec<SubnetSpec>,

    /// API server load balancer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_server_lb: Option<LoadBalancerSpec>,

    /// Private endpoints attached to cluster subnets
    #[serde(default)]
    pub private_endpoints: Vec<PrivateEndpointSpec>,
}

/// Virtual network configuration
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VnetSpec {
    /// Resource group of the VNet (defaults to the cluster resource group)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_group: Option<String>,

    /// VNet name
    #[serde(default)]
    pub name: String,

    /// Azure resource ID, populated once the VNet is observed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Address space
    #[serde(default)]
    pub cidr_blocks: Vec<String>,

    /// Extra tags for the VNet
    #[serde(default)]
    pub tags: Tags,
}

/// Subnet role within the cluster
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum SubnetRole {
    /// Control plane nodes
    ControlPlane,
    /// Worker nodes
    #[default]
    Node,
    /// Bastion hosts
    Bastion,
    /// Shared by all roles
    Cluster,
}

impl SubnetRole {
    /// Role tag value
    pub fn as_str(&self) -> &'static str {
        match self {
            SubnetRole::ControlPlane => "control-plane",
            SubnetRole::Node => "node",
            SubnetRole::Bastion => "bastion",
            SubnetRole::Cluster => "cluster",
        }
    }
}

/// Subnet configuration
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SubnetSpec {
    /// Subnet role
    #[serde(default)]
    pub role: SubnetRole,

    /// Subnet name
    pub name: String,

    /// Azure resource ID, populated once observed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Address prefixes
    #[serde(default)]
    pub cidr_blocks: Vec<String>,

    /// Network security group attached to the subnet
    #[serde(default)]
    pub security_group: SecurityGroupSpec,

    /// Route table attached to the subnet
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route_table: Option<RouteTableSpec>,
}

/// Network security group configuration
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SecurityGroupSpec {
    /// NSG name; an empty name means the subnet has no NSG
    #[serde(default)]
    pub name: String,

    /// Desired rules
    #[serde(default)]
    pub security_rules: Vec<SecurityRule>,

    /// Extra tags for the NSG
    #[serde(default)]
    pub tags: Tags,
}

/// Transport protocol of a security rule
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
pub enum SecurityRuleProtocol {
    /// Any protocol
    #[default]
    #[serde(rename = "*")]
    All,
    /// TCP
    Tcp,
    /// UDP
    Udp,
    /// ICMP
    Icmp,
}

/// Direction of traffic a rule applies to
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
pub enum SecurityRuleDirection {
    /// Incoming traffic
    #[default]
    Inbound,
    /// Outgoing traffic
    Outbound,
}

/// Whether matching traffic is allowed
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
pub enum SecurityRuleAccess {
    /// Allow traffic
    #[default]
    Allow,
    /// Deny traffic
    Deny,
}

/// A single security rule as declared by the user
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SecurityRule {
    /// Rule name, unique within the NSG (case-insensitive)
    pub name: String,

    /// Free-form description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Protocol
    #[serde(default)]
    pub protocol: SecurityRuleProtocol,

    /// Traffic direction
    #[serde(default)]
    pub direction: SecurityRuleDirection,

    /// Priority (100..4096, lower wins)
    pub priority: i32,

    /// Source address prefix
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    /// Source port range
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_ports: Option<String>,

    /// Destination address prefix
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,

    /// Destination port range
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_ports: Option<String>,

    /// Allow or deny
    #[serde(default)]
    pub action: SecurityRuleAccess,
}

/// Route table configuration
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RouteTableSpec {
    /// Route table name
    pub name: String,
}

/// Load balancer exposure
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
pub enum LoadBalancerType {
    /// Internet facing
    #[default]
    Public,
    /// VNet internal
    Internal,
}

/// Load balancer configuration
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LoadBalancerSpec {
    /// Load balancer name
    pub name: String,

    /// Public or internal
    #[serde(default, rename = "type")]
    pub lb_type: LoadBalancerType,

    /// Frontend IP configurations
    #[serde(default)]
    pub frontend_ips: Vec<FrontendIp>,

    /// Idle timeout for the API server rule
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idle_timeout_in_minutes: Option<i32>,

    /// Port the API server listens on
    #[serde(default = "default_api_server_port")]
    pub api_server_port: i32,
}

fn default_api_server_port() -> i32 {
    6443
}

/// Frontend IP configuration of a load balancer
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FrontendIp {
    /// Frontend name
    pub name: String,

    /// Public IP backing a public frontend
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_ip: Option<PublicIpSpec>,

    /// Static private address of an internal frontend
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_ip_address: Option<String>,
}

/// Public IP address configuration
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PublicIpSpec {
    /// Public IP name
    pub name: String,

    /// DNS label
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dns_name: Option<String>,
}

/// Private endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PrivateEndpointSpec {
    /// Endpoint name
    pub name: String,

    /// Name of the cluster subnet the endpoint is placed in
    pub subnet: String,

    /// Location override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,

    /// Name of the network interface Azure creates for the endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_network_interface_name: Option<String>,

    /// Private link connections
    #[serde(default)]
    pub private_link_service_connections: Vec<PrivateLinkServiceConnection>,
}

/// Connection from a private endpoint to a private link service
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PrivateLinkServiceConnection {
    /// Connection name
    pub name: String,

    /// Resource ID of the target service
    pub private_link_service_id: String,

    /// Target sub-resource group IDs
    #[serde(default)]
    pub group_ids: Vec<String>,

    /// Message sent with a manual approval request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_security_rule_deserializes_wire_names() {
        let rule: SecurityRule = serde_json::from_value(serde_json::json!({
            "name": "allow_ssh",
            "protocol": "Tcp",
            "direction": "Inbound",
            "priority": 100,
            "destinationPorts": "22",
            "action": "Allow"
        }))
        .unwrap();
        assert_eq!(rule.protocol, SecurityRuleProtocol::Tcp);
        assert_eq!(rule.destination_ports.as_deref(), Some("22"));
        assert!(rule.source.is_none());
    }

    #[test]
    fn test_load_balancer_defaults_api_server_port() {
        let lb: LoadBalancerSpec =
            serde_json::from_value(serde_json::json!({ "name": "api" })).unwrap();
        assert_eq!(lb.api_server_port, 6443);
        assert_eq!(lb.lb_type, LoadBalancerType::Public);
    }
}
