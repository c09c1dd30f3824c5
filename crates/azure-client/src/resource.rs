//! Resource kinds and ARM addressing

use serde::{Deserialize, Serialize};

const NETWORK_API_VERSION: &str = "2023-05-01";
const RESOURCES_API_VERSION: &str = "2021-04-01";

/// Azure resource kinds the controller manages
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// `Microsoft.Resources/resourceGroups`
    ResourceGroup,
    /// `Microsoft.Network/virtualNetworks`
    VirtualNetwork,
    /// `Microsoft.Network/virtualNetworks/subnets`
    Subnet,
    /// `Microsoft.Network/routeTables`
    RouteTable,
    /// `Microsoft.Network/networkSecurityGroups`
    SecurityGroup,
    /// `Microsoft.Network/publicIPAddresses`
    PublicIpAddress,
    /// `Microsoft.Network/loadBalancers`
    LoadBalancer,
    /// `Microsoft.Network/privateEndpoints`
    PrivateEndpoint,
    /// `Microsoft.Resources/tags` scoped to a resource group
    Tags,
}

impl ResourceKind {
    /// ARM provider type
    pub fn provider_type(&self) -> &'static str {
        match self {
            ResourceKind::ResourceGroup => "Microsoft.Resources/resourceGroups",
            ResourceKind::VirtualNetwork => "Microsoft.Network/virtualNetworks",
            ResourceKind::Subnet => "Microsoft.Network/virtualNetworks/subnets",
            ResourceKind::RouteTable => "Microsoft.Network/routeTables",
            ResourceKind::SecurityGroup => "Microsoft.Network/networkSecurityGroups",
            ResourceKind::PublicIpAddress => "Microsoft.Network/publicIPAddresses",
            ResourceKind::LoadBalancer => "Microsoft.Network/loadBalancers",
            ResourceKind::PrivateEndpoint => "Microsoft.Network/privateEndpoints",
            ResourceKind::Tags => "Microsoft.Resources/tags",
        }
    }

    /// ARM api-version used for this kind
    pub fn api_version(&self) -> &'static str {
        match self {
            ResourceKind::ResourceGroup | ResourceKind::Tags => RESOURCES_API_VERSION,
            _ => NETWORK_API_VERSION,
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.provider_type())
    }
}

/// Address of one Azure resource
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceRef {
    /// Resource kind
    pub kind: ResourceKind,
    /// Subscription ID
    pub subscription_id: String,
    /// Resource group (equal to `name` for resource groups)
    pub resource_group: String,
    /// Resource name
    pub name: String,
    /// Parent resource name for sub-resources (the VNet of a subnet)
    pub parent: Option<String>,
}

impl ResourceRef {
    /// Reference a top-level resource
    pub fn new(
        kind: ResourceKind,
        subscription_id: impl Into<String>,
        resource_group: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            subscription_id: subscription_id.into(),
            resource_group: resource_group.into(),
            name: name.into(),
            parent: None,
        }
    }

    /// Attach a parent resource name
    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    /// ARM resource ID (path relative to the management endpoint)
    pub fn id(&self) -> String {
        let sub = urlencoding::encode(&self.subscription_id);
        let rg = urlencoding::encode(&self.resource_group);
        let name = urlencoding::encode(&self.name);
        match self.kind {
            ResourceKind::ResourceGroup => {
                format!("/subscriptions/{}/resourceGroups/{}", sub, name)
            }
            ResourceKind::Tags => format!(
                "/subscriptions/{}/resourceGroups/{}/providers/Microsoft.Resources/tags/default",
                sub, rg
            ),
            ResourceKind::Subnet => format!(
                "/subscriptions/{}/resourceGroups/{}/providers/Microsoft.Network/virtualNetworks/{}/subnets/{}",
                sub,
                rg,
                urlencoding::encode(self.parent.as_deref().unwrap_or_default()),
                name
            ),
            kind => format!(
                "/subscriptions/{}/resourceGroups/{}/providers/{}/{}",
                sub,
                rg,
                kind.provider_type(),
                name
            ),
        }
    }

    /// `{rg}/{name}` form used in log and error messages
    pub fn display_name(&self) -> String {
        format!("{}/{}", self.resource_group, self.name)
    }
}

impl std::fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.kind, self.display_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_ids() {
        let rg = ResourceRef::new(ResourceKind::ResourceGroup, "sub", "my-rg", "my-rg");
        assert_eq!(rg.id(), "/subscriptions/sub/resourceGroups/my-rg");

        let nsg = ResourceRef::new(ResourceKind::SecurityGroup, "sub", "my-rg", "nsg");
        assert_eq!(
            nsg.id(),
            "/subscriptions/sub/resourceGroups/my-rg/providers/Microsoft.Network/networkSecurityGroups/nsg"
        );

        let subnet =
            ResourceRef::new(ResourceKind::Subnet, "sub", "my-rg", "node").with_parent("vnet");
        assert_eq!(
            subnet.id(),
            "/subscriptions/sub/resourceGroups/my-rg/providers/Microsoft.Network/virtualNetworks/vnet/subnets/node"
        );

        let tags = ResourceRef::new(ResourceKind::Tags, "sub", "my-rg", "default");
        assert!(tags.id().ends_with("/resourceGroups/my-rg/providers/Microsoft.Resources/tags/default"));
    }

    #[test]
    fn test_display_name() {
        let lb = ResourceRef::new(ResourceKind::LoadBalancer, "sub", "rg", "api-lb");
        assert_eq!(lb.display_name(), "rg/api-lb");
    }
}
