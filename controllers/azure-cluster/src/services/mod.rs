//! Per-resource-kind services.
//!
//! Each module holds the spec for one Azure resource kind and the strategy
//! plugged into [`crate::service::ResourceService`].

pub mod groups;
pub mod load_balancers;
pub mod private_endpoints;
pub mod public_ips;
pub mod route_tables;
pub mod security_groups;
pub mod subnets;
pub mod tags;
pub mod virtual_networks;

use crate::async_ops::OperationContext;
use crate::error::{ReconcileError, ResourceAction};
use azure_client::{AzureClientTrait, ResourceBody, ResourceRef};

/// GET a resource for a managed-ness check; absence is `None`
pub(crate) async fn observe(
    ctx: &OperationContext,
    client: &dyn AzureClientTrait,
    reference: &ResourceRef,
    service: &str,
) -> Result<Option<ResourceBody>, ReconcileError> {
    let wrap =
        |e: ReconcileError| e.for_resource(ResourceAction::Get, &reference.resource_group, &reference.name, service);
    match ctx.run(client.get(reference)).await.map_err(wrap)? {
        Ok(body) => Ok(Some(body)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(wrap(e.into())),
    }
}

/// Compare ARM resource IDs, which the service may return in a different case
pub(crate) fn same_id(a: Option<&str>, b: Option<&str>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
        (None, None) => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_id_ignores_case() {
        assert!(same_id(
            Some("/subscriptions/s/resourceGroups/RG/providers/x"),
            Some("/subscriptions/s/resourcegroups/rg/providers/x")
        ));
        assert!(same_id(None, None));
        assert!(!same_id(Some("/a"), None));
    }
}
