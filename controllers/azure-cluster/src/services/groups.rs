//! Resource group service.
//!
//! The resource group is managed when it does not exist yet or carries this
//! cluster's owner tag. Deleting a managed group removes everything in it,
//! so the orchestrator skips every other service on delete in that case.

use super::observe;
use crate::async_ops::OperationContext;
use crate::error::ReconcileError;
use crate::scope::ClusterScope;
use crate::service::ServiceStrategy;
use crate::spec::ResourceSpec;
use async_trait::async_trait;
use azure_client::{AzureClientTrait, ResourceBody, ResourceGroup, ResourceKind, ResourceRef, TypedBody};
use crds::{BuildParams, COMMON_ROLE, RESOURCE_GROUP_READY_CONDITION, Tags};
use tracing::info;

/// Service name
pub const SERVICE_NAME: &str = "group";

/// Desired resource group
#[derive(Debug, Clone)]
pub struct GroupSpec {
    name: String,
    location: String,
    cluster_name: String,
    additional_tags: Tags,
}

impl ResourceSpec for GroupSpec {
    fn kind(&self) -> ResourceKind {
        ResourceKind::ResourceGroup
    }

    fn resource_name(&self) -> &str {
        &self.name
    }

    fn resource_group_name(&self) -> &str {
        &self.name
    }

    fn parameters(&self, existing: Option<&ResourceBody>) -> Result<Option<ResourceBody>, ReconcileError> {
        if existing.is_some() {
            // Tags on an existing group are reconciled by the tags service
            return Ok(None);
        }
        let tags = crds::build(BuildParams {
            cluster_name: &self.cluster_name,
            name: Some(&self.name),
            role: Some(COMMON_ROLE),
            additional: Some(&self.additional_tags),
            ..Default::default()
        });
        Ok(Some(
            ResourceGroup {
                location: self.location.clone(),
                tags: Some(tags),
                ..Default::default()
            }
            .into_body(),
        ))
    }
}

/// Whether the cluster resource group is managed, cached on the scope
pub(crate) async fn group_is_managed(
    scope: &mut ClusterScope,
    ctx: &OperationContext,
    client: &dyn AzureClientTrait,
) -> Result<bool, ReconcileError> {
    if let Some(managed) = scope.group_managed() {
        return Ok(managed);
    }
    let reference = ResourceRef::new(
        ResourceKind::ResourceGroup,
        scope.subscription_id(),
        scope.resource_group(),
        scope.resource_group(),
    );
    let managed = match observe(ctx, client, &reference, SERVICE_NAME).await? {
        None => true,
        Some(body) => crds::has_owned(body.tags(), &scope.cluster_name()),
    };
    if !managed {
        info!(
            "Resource group {} is not owned by cluster {}, leaving it alone",
            scope.resource_group(),
            scope.cluster_name()
        );
    }
    scope.set_group_managed(managed);
    Ok(managed)
}

/// Strategy for the cluster resource group
#[derive(Debug, Default)]
pub struct Groups;

#[async_trait]
impl ServiceStrategy for Groups {
    type Spec = GroupSpec;

    fn name(&self) -> &'static str {
        SERVICE_NAME
    }

    fn condition_type(&self) -> &'static str {
        RESOURCE_GROUP_READY_CONDITION
    }

    async fn is_managed(
        &self,
        scope: &mut ClusterScope,
        ctx: &OperationContext,
        client: &dyn AzureClientTrait,
    ) -> Result<bool, ReconcileError> {
        group_is_managed(scope, ctx, client).await
    }

    fn specs(&self, scope: &ClusterScope) -> Result<Vec<GroupSpec>, ReconcileError> {
        Ok(vec![GroupSpec {
            name: scope.resource_group().to_string(),
            location: scope.location().to_string(),
            cluster_name: scope.cluster_name(),
            additional_tags: scope.additional_tags().clone(),
        }])
    }
}
