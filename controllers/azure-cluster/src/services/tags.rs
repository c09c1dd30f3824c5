//! Resource group tags service.
//!
//! Tags on the cluster resource group are merged with the same three-way
//! scheme as security rules, using the
//! [`RG_TAGS_LAST_APPLIED_ANNOTATION`] annotation as the last-applied bag.
//! Desired keys always win; keys this controller applied before and no
//! longer wants are removed; every other key belongs to the user. Changes
//! are submitted as a replacing PATCH of the tags sub-resource.

use super::groups::group_is_managed;
use crate::async_ops::OperationContext;
use crate::error::ReconcileError;
use crate::scope::ClusterScope;
use crate::service::ServiceStrategy;
use crate::spec::{ResourceSpec, existing_as};
use async_trait::async_trait;
use azure_client::{AzureClientTrait, ResourceBody, ResourceKind, TagsOperation, TagsProperties, TagsResource, TypedBody};
use crds::{FutureType, RG_TAGS_LAST_APPLIED_ANNOTATION, RESOURCE_LIFECYCLE_OWNED, TAGS_READY_CONDITION, Tags};

/// Service name
pub const SERVICE_NAME: &str = "tags";

/// Name of the tags sub-resource
const TAGS_RESOURCE_NAME: &str = "default";

/// Desired tags of the cluster resource group
#[derive(Debug, Clone)]
pub struct TagsSpec {
    resource_group: String,
    desired: Tags,
    last_applied: Tags,
}

impl TagsSpec {
    fn merge(&self, observed: &Tags) -> Option<Tags> {
        let mut merged = observed.clone();
        for (key, value) in &self.desired {
            merged.insert(key.clone(), value.clone());
        }
        merged.retain(|key, _| self.desired.contains_key(key) || !self.last_applied.contains_key(key));
        (merged != *observed).then_some(merged)
    }
}

impl ResourceSpec for TagsSpec {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Tags
    }

    fn resource_name(&self) -> &str {
        TAGS_RESOURCE_NAME
    }

    fn resource_group_name(&self) -> &str {
        &self.resource_group
    }

    fn operation_type(&self) -> FutureType {
        FutureType::Patch
    }

    fn parameters(&self, existing: Option<&ResourceBody>) -> Result<Option<ResourceBody>, ReconcileError> {
        let observed = match existing {
            Some(body) => existing_as::<TagsResource>(body, TAGS_RESOURCE_NAME)?.properties.tags.clone(),
            None => Tags::new(),
        };
        Ok(self.merge(&observed).map(|tags| {
            TagsResource {
                operation: Some(TagsOperation::Replace),
                properties: TagsProperties { tags },
                ..Default::default()
            }
            .into_body()
        }))
    }
}

/// Strategy for the cluster resource group tags
#[derive(Debug, Default)]
pub struct ResourceGroupTags;

#[async_trait]
impl ServiceStrategy for ResourceGroupTags {
    type Spec = TagsSpec;

    fn name(&self) -> &'static str {
        SERVICE_NAME
    }

    fn condition_type(&self) -> &'static str {
        TAGS_READY_CONDITION
    }

    fn operation_type(&self) -> FutureType {
        FutureType::Patch
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
        group_is_managed(scope, ctx, client).await
    }

    fn specs(&self, scope: &ClusterScope) -> Result<Vec<TagsSpec>, ReconcileError> {
        let mut desired = scope.additional_tags().clone();
        desired.insert(
            crds::cluster_tag_key(&scope.cluster_name()),
            RESOURCE_LIFECYCLE_OWNED.to_string(),
        );
        Ok(vec![TagsSpec {
            resource_group: scope.resource_group().to_string(),
            desired,
            last_applied: scope.annotation_json(RG_TAGS_LAST_APPLIED_ANNOTATION)?,
        }])
    }

    fn on_applied(
        &self,
        scope: &mut ClusterScope,
        spec: &TagsSpec,
        _result: Option<&ResourceBody>,
    ) -> Result<(), ReconcileError> {
        if spec.last_applied != spec.desired {
            scope.update_annotation_json(RG_TAGS_LAST_APPLIED_ANNOTATION, &spec.desired)?;
        }
        Ok(())
    }
}
