//! Helpers that stamp server-assigned fields onto stored bodies

use crate::error::AzureError;
use crate::models::{ResourceBody, Tags, TagsOperation, TagsResource};
use crate::resource::{ResourceKind, ResourceRef};

/// Fill in `id`, `name`, `etag` and `provisioningState` the way ARM would
pub(crate) fn stamp(
    resource: &ResourceRef,
    body: &ResourceBody,
    generation: u64,
) -> Result<ResourceBody, AzureError> {
    let mut value = body.to_json()?;
    if let Some(obj) = value.as_object_mut() {
        obj.insert("id".into(), resource.id().into());
        obj.insert("name".into(), resource.name.clone().into());
        if has_etag(resource.kind) {
            obj.insert("etag".into(), format!("W/\"{}\"", generation).into());
        }
        if resource.kind != ResourceKind::Tags {
            let props = obj
                .entry("properties")
                .or_insert_with(|| serde_json::json!({}));
            if let Some(props) = props.as_object_mut() {
                props.insert("provisioningState".into(), "Succeeded".into());
            }
        }
    }
    Ok(ResourceBody::from_json(resource.kind, value)?)
}

fn has_etag(kind: ResourceKind) -> bool {
    !matches!(kind, ResourceKind::ResourceGroup | ResourceKind::Tags)
}

/// Apply a tags PATCH to the currently stored tag bag
pub(crate) fn patch_tags(current: Option<&ResourceBody>, patch: &ResourceBody) -> ResourceBody {
    let mut tags: Tags = current.and_then(ResourceBody::tags).cloned().unwrap_or_default();
    if let ResourceBody::Tags(TagsResource {
        operation,
        properties,
        ..
    }) = patch
    {
        match operation.unwrap_or(TagsOperation::Merge) {
            TagsOperation::Replace => tags = properties.tags.clone(),
            TagsOperation::Merge => tags.extend(properties.tags.clone()),
            TagsOperation::Delete => tags.retain(|k, _| !properties.tags.contains_key(k)),
        }
    }
    ResourceBody::Tags(TagsResource {
        properties: crate::models::TagsProperties { tags },
        ..Default::default()
    })
}
