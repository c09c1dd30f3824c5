//! Resource specs.
//!
//! A spec is the in-memory intent for one Azure resource. The async
//! reconciler only ever talks to resources through this trait: it GETs the
//! resource, hands the observed body to [`ResourceSpec::parameters`] and
//! submits whatever comes back.

use crate::error::ReconcileError;
use azure_client::{ResourceBody, ResourceKind, ResourceRef, TypedBody};
use crds::FutureType;

/// Desired state of one Azure resource
pub trait ResourceSpec: Send + Sync {
    /// ARM resource kind
    fn kind(&self) -> ResourceKind;

    /// Resource name
    fn resource_name(&self) -> &str;

    /// Resource group holding the resource
    fn resource_group_name(&self) -> &str;

    /// Parent resource name for sub-resources (the VNet of a subnet)
    fn owner_resource_name(&self) -> Option<&str> {
        None
    }

    /// Verb used to submit changes
    fn operation_type(&self) -> FutureType {
        FutureType::Put
    }

    /// Body to submit given the observed resource.
    ///
    /// `Ok(None)` means the resource already matches and nothing is sent.
    fn parameters(&self, existing: Option<&ResourceBody>) -> Result<Option<ResourceBody>, ReconcileError>;

    /// ARM address of the resource
    fn resource_ref(&self, subscription_id: &str) -> ResourceRef {
        let reference = ResourceRef::new(
            self.kind(),
            subscription_id,
            self.resource_group_name(),
            self.resource_name(),
        );
        match self.owner_resource_name() {
            Some(parent) => reference.with_parent(parent),
            None => reference,
        }
    }
}

/// Borrow the observed body as the model a spec expects.
///
/// A body of any other kind is a controller bug.
pub fn existing_as<'a, T: TypedBody>(
    existing: &'a ResourceBody,
    spec_name: &str,
) -> Result<&'a T, ReconcileError> {
    existing.as_typed::<T>().ok_or_else(|| {
        ReconcileError::Programmer(format!(
            "{} is not a {} (got {})",
            spec_name,
            T::KIND,
            existing.kind()
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use azure_client::{RouteTable, SecurityGroup};

    #[test]
    fn test_existing_of_wrong_kind_is_a_bug() {
        let body = RouteTable::default().into_body();
        let err = existing_as::<SecurityGroup>(&body, "my-nsg").unwrap_err();
        assert!(matches!(err, ReconcileError::Programmer(_)));
        assert!(err.to_string().starts_with("BUG: my-nsg"));
    }
}
