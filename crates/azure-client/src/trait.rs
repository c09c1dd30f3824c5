//! AzureClient trait for mocking
//!
//! This trait abstracts the AzureClient so the reconciliation engine can be
//! driven against an in-memory implementation in unit tests.

use crate::error::AzureError;
use crate::models::ResourceBody;
use crate::operation::{OperationHandle, PollStatus, Submitted};
use crate::resource::ResourceRef;

/// Trait for Azure Resource Manager operations
///
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
#[async_trait::async_trait]
pub trait AzureClientTrait: Send + Sync {
    /// Management endpoint
    fn endpoint(&self) -> &str;

    /// GET a resource. Absence is reported as [`AzureError::NotFound`].
    async fn get(&self, resource: &ResourceRef) -> Result<ResourceBody, AzureError>;

    /// Submit a PUT, optionally guarded by `If-Match`
    async fn begin_create_or_update(
        &self,
        resource: &ResourceRef,
        body: &ResourceBody,
        if_match: Option<&str>,
    ) -> Result<Submitted, AzureError>;

    /// Submit a PATCH
    async fn begin_update(
        &self,
        resource: &ResourceRef,
        body: &ResourceBody,
    ) -> Result<Submitted, AzureError>;

    /// Submit a DELETE
    async fn begin_delete(&self, resource: &ResourceRef) -> Result<Submitted, AzureError>;

    /// Poll an in-flight operation once
    async fn poll(&self, operation: &OperationHandle) -> Result<PollStatus, AzureError>;

    /// Final resource body of a completed operation (`None` for deletes)
    async fn result(&self, operation: &OperationHandle) -> Result<Option<ResourceBody>, AzureError>;
}
