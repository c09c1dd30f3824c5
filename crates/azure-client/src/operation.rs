//! Long-running operation handles
//!
//! ARM answers a PUT, PATCH or DELETE either synchronously or with `201` /
//! `202` plus a polling URL. The handle captures everything needed to resume
//! polling from a different process, and serializes to an opaque token that
//! the controller stores on the owner status.

use crate::error::AzureError;
use crate::models::ResourceBody;
use crate::resource::ResourceKind;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// HTTP verb of a submitted operation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum OperationMethod {
    /// Create or update
    Put,
    /// Partial update
    Patch,
    /// Delete
    Delete,
}

impl OperationMethod {
    /// Verb as sent on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationMethod::Put => "PUT",
            OperationMethod::Patch => "PATCH",
            OperationMethod::Delete => "DELETE",
        }
    }
}

/// How completion of an operation is observed
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PollingStrategy {
    /// `Azure-AsyncOperation` header: poll the status monitor for `status`
    AsyncOperation,
    /// `Location` header: 202 while running, 200/204 when done
    Location,
    /// No header: GET the resource until `provisioningState` is terminal
    ProvisioningState,
}

/// Everything needed to resume polling an in-flight operation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OperationHandle {
    /// Resource kind the operation acts on
    pub kind: ResourceKind,
    /// Submitted verb
    pub method: OperationMethod,
    /// Absolute URL of the resource
    pub resource_url: String,
    /// Absolute URL to poll
    pub polling_url: String,
    /// Completion detection strategy
    pub strategy: PollingStrategy,
}

impl OperationHandle {
    /// Encode as an opaque resume token
    pub fn to_token(&self) -> Result<String, AzureError> {
        let json = serde_json::to_vec(self)?;
        Ok(STANDARD.encode(json))
    }

    /// Decode a resume token produced by [`OperationHandle::to_token`]
    pub fn from_token(token: &str) -> Result<Self, AzureError> {
        let json = STANDARD
            .decode(token)
            .map_err(|e| AzureError::InvalidRequest(format!("invalid resume token: {}", e)))?;
        Ok(serde_json::from_slice(&json)?)
    }
}

/// Outcome of submitting an operation
#[derive(Debug, Clone, PartialEq)]
pub enum Submitted {
    /// Completed synchronously; carries the final body when ARM returned one
    Done(Option<ResourceBody>),
    /// Still running; poll the handle
    InProgress(OperationHandle),
}

/// Outcome of polling an operation once.
///
/// Terminal failure is reported as `Err(AzureError::OperationFailed)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollStatus {
    /// Still running
    InProgress {
        /// `Retry-After` hint from the service
        retry_after: Option<Duration>,
    },
    /// Finished successfully
    Succeeded,
}

/// Terminal state reported by ARM
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TerminalStatus {
    Succeeded,
    Failed,
}

/// Classify an ARM status string; `None` while the operation is running
pub(crate) fn classify_status(status: &str) -> Option<TerminalStatus> {
    match status.to_ascii_lowercase().as_str() {
        "succeeded" => Some(TerminalStatus::Succeeded),
        "failed" | "canceled" | "cancelled" => Some(TerminalStatus::Failed),
        _ => None,
    }
}
