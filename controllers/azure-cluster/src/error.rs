//! Controller error types.
//!
//! `ControllerError` covers process plumbing (Kubernetes API, configuration,
//! watchers). `ReconcileError` is the taxonomy the reconciliation engine uses
//! to decide how a failed pass is surfaced and requeued.

use azure_client::AzureError;
use crds::Future;
use kube::Error as KubeError;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Requeue hint used when ARM does not send `Retry-After`
pub const DEFAULT_TRANSIENT_REQUEUE: Duration = Duration::from_secs(30);

/// Errors that can occur in the AzureCluster controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] KubeError),

    /// Azure client construction error
    #[error("Azure error: {0}")]
    Azure(#[from] AzureError),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Reconciliation failed and should be retried with backoff
    #[error("Reconciliation failed: {0}")]
    Reconcile(#[from] ReconcileError),

    /// Resource watch failed
    #[error("Resource watch failed: {0}")]
    Watch(String),

    /// Probe/metrics server failed
    #[error("Probe server failed: {0}")]
    Server(String),

    /// Metrics registration or encoding failed
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// Encoding an object for a patch failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Which mutation a wrapped resource error came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceAction {
    /// GET of the current state
    Get,
    /// PUT of a resource that did not exist
    Create,
    /// PUT or PATCH of an existing resource
    Update,
    /// DELETE
    Delete,
}

impl fmt::Display for ResourceAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ResourceAction::Get => "get",
            ResourceAction::Create => "create",
            ResourceAction::Update => "update",
            ResourceAction::Delete => "delete",
        })
    }
}

/// A submitted operation is still running; its handle was persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationNotDoneError {
    /// The persisted handle
    pub future: Future,
}

impl OperationNotDoneError {
    /// Wrap a persisted handle
    pub fn new(future: Future) -> Self {
        Self { future }
    }
}

impl fmt::Display for OperationNotDoneError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} on {}/{} is not done yet",
            self.future.type_, self.future.resource_group, self.future.name
        )
    }
}

impl std::error::Error for OperationNotDoneError {}

/// Failure class, used for precedence and for mapping to conditions and requeues
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Controller bug; retrying cannot help
    Programmer,
    /// Failed for this pass
    Terminal,
    /// Retry on the next pass
    Transient,
    /// In flight; poll on the next pass
    NotDone,
}

/// Errors produced by a reconcile pass
#[derive(Debug, Clone, Error)]
pub enum ReconcileError {
    /// Controller bug, e.g. a Spec was handed a body of the wrong kind
    #[error("BUG: {0}")]
    Programmer(String),

    /// Failure that will not resolve by retrying within this pass
    #[error("{0}")]
    Terminal(String),

    /// Failure expected to clear on its own
    #[error("{message}")]
    Transient {
        /// What failed
        message: String,
        /// When to try again
        requeue_after: Duration,
    },

    /// A long-running operation is still in flight
    #[error(transparent)]
    OperationNotDone(OperationNotDoneError),

    /// `If-Match` precondition failed; the resource changed under us
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    /// An error attributed to one resource of one service
    #[error("failed to {action} resource {resource_group}/{name} (service: {service}): {source}")]
    Resource {
        /// Attempted mutation
        action: ResourceAction,
        /// Resource group
        resource_group: String,
        /// Resource name
        name: String,
        /// Service name
        service: String,
        /// Underlying failure
        #[source]
        source: Box<ReconcileError>,
    },
}

impl ReconcileError {
    /// Transient error with an explicit requeue hint
    pub fn transient(message: impl Into<String>, requeue_after: Duration) -> Self {
        ReconcileError::Transient {
            message: message.into(),
            requeue_after,
        }
    }

    /// Attribute the error to a resource and service.
    ///
    /// Operation-not-done errors are returned unchanged so their message keeps
    /// the `... is not done yet` form.
    pub fn for_resource(
        self,
        action: ResourceAction,
        resource_group: &str,
        name: &str,
        service: &str,
    ) -> Self {
        match self {
            ReconcileError::OperationNotDone(_) | ReconcileError::Resource { .. } => self,
            other => ReconcileError::Resource {
                action,
                resource_group: resource_group.to_string(),
                name: name.to_string(),
                service: service.to_string(),
                source: Box::new(other),
            },
        }
    }

    /// The innermost error, looking through resource attribution
    pub fn root(&self) -> &ReconcileError {
        match self {
            ReconcileError::Resource { source, .. } => source.root(),
            other => other,
        }
    }

    /// Failure class
    pub fn class(&self) -> ErrorClass {
        match self.root() {
            ReconcileError::Programmer(_) => ErrorClass::Programmer,
            ReconcileError::Terminal(_) => ErrorClass::Terminal,
            ReconcileError::Transient { .. } => ErrorClass::Transient,
            ReconcileError::OperationNotDone(_) | ReconcileError::PreconditionFailed(_) => {
                ErrorClass::NotDone
            }
            // root() never returns Resource
            ReconcileError::Resource { .. } => ErrorClass::Terminal,
        }
    }

    /// Whether the error only means "come back later"
    pub fn is_operation_not_done(&self) -> bool {
        self.class() == ErrorClass::NotDone
    }

    /// Aggregation rank: not-done class is 1, everything else 2
    pub fn precedence(&self) -> u8 {
        if self.is_operation_not_done() { 1 } else { 2 }
    }

    /// Requeue hint carried by transient errors
    pub fn requeue_after(&self) -> Option<Duration> {
        match self.root() {
            ReconcileError::Transient { requeue_after, .. } => Some(*requeue_after),
            _ => None,
        }
    }
}

impl From<AzureError> for ReconcileError {
    fn from(err: AzureError) -> Self {
        if err.is_precondition_failed() {
            return ReconcileError::PreconditionFailed(err.to_string());
        }
        if err.is_retryable() {
            let requeue_after = err.retry_after().unwrap_or(DEFAULT_TRANSIENT_REQUEUE);
            return ReconcileError::transient(err.to_string(), requeue_after);
        }
        ReconcileError::Terminal(err.to_string())
    }
}

/// Keep whichever of two errors is more pressing; ties keep the current one.
pub fn more_pressing(
    current: Option<ReconcileError>,
    candidate: ReconcileError,
) -> Option<ReconcileError> {
    match current {
        Some(existing) if existing.precedence() >= candidate.precedence() => Some(existing),
        _ => Some(candidate),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crds::FutureType;

    fn not_done(name: &str) -> ReconcileError {
        ReconcileError::OperationNotDone(OperationNotDoneError::new(Future {
            type_: FutureType::Put,
            resource_kind: String::new(),
            resource_group: "my-rg".into(),
            service_name: "securitygroups".into(),
            name: name.into(),
            data: String::new(),
        }))
    }

    #[test]
    fn test_not_done_message() {
        assert_eq!(not_done("nsg").to_string(), "PUT on my-rg/nsg is not done yet");
    }

    #[test]
    fn test_resource_message() {
        let err = ReconcileError::Terminal("boom".into()).for_resource(
            ResourceAction::Create,
            "my-rg",
            "nsg",
            "securitygroups",
        );
        assert_eq!(
            err.to_string(),
            "failed to create resource my-rg/nsg (service: securitygroups): boom"
        );
        assert_eq!(err.class(), ErrorClass::Terminal);
    }

    #[test]
    fn test_not_done_is_not_rewrapped() {
        let err = not_done("nsg").for_resource(ResourceAction::Update, "my-rg", "nsg", "x");
        assert!(matches!(err, ReconcileError::OperationNotDone(_)));
    }

    #[test]
    fn test_precedence() {
        let agg = more_pressing(None, not_done("a"));
        let agg = more_pressing(agg, not_done("b"));
        assert_eq!(agg.as_ref().map(ToString::to_string).as_deref(), Some("PUT on my-rg/a is not done yet"));

        let agg = more_pressing(agg, ReconcileError::Terminal("first".into()));
        let agg = more_pressing(agg, ReconcileError::Terminal("second".into()));
        let agg = more_pressing(agg, not_done("c"));
        assert_eq!(agg.map(|e| e.to_string()).as_deref(), Some("first"));
    }

    #[test]
    fn test_azure_error_classification() {
        let precondition: ReconcileError = AzureError::PreconditionFailed("etag".into()).into();
        assert_eq!(precondition.class(), ErrorClass::NotDone);

        let throttled: ReconcileError = AzureError::Retryable {
            status: 429,
            retry_after: Some(Duration::from_secs(9)),
            message: "slow down".into(),
        }
        .into();
        assert_eq!(throttled.class(), ErrorClass::Transient);
        assert_eq!(throttled.requeue_after(), Some(Duration::from_secs(9)));

        let failed: ReconcileError = AzureError::OperationFailed {
            code: "Conflict".into(),
            message: "in use".into(),
        }
        .into();
        assert_eq!(failed.class(), ErrorClass::Terminal);
    }
}
