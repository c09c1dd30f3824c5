//! Mock AzureClient for unit testing
//!
//! Stores resources in memory keyed by ARM resource ID and records every call
//! so tests can assert on the exact traffic the engine produced. Operations
//! can be scripted to stay in flight for a number of polls, to end in a
//! terminal failure, or to fail at submission with a given HTTP status.

mod helpers;

use crate::azure_trait::AzureClientTrait;
use crate::error::AzureError;
use crate::models::ResourceBody;
use crate::operation::{
    OperationHandle, OperationMethod, PollStatus, PollingStrategy, Submitted,
};
use crate::resource::{ResourceKind, ResourceRef};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Verb of a recorded or scripted call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockVerb {
    /// GET
    Get,
    /// PUT
    Put,
    /// PATCH
    Patch,
    /// DELETE
    Delete,
    /// Operation poll
    Poll,
}

/// A call observed by the mock
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    /// Verb
    pub verb: MockVerb,
    /// Target resource
    pub resource: ResourceRef,
    /// Submitted body (PUT and PATCH)
    pub body: Option<ResourceBody>,
    /// `If-Match` value (PUT)
    pub if_match: Option<String>,
}

#[derive(Debug, Clone)]
struct PendingOperation {
    resource: ResourceRef,
    method: OperationMethod,
    body: Option<ResourceBody>,
    remaining_polls: u32,
    failure: Option<(String, String)>,
}

/// Mock AzureClient for testing
#[derive(Debug, Clone, Default)]
pub struct MockAzureClient {
    pub(crate) resources: Arc<Mutex<HashMap<String, ResourceBody>>>,
    operations: Arc<Mutex<HashMap<String, PendingOperation>>>,
    calls: Arc<Mutex<Vec<RecordedCall>>>,
    // (verb, resource name) -> HTTP status returned instead of performing the call
    failures: Arc<Mutex<HashMap<(MockVerb, String), u16>>>,
    // resource name -> polls an operation stays in flight
    long_running: Arc<Mutex<HashMap<String, u32>>>,
    // resource name -> (code, message) the operation ends with
    failing_operations: Arc<Mutex<HashMap<String, (String, String)>>>,
    next_id: Arc<Mutex<u64>>,
}

impl MockAzureClient {
    /// Create a new mock client
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an existing resource (for test setup)
    pub fn insert(&self, resource: &ResourceRef, body: ResourceBody) {
        let generation = self.next_id();
        let stored = helpers::stamp(resource, &body, generation).unwrap_or(body);
        self.resources.lock().unwrap().insert(resource.id(), stored);
    }

    /// Seed a resource exactly as given, without stamping server fields
    pub fn insert_raw(&self, resource: &ResourceRef, body: ResourceBody) {
        self.resources.lock().unwrap().insert(resource.id(), body);
    }

    /// Currently stored body of a resource
    pub fn resource(&self, resource: &ResourceRef) -> Option<ResourceBody> {
        self.resources.lock().unwrap().get(&resource.id()).cloned()
    }

    /// Whether a resource exists
    pub fn contains(&self, resource: &ResourceRef) -> bool {
        self.resources.lock().unwrap().contains_key(&resource.id())
    }

    /// Make calls of `verb` against the named resource fail with an HTTP status
    pub fn fail_with_status(&self, verb: MockVerb, name: &str, status: u16) {
        self.failures
            .lock()
            .unwrap()
            .insert((verb, name.to_string()), status);
    }

    /// Stop failing calls of `verb` against the named resource
    pub fn clear_failure(&self, verb: MockVerb, name: &str) {
        self.failures
            .lock()
            .unwrap()
            .remove(&(verb, name.to_string()));
    }

    /// Keep operations on the named resource in flight for `polls` polls
    pub fn set_long_running(&self, name: &str, polls: u32) {
        self.long_running
            .lock()
            .unwrap()
            .insert(name.to_string(), polls);
    }

    /// Make operations on the named resource end in a terminal failure
    pub fn fail_operation(&self, name: &str, code: &str, message: &str) {
        self.failing_operations
            .lock()
            .unwrap()
            .insert(name.to_string(), (code.to_string(), message.to_string()));
    }

    /// All recorded calls, oldest first
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Recorded calls of one verb
    pub fn calls_of(&self, verb: MockVerb) -> Vec<RecordedCall> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.verb == verb)
            .cloned()
            .collect()
    }

    /// Number of recorded calls of one verb
    pub fn count(&self, verb: MockVerb) -> usize {
        self.calls_of(verb).len()
    }

    /// Number of operations still in flight
    pub fn pending_operations(&self) -> usize {
        self.operations.lock().unwrap().len()
    }

    /// Forget recorded calls
    pub fn reset_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    fn next_id(&self) -> u64 {
        let mut id = self.next_id.lock().unwrap();
        *id += 1;
        *id
    }

    fn record(
        &self,
        verb: MockVerb,
        resource: &ResourceRef,
        body: Option<&ResourceBody>,
        if_match: Option<&str>,
    ) {
        self.calls.lock().unwrap().push(RecordedCall {
            verb,
            resource: resource.clone(),
            body: body.cloned(),
            if_match: if_match.map(str::to_string),
        });
    }

    fn injected_failure(&self, verb: MockVerb, resource: &ResourceRef) -> Result<(), AzureError> {
        match self
            .failures
            .lock()
            .unwrap()
            .get(&(verb, resource.name.clone()))
        {
            Some(status) => Err(AzureError::from_status(
                *status,
                None,
                "",
                &format!("{:?} {}", verb, resource),
            )),
            None => Ok(()),
        }
    }

    fn apply(
        &self,
        resource: &ResourceRef,
        method: OperationMethod,
        body: Option<&ResourceBody>,
    ) -> Result<Option<ResourceBody>, AzureError> {
        match (method, body) {
            (OperationMethod::Delete, _) => {
                // child resources (subnets, everything in a group) go with their parent
                let id = resource.id();
                let children = format!("{}/", id.to_lowercase());
                self.resources
                    .lock()
                    .unwrap()
                    .retain(|key, _| key != &id && !key.to_lowercase().starts_with(&children));
                Ok(None)
            }
            (OperationMethod::Patch, Some(body)) if resource.kind == ResourceKind::Tags => {
                let current = self.resource(resource);
                let patched = helpers::patch_tags(current.as_ref(), body);
                let stored = helpers::stamp(resource, &patched, self.next_id())?;
                self.insert_raw(resource, stored.clone());
                Ok(Some(stored))
            }
            (_, Some(body)) => {
                let stored = helpers::stamp(resource, body, self.next_id())?;
                self.insert_raw(resource, stored.clone());
                Ok(Some(stored))
            }
            (_, None) => Err(AzureError::InvalidRequest("missing request body".into())),
        }
    }

    /// ARM refuses to delete a security group or route table a subnet still uses
    fn in_use(&self, resource: &ResourceRef) -> Result<(), AzureError> {
        if !matches!(resource.kind, ResourceKind::SecurityGroup | ResourceKind::RouteTable) {
            return Ok(());
        }
        let id = resource.id();
        let resources = self.resources.lock().unwrap();
        let user = resources.values().find_map(|body| match body {
            ResourceBody::Subnet(subnet) => {
                let props = &subnet.properties;
                let referenced = match resource.kind {
                    ResourceKind::SecurityGroup => props.network_security_group.as_ref(),
                    _ => props.route_table.as_ref(),
                };
                referenced
                    .filter(|r| r.id.eq_ignore_ascii_case(&id))
                    .map(|_| subnet.id.clone().unwrap_or_default())
            }
            _ => None,
        });
        match user {
            Some(subnet) => {
                let code = match resource.kind {
                    ResourceKind::SecurityGroup => "InUseNetworkSecurityGroupCannotBeDeleted",
                    _ => "InUseRouteTableCannotBeDeleted",
                };
                let body = serde_json::json!({
                    "error": {"code": code, "message": format!("in use by {}", subnet)}
                });
                Err(AzureError::from_status(400, None, &body.to_string(), &format!("DELETE {}", resource)))
            }
            None => Ok(()),
        }
    }

    fn submit(
        &self,
        resource: &ResourceRef,
        method: OperationMethod,
        body: Option<&ResourceBody>,
    ) -> Result<Submitted, AzureError> {
        let polls = self
            .long_running
            .lock()
            .unwrap()
            .get(&resource.name)
            .copied()
            .unwrap_or(0);
        let failure = self
            .failing_operations
            .lock()
            .unwrap()
            .get(&resource.name)
            .cloned();

        if polls == 0 && failure.is_none() {
            return Ok(Submitted::Done(self.apply(resource, method, body)?));
        }

        let polling_url = format!("https://mock.azure/operations/{}", self.next_id());
        self.operations.lock().unwrap().insert(
            polling_url.clone(),
            PendingOperation {
                resource: resource.clone(),
                method,
                body: body.cloned(),
                remaining_polls: polls,
                failure,
            },
        );
        Ok(Submitted::InProgress(OperationHandle {
            kind: resource.kind,
            method,
            resource_url: format!("https://mock.azure{}", resource.id()),
            polling_url,
            strategy: PollingStrategy::AsyncOperation,
        }))
    }
}

#[async_trait::async_trait]
impl AzureClientTrait for MockAzureClient {
    fn endpoint(&self) -> &str {
        "https://mock.azure"
    }

    async fn get(&self, resource: &ResourceRef) -> Result<ResourceBody, AzureError> {
        self.record(MockVerb::Get, resource, None, None);
        self.injected_failure(MockVerb::Get, resource)?;
        self.resource(resource)
            .ok_or_else(|| AzureError::NotFound(format!("GET {}", resource)))
    }

    async fn begin_create_or_update(
        &self,
        resource: &ResourceRef,
        body: &ResourceBody,
        if_match: Option<&str>,
    ) -> Result<Submitted, AzureError> {
        self.record(MockVerb::Put, resource, Some(body), if_match);
        self.injected_failure(MockVerb::Put, resource)?;
        if let Some(etag) = if_match {
            let current = self.resource(resource);
            if current.as_ref().and_then(ResourceBody::etag) != Some(etag) {
                return Err(AzureError::PreconditionFailed(format!("PUT {}", resource)));
            }
        }
        self.submit(resource, OperationMethod::Put, Some(body))
    }

    async fn begin_update(
        &self,
        resource: &ResourceRef,
        body: &ResourceBody,
    ) -> Result<Submitted, AzureError> {
        self.record(MockVerb::Patch, resource, Some(body), None);
        self.injected_failure(MockVerb::Patch, resource)?;
        self.submit(resource, OperationMethod::Patch, Some(body))
    }

    async fn begin_delete(&self, resource: &ResourceRef) -> Result<Submitted, AzureError> {
        self.record(MockVerb::Delete, resource, None, None);
        self.injected_failure(MockVerb::Delete, resource)?;
        self.in_use(resource)?;
        self.submit(resource, OperationMethod::Delete, None)
    }

    async fn poll(&self, operation: &OperationHandle) -> Result<PollStatus, AzureError> {
        let pending = self
            .operations
            .lock()
            .unwrap()
            .get(&operation.polling_url)
            .cloned()
            .ok_or_else(|| AzureError::NotFound(format!("operation {}", operation.polling_url)))?;
        self.record(MockVerb::Poll, &pending.resource, None, None);
        self.injected_failure(MockVerb::Poll, &pending.resource)?;

        if pending.remaining_polls > 0 {
            if let Some(op) = self.operations.lock().unwrap().get_mut(&operation.polling_url) {
                op.remaining_polls -= 1;
            }
            return Ok(PollStatus::InProgress { retry_after: None });
        }

        self.operations.lock().unwrap().remove(&operation.polling_url);
        match pending.failure {
            Some((code, message)) => Err(AzureError::OperationFailed { code, message }),
            None => {
                self.apply(&pending.resource, pending.method, pending.body.as_ref())?;
                Ok(PollStatus::Succeeded)
            }
        }
    }

    async fn result(&self, operation: &OperationHandle) -> Result<Option<ResourceBody>, AzureError> {
        if operation.method == OperationMethod::Delete {
            return Ok(None);
        }
        let id = operation
            .resource_url
            .strip_prefix("https://mock.azure")
            .unwrap_or(&operation.resource_url)
            .to_string();
        Ok(self.resources.lock().unwrap().get(&id).cloned())
    }
}
