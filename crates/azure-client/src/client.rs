//! Azure Resource Manager client
//!
//! Implements GET, PUT, PATCH and DELETE against ARM and the long-running
//! operation protocol (`Azure-AsyncOperation`, `Location`, and
//! `provisioningState` polling).

use crate::common::{HttpClient, RawResponse};
use crate::error::AzureError;
use crate::models::ResourceBody;
use crate::operation::{
    OperationHandle, OperationMethod, PollStatus, PollingStrategy, Submitted, TerminalStatus,
    classify_status,
};
use crate::resource::ResourceRef;
use crate::azure_trait::AzureClientTrait;
use reqwest::{Client, Method};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// Status monitor body returned by an `Azure-AsyncOperation` URL
#[derive(Debug, Deserialize)]
struct OperationStatus {
    #[serde(default)]
    status: String,
    #[serde(default)]
    error: Option<OperationStatusError>,
}

#[derive(Debug, Deserialize)]
struct OperationStatusError {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

/// Azure Resource Manager client
#[derive(Debug, Clone)]
pub struct AzureClient {
    http: HttpClient,
}

impl AzureClient {
    /// Create a new client
    ///
    /// # Arguments
    /// * `endpoint` - Management endpoint (e.g., "https://management.azure.com")
    /// * `token` - Bearer token for the ARM audience
    pub fn new(endpoint: String, token: String) -> Result<Self, AzureError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(AzureError::Http)?;

        Ok(Self {
            http: HttpClient::new(client, endpoint, token),
        })
    }

    fn method(method: OperationMethod) -> Method {
        match method {
            OperationMethod::Put => Method::PUT,
            OperationMethod::Patch => Method::PATCH,
            OperationMethod::Delete => Method::DELETE,
        }
    }

    async fn submit(
        &self,
        resource: &ResourceRef,
        method: OperationMethod,
        body: Option<&ResourceBody>,
        if_match: Option<&str>,
    ) -> Result<Submitted, AzureError> {
        let url = self.http.resource_url(resource);
        let json = body.map(ResourceBody::to_json).transpose()?;
        let response = self
            .http
            .send(Self::method(method), &url, json.as_ref(), if_match)
            .await?;

        if !response.is_success() {
            return Err(response.into_error(&format!("{} {}", method.as_str(), resource)));
        }

        let handle = |polling_url: String, strategy: PollingStrategy| OperationHandle {
            kind: resource.kind,
            method,
            resource_url: url.clone(),
            polling_url,
            strategy,
        };

        if let Some(op) = response.async_operation.clone() {
            debug!("{} {} accepted, polling {}", method.as_str(), resource, op);
            return Ok(Submitted::InProgress(handle(op, PollingStrategy::AsyncOperation)));
        }
        if response.status == 202 {
            let submitted = match response.location.clone() {
                Some(location) => handle(location, PollingStrategy::Location),
                None => handle(url.clone(), PollingStrategy::ProvisioningState),
            };
            return Ok(Submitted::InProgress(submitted));
        }
        if method == OperationMethod::Delete {
            return Ok(Submitted::Done(None));
        }

        let value = response.json()?;
        if value.is_null() {
            return Ok(Submitted::Done(None));
        }
        let body = ResourceBody::from_json(resource.kind, value)?;
        match body.provisioning_state().and_then(classify_status) {
            // Some resources answer 201 with a body still provisioning
            None if body.provisioning_state().is_some() => Ok(Submitted::InProgress(handle(
                url.clone(),
                PollingStrategy::ProvisioningState,
            ))),
            Some(TerminalStatus::Failed) => Err(AzureError::OperationFailed {
                code: body.provisioning_state().unwrap_or_default().to_string(),
                message: format!("{} {} ended in a failed state", method.as_str(), resource),
            }),
            _ => Ok(Submitted::Done(Some(body))),
        }
    }

    fn poll_failure(response: RawResponse, what: &str) -> AzureError {
        match response.into_error(what) {
            AzureError::Api { code, message, .. } => AzureError::OperationFailed { code, message },
            other => other,
        }
    }
}

#[async_trait::async_trait]
impl AzureClientTrait for AzureClient {
    fn endpoint(&self) -> &str {
        self.http.endpoint()
    }

    async fn get(&self, resource: &ResourceRef) -> Result<ResourceBody, AzureError> {
        let url = self.http.resource_url(resource);
        let response = self.http.send(Method::GET, &url, None, None).await?;
        if !response.is_success() {
            return Err(response.into_error(&format!("GET {}", resource)));
        }
        Ok(ResourceBody::from_json(resource.kind, response.json()?)?)
    }

    async fn begin_create_or_update(
        &self,
        resource: &ResourceRef,
        body: &ResourceBody,
        if_match: Option<&str>,
    ) -> Result<Submitted, AzureError> {
        self.submit(resource, OperationMethod::Put, Some(body), if_match)
            .await
    }

    async fn begin_update(
        &self,
        resource: &ResourceRef,
        body: &ResourceBody,
    ) -> Result<Submitted, AzureError> {
        self.submit(resource, OperationMethod::Patch, Some(body), None)
            .await
    }

    async fn begin_delete(&self, resource: &ResourceRef) -> Result<Submitted, AzureError> {
        self.submit(resource, OperationMethod::Delete, None, None)
            .await
    }

    async fn poll(&self, operation: &OperationHandle) -> Result<PollStatus, AzureError> {
        let what = format!("poll {} {}", operation.method.as_str(), operation.resource_url);
        let response = self
            .http
            .send(Method::GET, &operation.polling_url, None, None)
            .await?;

        match operation.strategy {
            PollingStrategy::AsyncOperation => {
                if !response.is_success() {
                    return Err(response.into_error(&what));
                }
                let retry_after = response.retry_after;
                let status: OperationStatus = serde_json::from_str(&response.body)?;
                match classify_status(&status.status) {
                    None => Ok(PollStatus::InProgress { retry_after }),
                    Some(TerminalStatus::Succeeded) => Ok(PollStatus::Succeeded),
                    Some(TerminalStatus::Failed) => {
                        let (code, message) = status
                            .error
                            .map(|e| (e.code, e.message))
                            .unwrap_or_else(|| (status.status.clone(), String::new()));
                        Err(AzureError::OperationFailed { code, message })
                    }
                }
            }
            PollingStrategy::Location => match response.status {
                202 => Ok(PollStatus::InProgress {
                    retry_after: response.retry_after,
                }),
                200..=299 => Ok(PollStatus::Succeeded),
                _ => Err(Self::poll_failure(response, &what)),
            },
            PollingStrategy::ProvisioningState => {
                if response.status == 404 && operation.method == OperationMethod::Delete {
                    return Ok(PollStatus::Succeeded);
                }
                if !response.is_success() {
                    return Err(response.into_error(&what));
                }
                let retry_after = response.retry_after;
                let body = ResourceBody::from_json(operation.kind, response.json()?)?;
                let state = body.provisioning_state().unwrap_or("Succeeded").to_string();
                match classify_status(&state) {
                    // The resource still exists, so a delete is not finished
                    Some(TerminalStatus::Succeeded) if operation.method != OperationMethod::Delete => {
                        Ok(PollStatus::Succeeded)
                    }
                    Some(TerminalStatus::Failed) => Err(AzureError::OperationFailed {
                        code: state,
                        message: format!("{} ended in a failed state", what),
                    }),
                    _ => Ok(PollStatus::InProgress { retry_after }),
                }
            }
        }
    }

    async fn result(&self, operation: &OperationHandle) -> Result<Option<ResourceBody>, AzureError> {
        if operation.method == OperationMethod::Delete {
            return Ok(None);
        }
        let response = self
            .http
            .send(Method::GET, &operation.resource_url, None, None)
            .await?;
        if !response.is_success() {
            let what = format!("GET {}", operation.resource_url);
            return Err(response.into_error(&what));
        }
        Ok(Some(ResourceBody::from_json(operation.kind, response.json()?)?))
    }
}
