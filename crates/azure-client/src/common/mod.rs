//! Common utilities for the Azure Resource Manager client
//!
//! Provides authenticated request plumbing shared by every operation.

use crate::error::AzureError;
use crate::resource::ResourceRef;
use reqwest::header::{HeaderMap, LOCATION, RETRY_AFTER};
use reqwest::{Client, Method};
use std::time::Duration;
use tracing::debug;

const ASYNC_OPERATION_HEADER: &str = "Azure-AsyncOperation";
const CLIENT_REQUEST_ID_HEADER: &str = "x-ms-client-request-id";

/// A fully-read ARM response
#[derive(Debug, Clone)]
pub struct RawResponse {
    /// HTTP status code
    pub status: u16,
    /// `Retry-After` header, in seconds
    pub retry_after: Option<Duration>,
    /// `Azure-AsyncOperation` header
    pub async_operation: Option<String>,
    /// `Location` header
    pub location: Option<String>,
    /// Response body
    pub body: String,
}

impl RawResponse {
    /// 2xx status
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Convert a non-success response into an error
    pub fn into_error(self, what: &str) -> AzureError {
        AzureError::from_status(self.status, self.retry_after, &self.body, what)
    }

    /// Parse the body as JSON (`null` for an empty body)
    pub fn json(&self) -> Result<serde_json::Value, AzureError> {
        if self.body.trim().is_empty() {
            return Ok(serde_json::Value::Null);
        }
        serde_json::from_str(&self.body).map_err(|e| {
            AzureError::InvalidRequest(format!(
                "error decoding response body: {} - Response (first 500 chars): {}",
                e,
                self.body.chars().take(500).collect::<String>()
            ))
        })
    }
}

/// HTTP client wrapper with bearer authentication
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    endpoint: String,
    token: String,
}

impl HttpClient {
    /// Create a new HTTP client wrapper
    pub fn new(client: Client, endpoint: String, token: String) -> Self {
        Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            token,
        }
    }

    /// Management endpoint
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Absolute URL of a resource including its api-version
    pub fn resource_url(&self, resource: &ResourceRef) -> String {
        format!(
            "{}{}?api-version={}",
            self.endpoint,
            resource.id(),
            resource.kind.api_version()
        )
    }

    /// Get authorization header value
    pub fn auth_header(&self) -> String {
        format!("Bearer {}", self.token)
    }

    /// Send a request and read the full response
    pub async fn send(
        &self,
        method: Method,
        url: &str,
        body: Option<&serde_json::Value>,
        if_match: Option<&str>,
    ) -> Result<RawResponse, AzureError> {
        let request_id = uuid::Uuid::new_v4().to_string();
        debug!("{} {} (request id {})", method, url, request_id);

        let mut request = self
            .client
            .request(method, url)
            .header("Authorization", self.auth_header())
            .header("Accept", "application/json")
            .header(CLIENT_REQUEST_ID_HEADER, request_id);
        if let Some(etag) = if_match {
            request = request.header("If-Match", etag);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(AzureError::Http)?;
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response.text().await.map_err(AzureError::Http)?;

        Ok(RawResponse {
            status,
            retry_after: parse_retry_after(&headers),
            async_operation: header_string(&headers, ASYNC_OPERATION_HEADER),
            location: header_string(&headers, LOCATION.as_str()),
            body,
        })
    }
}

fn header_string(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// `Retry-After` in delta-seconds form; HTTP-date form is ignored
pub(crate) fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    header_string(headers, RETRY_AFTER.as_str())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}
