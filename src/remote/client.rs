//! HTTP control plane client.
//!
//! This module provides the JSON-over-HTTP client for the remote control
//! plane. Requests are never retried; transient failures surface as
//! [`RemoteError::RateLimited`] or [`RemoteError::NetworkError`].

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode, header};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, trace};

use crate::error::{HalldyllError, RemoteError, Result};

use super::api::{CANNOT_CANCEL_SIGNATURE, ControlPlane, NO_CHANGES_SIGNATURE};
use super::types::{
    FunctionSummary, InvokeResult, LogPage, LogQuery, LogStream, StackDescription,
};

/// Default request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Retry delay assumed when a 429 carries no `retry-after` header.
const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

/// HTTP control plane client.
#[derive(Debug, Clone)]
pub struct HttpControlPlane {
    /// HTTP client.
    client: Client,
    /// Endpoint without trailing slash.
    base_url: String,
    /// Bearer token.
    token: String,
}

/// Error body returned by the control plane.
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
    #[serde(default)]
    status: Option<String>,
}

#[derive(Debug, Serialize)]
struct CreateStackRequest<'a> {
    name: &'a str,
    template: &'a str,
}

#[derive(Debug, Serialize)]
struct UpdateStackRequest<'a> {
    template: &'a str,
}

#[derive(Debug, Deserialize)]
struct ResourceResponse {
    physical_id: String,
}

#[derive(Debug, Deserialize)]
struct FunctionsResponse {
    #[serde(default)]
    functions: Vec<FunctionSummary>,
}

#[derive(Debug, Deserialize)]
struct StreamsResponse {
    #[serde(default)]
    streams: Vec<LogStream>,
}

/// Request context used to turn signature messages into typed errors.
#[derive(Debug, Clone, Copy)]
enum Call<'a> {
    Plain,
    Update(&'a str),
    Cancel(&'a str),
}

impl HttpControlPlane {
    /// Creates a new control plane client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(base_url: &str, token: &str) -> Result<Self> {
        Self::with_timeout(base_url, token, DEFAULT_TIMEOUT_SECS)
    }

    /// Creates a client with a custom timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn with_timeout(base_url: &str, token: &str, timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| RemoteError::network(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Sends a request and maps failure statuses to typed errors.
    ///
    /// A 404 yields `Ok(None)`.
    async fn send(&self, request: RequestBuilder, call: Call<'_>) -> Result<Option<reqwest::Response>> {
        let response = request
            .header(header::AUTHORIZATION, format!("Bearer {}", self.token))
            .header(header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| RemoteError::network(format!("Request failed: {e}")))?;

        let status = response.status();
        trace!("Control plane answered {status}");

        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_RETRY_AFTER_SECS);

            return Err(HalldyllError::Remote(RemoteError::RateLimited {
                retry_after_secs: retry_after,
            }));
        }

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(HalldyllError::Remote(RemoteError::AuthenticationFailed {
                message: String::from("Invalid control plane token"),
            }));
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_failure(status.as_u16(), &body, call));
        }

        Ok(Some(response))
    }

    /// Sends a request and decodes the JSON body.
    async fn fetch<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<Option<T>> {
        let Some(response) = self.send(request, Call::Plain).await? else {
            return Ok(None);
        };

        let value = response.json::<T>().await.map_err(|e| {
            HalldyllError::Remote(RemoteError::InvalidResponse {
                message: format!("Failed to parse response: {e}"),
            })
        })?;

        Ok(Some(value))
    }

    /// Sends a request whose body is ignored; 404 means the stack is gone.
    async fn execute(&self, request: RequestBuilder, stack: &str, call: Call<'_>) -> Result<()> {
        match self.send(request, call).await? {
            Some(_) => Ok(()),
            None => Err(HalldyllError::Remote(RemoteError::StackNotFound {
                stack: stack.to_string(),
            })),
        }
    }
}

/// Maps a failed response to an error, recognising the no-changes and
/// cannot-cancel signatures.
fn classify_failure(status: u16, body: &str, call: Call<'_>) -> HalldyllError {
    let parsed = serde_json::from_str::<ApiErrorBody>(body).ok();
    let message = parsed
        .as_ref()
        .map_or_else(|| body.to_string(), |b| b.message.clone());

    match call {
        Call::Update(stack) if message.contains(NO_CHANGES_SIGNATURE) => {
            HalldyllError::Remote(RemoteError::NoChanges {
                stack: stack.to_string(),
            })
        }
        Call::Cancel(stack) if message.contains(CANNOT_CANCEL_SIGNATURE) => {
            HalldyllError::Remote(RemoteError::CannotCancel {
                stack: stack.to_string(),
                status: parsed
                    .and_then(|b| b.status)
                    .unwrap_or_else(|| String::from("UNKNOWN")),
            })
        }
        _ => HalldyllError::Remote(RemoteError::api_error(status, message)),
    }
}

#[async_trait]
impl ControlPlane for HttpControlPlane {
    async fn describe_stack(&self, stack: &str) -> Result<Option<StackDescription>> {
        debug!("Describing stack {stack}");
        self.fetch(self.client.get(self.url(&format!("/stacks/{stack}"))))
            .await
    }

    async fn create_stack(&self, stack: &str, template: &str) -> Result<()> {
        debug!("Creating stack {stack}");
        let request = self.client.post(self.url("/stacks")).json(&CreateStackRequest {
            name: stack,
            template,
        });
        self.execute(request, stack, Call::Plain).await
    }

    async fn update_stack(&self, stack: &str, template: &str) -> Result<()> {
        debug!("Updating stack {stack}");
        let request = self
            .client
            .put(self.url(&format!("/stacks/{stack}")))
            .json(&UpdateStackRequest { template });
        self.execute(request, stack, Call::Update(stack)).await
    }

    async fn cancel_update(&self, stack: &str) -> Result<()> {
        debug!("Cancelling update of stack {stack}");
        let request = self
            .client
            .post(self.url(&format!("/stacks/{stack}/cancel-update")));
        self.execute(request, stack, Call::Cancel(stack)).await
    }

    async fn delete_stack(&self, stack: &str) -> Result<()> {
        debug!("Deleting stack {stack}");
        let request = self.client.delete(self.url(&format!("/stacks/{stack}")));
        self.execute(request, stack, Call::Plain).await
    }

    async fn describe_resource(&self, stack: &str, logical_id: &str) -> Result<String> {
        let response: Option<ResourceResponse> = self
            .fetch(
                self.client
                    .get(self.url(&format!("/stacks/{stack}/resources/{logical_id}"))),
            )
            .await?;

        response.map(|r| r.physical_id).ok_or_else(|| {
            HalldyllError::Remote(RemoteError::InvalidResponse {
                message: format!("Resource {logical_id} not found in stack {stack}"),
            })
        })
    }

    async fn list_functions(&self) -> Result<Vec<FunctionSummary>> {
        let response: Option<FunctionsResponse> =
            self.fetch(self.client.get(self.url("/functions"))).await?;
        Ok(response.map(|r| r.functions).unwrap_or_default())
    }

    async fn invoke(&self, function: &str, payload: &serde_json::Value) -> Result<InvokeResult> {
        debug!("Invoking {function}");
        let response: Option<InvokeResult> = self
            .fetch(
                self.client
                    .post(self.url(&format!("/functions/{function}/invocations")))
                    .json(payload),
            )
            .await?;

        response.ok_or_else(|| {
            HalldyllError::Remote(RemoteError::InvalidResponse {
                message: format!("Function {function} not found"),
            })
        })
    }

    async fn list_log_streams(&self, log_group: &str) -> Result<Vec<LogStream>> {
        let response: Option<StreamsResponse> = self
            .fetch(self.client.get(self.url("/logs/streams")).query(&[("group", log_group)]))
            .await?;
        Ok(response.map(|r| r.streams).unwrap_or_default())
    }

    async fn filter_log_events(&self, query: &LogQuery) -> Result<LogPage> {
        let response: Option<LogPage> = self
            .fetch(self.client.post(self.url("/logs/events")).json(query))
            .await?;
        Ok(response.unwrap_or_default())
    }
}
