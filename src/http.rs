//! Shared HTTP plumbing for the token, resource-graph, management and metrics
//! endpoints.

use reqwest::{RequestBuilder, Response};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

use crate::credential::Token;
use crate::error::{CosmoError, Result};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Build the HTTP client shared by every remote collaborator
pub fn client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .user_agent(concat!("cosmolink/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| CosmoError::config_error(format!("Could not build HTTP client: {e}")))
}

/// Attach a bearer token
pub fn authorize(request: RequestBuilder, token: &Token) -> RequestBuilder {
    request.header(reqwest::header::AUTHORIZATION, token.header_value())
}

/// Send a request and decode a JSON body, mapping failures to `RemoteRequestFailed`
pub async fn send_json<T: DeserializeOwned>(service: &str, request: RequestBuilder) -> Result<T> {
    let response = send(service, request).await?;
    response
        .json::<T>()
        .await
        .map_err(|e| CosmoError::remote(service, None, format!("invalid response body: {}", e.without_url())))
}

/// Send a request, failing on non-success status
pub async fn send(service: &str, request: RequestBuilder) -> Result<Response> {
    let response = request
        .send()
        .await
        .map_err(|e| CosmoError::remote(service, None, e.without_url().to_string()))?;

    let status = response.status();
    debug!(service, status = status.as_u16(), "remote response");
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(CosmoError::remote(service, Some(status.as_u16()), error_detail(&body)))
}

/// Pull `error.message` (ARM) or `error_description` (token endpoint) out of an error body
fn error_detail(body: &str) -> String {
    let parsed: Option<serde_json::Value> = serde_json::from_str(body).ok();
    parsed
        .as_ref()
        .and_then(|v| {
            v.pointer("/error/message")
                .or_else(|| v.get("error_description"))
                .or_else(|| v.get("message"))
                .and_then(serde_json::Value::as_str)
        })
        .map(String::from)
        .unwrap_or_else(|| {
            if body.is_empty() {
                "empty response".to_string()
            } else {
                body.chars().take(200).collect()
            }
        })
}
