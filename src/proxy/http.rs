//! HTTP transport.
//!
//! One JSON-RPC POST to `<base>/mcp` per call. The base URL comes from the
//! backend's health-check URL, or `http://localhost:<port>` when only a port
//! is declared.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use uuid::Uuid;

use super::errors::ProxyError;
use super::router::TransportHandler;
use super::types::{parse_tool_list, ExecutionResult, JsonRpcRequest, JsonRpcResponse, ToolSchema};
use crate::registry::types::BackendDescriptor;

/// TCP connection timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Talks to backends that serve JSON-RPC over HTTP.
#[derive(Debug, Clone)]
pub struct HttpTransportHandler {
    http: HttpClient,
    list_timeout: Duration,
    call_timeout: Duration,
}

impl HttpTransportHandler {
    pub fn new(list_timeout: Duration, call_timeout: Duration) -> Self {
        let http = HttpClient::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "failed to build HTTP client, using defaults");
                HttpClient::new()
            });
        Self {
            http,
            list_timeout,
            call_timeout,
        }
    }

    async fn post(
        &self,
        backend: &BackendDescriptor,
        request: &JsonRpcRequest,
        timeout: Duration,
    ) -> Result<JsonRpcResponse, ProxyError> {
        let url = format!("{}/mcp", resolve_base_url(backend)?);
        tracing::debug!(backend = %backend.name, url = %url, method = %request.method, "posting to http backend");

        let response = self
            .http
            .post(&url)
            .json(request)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProxyError::Timeout {
                        name: backend.name.clone(),
                        timeout_secs: timeout.as_secs(),
                    }
                } else {
                    ProxyError::Transport {
                        name: backend.name.clone(),
                        reason: e.to_string(),
                    }
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProxyError::HttpStatus {
                name: backend.name.clone(),
                status: status.as_u16(),
            });
        }

        response
            .json::<JsonRpcResponse>()
            .await
            .map_err(|e| ProxyError::Transport {
                name: backend.name.clone(),
                reason: format!("invalid JSON-RPC response: {e}"),
            })
    }
}

#[async_trait]
impl TransportHandler for HttpTransportHandler {
    async fn list_tools(&self, backend: &BackendDescriptor) -> Vec<ToolSchema> {
        let request = JsonRpcRequest::list_tools(format!("list_tools_{}", Uuid::new_v4()));
        match self.post(backend, &request, self.list_timeout).await {
            Ok(JsonRpcResponse {
                result: Some(result),
                ..
            }) => parse_tool_list(&backend.name, &result),
            Ok(response) => {
                tracing::warn!(
                    backend = %backend.name,
                    error = %response.error_message().unwrap_or_default(),
                    "tools/list returned no result"
                );
                Vec::new()
            }
            Err(e) => {
                tracing::warn!(backend = %backend.name, error = %e, "tools/list failed");
                Vec::new()
            }
        }
    }

    async fn execute(
        &self,
        backend: &BackendDescriptor,
        tool_name: &str,
        arguments: serde_json::Value,
    ) -> ExecutionResult {
        let request =
            JsonRpcRequest::call_tool(format!("{tool_name}_{}", Uuid::new_v4()), tool_name, arguments);
        match self.post(backend, &request, self.call_timeout).await {
            Ok(response) => {
                if let Some(result) = response.result {
                    ExecutionResult::Success { result }
                } else if let Some(message) = response.error_message() {
                    ExecutionResult::error(message)
                } else {
                    ExecutionResult::error("Invalid response from server")
                }
            }
            Err(e) => {
                tracing::warn!(backend = %backend.name, tool = tool_name, error = %e, "tools/call failed");
                ExecutionResult::error(e.to_string())
            }
        }
    }
}

/// Base URL for a backend, without a trailing slash.
pub fn resolve_base_url(backend: &BackendDescriptor) -> Result<String, ProxyError> {
    let base = match (&backend.health_check_url, backend.port) {
        (Some(url), _) if !url.trim().is_empty() => url.trim().to_string(),
        (_, Some(port)) if port != 0 => format!("http://localhost:{port}"),
        _ => {
            return Err(ProxyError::Misconfigured {
                name: backend.name.clone(),
                reason: "no health_check_url or port configured".into(),
            })
        }
    };

    let base = if base.starts_with("http://") || base.starts_with("https://") {
        base
    } else {
        format!("http://{base}")
    };
    Ok(base.trim_end_matches('/').to_string())
}

// ─── Tests ───────────────────────────────────────────────────────────────────
