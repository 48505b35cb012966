//! Transport-agnostic dispatch.
//!
//! The router owns a table from transport name to handler and nothing else.
//! Every call is answered: unknown transports come back as an error result,
//! failed listings as an empty list.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::errors::ProxyError;
use super::http::HttpTransportHandler;
use super::stdio::StdioTransportHandler;
use super::types::{ExecutionResult, ToolSchema};
use crate::registry::types::BackendDescriptor;

// ─── TransportHandler ────────────────────────────────────────────────────────

/// The two operations every transport supports against one backend.
#[async_trait]
pub trait TransportHandler: Send + Sync {
    /// List the backend's tools. Failures yield an empty list.
    async fn list_tools(&self, backend: &BackendDescriptor) -> Vec<ToolSchema>;

    /// Execute `tool_name` with `arguments`. Failures yield an error result.
    async fn execute(
        &self,
        backend: &BackendDescriptor,
        tool_name: &str,
        arguments: serde_json::Value,
    ) -> ExecutionResult;
}

// ─── Timeouts ────────────────────────────────────────────────────────────────

/// Wall-clock budgets applied by the built-in transports.
#[derive(Debug, Clone, Copy)]
pub struct TransportTimeouts {
    pub stdio: Duration,
    pub http_list: Duration,
    pub http_call: Duration,
}

impl Default for TransportTimeouts {
    fn default() -> Self {
        Self {
            stdio: Duration::from_secs(30),
            http_list: Duration::from_secs(10),
            http_call: Duration::from_secs(30),
        }
    }
}

// ─── ProxyRouter ─────────────────────────────────────────────────────────────

/// Dispatches on `BackendDescriptor::transport`.
#[derive(Clone, Default)]
pub struct ProxyRouter {
    handlers: HashMap<String, Arc<dyn TransportHandler>>,
}

impl ProxyRouter {
    /// An empty router; every backend is unsupported until handlers are added.
    pub fn new() -> Self {
        Self::default()
    }

    /// Router with the `stdio` and `http` handlers registered.
    pub fn standard(workspace_root: impl Into<PathBuf>, timeouts: TransportTimeouts) -> Self {
        Self::new()
            .with_handler(
                "stdio",
                Arc::new(StdioTransportHandler::new(workspace_root).with_timeout(timeouts.stdio)),
            )
            .with_handler(
                "http",
                Arc::new(HttpTransportHandler::new(timeouts.http_list, timeouts.http_call)),
            )
    }

    /// Register (or replace) the handler for a transport name.
    pub fn with_handler(mut self, transport: &str, handler: Arc<dyn TransportHandler>) -> Self {
        self.handlers.insert(transport.to_string(), handler);
        self
    }

    fn handler_for(&self, backend: &BackendDescriptor) -> Result<&Arc<dyn TransportHandler>, ProxyError> {
        self.handlers
            .get(backend.transport.as_str())
            .ok_or_else(|| ProxyError::UnsupportedTransport {
                name: backend.name.clone(),
                transport: backend.transport.to_string(),
            })
    }

    /// List the backend's tools through its transport.
    pub async fn list_tools(&self, backend: &BackendDescriptor) -> Vec<ToolSchema> {
        match self.handler_for(backend) {
            Ok(handler) => handler.list_tools(backend).await,
            Err(e) => {
                tracing::warn!(backend = %backend.name, error = %e, "cannot list tools");
                Vec::new()
            }
        }
    }

    /// Find one tool by name. There is no single-tool fetch on the wire, so
    /// this lists and filters.
    pub async fn get_tool(&self, backend: &BackendDescriptor, tool_name: &str) -> Option<ToolSchema> {
        self.list_tools(backend)
            .await
            .into_iter()
            .find(|tool| tool.name == tool_name)
    }

    /// Execute a tool through the backend's transport.
    pub async fn execute(
        &self,
        backend: &BackendDescriptor,
        tool_name: &str,
        arguments: serde_json::Value,
    ) -> ExecutionResult {
        match self.handler_for(backend) {
            Ok(handler) => handler.execute(backend, tool_name, arguments).await,
            Err(e) => {
                tracing::warn!(backend = %backend.name, tool = tool_name, error = %e, "cannot route call");
                ExecutionResult::error(e.to_string())
            }
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
