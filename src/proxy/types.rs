//! Shared types for the proxy layer.
//!
//! Outbound JSON-RPC 2.0 messages sent to backends, the tool schema shape
//! returned by `tools/list`, and the normalized execution result envelope.

use serde::{Deserialize, Serialize};

/// Protocol version declared in every outbound `initialize` handshake.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Client identity sent to backends during the handshake.
pub const CLIENT_NAME: &str = "mcp-proxy";

// ─── JSON-RPC 2.0 ───────────────────────────────────────────────────────────

/// JSON-RPC 2.0 request message sent to a backend.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: serde_json::Value,
    pub method: String,
    pub params: serde_json::Value,
}

impl JsonRpcRequest {
    /// Create a new JSON-RPC request.
    pub fn new(id: impl Into<serde_json::Value>, method: &str, params: serde_json::Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: id.into(),
            method: method.to_string(),
            params,
        }
    }

    /// The `initialize` request that opens every stdio round trip.
    pub fn initialize(id: u64) -> Self {
        Self::new(
            id,
            "initialize",
            serde_json::json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {},
                "clientInfo": { "name": CLIENT_NAME },
            }),
        )
    }

    /// A `tools/list` request.
    pub fn list_tools(id: impl Into<serde_json::Value>) -> Self {
        Self::new(id, "tools/list", serde_json::json!({}))
    }

    /// A `tools/call` request for `tool_name` with `arguments`.
    pub fn call_tool(
        id: impl Into<serde_json::Value>,
        tool_name: &str,
        arguments: serde_json::Value,
    ) -> Self {
        Self::new(
            id,
            "tools/call",
            serde_json::json!({ "name": tool_name, "arguments": arguments }),
        )
    }
}

/// The `notifications/initialized` message sent after `initialize`.
pub fn initialized_notification() -> serde_json::Value {
    serde_json::json!({
        "jsonrpc": "2.0",
        "method": "notifications/initialized",
    })
}

/// JSON-RPC 2.0 response message (success or error) received from a backend.
///
/// Every field is optional so that partially-formed replies still parse and
/// can be normalized instead of rejected.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JsonRpcResponse {
    #[serde(default)]
    pub id: Option<serde_json::Value>,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<serde_json::Value>,
}

impl JsonRpcResponse {
    /// Human-readable message from the `error` member, whatever its shape.
    pub fn error_message(&self) -> Option<String> {
        let err = self.error.as_ref()?;
        Some(
            err.get("message")
                .and_then(|m| m.as_str())
                .map(str::to_string)
                .unwrap_or_else(|| err.to_string()),
        )
    }
}

// ─── Tool Schema ─────────────────────────────────────────────────────────────

/// Tool definition as reported by a backend's `tools/list`.
///
/// Unknown members (annotations, output schemas, vendor fields) are kept in
/// `extra` so that proxied listings round-trip without loss.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSchema {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(
        default = "default_input_schema",
        rename = "inputSchema",
        alias = "input_schema"
    )]
    pub input_schema: serde_json::Value,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ToolSchema {
    /// Create a schema with the given name and an empty object input schema.
    pub fn new(name: &str, description: Option<&str>) -> Self {
        Self {
            name: name.to_string(),
            description: description.map(str::to_string),
            input_schema: default_input_schema(),
            extra: serde_json::Map::new(),
        }
    }
}

/// `{"type": "object", "properties": {}}`: the schema of a tool with no inputs.
pub fn default_input_schema() -> serde_json::Value {
    serde_json::json!({ "type": "object", "properties": {} })
}

/// Extract the tool list from a `tools/list` result payload.
///
/// A missing or non-array `tools` key yields an empty list; individual
/// entries that do not look like tools are skipped with a warning.
pub fn parse_tool_list(backend: &str, result: &serde_json::Value) -> Vec<ToolSchema> {
    let Some(items) = result.get("tools").and_then(|t| t.as_array()) else {
        tracing::warn!(backend, "tools/list result has no 'tools' array");
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| match serde_json::from_value::<ToolSchema>(item.clone()) {
            Ok(tool) if !tool.name.is_empty() => Some(tool),
            Ok(_) => {
                tracing::warn!(backend, "skipping tool entry without a name");
                None
            }
            Err(e) => {
                tracing::warn!(backend, error = %e, "skipping malformed tool entry");
                None
            }
        })
        .collect()
}

// ─── Execution Result ────────────────────────────────────────────────────────

/// Normalized outcome of a proxied tool execution.
///
/// Serializes as `{"status": "success", "result": …}` or
/// `{"status": "error", "message": …}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ExecutionResult {
    Success { result: serde_json::Value },
    Error { message: String },
}

impl ExecutionResult {
    /// Build an error result.
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// Whether this result carries `status: error`.
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
