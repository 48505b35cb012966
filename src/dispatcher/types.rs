//! JSON-RPC 2.0 envelopes for the inbound protocol surface.

use serde::Serialize;
use serde_json::Value;

// ─── Error Codes ─────────────────────────────────────────────────────────────

pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;
pub const INTERNAL_ERROR: i64 = -32603;
/// Authorization header missing or not a Bearer token.
pub const AUTH_MISSING: i64 = -32000;
/// Bearer token does not match the server's API key.
pub const AUTH_INVALID: i64 = -32001;

/// A JSON-RPC error object.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

impl RpcError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(INVALID_REQUEST, message)
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(METHOD_NOT_FOUND, format!("Method not found: {method}"))
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(INVALID_PARAMS, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(INTERNAL_ERROR, message)
    }
}

// ─── Request ─────────────────────────────────────────────────────────────────

/// A validated inbound request.
#[derive(Debug, Clone, PartialEq)]
pub struct RpcRequest {
    pub id: Value,
    pub method: String,
    pub params: Value,
}

impl RpcRequest {
    /// Validate an envelope. `jsonrpc`, `method` and `id` must be present.
    ///
    /// On failure the returned id is the envelope's id when it has one.
    pub fn parse(envelope: &Value) -> Result<Self, (Value, RpcError)> {
        let Some(obj) = envelope.as_object() else {
            return Err((Value::Null, RpcError::invalid_request("Invalid Request")));
        };
        let id = obj.get("id").cloned().unwrap_or(Value::Null);

        let missing: Vec<&str> = ["jsonrpc", "method", "id"]
            .into_iter()
            .filter(|key| !obj.contains_key(*key))
            .collect();
        if !missing.is_empty() {
            return Err((
                id,
                RpcError::invalid_request(format!(
                    "Invalid Request: missing {}",
                    missing.join(", ")
                )),
            ));
        }

        let Some(method) = obj.get("method").and_then(Value::as_str) else {
            return Err((id, RpcError::invalid_request("Invalid Request: method must be a string")));
        };

        Ok(Self {
            id,
            method: method.to_string(),
            params: obj.get("params").cloned().unwrap_or(Value::Null),
        })
    }

    /// String member of `params`, if present and non-empty.
    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.params
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    /// The `params.arguments` object; absent or null is empty.
    pub fn arguments(&self) -> Result<serde_json::Map<String, Value>, RpcError> {
        match self.params.get("arguments") {
            None | Some(Value::Null) => Ok(serde_json::Map::new()),
            Some(Value::Object(map)) => Ok(map.clone()),
            Some(_) => Err(RpcError::invalid_params("arguments must be an object")),
        }
    }
}

// ─── Response ────────────────────────────────────────────────────────────────

pub fn success(id: Value, result: Value) -> Value {
    serde_json::json!({ "jsonrpc": "2.0", "id": id, "result": result })
}

pub fn failure(id: Value, error: &RpcError) -> Value {
    serde_json::json!({ "jsonrpc": "2.0", "id": id, "error": error })
}
