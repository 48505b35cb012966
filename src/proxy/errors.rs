//! Proxy error types.
//!
//! These never escape a transport handler: each handler folds them into an
//! `ExecutionResult::Error` (or an empty tool list) at its public boundary.

use thiserror::Error;

/// Errors that can occur while talking to a backend.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// The backend descriptor is missing what the transport needs.
    #[error("backend '{name}' is misconfigured: {reason}")]
    Misconfigured { name: String, reason: String },

    /// A backend process failed to start.
    #[error("failed to spawn backend '{name}': {reason}")]
    SpawnFailed { name: String, reason: String },

    /// The backend process exited with a nonzero status.
    #[error("backend '{name}' exited with {status}: {stderr}")]
    ProcessFailed {
        name: String,
        status: String,
        stderr: String,
    },

    /// The round trip exceeded its wall-clock budget.
    #[error("backend '{name}' timed out after {timeout_secs}s")]
    Timeout { name: String, timeout_secs: u64 },

    /// I/O or HTTP transport error.
    #[error("transport error for backend '{name}': {reason}")]
    Transport { name: String, reason: String },

    /// Non-2xx HTTP response.
    #[error("backend '{name}' returned HTTP {status}")]
    HttpStatus { name: String, status: u16 },

    /// No response with the expected id was found.
    #[error("no valid response received from backend '{name}'")]
    NoResponse { name: String },

    /// The backend answered with a JSON-RPC `error` member.
    #[error("{message}")]
    Remote { message: String },

    /// The declared transport has no registered handler.
    #[error("unsupported transport '{transport}' for backend '{name}'")]
    UnsupportedTransport { name: String, transport: String },
}
