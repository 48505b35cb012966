//! Toolkit error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ToolkitError {
    #[error("tool '{name}' not found")]
    UnknownTool { name: String },

    #[error("Missing required parameters: {}", missing.join(", "))]
    MissingParameters { name: String, missing: Vec<String> },

    #[error("invalid manifest {path}: {reason}")]
    Manifest { path: String, reason: String },

    #[error("tool '{name}' failed: {reason}")]
    Execution { name: String, reason: String },

    #[error("tool '{name}' timed out after {timeout_secs}s")]
    Timeout { name: String, timeout_secs: u64 },

    #[error("No resource handler found for: {uri}")]
    NoHandler { uri: String },

    #[error("resource handler failed: {reason}")]
    Handler { reason: String },

    #[error("stdio error: {0}")]
    Io(#[from] std::io::Error),
}
