//! Registry error types.

use thiserror::Error;

/// Errors raised while reading or repairing the declarative registry.
///
/// Discovery never fails as a whole: these are logged per entry and the
/// offending entry is skipped or marked with an error status.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("failed to read {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("invalid registry entry {path}: {reason}")]
    InvalidEntry { path: String, reason: String },

    #[error("failed to sync repository for '{name}': {reason}")]
    Sync { name: String, reason: String },

    #[error("no free port available for '{name}' above {port}")]
    PortExhausted { name: String, port: u16 },

    #[error("failed to persist registry entry {path}: {reason}")]
    Persist { path: String, reason: String },
}
