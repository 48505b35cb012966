//! Virtual server store errors.

use thiserror::Error;

use crate::storage::StorageError;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("virtual server '{name}' already exists")]
    AlreadyExists { name: String },

    #[error("virtual server '{name}' not found")]
    NotFound { name: String },

    #[error("invalid virtual server: {reason}")]
    Invalid { reason: String },

    #[error(transparent)]
    Storage(#[from] StorageError),
}
