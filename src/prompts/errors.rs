//! Prompt manager errors.

use thiserror::Error;

use crate::storage::StorageError;

#[derive(Debug, Error)]
pub enum PromptError {
    #[error("invalid prompt: {reason}")]
    Invalid { reason: String },

    #[error("a prompt with the id '{id}' already exists")]
    AlreadyExists { id: String },

    #[error("prompt '{id}' not found")]
    NotFound { id: String },

    #[error(transparent)]
    Storage(#[from] StorageError),
}
