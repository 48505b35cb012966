//! Virtual servers: named compositions of backend tools and custom prompts.

pub mod errors;
pub mod store;
pub mod types;

pub use errors::StoreError;
pub use store::{generate_api_key, VirtualServerStore};
pub use types::{ToolReference, VirtualServer, VirtualServerUpdate};
