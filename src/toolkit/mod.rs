//! Generic tool executor backend.
//!
//! Serves a directory of command-backed tools over stdio so that it can be
//! registered as an ordinary `stdio` backend. Manifests declare the tools,
//! their prompts and resource templates, and how resource URIs are answered.

pub mod errors;
pub mod executor;
pub mod manifest;
pub mod resources;
pub mod stdio_server;

pub use errors::ToolkitError;
pub use executor::InternalToolExecutor;
pub use manifest::{load_manifests, ToolManifest};
pub use resources::ResourceResponders;
pub use stdio_server::ToolServer;
