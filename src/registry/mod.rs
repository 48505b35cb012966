//! Capability registry.
//!
//! Known backends come from declarative YAML entries and are rebuilt on every
//! discovery pass. Tool lists are never cached here; they are fetched lazily
//! through the proxy router.

pub mod capabilities;
pub mod discovery;
pub mod errors;
pub mod repo;
pub mod toggles;
pub mod types;

pub use capabilities::{CapabilityKind, CapabilityReader};
pub use discovery::Registry;
pub use errors::RegistryError;
pub use repo::{GitCli, RepoSync};
pub use toggles::ToolToggles;
pub use types::{BackendDescriptor, BackendStatus, DiscoveryMethod, Transport};
