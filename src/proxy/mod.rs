//! Proxy layer.
//!
//! Turns "any backend, any transport" into one capability interface:
//! - `stdio`: subprocess-per-call JSON-RPC over stdin/stdout
//! - `http`: JSON-RPC POST to `<base>/mcp`
//! - `router`: selects the handler from the backend's declared transport

pub mod errors;
pub mod http;
pub mod router;
pub mod stdio;
pub mod types;

pub use errors::ProxyError;
pub use router::{ProxyRouter, TransportHandler, TransportTimeouts};
pub use types::{ExecutionResult, ToolSchema};
