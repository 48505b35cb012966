//! Protocol dispatcher.
//!
//! Stateless per request: validates each JSON-RPC envelope, looks the method
//! up in the registration table, and runs its handler with a collaborator
//! scope limited to what the method declared. Batches are processed
//! concurrently and answered as a list in the same order.

pub mod handlers;
pub mod services;
pub mod target;
pub mod types;

use futures::future::join_all;
use serde_json::Value;

use handlers::Method;
pub use services::{Needs, Scope, Services};
pub use target::Target;
pub use types::{failure, success, RpcError, RpcRequest};

pub struct Dispatcher {
    services: Services,
}

impl Dispatcher {
    pub fn new(services: Services) -> Self {
        Self { services }
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    /// Handle a single envelope or a batch of envelopes.
    pub async fn dispatch(&self, target: &Target, message: &Value) -> Value {
        match message {
            Value::Array(batch) if batch.is_empty() => failure(
                Value::Null,
                &RpcError::invalid_request("Invalid Request: empty batch"),
            ),
            Value::Array(batch) => Value::Array(
                join_all(batch.iter().map(|envelope| self.dispatch_one(target, envelope))).await,
            ),
            single => self.dispatch_one(target, single).await,
        }
    }

    async fn dispatch_one(&self, target: &Target, envelope: &Value) -> Value {
        let request = match RpcRequest::parse(envelope) {
            Ok(request) => request,
            Err((id, error)) => return failure(id, &error),
        };

        let Some((method, needs)) = Method::lookup(&request.method) else {
            tracing::debug!(server = target.name(), method = %request.method, "unknown method");
            return failure(request.id, &RpcError::method_not_found(&request.method));
        };

        tracing::debug!(server = target.name(), method = %request.method, "dispatching");
        match handlers::handle(method, target, &request, self.services.scope(needs)).await {
            Ok(result) => success(request.id, result),
            Err(error) => {
                tracing::warn!(
                    server = target.name(),
                    method = %request.method,
                    code = error.code,
                    error = %error.message,
                    "request failed"
                );
                failure(request.id, &error)
            }
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
