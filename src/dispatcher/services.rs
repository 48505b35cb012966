//! Collaborator scoping for protocol handlers.
//!
//! Every method declares the collaborators it uses in a static table
//! (`Method::lookup`). The dispatcher builds a `Scope` holding only those;
//! asking a scope for anything else is an internal error.

use std::sync::Arc;

use super::types::RpcError;
use crate::prompts::PromptManager;
use crate::proxy::ProxyRouter;
use crate::registry::{CapabilityReader, Registry};

/// Collaborators a handler may use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Needs {
    pub registry: bool,
    pub router: bool,
    pub prompts: bool,
    pub capabilities: bool,
}

impl Needs {
    pub const NONE: Needs = Needs {
        registry: false,
        router: false,
        prompts: false,
        capabilities: false,
    };
}

/// Every shared collaborator, owned by the server.
#[derive(Clone)]
pub struct Services {
    pub registry: Arc<Registry>,
    pub router: Arc<ProxyRouter>,
    pub prompts: Arc<PromptManager>,
    pub capabilities: Arc<CapabilityReader>,
}

impl Services {
    /// A view exposing only the declared collaborators.
    pub fn scope(&self, needs: Needs) -> Scope<'_> {
        Scope {
            registry: needs.registry.then_some(&*self.registry),
            router: needs.router.then_some(&*self.router),
            prompts: needs.prompts.then_some(&*self.prompts),
            capabilities: needs.capabilities.then_some(&*self.capabilities),
        }
    }
}

/// The collaborators available to one handler invocation.
#[derive(Clone, Copy)]
pub struct Scope<'a> {
    registry: Option<&'a Registry>,
    router: Option<&'a ProxyRouter>,
    prompts: Option<&'a PromptManager>,
    capabilities: Option<&'a CapabilityReader>,
}

impl<'a> Scope<'a> {
    pub fn registry(&self) -> Result<&'a Registry, RpcError> {
        self.registry.ok_or_else(|| undeclared("registry"))
    }

    pub fn router(&self) -> Result<&'a ProxyRouter, RpcError> {
        self.router.ok_or_else(|| undeclared("router"))
    }

    pub fn prompts(&self) -> Result<&'a PromptManager, RpcError> {
        self.prompts.ok_or_else(|| undeclared("prompt manager"))
    }

    pub fn capabilities(&self) -> Result<&'a CapabilityReader, RpcError> {
        self.capabilities.ok_or_else(|| undeclared("capability reader"))
    }
}

fn undeclared(collaborator: &str) -> RpcError {
    tracing::error!(collaborator, "handler used an undeclared collaborator");
    RpcError::internal(format!("handler did not declare the {collaborator}"))
}
