//! Protocol method handlers.
//!
//! `METHODS` is the registration table: method name, handler, and the
//! collaborators the handler is allowed to use. Handlers receive the resolved
//! `Target` and a `Scope` built from that declaration.

use serde_json::{json, Value};

use super::services::{Needs, Scope};
use super::target::Target;
use super::types::{RpcError, RpcRequest};
use crate::prompts::{CustomPrompt, PromptManager};
use crate::proxy::types::PROTOCOL_VERSION;
use crate::registry::CapabilityKind;
use crate::virtual_server::{ToolReference, VirtualServer};

// ─── Registration Table ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Initialize,
    Ping,
    ToolsList,
    ToolsCall,
    PromptsList,
    PromptsGet,
    ResourcesList,
    ResourcesRead,
    ResourceTemplatesList,
}

const LISTING: Needs = Needs {
    registry: true,
    capabilities: true,
    ..Needs::NONE
};

const METHODS: &[(&str, Method, Needs)] = &[
    ("initialize", Method::Initialize, Needs::NONE),
    ("ping", Method::Ping, Needs::NONE),
    (
        "tools/list",
        Method::ToolsList,
        Needs {
            router: true,
            prompts: true,
            ..Needs::NONE
        },
    ),
    (
        "tools/call",
        Method::ToolsCall,
        Needs {
            registry: true,
            router: true,
            prompts: true,
            ..Needs::NONE
        },
    ),
    (
        "prompts/list",
        Method::PromptsList,
        Needs {
            prompts: true,
            ..LISTING
        },
    ),
    (
        "prompts/get",
        Method::PromptsGet,
        Needs {
            prompts: true,
            ..LISTING
        },
    ),
    ("resources/list", Method::ResourcesList, LISTING),
    ("resources/read", Method::ResourcesRead, Needs::NONE),
    ("resources/templates/list", Method::ResourceTemplatesList, LISTING),
    ("resource-templates/list", Method::ResourceTemplatesList, LISTING),
];

impl Method {
    /// Find a method and its declared collaborators by name.
    pub fn lookup(name: &str) -> Option<(Method, Needs)> {
        METHODS
            .iter()
            .find(|(method_name, _, _)| *method_name == name)
            .map(|(_, method, needs)| (*method, *needs))
    }
}

/// Run one method against a target.
pub async fn handle(
    method: Method,
    target: &Target,
    request: &RpcRequest,
    scope: Scope<'_>,
) -> Result<Value, RpcError> {
    match method {
        Method::Initialize => Ok(initialize(target)),
        Method::Ping => Ok(json!({})),
        Method::ToolsList => tools_list(target, scope).await,
        Method::ToolsCall => tools_call(target, request, scope).await,
        Method::PromptsList => capability_list(target, CapabilityKind::Prompts, scope).await,
        Method::PromptsGet => prompts_get(target, request, scope).await,
        Method::ResourcesList => capability_list(target, CapabilityKind::Resources, scope).await,
        Method::ResourcesRead => Err(RpcError::invalid_params("Resource reading not yet implemented")),
        Method::ResourceTemplatesList => {
            capability_list(target, CapabilityKind::ResourceTemplates, scope).await
        }
    }
}

// ─── Handlers ────────────────────────────────────────────────────────────────

fn initialize(target: &Target) -> Value {
    json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": {
            "tools": { "listChanged": false },
            "prompts": { "listChanged": false },
            "resources": { "subscribe": false, "listChanged": false },
        },
        "serverInfo": {
            "name": format!("MCP Proxy - {}", target.name()),
            "version": env!("CARGO_PKG_VERSION"),
        },
    })
}

async fn tools_list(target: &Target, scope: Scope<'_>) -> Result<Value, RpcError> {
    match target {
        Target::Virtual(server) => {
            let mut tools: Vec<Value> = server
                .selected_tools
                .iter()
                .map(ToolReference::listing)
                .collect();
            tools.extend(
                selected_prompts(server, scope.prompts()?)
                    .iter()
                    .map(CustomPrompt::as_tool),
            );
            Ok(json!({ "tools": tools }))
        }
        Target::Backend(backend) => {
            let tools = scope.router()?.list_tools(backend).await;
            Ok(json!({ "tools": tools }))
        }
    }
}

async fn tools_call(target: &Target, request: &RpcRequest, scope: Scope<'_>) -> Result<Value, RpcError> {
    let name = request
        .param_str("name")
        .ok_or_else(|| RpcError::invalid_params("Missing tool name"))?;
    let arguments = request.arguments()?;

    let server = match target {
        Target::Virtual(server) => server,
        Target::Backend(backend) => {
            return Err(RpcError::invalid_params(format!(
                "Server \"{}\" is not a virtual server; tools are called through a virtual server",
                backend.name
            )))
        }
    };

    if server.has_prompt(name) {
        let prompt = scope
            .prompts()?
            .get(name)
            .map_err(|e| RpcError::internal(e.to_string()))?;
        if let Some(prompt) = prompt {
            let rendered = prompt.render(&arguments);
            return Ok(tool_content(&json!({ "rendered_prompt": rendered }), false));
        }
    }

    let reference = server.find_tool(name).ok_or_else(|| {
        RpcError::invalid_params(format!("Tool \"{name}\" not found in this virtual server"))
    })?;

    let backend = scope
        .registry()?
        .find(&reference.backend_name)
        .await
        .ok_or_else(|| {
            RpcError::internal(format!(
                "Underlying server \"{}\" not found",
                reference.backend_name
            ))
        })?;

    tracing::info!(
        server = %server.name,
        backend = %backend.name,
        tool = %reference.tool_name,
        "proxying tool call"
    );
    let result = scope
        .router()?
        .execute(&backend, &reference.tool_name, Value::Object(arguments))
        .await;
    let envelope = serde_json::to_value(&result).map_err(|e| RpcError::internal(e.to_string()))?;
    Ok(tool_content(&envelope, result.is_error()))
}

async fn capability_list(
    target: &Target,
    kind: CapabilityKind,
    scope: Scope<'_>,
) -> Result<Value, RpcError> {
    let reader = scope.capabilities()?;
    let items = match target {
        Target::Backend(backend) => reader.list(backend, kind),
        Target::Virtual(server) => {
            let snapshot = scope.registry()?.discover().await;
            let mut items = Vec::new();
            for backend_name in server.backend_names() {
                match snapshot.iter().find(|b| b.name == backend_name) {
                    Some(backend) => items.extend(reader.list(backend, kind)),
                    None => tracing::warn!(
                        server = %server.name,
                        backend = backend_name,
                        "referenced backend not found, contributing nothing"
                    ),
                }
            }
            if kind == CapabilityKind::Prompts {
                items.extend(
                    selected_prompts(server, scope.prompts()?)
                        .iter()
                        .map(CustomPrompt::listing),
                );
            }
            items
        }
    };

    let key = match kind {
        CapabilityKind::Prompts => "prompts",
        CapabilityKind::Resources => "resources",
        CapabilityKind::ResourceTemplates => "resourceTemplates",
    };
    let mut result = serde_json::Map::new();
    result.insert(key.to_string(), Value::Array(items));
    Ok(Value::Object(result))
}

async fn prompts_get(target: &Target, request: &RpcRequest, scope: Scope<'_>) -> Result<Value, RpcError> {
    let name = request
        .param_str("name")
        .ok_or_else(|| RpcError::invalid_params("Missing prompt name"))?;
    let arguments = request.arguments()?;
    let reader = scope.capabilities()?;

    let rendered = match target {
        Target::Backend(backend) => reader
            .find_prompt(backend, name)
            .map(|p| (p.description.clone(), p.render(&arguments))),
        Target::Virtual(server) => {
            let custom = if server.has_prompt(name) {
                scope
                    .prompts()?
                    .get(name)
                    .map_err(|e| RpcError::internal(e.to_string()))?
            } else {
                None
            };
            match custom {
                Some(prompt) => Some((prompt.description.clone(), prompt.render(&arguments))),
                None => {
                    let snapshot = scope.registry()?.discover().await;
                    server
                        .backend_names()
                        .into_iter()
                        .filter_map(|backend_name| snapshot.iter().find(|b| b.name == backend_name))
                        .find_map(|backend| reader.find_prompt(backend, name))
                        .map(|p| (p.description.clone(), p.render(&arguments)))
                }
            }
        }
    };

    let (description, text) = rendered
        .ok_or_else(|| RpcError::invalid_params(format!("Prompt \"{name}\" not found")))?;
    Ok(json!({
        "description": description,
        "messages": [{
            "role": "user",
            "content": { "type": "text", "text": text },
        }],
    }))
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

/// Custom prompts selected by a virtual server. Missing or unreadable ones
/// are skipped.
fn selected_prompts(server: &VirtualServer, manager: &PromptManager) -> Vec<CustomPrompt> {
    server
        .selected_prompts
        .iter()
        .filter_map(|id| match manager.get(id) {
            Ok(Some(prompt)) => Some(prompt),
            Ok(None) => {
                tracing::warn!(server = %server.name, prompt = %id, "selected prompt not found");
                None
            }
            Err(e) => {
                tracing::warn!(server = %server.name, prompt = %id, error = %e, "failed to load prompt");
                None
            }
        })
        .collect()
}

/// `tools/call` result: one text block holding the pretty-printed envelope.
fn tool_content(envelope: &Value, is_error: bool) -> Value {
    let text = serde_json::to_string_pretty(envelope).unwrap_or_else(|_| envelope.to_string());
    json!({
        "content": [{ "type": "text", "text": text }],
        "isError": is_error,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_table() {
        let (method, needs) = Method::lookup("tools/call").unwrap();
        assert_eq!(method, Method::ToolsCall);
        assert!(needs.registry && needs.router && needs.prompts);
        assert!(!needs.capabilities);

        let (_, needs) = Method::lookup("initialize").unwrap();
        assert_eq!(needs, Needs::NONE);

        let (_, needs) = Method::lookup("resources/list").unwrap();
        assert!(needs.registry && needs.capabilities && !needs.router && !needs.prompts);

        assert_eq!(
            Method::lookup("resource-templates/list").map(|(m, _)| m),
            Method::lookup("resources/templates/list").map(|(m, _)| m)
        );
        assert!(Method::lookup("tools/destroy").is_none());
    }

    #[test]
    fn test_tool_content_shape() {
        let content = tool_content(&json!({"status": "success", "result": {"a": 1}}), false);
        assert_eq!(content["isError"], false);
        assert_eq!(content["content"][0]["type"], "text");
        let text = content["content"][0]["text"].as_str().unwrap();
        assert!(text.contains('\n'));
        let back: Value = serde_json::from_str(text).unwrap();
        assert_eq!(back["result"]["a"], 1);
    }
}
