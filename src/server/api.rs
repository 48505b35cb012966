//! Management API.
//!
//! JSON endpoints for the registry, tool toggles, virtual servers and custom
//! prompts. API keys are only ever returned by create and regenerate-key;
//! every other view is redacted.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use super::errors::ApiError;
use super::AppState;
use crate::prompts::{NewPrompt, PromptUpdate};
use crate::virtual_server::{generate_api_key, ToolReference, VirtualServer, VirtualServerUpdate};

type ApiResult = Result<Response, ApiError>;

fn json_body<T: DeserializeOwned>(body: &Bytes) -> Result<T, ApiError> {
    serde_json::from_slice(body).map_err(|e| {
        tracing::debug!(error = %e, "rejected request body");
        ApiError::bad_request("Invalid JSON body")
    })
}

// ─── Registry ────────────────────────────────────────────────────────────────

pub async fn registry_list(State(st): State<AppState>) -> ApiResult {
    let backends = st.dispatcher.services().registry.discover().await;
    Ok(Json(json!({ "servers": backends })).into_response())
}

pub async fn registry_refresh(State(st): State<AppState>) -> ApiResult {
    let backends = st.dispatcher.services().registry.refresh().await;
    tracing::info!(count = backends.len(), "registry refreshed");
    Ok(Json(json!({ "servers": backends })).into_response())
}

/// Live tool list of one backend, annotated with toggle state.
pub async fn registry_tools(State(st): State<AppState>, Path(name): Path<String>) -> ApiResult {
    let services = st.dispatcher.services();
    let backend = services
        .registry
        .find(&name)
        .await
        .ok_or_else(|| ApiError::not_found("Server not found"))?;
    let tools = services.router.list_tools(&backend).await;
    let tools = st.toggles.annotate(&backend.name, tools).await;
    Ok(Json(json!({ "server": backend.name, "tools": tools })).into_response())
}

/// Flip one backend tool's flag. Only tools the backend currently lists can
/// be toggled.
pub async fn toggle_tool(
    State(st): State<AppState>,
    Path((server, tool)): Path<(String, String)>,
) -> ApiResult {
    let services = st.dispatcher.services();
    let backend = services
        .registry
        .find(&server)
        .await
        .ok_or_else(|| ApiError::not_found("Server not found"))?;
    services
        .router
        .get_tool(&backend, &tool)
        .await
        .ok_or_else(|| ApiError::not_found("Tool not found"))?;
    let enabled = st.toggles.toggle(&server, &tool).await;
    Ok(Json(json!({ "server": server, "tool": tool, "enabled": enabled })).into_response())
}

// ─── Virtual Servers ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct CreateServer {
    name: Option<String>,
    description: Option<String>,
    selected_tools: Option<Vec<ToolReference>>,
    #[serde(default)]
    selected_prompts: Vec<String>,
    #[serde(default)]
    enabled: Option<bool>,
}

pub async fn servers_list(State(st): State<AppState>) -> ApiResult {
    let servers: Vec<Value> = st.store.list()?.iter().map(VirtualServer::redacted).collect();
    Ok(Json(json!({ "servers": servers })).into_response())
}

/// Create a server with a freshly generated API key. The response is the
/// only place the new key is shown.
pub async fn servers_create(State(st): State<AppState>, body: Bytes) -> ApiResult {
    let request: CreateServer = json_body(&body)?;
    let missing = |field: &str| ApiError::bad_request(format!("Missing required field: {field}"));
    let name = request.name.filter(|n| !n.trim().is_empty()).ok_or_else(|| missing("name"))?;
    let description = request.description.ok_or_else(|| missing("description"))?;
    let selected_tools = request.selected_tools.ok_or_else(|| missing("selected_tools"))?;

    let mut server = VirtualServer::new(name.trim(), &description, selected_tools);
    server.selected_prompts = request.selected_prompts;
    server.enabled = request.enabled.unwrap_or(true);
    server.api_key = Some(generate_api_key());

    let server = st.store.create(server).await?;
    Ok((StatusCode::CREATED, Json(server)).into_response())
}

pub async fn servers_update(
    State(st): State<AppState>,
    Path(name): Path<String>,
    body: Bytes,
) -> ApiResult {
    let update: VirtualServerUpdate = json_body(&body)?;
    let server = st.store.update(&name, update).await?;
    Ok(Json(server.redacted()).into_response())
}

pub async fn servers_delete(State(st): State<AppState>, Path(name): Path<String>) -> ApiResult {
    st.store.delete(&name).await?;
    Ok(Json(json!({ "deleted": name })).into_response())
}

pub async fn servers_regenerate_key(State(st): State<AppState>, Path(name): Path<String>) -> ApiResult {
    let server = st.store.regenerate_key(&name).await?;
    tracing::info!(server = %name, "api key regenerated");
    Ok(Json(json!({ "name": server.name, "api_key": server.api_key })).into_response())
}

pub async fn servers_status(State(st): State<AppState>, Path(name): Path<String>) -> ApiResult {
    let server = st
        .store
        .get(&name)?
        .ok_or_else(|| ApiError::not_found("Server not found"))?;
    Ok(Json(json!({
        "name": server.name,
        "status": server.status,
        "enabled": server.enabled,
        "tools_count": server.selected_tools.len(),
    }))
    .into_response())
}

// ─── Prompts ─────────────────────────────────────────────────────────────────

pub async fn prompts_list(State(st): State<AppState>) -> ApiResult {
    let prompts = st.dispatcher.services().prompts.list()?;
    Ok(Json(json!({ "prompts": prompts })).into_response())
}

pub async fn prompts_create(State(st): State<AppState>, body: Bytes) -> ApiResult {
    let new: NewPrompt = json_body(&body)?;
    let prompt = st.dispatcher.services().prompts.create(new).await?;
    Ok((StatusCode::CREATED, Json(prompt)).into_response())
}

pub async fn prompts_get(State(st): State<AppState>, Path(id): Path<String>) -> ApiResult {
    let prompt = st
        .dispatcher
        .services()
        .prompts
        .get(&id)?
        .ok_or_else(|| ApiError::not_found("Prompt not found"))?;
    Ok(Json(prompt).into_response())
}

pub async fn prompts_update(
    State(st): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> ApiResult {
    let update: PromptUpdate = json_body(&body)?;
    let prompt = st.dispatcher.services().prompts.update(&id, update).await?;
    Ok(Json(prompt).into_response())
}

pub async fn prompts_delete(State(st): State<AppState>, Path(id): Path<String>) -> ApiResult {
    if !st.dispatcher.services().prompts.delete(&id).await? {
        return Err(ApiError::not_found("Prompt not found"));
    }
    Ok(Json(json!({ "deleted": id })).into_response())
}
