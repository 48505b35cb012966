//! Protocol endpoints.
//!
//! - `GET|HEAD /mcp/{name}`: liveness probe after auth, empty body
//! - `POST /mcp/{name}`: JSON-RPC request/response
//! - `POST /mcp-sse/{name}`: same result delivered as one SSE `data:` frame
//!
//! Admission order: resolve the target (404), authenticate (401), reject
//! disabled servers (403), parse the body (400).

use std::convert::Infallible;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::Value;

use super::auth::check_api_key;
use super::errors::ApiError;
use super::AppState;
use crate::dispatcher::types::{failure, RpcError};
use crate::dispatcher::Target;

/// Resolve and authorize the target, or produce the rejection response.
async fn admit(st: &AppState, name: &str, headers: &HeaderMap) -> Result<Target, Response> {
    let registry = &st.dispatcher.services().registry;
    let target = Target::resolve(name, &st.store, registry)
        .await
        .map_err(|e| ApiError::internal(e).into_response())?
        .ok_or_else(|| ApiError::not_found("Server not found").into_response())?;

    if let Target::Virtual(server) = &target {
        if let Err(error) = check_api_key(headers, server.api_key.as_deref()) {
            tracing::warn!(server = name, code = error.code, "rejected unauthenticated call");
            return Err(rpc_rejection(StatusCode::UNAUTHORIZED, &error));
        }
        if !server.enabled {
            let error = RpcError::invalid_params(format!("Server \"{name}\" is disabled"));
            return Err(rpc_rejection(StatusCode::FORBIDDEN, &error));
        }
    }
    Ok(target)
}

fn rpc_rejection(status: StatusCode, error: &RpcError) -> Response {
    (status, Json(failure(Value::Null, error))).into_response()
}

/// Parse the request body. Empty values (`null`, `{}`, `[]`, `""`, `false`,
/// `0`) carry no request and are rejected like unparseable bodies.
fn parse_body(body: &Bytes) -> Result<Value, Response> {
    serde_json::from_slice::<Value>(body)
        .ok()
        .filter(|v| match v {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => n.as_f64() != Some(0.0),
            Value::String(s) => !s.is_empty(),
            Value::Array(items) => !items.is_empty(),
            Value::Object(map) => !map.is_empty(),
        })
        .ok_or_else(|| ApiError::bad_request("Invalid JSON body").into_response())
}

/// Compute the JSON-RPC response body for a POST.
async fn respond(st: &AppState, name: &str, headers: &HeaderMap, body: &Bytes) -> Result<Value, Response> {
    let target = admit(st, name, headers).await?;
    let message = parse_body(body)?;
    Ok(st.dispatcher.dispatch(&target, &message).await)
}

pub async fn probe(State(st): State<AppState>, Path(name): Path<String>, headers: HeaderMap) -> Response {
    match admit(&st, &name, &headers).await {
        Ok(_) => StatusCode::OK.into_response(),
        Err(rejection) => rejection,
    }
}

pub async fn post(
    State(st): State<AppState>,
    Path(name): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    match respond(&st, &name, &headers, &body).await {
        Ok(response) => Json(response).into_response(),
        Err(rejection) => rejection,
    }
}

/// One-shot SSE: the full response is computed first, then sent as a single
/// frame and the stream ends.
pub async fn post_sse(
    State(st): State<AppState>,
    Path(name): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    match respond(&st, &name, &headers, &body).await {
        Ok(response) => {
            let frame = Event::default().data(response.to_string());
            Sse::new(futures::stream::once(async move { Ok::<_, Infallible>(frame) })).into_response()
        }
        Err(rejection) => rejection,
    }
}
