//! Bearer-token checks.
//!
//! Protocol calls against a virtual server with an API key must present it;
//! the management API is guarded by the optional admin token. Both compare
//! in constant time.

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderMap, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use subtle::ConstantTimeEq;

use super::errors::ApiError;
use super::AppState;
use crate::dispatcher::types::{RpcError, AUTH_INVALID, AUTH_MISSING};

/// Extract the Bearer token, or the -32000 error explaining why there is none.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, RpcError> {
    let raw = headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .ok_or_else(|| {
            RpcError::new(AUTH_MISSING, "Authentication error: Missing Authorization header")
        })?;
    raw.strip_prefix("Bearer ").map(str::trim).ok_or_else(|| {
        RpcError::new(
            AUTH_MISSING,
            "Authentication error: Invalid token type, expected Bearer",
        )
    })
}

/// Constant-time token comparison.
pub fn tokens_match(presented: &str, expected: &str) -> bool {
    presented.as_bytes().ct_eq(expected.as_bytes()).into()
}

/// Check a protocol request against a virtual server's key. No key means
/// the server is open.
pub fn check_api_key(headers: &HeaderMap, api_key: Option<&str>) -> Result<(), RpcError> {
    let Some(expected) = api_key else {
        return Ok(());
    };
    let presented = bearer_token(headers)?;
    if tokens_match(presented, expected) {
        Ok(())
    } else {
        Err(RpcError::new(AUTH_INVALID, "Authentication error: Invalid API Key"))
    }
}

/// Middleware guarding `/api/*` when an admin token is configured.
pub async fn require_admin(State(st): State<AppState>, request: Request<Body>, next: Next) -> Response {
    let Some(expected) = st.admin_token.as_deref() else {
        return next.run(request).await;
    };

    let authorized = bearer_token(request.headers())
        .map(|presented| tokens_match(presented, expected))
        .unwrap_or(false);
    if !authorized {
        return ApiError::new(
            axum::http::StatusCode::UNAUTHORIZED,
            "missing or invalid admin token",
        )
        .into_response();
    }

    next.run(request).await
}
