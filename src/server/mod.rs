//! HTTP surface.
//!
//! - `/mcp/{name}`, `/mcp-sse/{name}`: protocol endpoints for virtual
//!   servers and raw backends
//! - `/api/*`: management API, behind the admin token when one is set
//!
//! Every request is traced by `tower-http`.

pub mod api;
pub mod auth;
pub mod errors;
pub mod mcp;

use std::sync::Arc;

use axum::routing::{get, post, put};
use axum::{middleware, Router};
use tower_http::trace::TraceLayer;

use crate::dispatcher::Dispatcher;
use crate::registry::ToolToggles;
use crate::virtual_server::VirtualServerStore;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub store: Arc<VirtualServerStore>,
    pub toggles: Arc<ToolToggles>,
    pub admin_token: Option<Arc<str>>,
}

impl AppState {
    pub fn new(dispatcher: Dispatcher, store: VirtualServerStore, admin_token: Option<String>) -> Self {
        Self {
            dispatcher: Arc::new(dispatcher),
            store: Arc::new(store),
            toggles: Arc::new(ToolToggles::new()),
            admin_token: admin_token.map(Arc::from),
        }
    }
}

/// Build the full application router.
pub fn router(st: AppState) -> Router {
    let api = Router::new()
        .route("/registry", get(api::registry_list))
        .route("/registry/refresh", post(api::registry_refresh))
        .route("/registry/{name}/tools", get(api::registry_tools))
        .route("/tools/{server}/{tool}/toggle", post(api::toggle_tool))
        .route("/servers", get(api::servers_list).post(api::servers_create))
        .route(
            "/servers/{name}",
            put(api::servers_update).delete(api::servers_delete),
        )
        .route("/servers/{name}/regenerate-key", post(api::servers_regenerate_key))
        .route("/servers/{name}/status", get(api::servers_status))
        .route("/prompts", get(api::prompts_list).post(api::prompts_create))
        .route(
            "/prompts/{id}",
            get(api::prompts_get)
                .put(api::prompts_update)
                .delete(api::prompts_delete),
        )
        .layer(middleware::from_fn_with_state(st.clone(), auth::require_admin));

    Router::new()
        .route("/mcp/{name}", get(mcp::probe).post(mcp::post))
        .route("/mcp-sse/{name}", post(mcp::post_sse))
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
        .with_state(st)
}

/// Bind and serve until the process is stopped.
pub async fn serve(st: AppState, bind: &str) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    tracing::info!(addr = %listener.local_addr()?, "mcp-composer listening");
    axum::serve(listener, router(st)).await
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::Services;
    use crate::prompts::PromptManager;
    use crate::proxy::types::{ExecutionResult, ToolSchema};
    use crate::proxy::{ProxyRouter, TransportHandler};
    use crate::registry::{BackendDescriptor, CapabilityReader, Registry};
    use crate::virtual_server::{ToolReference, VirtualServer};
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Method, Request, StatusCode};
    use serde_json::{json, Value};
    use tempfile::TempDir;
    use tower::ServiceExt as _;

    struct EchoBackend;

    #[async_trait]
    impl TransportHandler for EchoBackend {
        async fn list_tools(&self, _backend: &BackendDescriptor) -> Vec<ToolSchema> {
            vec![ToolSchema::new("query", Some("Look up")), ToolSchema::new("scan", None)]
        }

        async fn execute(&self, _backend: &BackendDescriptor, tool: &str, arguments: Value) -> ExecutionResult {
            ExecutionResult::Success {
                result: json!({ "tool": tool, "arguments": arguments }),
            }
        }
    }

    async fn app(admin_token: Option<&str>) -> (TempDir, AppState) {
        let ws = TempDir::new().unwrap();
        let root = ws.path();
        std::fs::create_dir_all(root.join("registry")).unwrap();
        std::fs::write(
            root.join("registry/vt.yaml"),
            "name: virustotal\npath: servers/vt\ncommand: [fake]\n",
        )
        .unwrap();

        let services = Services {
            registry: Arc::new(Registry::new(root, "registry")),
            router: Arc::new(ProxyRouter::new().with_handler("stdio", Arc::new(EchoBackend))),
            prompts: Arc::new(PromptManager::new(root.join("custom-prompts"))),
            capabilities: Arc::new(CapabilityReader::new(root)),
        };
        let st = AppState::new(
            Dispatcher::new(services),
            VirtualServerStore::new(root.join("servers-configs")),
            admin_token.map(str::to_string),
        );

        let mut locked = VirtualServer::new("sec-tools", "Security", vec![ToolReference::new("virustotal", "query")]);
        locked.api_key = Some("s3cret".into());
        st.store.create(locked).await.unwrap();

        let open = VirtualServer::new("open", "", vec![ToolReference::new("virustotal", "query")]);
        st.store.create(open).await.unwrap();

        let mut off = VirtualServer::new("off", "", vec![ToolReference::new("virustotal", "query")]);
        off.enabled = false;
        st.store.create(off).await.unwrap();

        (ws, st)
    }

    fn request(method: Method, uri: &str, auth: Option<&str>, body: Option<Value>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(auth) = auth {
            builder = builder.header(header::AUTHORIZATION, auth);
        }
        let body = match body {
            Some(value) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(value.to_string())
            }
            None => Body::empty(),
        };
        builder.body(body).unwrap()
    }

    async fn send(st: &AppState, req: Request<Body>) -> (StatusCode, String) {
        let resp = router(st.clone()).oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    async fn send_json(st: &AppState, req: Request<Body>) -> (StatusCode, Value) {
        let (status, text) = send(st, req).await;
        (status, serde_json::from_str(&text).unwrap_or(Value::Null))
    }

    fn ping() -> Value {
        json!({"jsonrpc": "2.0", "id": 1, "method": "ping"})
    }

    #[tokio::test]
    async fn test_auth_on_keyed_server() {
        let (_ws, st) = app(None).await;

        let (status, body) = send_json(&st, request(Method::POST, "/mcp/sec-tools", None, Some(ping()))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["code"], -32000);
        assert_eq!(body["id"], Value::Null);

        let (status, body) = send_json(
            &st,
            request(Method::POST, "/mcp/sec-tools", Some("Bearer wrong"), Some(ping())),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["code"], -32001);

        let (status, body) = send_json(
            &st,
            request(Method::POST, "/mcp/sec-tools", Some("Bearer s3cret"), Some(ping())),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["result"], json!({}));
    }

    #[tokio::test]
    async fn test_open_server_and_tool_call() {
        let (_ws, st) = app(None).await;
        let call = json!({
            "jsonrpc": "2.0", "id": 7, "method": "tools/call",
            "params": {"name": "query", "arguments": {"query": "8.8.8.8"}}
        });
        let (status, body) = send_json(&st, request(Method::POST, "/mcp/open", None, Some(call))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["id"], 7);
        let text = body["result"]["content"][0]["text"].as_str().unwrap();
        let envelope: Value = serde_json::from_str(text).unwrap();
        assert_eq!(envelope["result"]["tool"], "query");
        assert_eq!(envelope["result"]["arguments"]["query"], "8.8.8.8");
    }

    #[tokio::test]
    async fn test_rejections() {
        let (_ws, st) = app(None).await;

        let (status, body) = send_json(&st, request(Method::POST, "/mcp/ghost", None, Some(ping()))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({"error": "Server not found"}));

        let (status, body) = send_json(&st, request(Method::POST, "/mcp/off", None, Some(ping()))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"]["code"], -32602);

        let bad = Request::builder()
            .method(Method::POST)
            .uri("/mcp/open")
            .body(Body::from("{not json"))
            .unwrap();
        let (status, body) = send_json(&st, bad).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({"error": "Invalid JSON body"}));

        let (status, _) = send(&st, request(Method::POST, "/mcp/open", None, None)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        for empty in [json!({}), json!([]), json!(""), json!(0)] {
            let (status, body) = send_json(&st, request(Method::POST, "/mcp/open", None, Some(empty))).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(body, json!({"error": "Invalid JSON body"}));
        }
    }

    #[tokio::test]
    async fn test_probe_and_raw_backend() {
        let (_ws, st) = app(None).await;
        let (status, body) = send(&st, request(Method::GET, "/mcp/open", None, None)).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.is_empty());

        let (status, _) = send(&st, request(Method::HEAD, "/mcp/sec-tools", None, None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let list = json!({"jsonrpc": "2.0", "id": 1, "method": "tools/list"});
        let (status, body) = send_json(&st, request(Method::POST, "/mcp/virustotal", None, Some(list))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["result"]["tools"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_sse_single_frame() {
        let (_ws, st) = app(None).await;
        let resp = router(st.clone())
            .oneshot(request(Method::POST, "/mcp-sse/open", None, Some(ping())))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers().get(header::CONTENT_TYPE).unwrap(),
            "text/event-stream"
        );
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        let frames: Vec<&str> = text.lines().filter(|l| l.starts_with("data:")).collect();
        assert_eq!(frames.len(), 1);
        let payload: Value = serde_json::from_str(frames[0].trim_start_matches("data:").trim()).unwrap();
        assert_eq!(payload["result"], json!({}));
    }

    #[tokio::test]
    async fn test_server_management() {
        let (_ws, st) = app(None).await;
        let create = json!({
            "name": "intel",
            "description": "Intel",
            "selected_tools": [{"server_name": "virustotal", "tool_name": "query"}]
        });
        let (status, body) = send_json(&st, request(Method::POST, "/api/servers", None, Some(create.clone()))).await;
        assert_eq!(status, StatusCode::CREATED);
        let key = body["api_key"].as_str().unwrap().to_string();
        assert_eq!(key.len(), 64);

        let (status, _) = send_json(&st, request(Method::POST, "/api/servers", None, Some(create))).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, body) = send_json(
            &st,
            request(Method::POST, "/api/servers", None, Some(json!({"name": "x", "description": ""}))),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Missing required field: selected_tools");

        let (_, body) = send_json(&st, request(Method::GET, "/api/servers", None, None)).await;
        let servers = body["servers"].as_array().unwrap();
        assert!(servers.iter().all(|s| s.get("api_key").is_none()));

        let (status, body) = send_json(
            &st,
            request(Method::PUT, "/api/servers/intel", None, Some(json!({"enabled": false, "name": "hijack"}))),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["name"], "intel");
        assert_eq!(body["enabled"], false);

        let (_, body) = send_json(&st, request(Method::GET, "/api/servers/intel/status", None, None)).await;
        assert_eq!(body, json!({"name": "intel", "status": "stopped", "enabled": false, "tools_count": 1}));

        let (_, body) = send_json(
            &st,
            request(Method::POST, "/api/servers/intel/regenerate-key", None, None),
        )
        .await;
        assert_ne!(body["api_key"].as_str().unwrap(), key);

        let (status, _) = send_json(&st, request(Method::DELETE, "/api/servers/intel", None, None)).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = send_json(&st, request(Method::DELETE, "/api/servers/intel", None, None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_registry_and_toggles() {
        let (_ws, st) = app(None).await;
        let (_, body) = send_json(&st, request(Method::GET, "/api/registry", None, None)).await;
        assert_eq!(body["servers"][0]["name"], "virustotal");

        let (status, body) = send_json(
            &st,
            request(Method::POST, "/api/tools/virustotal/scan/toggle", None, None),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["enabled"], false);

        let (_, body) = send_json(&st, request(Method::GET, "/api/registry/virustotal/tools", None, None)).await;
        let tools = body["tools"].as_array().unwrap();
        assert_eq!(tools[0]["enabled"], true);
        assert_eq!(tools[1]["name"], "scan");
        assert_eq!(tools[1]["enabled"], false);

        let (status, _) = send_json(&st, request(Method::GET, "/api/registry/ghost/tools", None, None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_toggle_unknown_server_or_tool_is_not_found() {
        let (_ws, st) = app(None).await;

        let (status, body) = send_json(
            &st,
            request(Method::POST, "/api/tools/ghost/scan/toggle", None, None),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Server not found");

        let (status, body) = send_json(
            &st,
            request(Method::POST, "/api/tools/virustotal/ghost-tool/toggle", None, None),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Tool not found");

        let (_, body) = send_json(&st, request(Method::GET, "/api/registry/virustotal/tools", None, None)).await;
        let tools = body["tools"].as_array().unwrap();
        assert!(tools.iter().all(|t| t["enabled"] == true));
    }

    #[tokio::test]
    async fn test_prompt_management() {
        let (_ws, st) = app(None).await;
        let (status, body) = send_json(
            &st,
            request(
                Method::POST,
                "/api/prompts",
                None,
                Some(json!({"name": "IOC Summary", "prompt_template": "Summarize {{ioc}}"})),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["id"], "ioc-summary");

        let (_, body) = send_json(
            &st,
            request(Method::PUT, "/api/prompts/ioc-summary", None, Some(json!({"description": "d"}))),
        )
        .await;
        assert_eq!(body["description"], "d");

        let (status, _) = send_json(&st, request(Method::GET, "/api/prompts/ioc-summary", None, None)).await;
        assert_eq!(status, StatusCode::OK);
        let (_, body) = send_json(&st, request(Method::GET, "/api/prompts", None, None)).await;
        assert_eq!(body["prompts"].as_array().unwrap().len(), 1);

        let (status, _) = send_json(&st, request(Method::DELETE, "/api/prompts/ioc-summary", None, None)).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = send_json(&st, request(Method::GET, "/api/prompts/ioc-summary", None, None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_admin_token_guards_api_only() {
        let (_ws, st) = app(Some("admin")).await;
        let (status, _) = send_json(&st, request(Method::GET, "/api/servers", None, None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let (status, _) = send_json(&st, request(Method::GET, "/api/servers", Some("Bearer admin"), None)).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = send_json(&st, request(Method::POST, "/mcp/open", None, Some(ping()))).await;
        assert_eq!(status, StatusCode::OK);
    }
}
