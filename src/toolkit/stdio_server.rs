//! `tool-server`: a tools directory served as a stdio backend.
//!
//! Line-delimited JSON-RPC on stdin/stdout, one response line per request.
//! Notifications get no reply; unparseable lines get -32700.

use serde_json::{json, Map, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use super::errors::ToolkitError;
use super::executor::InternalToolExecutor;
use super::resources::ResourceResponders;
use crate::dispatcher::types::{failure, success, RpcError, RpcRequest, PARSE_ERROR};
use crate::proxy::types::PROTOCOL_VERSION;
use crate::registry::capabilities::{PromptTemplate, ResourceTemplate};

/// Mime type of `resources/read` contents when no template declares one.
const DEFAULT_MIME_TYPE: &str = "text/markdown";

pub struct ToolServer {
    name: String,
    executor: InternalToolExecutor,
    responders: ResourceResponders,
}

impl ToolServer {
    pub fn new(name: impl Into<String>, executor: InternalToolExecutor) -> Self {
        let responders = ResourceResponders::from_manifests(executor.tools());
        Self {
            name: name.into(),
            executor,
            responders,
        }
    }

    /// Serve until `reader` reaches end of input.
    pub async fn run<R, W>(&self, reader: R, mut writer: W) -> Result<(), ToolkitError>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        tracing::info!(server = %self.name, tools = self.executor.tools().len(), "tool server ready");
        let mut lines = reader.lines();
        while let Some(line) = lines.next_line().await? {
            let Some(response) = self.handle_line(&line).await else {
                continue;
            };
            let mut out = response.to_string();
            out.push('\n');
            writer.write_all(out.as_bytes()).await?;
            writer.flush().await?;
        }
        tracing::info!(server = %self.name, "stdin closed, tool server exiting");
        Ok(())
    }

    /// Answer one input line. `None` means no reply is due.
    pub async fn handle_line(&self, line: &str) -> Option<Value> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        match serde_json::from_str::<Value>(line) {
            Ok(message) => self.handle(&message).await,
            Err(e) => {
                tracing::warn!(server = %self.name, error = %e, "unparseable input line");
                Some(failure(Value::Null, &RpcError::new(PARSE_ERROR, format!("Parse error: {e}"))))
            }
        }
    }

    async fn handle(&self, message: &Value) -> Option<Value> {
        if message.get("id").is_none() {
            let method = message.get("method").and_then(Value::as_str).unwrap_or_default();
            tracing::debug!(server = %self.name, method, "notification");
            return None;
        }

        let request = match RpcRequest::parse(message) {
            Ok(request) => request,
            Err((id, error)) => return Some(failure(id, &error)),
        };

        let outcome = match request.method.as_str() {
            "initialize" => Ok(self.initialize()),
            "ping" => Ok(json!({})),
            "tools/list" => Ok(self.tools_list()),
            "tools/call" => self.tools_call(&request).await,
            "prompts/list" => Ok(self.prompts_list()),
            "resources/templates/list" | "resource-templates/list" => Ok(self.resource_templates_list()),
            "resources/read" => self.resources_read(&request).await,
            other => Err(RpcError::method_not_found(other)),
        };

        Some(match outcome {
            Ok(result) => success(request.id, result),
            Err(error) => failure(request.id, &error),
        })
    }

    fn initialize(&self) -> Value {
        json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {
                "tools": { "listChanged": false },
                "prompts": { "listChanged": false },
                "resources": { "subscribe": false, "listChanged": false },
            },
            "serverInfo": { "name": self.name, "version": env!("CARGO_PKG_VERSION") },
        })
    }

    fn tools_list(&self) -> Value {
        let tools: Vec<Value> = self
            .executor
            .tools()
            .iter()
            .map(|tool| {
                json!({
                    "name": tool.name,
                    "description": tool.description,
                    "inputSchema": tool.input_schema(),
                })
            })
            .collect();
        json!({ "tools": tools })
    }

    async fn tools_call(&self, request: &RpcRequest) -> Result<Value, RpcError> {
        let name = request
            .param_str("name")
            .ok_or_else(|| RpcError::invalid_params("Missing tool name"))?;
        let arguments: Map<String, Value> = request.arguments()?;

        tracing::info!(server = %self.name, tool = name, "tool call");
        let (text, is_error) = match self.executor.call_tool(name, &arguments).await {
            Ok(Value::String(s)) => (s, false),
            Ok(result) => (
                serde_json::to_string_pretty(&result).unwrap_or_else(|_| result.to_string()),
                false,
            ),
            Err(e) => {
                tracing::error!(server = %self.name, tool = name, error = %e, "tool failed");
                (format!("Error executing tool '{name}': {e}"), true)
            }
        };
        Ok(json!({
            "content": [{ "type": "text", "text": text }],
            "isError": is_error,
        }))
    }

    fn prompts_list(&self) -> Value {
        let prompts: Vec<Value> = self
            .executor
            .tools()
            .iter()
            .flat_map(|tool| tool.prompts.iter().map(PromptTemplate::listing))
            .collect();
        json!({ "prompts": prompts })
    }

    fn templates(&self) -> impl Iterator<Item = &ResourceTemplate> {
        self.executor.tools().iter().flat_map(|tool| tool.resource_templates.iter())
    }

    fn resource_templates_list(&self) -> Value {
        let templates: Vec<&ResourceTemplate> = self.templates().collect();
        json!({ "resourceTemplates": templates })
    }

    async fn resources_read(&self, request: &RpcRequest) -> Result<Value, RpcError> {
        let uri = request
            .param_str("uri")
            .ok_or_else(|| RpcError::invalid_params("Missing resource uri"))?;

        let text = self.responders.read(uri, &self.executor).await.map_err(|e| match e {
            ToolkitError::NoHandler { .. } => RpcError::invalid_params(e.to_string()),
            other => RpcError::internal(other.to_string()),
        })?;

        let mime_type = self
            .responders
            .find(uri)
            .and_then(|handler| {
                self.templates()
                    .find(|t| t.uri_template.starts_with(&handler.uri_prefix))
                    .and_then(|t| t.mime_type.clone())
            })
            .unwrap_or_else(|| DEFAULT_MIME_TYPE.to_string());

        Ok(json!({
            "contents": [{ "uri": uri, "mimeType": mime_type, "text": text }],
        }))
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::types::{INVALID_PARAMS, METHOD_NOT_FOUND};
    use tempfile::TempDir;
    use tokio::io::BufReader;

    fn server() -> (TempDir, ToolServer) {
        let dir = TempDir::new().unwrap();
        let tool = dir.path().join("virustotal");
        std::fs::create_dir_all(&tool).unwrap();
        std::fs::write(
            tool.join("config.yaml"),
            "name: virustotal\ndescription: VT lookup\ninputs:\n  - name: query\n    required: true\ncommand: [sh, -c, cat]\nprompts:\n  - name: vt-triage\n    template: \"Triage {ioc}\"\nresource_templates:\n  - uriTemplate: \"vt://{ioc}\"\n    name: vt-report\n    mimeType: text/plain\nhandlers:\n  - uri_prefix: \"vt://\"\n    uri_pattern: \"vt://{ioc}\"\n    type: single_tool\n    tool_name: virustotal\n    parameter_mapping:\n      query: ioc\n    response_template: \"{tool_result}\"\n",
        )
        .unwrap();
        let executor = InternalToolExecutor::load(dir.path());
        (dir, ToolServer::new("intel", executor))
    }

    fn rpc(id: u64, method: &str, params: Value) -> String {
        json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params}).to_string()
    }

    #[tokio::test]
    async fn test_handshake_and_listing() {
        let (_dir, server) = server();
        let init = server.handle_line(&rpc(1, "initialize", json!({}))).await.unwrap();
        assert_eq!(init["result"]["serverInfo"]["name"], "intel");

        let initialized = json!({"jsonrpc": "2.0", "method": "notifications/initialized"}).to_string();
        assert!(server.handle_line(&initialized).await.is_none());
        assert!(server.handle_line("   ").await.is_none());

        let list = server.handle_line(&rpc(2, "tools/list", json!({}))).await.unwrap();
        let tool = &list["result"]["tools"][0];
        assert_eq!(tool["name"], "virustotal");
        assert_eq!(tool["inputSchema"]["required"], json!(["query"]));

        let prompts = server.handle_line(&rpc(3, "prompts/list", json!({}))).await.unwrap();
        assert_eq!(prompts["result"]["prompts"][0]["name"], "vt-triage");

        let templates = server
            .handle_line(&rpc(4, "resources/templates/list", json!({})))
            .await
            .unwrap();
        assert_eq!(templates["result"]["resourceTemplates"][0]["uriTemplate"], "vt://{ioc}");
    }

    #[tokio::test]
    async fn test_tools_call() {
        let (_dir, server) = server();
        let resp = server
            .handle_line(&rpc(2, "tools/call", json!({"name": "virustotal", "arguments": {"query": "1.1.1.1"}})))
            .await
            .unwrap();
        assert_eq!(resp["result"]["isError"], false);
        let text = resp["result"]["content"][0]["text"].as_str().unwrap();
        assert_eq!(serde_json::from_str::<Value>(text).unwrap(), json!({"query": "1.1.1.1"}));

        let resp = server
            .handle_line(&rpc(3, "tools/call", json!({"name": "virustotal"})))
            .await
            .unwrap();
        assert_eq!(resp["result"]["isError"], true);
        assert_eq!(
            resp["result"]["content"][0]["text"],
            "Error executing tool 'virustotal': Missing required parameters: query"
        );
    }

    #[tokio::test]
    async fn test_resources_read() {
        let (_dir, server) = server();
        let resp = server
            .handle_line(&rpc(5, "resources/read", json!({"uri": "vt://8.8.8.8"})))
            .await
            .unwrap();
        let contents = &resp["result"]["contents"][0];
        assert_eq!(contents["uri"], "vt://8.8.8.8");
        assert_eq!(contents["mimeType"], "text/plain");
        assert!(contents["text"].as_str().unwrap().contains("8.8.8.8"));

        let resp = server
            .handle_line(&rpc(6, "resources/read", json!({"uri": "other://x"})))
            .await
            .unwrap();
        assert_eq!(resp["error"]["code"], INVALID_PARAMS);
    }

    #[tokio::test]
    async fn test_run_loop() {
        let (_dir, server) = server();
        let input = format!(
            "{}\nnot json\n{}\n{}\n",
            rpc(1, "ping", Value::Null),
            json!({"jsonrpc": "2.0", "method": "notifications/initialized"}),
            rpc(2, "nope", json!({}))
        );
        let mut output = Vec::new();
        server
            .run(BufReader::new(input.as_bytes()), &mut output)
            .await
            .unwrap();

        let lines: Vec<Value> = String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0]["result"], json!({}));
        assert_eq!(lines[1]["error"]["code"], PARSE_ERROR);
        assert_eq!(lines[1]["id"], Value::Null);
        assert_eq!(lines[2]["error"]["code"], METHOD_NOT_FOUND);
    }
}
