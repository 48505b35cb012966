//! Subprocess transport.
//!
//! One process per call: spawn the backend command, write the three-line
//! handshake (`initialize`, `notifications/initialized`, then the real
//! request with id 2), close stdin, and collect stdout until the process
//! exits or the timeout fires. The response is the stdout line whose `id`
//! is 2; lines that are not JSON are skipped.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::errors::ProxyError;
use super::router::TransportHandler;
use super::types::{
    initialized_notification, parse_tool_list, ExecutionResult, JsonRpcRequest, JsonRpcResponse,
    ToolSchema,
};
use crate::registry::types::BackendDescriptor;

/// Id of the request that carries the actual operation.
const REQUEST_ID: u64 = 2;

/// Maximum stderr kept in error messages.
const STDERR_LIMIT: usize = 2000;

// ─── StdioTransportHandler ───────────────────────────────────────────────────

/// Talks to backends by spawning their command for every call.
#[derive(Debug, Clone)]
pub struct StdioTransportHandler {
    workspace_root: PathBuf,
    timeout: Duration,
}

impl StdioTransportHandler {
    /// Create a handler that launches commands from `workspace_root`.
    pub fn new(workspace_root: impl Into<PathBuf>) -> Self {
        Self {
            workspace_root: workspace_root.into(),
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Resolve the argument vector for a backend.
    ///
    /// A relative script argument (second element, with a file extension) is
    /// made absolute against the workspace root and must exist.
    fn resolve_command(&self, backend: &BackendDescriptor) -> Result<Vec<String>, ProxyError> {
        let mut argv = backend.command.clone();
        if argv.is_empty() || argv[0].trim().is_empty() {
            return Err(ProxyError::Misconfigured {
                name: backend.name.clone(),
                reason: "no command configured".into(),
            });
        }

        if let Some(script) = argv.get(1) {
            let script_path = Path::new(script);
            let looks_like_script = !script.starts_with('-') && script_path.extension().is_some();
            if looks_like_script && script_path.is_relative() {
                let absolute = self.workspace_root.join(script_path);
                if !absolute.exists() {
                    return Err(ProxyError::Misconfigured {
                        name: backend.name.clone(),
                        reason: format!("script not found at {}", absolute.display()),
                    });
                }
                argv[1] = absolute.to_string_lossy().into_owned();
            }
        }

        Ok(argv)
    }

    /// Run one handshake + request round trip and return the id-2 response.
    async fn round_trip(
        &self,
        backend: &BackendDescriptor,
        request: JsonRpcRequest,
    ) -> Result<JsonRpcResponse, ProxyError> {
        let argv = self.resolve_command(backend)?;
        let input = build_handshake(&request).map_err(|e| ProxyError::Transport {
            name: backend.name.clone(),
            reason: format!("failed to encode request: {e}"),
        })?;

        let mut cmd = Command::new(&argv[0]);
        cmd.args(&argv[1..])
            .current_dir(&self.workspace_root)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let name = backend.name.clone();
        let timeout = self.timeout;

        tracing::debug!(backend = %name, method = %request.method, "spawning stdio backend");

        // TODO: propagate client disconnect to cancel the backend process;
        // the detached task keeps running until exit or timeout.
        let task = tokio::spawn(async move { run_process(cmd, &name, input, timeout).await });

        match task.await {
            Ok(outcome) => outcome,
            Err(e) => Err(ProxyError::Transport {
                name: backend.name.clone(),
                reason: format!("join error: {e}"),
            }),
        }
    }
}

#[async_trait]
impl TransportHandler for StdioTransportHandler {
    async fn list_tools(&self, backend: &BackendDescriptor) -> Vec<ToolSchema> {
        match self.round_trip(backend, JsonRpcRequest::list_tools(REQUEST_ID)).await {
            Ok(response) => {
                if let Some(message) = response.error_message() {
                    tracing::warn!(backend = %backend.name, error = %message, "tools/list returned an error");
                    return Vec::new();
                }
                parse_tool_list(&backend.name, &response.result.unwrap_or_default())
            }
            Err(e) => {
                tracing::warn!(backend = %backend.name, error = %e, "tools/list failed");
                Vec::new()
            }
        }
    }

    async fn execute(
        &self,
        backend: &BackendDescriptor,
        tool_name: &str,
        arguments: serde_json::Value,
    ) -> ExecutionResult {
        let request = JsonRpcRequest::call_tool(REQUEST_ID, tool_name, arguments);
        match self.round_trip(backend, request).await {
            Ok(response) => match response.error {
                Some(_) => ExecutionResult::error(
                    response
                        .error_message()
                        .unwrap_or_else(|| "Tool execution failed".to_string()),
                ),
                None => ExecutionResult::Success {
                    result: response.result.unwrap_or_else(|| serde_json::json!({})),
                },
            },
            Err(e) => {
                tracing::warn!(backend = %backend.name, tool = tool_name, error = %e, "tools/call failed");
                ExecutionResult::error(e.to_string())
            }
        }
    }
}

// ─── Process Plumbing ────────────────────────────────────────────────────────

/// Spawn, feed stdin, and wait for output under `timeout`.
///
/// On timeout the child is dropped, which kills it (`kill_on_drop`).
async fn run_process(
    mut cmd: Command,
    name: &str,
    input: String,
    timeout: Duration,
) -> Result<JsonRpcResponse, ProxyError> {
    let mut child = cmd.spawn().map_err(|e| ProxyError::SpawnFailed {
        name: name.to_string(),
        reason: format!("{e}"),
    })?;

    let stdin = child.stdin.take();
    let exchange = async move {
        if let Some(mut stdin) = stdin {
            // A backend may exit before reading its input; that is reported
            // through its exit status, not as a write failure.
            if let Err(e) = stdin.write_all(input.as_bytes()).await {
                tracing::debug!(backend = name, error = %e, "stdin write failed");
            }
            drop(stdin);
        }
        child.wait_with_output().await
    };

    let output = match tokio::time::timeout(timeout, exchange).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            return Err(ProxyError::Transport {
                name: name.to_string(),
                reason: format!("{e}"),
            })
        }
        Err(_) => {
            return Err(ProxyError::Timeout {
                name: name.to_string(),
                timeout_secs: timeout.as_secs(),
            })
        }
    };

    if !output.status.success() {
        let stderr = truncate_stderr(&String::from_utf8_lossy(&output.stderr));
        return Err(ProxyError::ProcessFailed {
            name: name.to_string(),
            status: output.status.to_string(),
            stderr,
        });
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    find_response(name, &stdout).ok_or_else(|| ProxyError::NoResponse {
        name: name.to_string(),
    })
}

/// Serialize the handshake and request, one JSON object per line.
pub fn build_handshake(request: &JsonRpcRequest) -> Result<String, serde_json::Error> {
    let lines = [
        serde_json::to_string(&JsonRpcRequest::initialize(1))?,
        serde_json::to_string(&initialized_notification())?,
        serde_json::to_string(request)?,
    ];
    Ok(format!("{}\n", lines.join("\n")))
}

/// Locate the response to the id-2 request in the backend's stdout.
pub fn find_response(backend: &str, stdout: &str) -> Option<JsonRpcResponse> {
    for line in stdout.lines().map(str::trim).filter(|l| !l.is_empty()) {
        match serde_json::from_str::<JsonRpcResponse>(line) {
            Ok(response) if response.id == Some(serde_json::json!(REQUEST_ID)) => {
                return Some(response)
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(backend, error = %e, "skipping non-JSON line from backend");
            }
        }
    }
    None
}

fn truncate_stderr(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.len() <= STDERR_LIMIT {
        return trimmed.to_string();
    }
    let mut end = STDERR_LIMIT;
    while !trimmed.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...(truncated)", &trimmed[..end])
}

// ─── Tests ───────────────────────────────────────────────────────────────────
