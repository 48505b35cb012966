//! Command-backed tool execution.
//!
//! A tool runs as a child process in its own directory. The call arguments
//! are written to stdin as one JSON object; stdout is parsed as JSON and
//! falls back to the trimmed text when it is not.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use serde_json::{Map, Value};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::errors::ToolkitError;
use super::manifest::{load_manifests, ToolManifest};

/// Default per-call budget.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum stderr kept in error messages.
const STDERR_LIMIT: usize = 2000;

/// Runs the tools found under one tools directory.
#[derive(Debug, Clone)]
pub struct InternalToolExecutor {
    tools: Vec<ToolManifest>,
    timeout: Duration,
}

impl InternalToolExecutor {
    pub fn new(tools: Vec<ToolManifest>) -> Self {
        Self {
            tools,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Discover every tool under `tools_dir`.
    pub fn load(tools_dir: &Path) -> Self {
        let tools = load_manifests(tools_dir);
        tracing::info!(path = %tools_dir.display(), count = tools.len(), "tools loaded");
        Self::new(tools)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn tools(&self) -> &[ToolManifest] {
        &self.tools
    }

    pub fn find(&self, name: &str) -> Option<&ToolManifest> {
        self.tools.iter().find(|tool| tool.name == name)
    }

    /// Validate required inputs, then run the tool.
    pub async fn call_tool(&self, name: &str, arguments: &Map<String, Value>) -> Result<Value, ToolkitError> {
        let tool = self.find(name).ok_or_else(|| ToolkitError::UnknownTool {
            name: name.to_string(),
        })?;

        let missing = tool.missing_inputs(arguments);
        if !missing.is_empty() {
            return Err(ToolkitError::MissingParameters {
                name: name.to_string(),
                missing,
            });
        }

        let argv = tool.resolved_command().ok_or_else(|| ToolkitError::Execution {
            name: name.to_string(),
            reason: "no command configured".into(),
        })?;

        tracing::info!(tool = name, "executing tool");
        self.run(tool, &argv, arguments).await
    }

    async fn run(
        &self,
        tool: &ToolManifest,
        argv: &[String],
        arguments: &Map<String, Value>,
    ) -> Result<Value, ToolkitError> {
        let execution_error = |reason: String| ToolkitError::Execution {
            name: tool.name.clone(),
            reason,
        };
        let input = serde_json::to_string(arguments).map_err(|e| execution_error(e.to_string()))?;

        let mut child = Command::new(&argv[0])
            .args(&argv[1..])
            .current_dir(&tool.dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| execution_error(format!("failed to spawn: {e}")))?;

        let stdin = child.stdin.take();
        let exchange = async move {
            if let Some(mut stdin) = stdin {
                if let Err(e) = stdin.write_all(input.as_bytes()).await {
                    tracing::debug!(error = %e, "stdin write failed");
                }
                drop(stdin);
            }
            child.wait_with_output().await
        };

        let output = match tokio::time::timeout(self.timeout, exchange).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(execution_error(e.to_string())),
            Err(_) => {
                return Err(ToolkitError::Timeout {
                    name: tool.name.clone(),
                    timeout_secs: self.timeout.as_secs(),
                })
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stderr: String = stderr.trim().chars().take(STDERR_LIMIT).collect();
            return Err(execution_error(format!("exited with {}: {stderr}", output.status)));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stdout = stdout.trim();
        Ok(serde_json::from_str(stdout).unwrap_or_else(|_| Value::String(stdout.to_string())))
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn executor(dir: &TempDir, tools: &[(&str, &str)]) -> InternalToolExecutor {
        for (name, config) in tools {
            let tool_dir = dir.path().join(name);
            std::fs::create_dir_all(&tool_dir).unwrap();
            std::fs::write(tool_dir.join("config.yaml"), config).unwrap();
        }
        InternalToolExecutor::load(dir.path())
    }

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_call_tool_parses_json_stdout() {
        let dir = TempDir::new().unwrap();
        let exec = executor(
            &dir,
            &[(
                "echo",
                "name: echo\ninputs:\n  - name: query\n    required: true\ncommand: [sh, -c, \"cat\"]\n",
            )],
        );
        let result = exec.call_tool("echo", &args(json!({"query": "8.8.8.8"}))).await.unwrap();
        assert_eq!(result, json!({"query": "8.8.8.8"}));
    }

    #[tokio::test]
    async fn test_call_tool_plain_text_stdout() {
        let dir = TempDir::new().unwrap();
        let exec = executor(&dir, &[("hello", "name: hello\ncommand: [sh, -c, \"echo hi there\"]\n")]);
        let result = exec.call_tool("hello", &Map::new()).await.unwrap();
        assert_eq!(result, json!("hi there"));
    }

    #[tokio::test]
    async fn test_call_tool_runs_in_tool_dir() {
        let dir = TempDir::new().unwrap();
        let exec = executor(&dir, &[("where", "name: where\ncommand: [sh, -c, \"cat marker\"]\n")]);
        std::fs::write(dir.path().join("where/marker"), "\"found\"").unwrap();
        assert_eq!(exec.call_tool("where", &Map::new()).await.unwrap(), json!("found"));
    }

    #[tokio::test]
    async fn test_missing_parameters_and_unknown_tool() {
        let dir = TempDir::new().unwrap();
        let exec = executor(
            &dir,
            &[(
                "vt",
                "name: vt\ninputs:\n  - name: query\n    required: true\n  - name: kind\n    required: true\n  - name: limit\ncommand: [cat]\n",
            )],
        );
        let err = exec.call_tool("vt", &args(json!({"kind": "ip"}))).await.unwrap_err();
        assert_eq!(err.to_string(), "Missing required parameters: query");

        let err = exec.call_tool("nope", &Map::new()).await.unwrap_err();
        assert!(matches!(err, ToolkitError::UnknownTool { .. }));
    }

    #[tokio::test]
    async fn test_failures() {
        let dir = TempDir::new().unwrap();
        let exec = executor(
            &dir,
            &[
                ("fail", "name: fail\ncommand: [sh, -c, \"echo boom >&2; exit 3\"]\n"),
                ("slow", "name: slow\ncommand: [sh, -c, \"sleep 5\"]\n"),
                ("nocmd", "name: nocmd\n"),
            ],
        )
        .with_timeout(Duration::from_millis(200));

        let err = exec.call_tool("fail", &Map::new()).await.unwrap_err();
        assert!(err.to_string().contains("boom"));

        let err = exec.call_tool("slow", &Map::new()).await.unwrap_err();
        assert!(matches!(err, ToolkitError::Timeout { .. }));

        let err = exec.call_tool("nocmd", &Map::new()).await.unwrap_err();
        assert!(err.to_string().contains("no command"));
    }
}
