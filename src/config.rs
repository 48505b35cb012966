//! Composer configuration loading.
//!
//! Reads `composer.yaml` and resolves environment variables. Every field is
//! optional; a missing file means built-in defaults. Relative directories
//! resolve against `workspace_root`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::proxy::TransportTimeouts;

// ─── Constants ───────────────────────────────────────────────────────────────

/// Config file name searched for when no explicit path is given.
pub const CONFIG_FILE_NAME: &str = "composer.yaml";

/// Env var holding an explicit config path.
pub const CONFIG_ENV_VAR: &str = "MCP_COMPOSER_CONFIG";

// ─── Errors ──────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("failed to parse {path}: {reason}")]
    Parse { path: String, reason: String },
}

// ─── Public Types ────────────────────────────────────────────────────────────

/// Outbound call timeouts, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub stdio_secs: u64,
    pub http_list_secs: u64,
    pub http_call_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            stdio_secs: 30,
            http_list_secs: 10,
            http_call_secs: 30,
        }
    }
}

impl TimeoutConfig {
    pub fn transport_timeouts(&self) -> TransportTimeouts {
        TransportTimeouts {
            stdio: Duration::from_secs(self.stdio_secs),
            http_list: Duration::from_secs(self.http_list_secs),
            http_call: Duration::from_secs(self.http_call_secs),
        }
    }
}

/// Top-level configuration (mirrors `composer.yaml`).
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ComposerConfig {
    pub workspace_root: PathBuf,
    pub bind: String,
    pub registry_dir: PathBuf,
    pub virtual_servers_dir: PathBuf,
    pub prompts_dir: PathBuf,
    /// Bearer token guarding `/api/*`. Unset leaves the management API open.
    pub admin_token: Option<String>,
    /// Directory for `composer.log`, relative to `workspace_root`. Unset logs
    /// to stderr.
    pub log_dir: Option<PathBuf>,
    pub log_json: bool,
    pub timeouts: TimeoutConfig,
}

impl Default for ComposerConfig {
    fn default() -> Self {
        Self {
            workspace_root: PathBuf::from("."),
            bind: "127.0.0.1:5000".into(),
            registry_dir: PathBuf::from("registry"),
            virtual_servers_dir: PathBuf::from("servers-configs"),
            prompts_dir: PathBuf::from("custom-prompts"),
            admin_token: None,
            log_dir: None,
            log_json: false,
            timeouts: TimeoutConfig::default(),
        }
    }
}

impl ComposerConfig {
    pub fn registry_path(&self) -> PathBuf {
        self.workspace_root.join(&self.registry_dir)
    }

    pub fn virtual_servers_path(&self) -> PathBuf {
        self.workspace_root.join(&self.virtual_servers_dir)
    }

    pub fn prompts_path(&self) -> PathBuf {
        self.workspace_root.join(&self.prompts_dir)
    }

    pub fn log_path(&self) -> Option<PathBuf> {
        self.log_dir.as_ref().map(|dir| self.workspace_root.join(dir))
    }

    /// Make `workspace_root` absolute against `base` (the config file's
    /// directory, or the current directory without a file).
    fn anchor(mut self, base: &Path) -> Self {
        if self.workspace_root.is_relative() {
            self.workspace_root = base.join(&self.workspace_root);
        }
        self.admin_token = self.admin_token.filter(|t| !t.trim().is_empty());
        self
    }
}

// ─── Loading ─────────────────────────────────────────────────────────────────

/// Locate the config file.
///
/// Order: the explicit path, `MCP_COMPOSER_CONFIG`, then `composer.yaml`
/// walking upward from `start`. `None` means defaults apply.
pub fn find_config_path(explicit: Option<&Path>, start: &Path) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.is_empty() {
            return Some(PathBuf::from(expand_tilde(&path)));
        }
    }

    let mut dir = start.to_path_buf();
    loop {
        let candidate = dir.join(CONFIG_FILE_NAME);
        if candidate.is_file() {
            return Some(candidate);
        }
        if !dir.pop() {
            return None;
        }
    }
}

/// Load the configuration, falling back to defaults when no file is found.
pub fn load(explicit: Option<&Path>, cwd: &Path) -> Result<ComposerConfig, ConfigError> {
    match find_config_path(explicit, cwd) {
        Some(path) => load_file(&path),
        None => {
            tracing::debug!(cwd = %cwd.display(), "no config file found, using defaults");
            Ok(ComposerConfig::default().anchor(cwd))
        }
    }
}

/// Load and parse one config file.
///
/// Performs environment-variable interpolation on `${VAR_NAME}` and
/// `${VAR_NAME:-default}` before parsing.
pub fn load_file(path: &Path) -> Result<ComposerConfig, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;

    let interpolated = interpolate_env_vars(&raw);
    let config: ComposerConfig = if interpolated.trim().is_empty() {
        ComposerConfig::default()
    } else {
        serde_yaml::from_str(&interpolated).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?
    };

    let base = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    Ok(config.anchor(&base))
}

// ─── Env-var interpolation ───────────────────────────────────────────────────

/// Replace `${VAR}` and `${VAR:-default}` in a string.
fn interpolate_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && chars.peek() == Some(&'{') {
            chars.next();
            let mut var_expr = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_expr.push(c);
            }
            result.push_str(&resolve_var_expr(&var_expr));
        } else {
            result.push(ch);
        }
    }

    result
}

/// Resolve `VAR` or `VAR:-default`. Unset variables without a default are
/// empty.
fn resolve_var_expr(expr: &str) -> String {
    match expr.split_once(":-") {
        Some((name, default)) => std::env::var(name).unwrap_or_else(|_| expand_tilde(default)),
        None => std::env::var(expr).unwrap_or_default(),
    }
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &str) -> String {
    if let Some(rest) = path.strip_prefix('~') {
        if let Some(home) = dirs::home_dir() {
            return format!("{}{rest}", home.display());
        }
    }
    path.to_string()
}

// ─── Tests ───────────────────────────────────────────────────────────────────
