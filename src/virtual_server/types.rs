//! Virtual server data model.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::proxy::types::{default_input_schema, ToolSchema};
use crate::storage::Keyed;

// ─── ToolReference ───────────────────────────────────────────────────────────

/// Points at one tool on one backend, with the schema cached at selection time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolReference {
    #[serde(rename = "server_name", alias = "backend_name")]
    pub backend_name: String,
    pub tool_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<ToolSchema>,
}

impl ToolReference {
    pub fn new(backend_name: &str, tool_name: &str) -> Self {
        Self {
            backend_name: backend_name.to_string(),
            tool_name: tool_name.to_string(),
            config: None,
        }
    }

    /// The `tools/list` entry built from the cached schema.
    pub fn listing(&self) -> serde_json::Value {
        let description = self
            .config
            .as_ref()
            .and_then(|c| c.description.clone())
            .unwrap_or_default();
        let input_schema = self
            .config
            .as_ref()
            .map(|c| c.input_schema.clone())
            .unwrap_or_else(default_input_schema);
        serde_json::json!({
            "name": self.tool_name,
            "description": description,
            "inputSchema": input_schema,
        })
    }
}

// ─── VirtualServer ───────────────────────────────────────────────────────────

/// Lifecycle status reported for a virtual server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerStatus {
    Running,
    #[default]
    Stopped,
    Error,
}

/// A named, optionally key-protected composition of backend tools and prompts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VirtualServer {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub selected_tools: Vec<ToolReference>,
    /// Custom prompt ids exposed as synthetic tools.
    #[serde(default)]
    pub selected_prompts: Vec<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// When set, every protocol call must present it as a Bearer token.
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub status: ServerStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_enabled() -> bool {
    true
}

impl Keyed for VirtualServer {
    fn key(&self) -> &str {
        &self.name
    }
}

impl VirtualServer {
    pub fn new(name: &str, description: &str, selected_tools: Vec<ToolReference>) -> Self {
        let now = Utc::now();
        Self {
            name: name.to_string(),
            description: description.to_string(),
            selected_tools,
            selected_prompts: Vec::new(),
            enabled: true,
            api_key: None,
            status: ServerStatus::Stopped,
            created_at: now,
            updated_at: now,
        }
    }

    /// Distinct backend names referenced by the tool selection, in order.
    pub fn backend_names(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.selected_tools
            .iter()
            .map(|t| t.backend_name.as_str())
            .filter(|name| seen.insert(*name))
            .collect()
    }

    pub fn find_tool(&self, tool_name: &str) -> Option<&ToolReference> {
        self.selected_tools.iter().find(|t| t.tool_name == tool_name)
    }

    pub fn has_prompt(&self, prompt_id: &str) -> bool {
        self.selected_prompts.iter().any(|p| p == prompt_id)
    }

    /// Management view: the key itself is replaced by whether one is set.
    pub fn redacted(&self) -> serde_json::Value {
        let mut value = serde_json::to_value(self).unwrap_or_default();
        if let Some(obj) = value.as_object_mut() {
            obj.remove("api_key");
            obj.insert("has_api_key".into(), self.api_key.is_some().into());
            obj.insert("tools_count".into(), self.selected_tools.len().into());
        }
        value
    }
}

// ─── Updates ─────────────────────────────────────────────────────────────────

/// The fields a caller may change after creation. Anything else in an update
/// payload is ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VirtualServerUpdate {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub selected_tools: Option<Vec<ToolReference>>,
    #[serde(default)]
    pub selected_prompts: Option<Vec<String>>,
    /// `Some(None)` clears the key; absent leaves it unchanged.
    #[serde(default, deserialize_with = "present_or_null")]
    pub api_key: Option<Option<String>>,
}

fn present_or_null<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

impl VirtualServerUpdate {
    /// Apply the allow-listed fields and bump `updated_at`.
    pub fn apply_to(self, server: &mut VirtualServer) {
        if let Some(description) = self.description {
            server.description = description;
        }
        if let Some(enabled) = self.enabled {
            server.enabled = enabled;
        }
        if let Some(tools) = self.selected_tools {
            server.selected_tools = tools;
        }
        if let Some(prompts) = self.selected_prompts {
            server.selected_prompts = prompts;
        }
        if let Some(api_key) = self.api_key {
            server.api_key = api_key.filter(|k| !k.is_empty());
        }
        server.updated_at = Utc::now();
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
