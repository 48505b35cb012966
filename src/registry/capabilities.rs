//! Backend capability manifests.
//!
//! Prompts, resources and resource templates are not fetched over the wire.
//! They are declared next to the backend's tools:
//!
//! - `<backend>/tools/*/config.yaml`: `prompts` and `resource_templates`
//! - `<backend>/resources/static/*.yaml`: one static resource per file
//!
//! Remote backends have no local directory and therefore no manifests.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::types::BackendDescriptor;

// ─── Manifest Types ──────────────────────────────────────────────────────────

/// Capability kinds that can be listed from manifests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapabilityKind {
    Prompts,
    Resources,
    ResourceTemplates,
}

/// A declared prompt argument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptArgument {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
}

/// A prompt declared by a backend tool, rendered with `{arg}` placeholders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptTemplate {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub arguments: Vec<PromptArgument>,
    #[serde(default)]
    pub template: String,
}

impl PromptTemplate {
    /// The `prompts/list` entry for this prompt.
    pub fn listing(&self) -> serde_json::Value {
        serde_json::json!({
            "name": self.name,
            "description": self.description,
            "arguments": self.arguments.iter().map(|arg| serde_json::json!({
                "name": arg.name,
                "description": arg.description,
                "required": arg.required,
            })).collect::<Vec<_>>(),
        })
    }

    /// Substitute `{arg}` with the caller's values, then fill placeholders of
    /// omitted arguments with their declared defaults.
    pub fn render(&self, arguments: &serde_json::Map<String, serde_json::Value>) -> String {
        let mut text = self.template.clone();
        for (name, value) in arguments {
            text = text.replace(&format!("{{{name}}}"), &value_text(value));
        }
        for arg in &self.arguments {
            if arguments.contains_key(&arg.name) {
                continue;
            }
            if let Some(default) = arg.default.as_ref().filter(|d| !is_blank(d)) {
                text = text.replace(&format!("{{{}}}", arg.name), &value_text(default));
            }
        }
        text
    }
}

/// A resource template declared by a backend tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceTemplate {
    #[serde(rename = "uriTemplate", alias = "uri_template")]
    pub uri_template: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, rename = "mimeType", alias = "mime_type")]
    pub mime_type: Option<String>,
}

/// A static resource declared under `resources/static/`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaticResource {
    pub uri: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, rename = "mimeType", alias = "mime_type")]
    pub mime_type: Option<String>,
}

/// The capability keys of a tool's `config.yaml`; everything else is ignored.
#[derive(Debug, Default, Deserialize)]
struct ToolCapabilities {
    #[serde(default)]
    prompts: Vec<PromptTemplate>,
    #[serde(default)]
    resource_templates: Vec<ResourceTemplate>,
}

/// Text form of an argument value: strings verbatim, anything else as JSON.
pub fn value_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn is_blank(value: &serde_json::Value) -> bool {
    matches!(value, serde_json::Value::Null) || value.as_str().is_some_and(str::is_empty)
}

// ─── CapabilityReader ────────────────────────────────────────────────────────

/// Reads capability manifests from backend directories in the workspace.
#[derive(Debug, Clone)]
pub struct CapabilityReader {
    workspace_root: PathBuf,
}

impl CapabilityReader {
    pub fn new(workspace_root: impl Into<PathBuf>) -> Self {
        Self {
            workspace_root: workspace_root.into(),
        }
    }

    /// Listing entries of one kind, as JSON objects.
    pub fn list(&self, backend: &BackendDescriptor, kind: CapabilityKind) -> Vec<serde_json::Value> {
        match kind {
            CapabilityKind::Prompts => self.prompts(backend).iter().map(PromptTemplate::listing).collect(),
            CapabilityKind::Resources => to_values(&self.resources(backend)),
            CapabilityKind::ResourceTemplates => to_values(&self.resource_templates(backend)),
        }
    }

    pub fn prompts(&self, backend: &BackendDescriptor) -> Vec<PromptTemplate> {
        self.tool_capabilities(backend)
            .into_iter()
            .flat_map(|caps| caps.prompts)
            .collect()
    }

    pub fn find_prompt(&self, backend: &BackendDescriptor, name: &str) -> Option<PromptTemplate> {
        self.prompts(backend).into_iter().find(|p| p.name == name)
    }

    pub fn resource_templates(&self, backend: &BackendDescriptor) -> Vec<ResourceTemplate> {
        self.tool_capabilities(backend)
            .into_iter()
            .flat_map(|caps| caps.resource_templates)
            .collect()
    }

    pub fn resources(&self, backend: &BackendDescriptor) -> Vec<StaticResource> {
        let Some(dir) = self.backend_dir(backend) else {
            return Vec::new();
        };
        yaml_files(&dir.join("resources").join("static"))
            .into_iter()
            .filter_map(|path| read_manifest::<StaticResource>(&backend.name, &path))
            .collect()
    }

    fn backend_dir(&self, backend: &BackendDescriptor) -> Option<PathBuf> {
        if backend.path.contains("://") {
            return None;
        }
        let dir = self.workspace_root.join(&backend.path);
        dir.is_dir().then_some(dir)
    }

    fn tool_capabilities(&self, backend: &BackendDescriptor) -> Vec<ToolCapabilities> {
        let Some(dir) = self.backend_dir(backend) else {
            return Vec::new();
        };
        let tools_dir = dir.join("tools");
        let Ok(entries) = std::fs::read_dir(&tools_dir) else {
            return Vec::new();
        };

        let mut configs: Vec<PathBuf> = entries
            .flatten()
            .map(|e| e.path().join("config.yaml"))
            .filter(|p| p.is_file())
            .collect();
        configs.sort();

        configs
            .iter()
            .filter_map(|path| read_manifest::<ToolCapabilities>(&backend.name, path))
            .collect()
    }
}

fn yaml_files(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut files: Vec<PathBuf> = entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "yaml"))
        .collect();
    files.sort();
    files
}

fn read_manifest<T: serde::de::DeserializeOwned>(backend: &str, path: &Path) -> Option<T> {
    let parsed = std::fs::read_to_string(path)
        .map_err(|e| e.to_string())
        .and_then(|text| serde_yaml::from_str(&text).map_err(|e| e.to_string()));
    match parsed {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(backend, path = %path.display(), error = %e, "skipping unreadable manifest");
            None
        }
    }
}

fn to_values<T: Serialize>(items: &[T]) -> Vec<serde_json::Value> {
    items
        .iter()
        .filter_map(|item| serde_json::to_value(item).ok())
        .collect()
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::types::{BackendStatus, DiscoveryMethod, Transport};
    use tempfile::TempDir;

    fn backend(path: &str) -> BackendDescriptor {
        BackendDescriptor {
            name: "intel".into(),
            path: path.into(),
            description: String::new(),
            transport: Transport::Stdio,
            command: vec!["python3".into()],
            tools: Vec::new(),
            status: BackendStatus::Discovered,
            discovery_method: DiscoveryMethod::Registry,
            port: None,
            health_check_url: None,
            last_discovered_at: chrono::Utc::now(),
        }
    }

    fn write(root: &Path, rel: &str, text: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, text).unwrap();
    }

    fn fixture() -> TempDir {
        let ws = TempDir::new().unwrap();
        write(
            ws.path(),
            "servers/intel/tools/virustotal/config.yaml",
            r#"
name: virustotal
description: VirusTotal lookup
prompts:
  - name: triage
    description: Triage an indicator
    arguments:
      - name: indicator
        description: IOC to check
        required: true
      - name: depth
        description: How deep
        default: shallow
    template: "Check {indicator} ({depth})"
resource_templates:
  - uriTemplate: "vt://report/{hash}"
    name: report
    description: VT report
    mimeType: text/markdown
"#,
        );
        write(ws.path(), "servers/intel/tools/broken/config.yaml", "prompts: [oops");
        write(
            ws.path(),
            "servers/intel/resources/static/readme.yaml",
            "uri: intel://readme\nname: readme\ndescription: About\nmimeType: text/plain\n",
        );
        ws
    }

    #[test]
    fn test_lists_each_kind() {
        let ws = fixture();
        let reader = CapabilityReader::new(ws.path());
        let b = backend("servers/intel");

        let prompts = reader.list(&b, CapabilityKind::Prompts);
        assert_eq!(prompts.len(), 1);
        assert_eq!(prompts[0]["name"], "triage");
        assert_eq!(prompts[0]["arguments"][0]["required"], true);
        assert!(prompts[0].get("template").is_none());

        let templates = reader.list(&b, CapabilityKind::ResourceTemplates);
        assert_eq!(templates[0]["uriTemplate"], "vt://report/{hash}");
        assert_eq!(templates[0]["mimeType"], "text/markdown");

        let resources = reader.list(&b, CapabilityKind::Resources);
        assert_eq!(resources[0]["uri"], "intel://readme");
    }

    #[test]
    fn test_remote_or_missing_backend_has_no_capabilities() {
        let ws = fixture();
        let reader = CapabilityReader::new(ws.path());
        assert!(reader.list(&backend("http://intel.local"), CapabilityKind::Prompts).is_empty());
        assert!(reader.list(&backend("servers/none"), CapabilityKind::Resources).is_empty());
    }

    #[test]
    fn test_backend_prompt_render_uses_defaults_for_omitted_args() {
        let ws = fixture();
        let reader = CapabilityReader::new(ws.path());
        let prompt = reader.find_prompt(&backend("servers/intel"), "triage").unwrap();

        let mut args = serde_json::Map::new();
        args.insert("indicator".into(), serde_json::json!("8.8.8.8"));
        assert_eq!(prompt.render(&args), "Check 8.8.8.8 (shallow)");

        args.insert("depth".into(), serde_json::json!(3));
        assert_eq!(prompt.render(&args), "Check 8.8.8.8 (3)");
    }

    #[test]
    fn test_value_text() {
        assert_eq!(value_text(&serde_json::json!("x")), "x");
        assert_eq!(value_text(&serde_json::json!(true)), "true");
        assert_eq!(value_text(&serde_json::json!([1])), "[1]");
    }
}
