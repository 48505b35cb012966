//! Tool manifests.
//!
//! Each tool lives in its own directory under the tools directory:
//!
//! - `config.yaml`: name, description, inputs, command, prompts,
//!   resource templates
//! - `resource_config.yaml` (optional): top-level keys merged over
//!   `config.yaml`, typically `handlers`
//!
//! Without an explicit `command`, a `tool.py` next to the manifest runs as
//! `python3 tool.py`.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::errors::ToolkitError;
use super::resources::HandlerConfig;
use crate::registry::capabilities::{PromptTemplate, ResourceTemplate};

/// Script run when a manifest declares no command.
const DEFAULT_SCRIPT: &str = "tool.py";

/// Interpreter for `DEFAULT_SCRIPT`.
const DEFAULT_INTERPRETER: &str = "python3";

/// One declared tool input.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ToolInput {
    pub name: String,
    #[serde(rename = "type", default = "default_input_type")]
    pub kind: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub required: bool,
}

fn default_input_type() -> String {
    "string".into()
}

/// A tool's merged manifest.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolManifest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub inputs: Vec<ToolInput>,
    #[serde(default)]
    pub command: Vec<String>,
    #[serde(default)]
    pub prompts: Vec<PromptTemplate>,
    #[serde(default)]
    pub resource_templates: Vec<ResourceTemplate>,
    #[serde(default)]
    pub handlers: Vec<HandlerConfig>,
    /// The tool's directory; commands run here.
    #[serde(skip)]
    pub dir: PathBuf,
}

impl ToolManifest {
    /// JSON Schema for `tools/list`, built from `inputs`.
    pub fn input_schema(&self) -> serde_json::Value {
        let mut properties = serde_json::Map::new();
        let mut required = Vec::new();
        for input in &self.inputs {
            let mut schema = serde_json::Map::new();
            schema.insert("type".into(), input.kind.clone().into());
            if let Some(description) = &input.description {
                schema.insert("description".into(), description.clone().into());
            }
            properties.insert(input.name.clone(), serde_json::Value::Object(schema));
            if input.required {
                required.push(input.name.clone());
            }
        }
        serde_json::json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    /// Required inputs absent from `arguments`, in declaration order.
    pub fn missing_inputs(&self, arguments: &serde_json::Map<String, serde_json::Value>) -> Vec<String> {
        self.inputs
            .iter()
            .filter(|input| input.required && !arguments.contains_key(&input.name))
            .map(|input| input.name.clone())
            .collect()
    }

    /// The argv to run, falling back to `python3 tool.py`.
    pub fn resolved_command(&self) -> Option<Vec<String>> {
        if !self.command.is_empty() {
            return Some(self.command.clone());
        }
        self.dir
            .join(DEFAULT_SCRIPT)
            .is_file()
            .then(|| vec![DEFAULT_INTERPRETER.to_string(), DEFAULT_SCRIPT.to_string()])
    }
}

// ─── Loading ─────────────────────────────────────────────────────────────────

/// Load every tool manifest under `tools_dir`, in directory-name order.
/// Directories without `config.yaml` are ignored; broken manifests are
/// logged and skipped.
pub fn load_manifests(tools_dir: &Path) -> Vec<ToolManifest> {
    let entries = match std::fs::read_dir(tools_dir) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!(path = %tools_dir.display(), error = %e, "tools directory not readable");
            return Vec::new();
        }
    };

    let mut dirs: Vec<PathBuf> = entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.join("config.yaml").is_file())
        .collect();
    dirs.sort();

    dirs.iter()
        .filter_map(|dir| match load_manifest(dir) {
            Ok(manifest) => Some(manifest),
            Err(e) => {
                tracing::error!(error = %e, "skipping tool");
                None
            }
        })
        .collect()
}

/// Load one tool directory, merging `resource_config.yaml` over `config.yaml`.
pub fn load_manifest(dir: &Path) -> Result<ToolManifest, ToolkitError> {
    let mut merged = read_mapping(&dir.join("config.yaml"))?;
    let resource_config = dir.join("resource_config.yaml");
    if resource_config.is_file() {
        for (key, value) in read_mapping(&resource_config)? {
            merged.insert(key, value);
        }
    }

    let mut manifest: ToolManifest =
        serde_yaml::from_value(serde_yaml::Value::Mapping(merged)).map_err(|e| {
            ToolkitError::Manifest {
                path: dir.display().to_string(),
                reason: e.to_string(),
            }
        })?;
    manifest.dir = dir.to_path_buf();
    Ok(manifest)
}

fn read_mapping(path: &Path) -> Result<serde_yaml::Mapping, ToolkitError> {
    let manifest_error = |reason: String| ToolkitError::Manifest {
        path: path.display().to_string(),
        reason,
    };
    let text = std::fs::read_to_string(path).map_err(|e| manifest_error(e.to_string()))?;
    match serde_yaml::from_str::<serde_yaml::Value>(&text).map_err(|e| manifest_error(e.to_string()))? {
        serde_yaml::Value::Mapping(map) => Ok(map),
        serde_yaml::Value::Null => Ok(serde_yaml::Mapping::new()),
        _ => Err(manifest_error("top level must be a mapping".into())),
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn tool_dir(root: &Path, name: &str, config: &str) -> PathBuf {
        let dir = root.join(name);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("config.yaml"), config).unwrap();
        dir
    }

    #[test]
    fn test_input_schema_and_missing_inputs() {
        let dir = TempDir::new().unwrap();
        let path = tool_dir(
            dir.path(),
            "virustotal",
            "name: virustotal\ndescription: VT lookup\ninputs:\n  - name: query\n    description: IOC\n    required: true\n  - name: limit\n    type: integer\n",
        );
        let manifest = load_manifest(&path).unwrap();
        let schema = manifest.input_schema();
        assert_eq!(schema["properties"]["query"]["type"], "string");
        assert_eq!(schema["properties"]["query"]["description"], "IOC");
        assert_eq!(schema["properties"]["limit"]["type"], "integer");
        assert!(schema["properties"]["limit"].get("description").is_none());
        assert_eq!(schema["required"], serde_json::json!(["query"]));

        let args = serde_json::Map::new();
        assert_eq!(manifest.missing_inputs(&args), vec!["query".to_string()]);
    }

    #[test]
    fn test_resource_config_merged_over_config() {
        let dir = TempDir::new().unwrap();
        let path = tool_dir(dir.path(), "howto", "name: howto\ndescription: old\n");
        std::fs::write(
            path.join("resource_config.yaml"),
            "description: new\nhandlers:\n  - uri_prefix: \"howto://\"\n    uri_pattern: \"howto://{cve}\"\n    type: single_tool\n    tool_name: howto\n    response_template: \"{tool_result}\"\n",
        )
        .unwrap();

        let manifest = load_manifest(&path).unwrap();
        assert_eq!(manifest.description, "new");
        assert_eq!(manifest.handlers.len(), 1);
        assert_eq!(manifest.handlers[0].uri_prefix, "howto://");
        assert_eq!(manifest.dir, path);
    }

    #[test]
    fn test_load_manifests_skips_broken() {
        let dir = TempDir::new().unwrap();
        tool_dir(dir.path(), "b", "name: b\n");
        tool_dir(dir.path(), "a", "name: a\n");
        tool_dir(dir.path(), "broken", "- not\n- a mapping\n");
        std::fs::create_dir_all(dir.path().join("no-config")).unwrap();

        let names: Vec<String> = load_manifests(dir.path()).into_iter().map(|m| m.name).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert!(load_manifests(&dir.path().join("missing")).is_empty());
    }

    #[test]
    fn test_resolved_command() {
        let dir = TempDir::new().unwrap();
        let path = tool_dir(dir.path(), "a", "name: a\n");
        let manifest = load_manifest(&path).unwrap();
        assert!(manifest.resolved_command().is_none());

        std::fs::write(path.join("tool.py"), "").unwrap();
        assert_eq!(
            manifest.resolved_command(),
            Some(vec!["python3".to_string(), "tool.py".to_string()])
        );

        let path = tool_dir(dir.path(), "b", "name: b\ncommand: [sh, run.sh]\n");
        let manifest = load_manifest(&path).unwrap();
        assert_eq!(manifest.resolved_command().unwrap()[0], "sh");
    }
}
