//! Configuration-driven resource responders.
//!
//! A tool's `handlers` describe how to answer `resources/read` for URIs that
//! start with `uri_prefix`:
//!
//! - parameters are pulled from the URI segment-wise, where the matching
//!   `uri_pattern` segment is `{name}`, and percent-decoded
//! - `single_tool` runs one tool and exposes `tool_result` plus `metadata`
//! - `multi_tool` runs each listed tool and joins formatted sections
//! - `response_template` is filled with `{key}` substitution
//!
//! Every template also gets `timestamp` (UTC, RFC 3339).

use std::collections::BTreeMap;

use chrono::Utc;
use percent_encoding::percent_decode_str;
use serde::Deserialize;
use serde_json::{Map, Value};

use super::errors::ToolkitError;
use super::executor::InternalToolExecutor;
use super::manifest::ToolManifest;
use crate::registry::capabilities::value_text;

/// Tool input name → URI parameter name.
pub type ParameterMapping = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandlerKind {
    SingleTool,
    MultiTool,
}

/// How one tool's result is rendered inside a `multi_tool` response.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SectionTool {
    pub name: String,
    #[serde(default)]
    pub parameter_mapping: ParameterMapping,
    /// `json_code_block`, `text`, or anything else for plain text.
    #[serde(default)]
    pub format: Option<String>,
    /// Defaults to `## <Title Case Name>`.
    #[serde(default)]
    pub section_header: Option<String>,
}

/// One `handlers` entry of a tool manifest.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HandlerConfig {
    pub uri_prefix: String,
    pub uri_pattern: String,
    #[serde(rename = "type")]
    pub kind: HandlerKind,
    #[serde(default)]
    pub tool_name: Option<String>,
    #[serde(default)]
    pub parameter_mapping: ParameterMapping,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(default)]
    pub tools: Vec<SectionTool>,
    #[serde(default)]
    pub response_template: String,
}

/// Template variables, substituted in insertion order.
type Variables = Vec<(String, Value)>;

/// Insert or replace `key`. A replaced key keeps its original position.
fn set_variable(variables: &mut Variables, key: &str, value: Value) {
    match variables.iter_mut().find(|(k, _)| k == key) {
        Some((_, slot)) => *slot = value,
        None => variables.push((key.to_string(), value)),
    }
}

// ─── Responders ──────────────────────────────────────────────────────────────

/// Every handler declared by a set of manifests, in manifest order.
#[derive(Debug, Clone, Default)]
pub struct ResourceResponders {
    handlers: Vec<HandlerConfig>,
}

impl ResourceResponders {
    pub fn from_manifests(manifests: &[ToolManifest]) -> Self {
        Self {
            handlers: manifests
                .iter()
                .flat_map(|m| m.handlers.iter().cloned())
                .collect(),
        }
    }

    /// The first handler whose prefix matches `uri`.
    pub fn find(&self, uri: &str) -> Option<&HandlerConfig> {
        self.handlers.iter().find(|h| uri.starts_with(&h.uri_prefix))
    }

    /// Answer a resource read with the rendered response template.
    pub async fn read(&self, uri: &str, executor: &InternalToolExecutor) -> Result<String, ToolkitError> {
        let handler = self.find(uri).ok_or_else(|| ToolkitError::NoHandler {
            uri: uri.to_string(),
        })?;

        let params = extract_parameters(uri, &handler.uri_pattern);
        let mut variables: Variables = vec![("timestamp".into(), Value::String(Utc::now().to_rfc3339()))];
        for (key, value) in &params {
            set_variable(&mut variables, key, Value::String(value.clone()));
        }

        match handler.kind {
            HandlerKind::SingleTool => {
                let tool_name = handler.tool_name.as_deref().unwrap_or_default();
                if executor.find(tool_name).is_none() {
                    return Err(ToolkitError::Handler {
                        reason: format!("Tool {tool_name} not available"),
                    });
                }
                let arguments = map_arguments(&handler.parameter_mapping, &params);
                let result = executor.call_tool(tool_name, &arguments).await?;
                set_variable(&mut variables, "tool_result", result);
                for (key, value) in &handler.metadata {
                    set_variable(&mut variables, key, value.clone());
                }
            }
            HandlerKind::MultiTool => {
                let mut sections = Vec::new();
                for section in &handler.tools {
                    if executor.find(&section.name).is_none() {
                        tracing::warn!(tool = %section.name, uri, "section tool not available, skipped");
                        continue;
                    }
                    let arguments = map_arguments(&section.parameter_mapping, &params);
                    let result = executor.call_tool(&section.name, &arguments).await?;
                    let header = section
                        .section_header
                        .clone()
                        .unwrap_or_else(|| format!("## {}", title_case(&section.name)));
                    sections.push(format!("{header}\n{}", format_section(section.format.as_deref(), &result)));
                }
                set_variable(&mut variables, "sections", Value::String(sections.join("\n\n")));
            }
        }

        Ok(format_template(&handler.response_template, &variables))
    }
}

// ─── Templating ──────────────────────────────────────────────────────────────

/// Pull `{name}` segments of `pattern` out of the matching `uri` segments.
pub fn extract_parameters(uri: &str, pattern: &str) -> Vec<(String, String)> {
    uri.split('/')
        .zip(pattern.split('/'))
        .filter_map(|(value, segment)| {
            let name = segment.strip_prefix('{')?.strip_suffix('}')?;
            Some((
                name.to_string(),
                percent_decode_str(value).decode_utf8_lossy().into_owned(),
            ))
        })
        .collect()
}

/// Replace `{key}` for every variable, in order. Objects and arrays render
/// as pretty JSON.
pub fn format_template(template: &str, variables: &[(String, Value)]) -> String {
    let mut result = template.to_string();
    for (key, value) in variables {
        let text = match value {
            Value::Object(_) | Value::Array(_) => {
                serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
            }
            other => value_text(other),
        };
        result = result.replace(&format!("{{{key}}}"), &text);
    }
    result
}

fn map_arguments(mapping: &ParameterMapping, params: &[(String, String)]) -> Map<String, Value> {
    mapping
        .iter()
        .filter_map(|(input, param)| {
            params
                .iter()
                .find(|(name, _)| name == param)
                .map(|(_, value)| (input.clone(), Value::String(value.clone())))
        })
        .collect()
}

fn format_section(format: Option<&str>, result: &Value) -> String {
    match format {
        Some("json_code_block") => {
            let pretty = serde_json::to_string_pretty(result).unwrap_or_else(|_| result.to_string());
            format!("```json\n{pretty}\n```")
        }
        Some("text") => match result.get("instructions") {
            Some(instructions) => value_text(instructions),
            None => value_text(result),
        },
        _ => value_text(result),
    }
}

/// `howto_cve` → `Howto_Cve`: upper-case every letter that follows a
/// non-letter.
fn title_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut boundary = true;
    for ch in name.chars() {
        if ch.is_alphabetic() {
            if boundary {
                out.extend(ch.to_uppercase());
            } else {
                out.extend(ch.to_lowercase());
            }
            boundary = false;
        } else {
            out.push(ch);
            boundary = true;
        }
    }
    out
}

// ─── Tests ───────────────────────────────────────────────────────────────────
