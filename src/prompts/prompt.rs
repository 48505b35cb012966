//! Custom prompt model and `{{variable}}` templating.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

use crate::registry::capabilities::value_text;
use crate::storage::Keyed;

/// Category assigned when none is given.
pub const DEFAULT_CATEGORY: &str = "default";

/// `{{name}}` placeholder; names are ASCII word characters.
#[allow(clippy::expect_used)]
static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{([a-zA-Z0-9_]+)\}\}").expect("hardcoded placeholder pattern should be valid")
});

/// A reusable text template that a virtual server can expose as a tool.
///
/// `id` is derived from the name once, at creation, and never changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomPrompt {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default)]
    pub prompt_template: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_category() -> String {
    DEFAULT_CATEGORY.to_string()
}

impl Keyed for CustomPrompt {
    fn key(&self) -> &str {
        &self.id
    }
}

impl CustomPrompt {
    /// Sorted, unique placeholder names found in the template.
    pub fn input_variables(&self) -> Vec<String> {
        PLACEHOLDER
            .captures_iter(&self.prompt_template)
            .map(|caps| caps[1].to_string())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Replace each `{{var}}` with its argument. Placeholders without an
    /// argument are left as they are.
    pub fn render(&self, arguments: &serde_json::Map<String, serde_json::Value>) -> String {
        PLACEHOLDER
            .replace_all(&self.prompt_template, |caps: &Captures| {
                arguments
                    .get(&caps[1])
                    .map(value_text)
                    .unwrap_or_else(|| caps[0].to_string())
            })
            .into_owned()
    }

    /// The synthetic tool entry used in a virtual server's `tools/list`.
    pub fn as_tool(&self) -> serde_json::Value {
        let variables = self.input_variables();
        let properties: serde_json::Map<String, serde_json::Value> = variables
            .iter()
            .map(|var| {
                (
                    var.clone(),
                    serde_json::json!({
                        "type": "string",
                        "description": format!("Input for the '{var}' variable in the prompt."),
                    }),
                )
            })
            .collect();

        serde_json::json!({
            "name": self.id,
            "description": format!("[PROMPT] {}", self.description),
            "inputSchema": {
                "type": "object",
                "properties": properties,
                "required": variables,
            },
        })
    }

    /// The `prompts/list` entry for this prompt.
    pub fn listing(&self) -> serde_json::Value {
        let variables = self.input_variables();
        serde_json::json!({
            "name": self.id,
            "description": self.description,
            "inputVariables": variables,
            "arguments": variables.iter().map(|var| serde_json::json!({
                "name": var,
                "description": format!("Input for the '{var}' variable in the prompt."),
                "required": true,
            })).collect::<Vec<_>>(),
        })
    }
}
