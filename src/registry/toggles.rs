//! Per-tool enable flags.
//!
//! Ephemeral: the flags live only in process memory and are lost on restart.
//! They annotate backend tool listings in the management API and are not
//! consulted when routing calls.

use std::collections::HashMap;

use tokio::sync::RwLock;

use crate::proxy::types::ToolSchema;

/// In-memory `(backend, tool) -> enabled` map. Unknown tools are enabled.
#[derive(Debug, Default)]
pub struct ToolToggles {
    flags: RwLock<HashMap<(String, String), bool>>,
}

impl ToolToggles {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn is_enabled(&self, backend: &str, tool: &str) -> bool {
        self.flags
            .read()
            .await
            .get(&(backend.to_string(), tool.to_string()))
            .copied()
            .unwrap_or(true)
    }

    /// Flip the flag and return the new value.
    pub async fn toggle(&self, backend: &str, tool: &str) -> bool {
        let mut flags = self.flags.write().await;
        let flag = flags
            .entry((backend.to_string(), tool.to_string()))
            .or_insert(true);
        *flag = !*flag;
        tracing::info!(backend, tool, enabled = *flag, "tool toggled");
        *flag
    }

    /// Tool listing with an `enabled` member added to each entry.
    pub async fn annotate(&self, backend: &str, tools: Vec<ToolSchema>) -> Vec<serde_json::Value> {
        let flags = self.flags.read().await;
        tools
            .into_iter()
            .filter_map(|tool| {
                let enabled = flags
                    .get(&(backend.to_string(), tool.name.clone()))
                    .copied()
                    .unwrap_or(true);
                let mut value = serde_json::to_value(&tool).ok()?;
                if let Some(obj) = value.as_object_mut() {
                    obj.insert("enabled".into(), serde_json::Value::Bool(enabled));
                }
                Some(value)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_toggle_flips_and_defaults_enabled() {
        let toggles = ToolToggles::new();
        assert!(toggles.is_enabled("vt", "query").await);
        assert!(!toggles.toggle("vt", "query").await);
        assert!(!toggles.is_enabled("vt", "query").await);
        assert!(toggles.is_enabled("other", "query").await);
        assert!(toggles.toggle("vt", "query").await);
    }

    #[tokio::test]
    async fn test_annotate_adds_enabled() {
        let toggles = ToolToggles::new();
        toggles.toggle("vt", "report").await;
        let listed = toggles
            .annotate(
                "vt",
                vec![ToolSchema::new("query", None), ToolSchema::new("report", None)],
            )
            .await;
        assert_eq!(listed[0]["enabled"], true);
        assert_eq!(listed[1]["enabled"], false);
        assert_eq!(listed[1]["name"], "report");
    }
}
