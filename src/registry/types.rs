//! Registry data model.
//!
//! `RegistryEntry` mirrors one declarative YAML file under the registry
//! directory; `BackendDescriptor` is the resolved, value-snapshot view that
//! the proxy layer consumes.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::proxy::types::ToolSchema;

// ─── Transport ───────────────────────────────────────────────────────────────

/// Wire mechanism used to reach a backend.
///
/// Unknown transport names are preserved in `Other` so the router can report
/// them instead of failing to parse the whole entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Transport {
    Stdio,
    Http,
    Sse,
    Other(String),
}

impl Transport {
    /// Canonical lowercase name of the transport.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Stdio => "stdio",
            Self::Http => "http",
            Self::Sse => "sse",
            Self::Other(name) => name,
        }
    }
}

impl From<String> for Transport {
    fn from(value: String) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "stdio" => Self::Stdio,
            "http" => Self::Http,
            "sse" => Self::Sse,
            _ => Self::Other(value),
        }
    }
}

impl From<&str> for Transport {
    fn from(value: &str) -> Self {
        Self::from(value.to_string())
    }
}

impl From<Transport> for String {
    fn from(value: Transport) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Status / Discovery Method ───────────────────────────────────────────────

/// Discovery-time status of a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendStatus {
    Discovered,
    Disabled,
    Error,
    PortCollisionError,
}

/// How a backend entered the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscoveryMethod {
    Registry,
    Github,
}

// ─── BackendDescriptor ───────────────────────────────────────────────────────

/// A resolved backend, rebuilt from the declarative source on every discovery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendDescriptor {
    pub name: String,
    /// Workspace-relative directory, or the URL of a remote backend.
    pub path: String,
    pub description: String,
    pub transport: Transport,
    /// Argument vector used to launch a stdio backend.
    pub command: Vec<String>,
    /// Always empty after discovery; listings go through the proxy router.
    #[serde(default)]
    pub tools: Vec<ToolSchema>,
    pub status: BackendStatus,
    pub discovery_method: DiscoveryMethod,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub health_check_url: Option<String>,
    pub last_discovered_at: DateTime<Utc>,
}

impl BackendDescriptor {
    /// Whether the backend takes part in routing and port allocation.
    pub fn is_enabled(&self) -> bool {
        self.status != BackendStatus::Disabled
    }
}

// ─── RegistryEntry ───────────────────────────────────────────────────────────

/// Kind of declarative registry entry (`type:` key).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    #[default]
    Local,
    Remote,
    Github,
}

/// One declarative registry file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegistryEntry {
    #[serde(default, rename = "type")]
    pub kind: EntryKind,
    #[serde(default)]
    pub name: Option<String>,
    /// Workspace-relative directory (`local`).
    #[serde(default)]
    pub path: Option<String>,
    /// Endpoint URL (`remote`).
    #[serde(default)]
    pub url: Option<String>,
    /// Clone URL (`github`).
    #[serde(default)]
    pub repo: Option<String>,
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default)]
    pub subdir: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub transport: Option<Transport>,
    /// Explicit launch command; overrides script detection.
    #[serde(default)]
    pub command: Option<Vec<String>>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub health_check_url: Option<String>,
}

fn default_enabled() -> bool {
    true
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_parsing() {
        assert_eq!(Transport::from("stdio"), Transport::Stdio);
        assert_eq!(Transport::from("HTTP"), Transport::Http);
        assert_eq!(Transport::from("sse"), Transport::Sse);
        assert_eq!(Transport::from("docker"), Transport::Other("docker".into()));
        assert_eq!(Transport::Other("docker".into()).as_str(), "docker");
    }

    #[test]
    fn test_transport_serde_roundtrip_as_string() {
        let t: Transport = serde_json::from_str("\"http\"").unwrap();
        assert_eq!(t, Transport::Http);
        assert_eq!(serde_json::to_string(&Transport::Stdio).unwrap(), "\"stdio\"");
    }

    #[test]
    fn test_registry_entry_defaults() {
        let yaml = "name: vt\npath: servers/vt\n";
        let entry: RegistryEntry = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(entry.kind, EntryKind::Local);
        assert!(entry.enabled);
        assert!(entry.transport.is_none());
        assert!(entry.port.is_none());
    }

    #[test]
    fn test_registry_entry_remote() {
        let yaml = r#"
            type: remote
            name: intel
            url: "http://intel.local:9000"
            port: 9000
            enabled: false
        "#;
        let entry: RegistryEntry = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(entry.kind, EntryKind::Remote);
        assert_eq!(entry.port, Some(9000));
        assert!(!entry.enabled);
    }

    #[test]
    fn test_status_serialization() {
        assert_eq!(
            serde_json::to_string(&BackendStatus::PortCollisionError).unwrap(),
            "\"port_collision_error\""
        );
        assert_eq!(
            serde_json::to_string(&DiscoveryMethod::Github).unwrap(),
            "\"github\""
        );
    }
}
