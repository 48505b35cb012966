//! Persistence for virtual servers.
//!
//! One YAML file per server under the configured directory. Creation is
//! rejected when the name is taken; updates are limited to the fields of
//! `VirtualServerUpdate`. Writers are serialized so that check-then-write
//! sequences cannot interleave.

use std::path::{Path, PathBuf};

use rand::RngCore;
use tokio::sync::Mutex;

use super::errors::StoreError;
use super::types::{VirtualServer, VirtualServerUpdate};
use crate::storage::{validate_key, YamlStore};

/// Directory for per-server prompt assets, created alongside every save.
const PROMPTS_SUBDIR: &str = "prompts";

/// Generate a 64-character hex API key from 32 random bytes.
pub fn generate_api_key() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

pub struct VirtualServerStore {
    store: YamlStore<VirtualServer>,
    write_lock: Mutex<()>,
}

impl VirtualServerStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            store: YamlStore::new(dir),
            write_lock: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        self.store.dir()
    }

    pub fn get(&self, name: &str) -> Result<Option<VirtualServer>, StoreError> {
        Ok(self.store.get(name)?)
    }

    pub fn list(&self) -> Result<Vec<VirtualServer>, StoreError> {
        Ok(self.store.list()?)
    }

    /// Persist a new server. Fails without touching the existing entry when
    /// the name is already taken.
    pub async fn create(&self, server: VirtualServer) -> Result<VirtualServer, StoreError> {
        validate(&server)?;
        let _write = self.write_lock.lock().await;
        if self.store.exists(&server.name)? {
            return Err(StoreError::AlreadyExists {
                name: server.name.clone(),
            });
        }
        self.save(&server)?;
        tracing::info!(server = %server.name, tools = server.selected_tools.len(), "virtual server created");
        Ok(server)
    }

    pub async fn update(
        &self,
        name: &str,
        update: VirtualServerUpdate,
    ) -> Result<VirtualServer, StoreError> {
        let _write = self.write_lock.lock().await;
        let mut server = self.require(name)?;
        update.apply_to(&mut server);
        validate(&server)?;
        self.save(&server)?;
        tracing::info!(server = name, "virtual server updated");
        Ok(server)
    }

    /// Replace the API key with a freshly generated one.
    pub async fn regenerate_key(&self, name: &str) -> Result<VirtualServer, StoreError> {
        let update = VirtualServerUpdate {
            api_key: Some(Some(generate_api_key())),
            ..Default::default()
        };
        self.update(name, update).await
    }

    pub async fn delete(&self, name: &str) -> Result<(), StoreError> {
        let _write = self.write_lock.lock().await;
        if self.store.delete(name)? {
            tracing::info!(server = name, "virtual server deleted");
            Ok(())
        } else {
            Err(StoreError::NotFound {
                name: name.to_string(),
            })
        }
    }

    fn require(&self, name: &str) -> Result<VirtualServer, StoreError> {
        self.store.get(name)?.ok_or_else(|| StoreError::NotFound {
            name: name.to_string(),
        })
    }

    fn save(&self, server: &VirtualServer) -> Result<(), StoreError> {
        self.store.save(server)?;
        let prompts_dir = self.store.dir().join(PROMPTS_SUBDIR);
        if let Err(e) = std::fs::create_dir_all(&prompts_dir) {
            tracing::warn!(path = %prompts_dir.display(), error = %e, "failed to create prompts directory");
        }
        Ok(())
    }
}

fn validate(server: &VirtualServer) -> Result<(), StoreError> {
    validate_key(&server.name).map_err(|e| StoreError::Invalid {
        reason: e.to_string(),
    })?;
    if let Some(bad) = server
        .selected_tools
        .iter()
        .find(|t| t.backend_name.trim().is_empty() || t.tool_name.trim().is_empty())
    {
        return Err(StoreError::Invalid {
            reason: format!(
                "tool reference ('{}', '{}') needs both a server name and a tool name",
                bad.backend_name, bad.tool_name
            ),
        });
    }
    Ok(())
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::virtual_server::types::ToolReference;
    use tempfile::TempDir;

    fn sec_tools() -> VirtualServer {
        VirtualServer::new(
            "sec-tools",
            "Security tools",
            vec![ToolReference::new("virustotal", "query")],
        )
    }

    #[test]
    fn test_generate_api_key_shape() {
        let key = generate_api_key();
        assert_eq!(key.len(), 64);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(key, generate_api_key());
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let dir = TempDir::new().unwrap();
        let store = VirtualServerStore::new(dir.path().join("servers-configs"));
        store.create(sec_tools()).await.unwrap();

        let loaded = store.get("sec-tools").unwrap().unwrap();
        assert_eq!(loaded.selected_tools[0].backend_name, "virustotal");
        assert!(dir.path().join("servers-configs/prompts").is_dir());
        assert_eq!(store.list().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_create_leaves_existing_untouched() {
        let dir = TempDir::new().unwrap();
        let store = VirtualServerStore::new(dir.path());
        store.create(sec_tools()).await.unwrap();
        let before = std::fs::read_to_string(dir.path().join("sec-tools.yaml")).unwrap();

        let mut dup = sec_tools();
        dup.description = "overwritten?".into();
        let err = store.create(dup).await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists { .. }));

        let after = std::fs::read_to_string(dir.path().join("sec-tools.yaml")).unwrap();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn test_update_and_regenerate_key() {
        let dir = TempDir::new().unwrap();
        let store = VirtualServerStore::new(dir.path());
        store.create(sec_tools()).await.unwrap();

        let updated = store
            .update(
                "sec-tools",
                VirtualServerUpdate {
                    description: Some("new".into()),
                    selected_prompts: Some(vec!["triage".into()]),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.description, "new");
        assert!(updated.has_prompt("triage"));

        let keyed = store.regenerate_key("sec-tools").await.unwrap();
        assert_eq!(keyed.api_key.as_ref().map(String::len), Some(64));
        assert_eq!(store.get("sec-tools").unwrap().unwrap().api_key, keyed.api_key);

        let missing = store.update("nope", VirtualServerUpdate::default()).await;
        assert!(matches!(missing, Err(StoreError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_delete() {
        let dir = TempDir::new().unwrap();
        let store = VirtualServerStore::new(dir.path());
        store.create(sec_tools()).await.unwrap();
        store.delete("sec-tools").await.unwrap();
        assert!(store.get("sec-tools").unwrap().is_none());
        assert!(matches!(
            store.delete("sec-tools").await,
            Err(StoreError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_invalid_servers_rejected() {
        let dir = TempDir::new().unwrap();
        let store = VirtualServerStore::new(dir.path());

        let mut bad_name = sec_tools();
        bad_name.name = "../escape".into();
        assert!(matches!(store.create(bad_name).await, Err(StoreError::Invalid { .. })));

        let mut bad_ref = sec_tools();
        bad_ref.selected_tools.push(ToolReference::new("", "query"));
        assert!(matches!(store.create(bad_ref).await, Err(StoreError::Invalid { .. })));
    }
}
