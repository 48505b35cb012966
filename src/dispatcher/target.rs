//! The entity a protocol request addresses.

use crate::registry::{BackendDescriptor, Registry};
use crate::virtual_server::{StoreError, VirtualServer, VirtualServerStore};

/// Either a virtual server composition or a raw registry backend. Resolved
/// once per request; handlers match on it.
#[derive(Debug, Clone)]
pub enum Target {
    Virtual(VirtualServer),
    Backend(BackendDescriptor),
}

impl Target {
    pub fn name(&self) -> &str {
        match self {
            Self::Virtual(server) => &server.name,
            Self::Backend(backend) => &backend.name,
        }
    }

    /// Resolve `name`, preferring a virtual server over a backend of the
    /// same name.
    pub async fn resolve(
        name: &str,
        store: &VirtualServerStore,
        registry: &Registry,
    ) -> Result<Option<Self>, StoreError> {
        if let Some(server) = store.get(name)? {
            return Ok(Some(Self::Virtual(server)));
        }
        Ok(registry.find(name).await.map(Self::Backend))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::virtual_server::ToolReference;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_virtual_server_wins_over_backend() {
        let ws = TempDir::new().unwrap();
        std::fs::create_dir_all(ws.path().join("registry")).unwrap();
        std::fs::write(
            ws.path().join("registry/a.yaml"),
            "type: remote\nname: shared\nurl: http://x\n",
        )
        .unwrap();
        std::fs::write(
            ws.path().join("registry/b.yaml"),
            "type: remote\nname: intel\nurl: http://y\n",
        )
        .unwrap();

        let registry = Registry::new(ws.path(), "registry");
        let store = VirtualServerStore::new(ws.path().join("servers-configs"));
        store
            .create(VirtualServer::new("shared", "", vec![ToolReference::new("intel", "q")]))
            .await
            .unwrap();

        let target = Target::resolve("shared", &store, &registry).await.unwrap().unwrap();
        assert!(matches!(target, Target::Virtual(_)));

        let target = Target::resolve("intel", &store, &registry).await.unwrap().unwrap();
        assert!(matches!(target, Target::Backend(_)));
        assert_eq!(target.name(), "intel");

        assert!(Target::resolve("ghost", &store, &registry).await.unwrap().is_none());
    }
}
