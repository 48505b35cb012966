//! Backend discovery from the declarative registry directory.
//!
//! Each `*.yaml` file under the registry directory declares one backend
//! (`local`, `remote` or `github`). A discovery pass:
//!
//! - reads every entry in sorted path order, skipping malformed ones
//! - resolves each into a fresh `BackendDescriptor`
//! - deduplicates by `(name, path)`
//! - repairs port collisions between enabled backends and persists the new
//!   port back into the entry file
//!
//! Passes are serialized: port repair is the one write discovery performs.
//! Git checkouts are synced before a pass under a separate lock, so a slow
//! clone never holds up lookups that only read existing checkouts.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;

use super::errors::RegistryError;
use super::repo::{repo_dir_name, GitCli, RepoSync};
use super::types::{
    BackendDescriptor, BackendStatus, DiscoveryMethod, EntryKind, RegistryEntry, Transport,
};
use crate::storage::write_atomic;

// ─── Constants ───────────────────────────────────────────────────────────────

/// Entry-point scripts probed in a local backend directory, in order.
const SCRIPT_CANDIDATES: &[&str] = &["server_stdio.py", "server.py", "server_http.py", "main.py"];

/// Interpreter used for detected entry-point scripts.
const DEFAULT_INTERPRETER: &str = "python3";

/// Where git-hosted backends are checked out, relative to the workspace.
const GITHUB_CHECKOUT_DIR: &str = "servers/github";

/// Default branch for git-hosted backends.
const DEFAULT_BRANCH: &str = "main";

/// What a pass may do to git checkouts before resolving entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SyncMode {
    /// Read existing checkouts only; never touches the network.
    Offline,
    /// Clone missing checkouts.
    EnsurePresent,
    /// Clone missing checkouts and pull existing ones.
    Update,
}

// ─── Registry ────────────────────────────────────────────────────────────────

/// Discovers backends from `<workspace>/<registry_dir>/*.yaml`.
pub struct Registry {
    workspace_root: PathBuf,
    registry_dir: PathBuf,
    repo_sync: Arc<dyn RepoSync>,
    pass_lock: Mutex<()>,
    sync_lock: Mutex<()>,
}

impl Registry {
    /// `registry_dir` may be absolute or relative to `workspace_root`.
    pub fn new(workspace_root: impl Into<PathBuf>, registry_dir: impl AsRef<Path>) -> Self {
        let workspace_root = workspace_root.into();
        let registry_dir = workspace_root.join(registry_dir);
        Self {
            workspace_root,
            registry_dir,
            repo_sync: Arc::new(GitCli),
            pass_lock: Mutex::new(()),
            sync_lock: Mutex::new(()),
        }
    }

    pub fn with_repo_sync(mut self, repo_sync: Arc<dyn RepoSync>) -> Self {
        self.repo_sync = repo_sync;
        self
    }

    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    /// Discover backends from existing checkouts. A git-hosted backend whose
    /// checkout is missing is kept with status `error`.
    pub async fn discover(&self) -> Vec<BackendDescriptor> {
        self.run_pass(SyncMode::Offline).await
    }

    /// Clone missing checkouts, then discover.
    pub async fn prepare(&self) -> Vec<BackendDescriptor> {
        self.run_pass(SyncMode::EnsurePresent).await
    }

    /// Clone missing checkouts and pull existing ones, then discover.
    pub async fn refresh(&self) -> Vec<BackendDescriptor> {
        self.run_pass(SyncMode::Update).await
    }

    /// Look up one backend in a fresh offline snapshot.
    pub async fn find(&self, name: &str) -> Option<BackendDescriptor> {
        self.discover().await.into_iter().find(|b| b.name == name)
    }

    async fn run_pass(&self, mode: SyncMode) -> Vec<BackendDescriptor> {
        let failed = match mode {
            SyncMode::Offline => HashSet::new(),
            SyncMode::EnsurePresent => self.sync_checkouts(false).await,
            SyncMode::Update => self.sync_checkouts(true).await,
        };

        let _pass = self.pass_lock.lock().await;

        let mut resolved = Vec::new();
        for (file, entry) in self.read_entries() {
            match self.resolve(&file, entry, &failed) {
                Ok(descriptor) => resolved.push((descriptor, file)),
                Err(e) => tracing::warn!(error = %e, "skipping registry entry"),
            }
        }

        let mut resolved = dedup(resolved);
        for (descriptor, file, new_port) in plan_port_repairs(&resolved) {
            let (slot, _) = &mut resolved[descriptor];
            match new_port {
                Ok(port) => {
                    let old = slot.port;
                    match persist_port(&file, port) {
                        Ok(()) => {
                            tracing::info!(backend = %slot.name, old_port = ?old, new_port = port, "reassigned colliding port");
                            slot.port = Some(port);
                        }
                        Err(e) => {
                            tracing::error!(backend = %slot.name, error = %e, "port repair not persisted");
                            slot.status = BackendStatus::PortCollisionError;
                        }
                    }
                }
                Err(e) => {
                    tracing::error!(backend = %slot.name, error = %e, "port collision unresolved");
                    slot.status = BackendStatus::PortCollisionError;
                }
            }
        }

        let descriptors: Vec<BackendDescriptor> = resolved.into_iter().map(|(d, _)| d).collect();
        tracing::debug!(count = descriptors.len(), "discovery pass complete");
        descriptors
    }

    /// Sync the checkout of every enabled git-hosted entry. Returns the names
    /// whose sync failed.
    async fn sync_checkouts(&self, update: bool) -> HashSet<String> {
        let _sync = self.sync_lock.lock().await;

        let mut failed = HashSet::new();
        for (_, entry) in self.read_entries() {
            if entry.kind != EntryKind::Github || !entry.enabled {
                continue;
            }
            let (Some(name), Some(repo)) = (
                non_empty(entry.name.as_deref()),
                non_empty(entry.repo.as_deref()),
            ) else {
                continue;
            };
            let Some(checkout_rel) = checkout_rel(&repo) else {
                continue;
            };
            let branch = entry.branch.as_deref().unwrap_or(DEFAULT_BRANCH);
            let checkout = self.workspace_root.join(&checkout_rel);
            if let Err(e) = self.repo_sync.sync(&name, &repo, branch, &checkout, update).await {
                tracing::warn!(backend = %name, error = %e, "repository sync failed");
                failed.insert(name);
            }
        }
        failed
    }

    /// Read and parse every entry file; malformed ones are logged and skipped.
    fn read_entries(&self) -> Vec<(PathBuf, RegistryEntry)> {
        let dir_entries = match std::fs::read_dir(&self.registry_dir) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(
                    path = %self.registry_dir.display(),
                    error = %e,
                    "registry directory not readable, no backends discovered"
                );
                return Vec::new();
            }
        };

        let mut files: Vec<PathBuf> = dir_entries
            .flatten()
            .map(|e| e.path())
            .filter(|p| {
                p.is_file()
                    && p.extension().is_some_and(|ext| ext == "yaml" || ext == "yml")
                    && !p
                        .file_name()
                        .is_some_and(|n| n.to_string_lossy().starts_with('.'))
            })
            .collect();
        files.sort();

        files
            .into_iter()
            .filter_map(|file| match read_entry(&file) {
                Ok(entry) => Some((file, entry)),
                Err(e) => {
                    tracing::warn!(error = %e, "skipping malformed registry entry");
                    None
                }
            })
            .collect()
    }

    fn resolve(
        &self,
        file: &Path,
        entry: RegistryEntry,
        sync_failed: &HashSet<String>,
    ) -> Result<BackendDescriptor, RegistryError> {
        let invalid = |reason: &str| RegistryError::InvalidEntry {
            path: file.display().to_string(),
            reason: reason.to_string(),
        };
        let name = non_empty(entry.name.as_deref()).ok_or_else(|| invalid("missing 'name'"))?;

        let mut descriptor = match entry.kind {
            EntryKind::Local => {
                let path = non_empty(entry.path.as_deref()).ok_or_else(|| invalid("missing 'path'"))?;
                self.local_descriptor(&name, &path, &entry)
            }
            EntryKind::Remote => {
                let url = non_empty(entry.url.as_deref()).ok_or_else(|| invalid("missing 'url'"))?;
                remote_descriptor(&name, &url, &entry)
            }
            EntryKind::Github => {
                let repo = non_empty(entry.repo.as_deref()).ok_or_else(|| invalid("missing 'repo'"))?;
                self.github_descriptor(&name, &repo, &entry, sync_failed)?
            }
        };

        if descriptor.transport == Transport::Stdio && descriptor.command.is_empty() {
            tracing::warn!(backend = %name, path = %descriptor.path, "no command found for stdio backend");
            descriptor.status = BackendStatus::Error;
        }
        if !entry.enabled {
            descriptor.status = BackendStatus::Disabled;
        }
        Ok(descriptor)
    }

    fn local_descriptor(&self, name: &str, path: &str, entry: &RegistryEntry) -> BackendDescriptor {
        let command = entry
            .command
            .clone()
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| detect_command(&self.workspace_root, path));

        BackendDescriptor {
            name: name.to_string(),
            path: path.to_string(),
            description: entry.description.clone().unwrap_or_default(),
            transport: entry.transport.clone().unwrap_or(Transport::Stdio),
            command,
            tools: Vec::new(),
            status: BackendStatus::Discovered,
            discovery_method: DiscoveryMethod::Registry,
            port: entry.port,
            health_check_url: entry.health_check_url.clone(),
            last_discovered_at: Utc::now(),
        }
    }

    fn github_descriptor(
        &self,
        name: &str,
        repo: &str,
        entry: &RegistryEntry,
        sync_failed: &HashSet<String>,
    ) -> Result<BackendDescriptor, RegistryError> {
        let checkout_rel = checkout_rel(repo).ok_or_else(|| RegistryError::InvalidEntry {
            path: repo.to_string(),
            reason: "cannot derive checkout directory from 'repo'".into(),
        })?;
        let checkout_present = self.workspace_root.join(&checkout_rel).is_dir();

        let path = match non_empty(entry.subdir.as_deref()) {
            Some(subdir) => format!("{checkout_rel}/{}", subdir.trim_matches('/')),
            None => checkout_rel,
        };

        let mut descriptor = self.local_descriptor(name, &path, entry);
        descriptor.discovery_method = DiscoveryMethod::Github;
        descriptor.description = format!("[GitHub] {}", descriptor.description);
        if sync_failed.contains(name) {
            descriptor.status = BackendStatus::Error;
        } else if !checkout_present {
            tracing::warn!(backend = name, path = %descriptor.path, "checkout missing, refresh the registry to clone it");
            descriptor.status = BackendStatus::Error;
        }
        Ok(descriptor)
    }
}

// ─── Resolution Helpers ──────────────────────────────────────────────────────

fn read_entry(file: &Path) -> Result<RegistryEntry, RegistryError> {
    let text = std::fs::read_to_string(file).map_err(|e| RegistryError::Io {
        path: file.display().to_string(),
        reason: e.to_string(),
    })?;
    serde_yaml::from_str(&text).map_err(|e| RegistryError::InvalidEntry {
        path: file.display().to_string(),
        reason: e.to_string(),
    })
}

/// Workspace-relative checkout directory of a git-hosted backend.
fn checkout_rel(repo: &str) -> Option<String> {
    repo_dir_name(repo).map(|dir_name| format!("{GITHUB_CHECKOUT_DIR}/{dir_name}"))
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}

fn remote_descriptor(name: &str, url: &str, entry: &RegistryEntry) -> BackendDescriptor {
    BackendDescriptor {
        name: name.to_string(),
        path: url.to_string(),
        description: entry.description.clone().unwrap_or_default(),
        transport: entry.transport.clone().unwrap_or(Transport::Http),
        command: entry.command.clone().unwrap_or_else(|| vec![url.to_string()]),
        tools: Vec::new(),
        status: BackendStatus::Discovered,
        discovery_method: DiscoveryMethod::Registry,
        port: entry.port,
        health_check_url: entry.health_check_url.clone().or_else(|| Some(url.to_string())),
        last_discovered_at: Utc::now(),
    }
}

/// Launch command for the first entry-point script found in `path`.
fn detect_command(workspace_root: &Path, path: &str) -> Vec<String> {
    let dir = workspace_root.join(path);
    SCRIPT_CANDIDATES
        .iter()
        .find(|script| dir.join(script).is_file())
        .map(|script| {
            vec![
                DEFAULT_INTERPRETER.to_string(),
                format!("{}/{script}", path.trim_end_matches('/')),
            ]
        })
        .unwrap_or_default()
}

// ─── Deduplication ───────────────────────────────────────────────────────────

/// Collapse entries sharing `(name, path)` and enforce unique names.
///
/// A repeated `(name, path)` replaces the earlier entry in place. A repeated
/// name with a different path is dropped with a warning.
fn dedup(resolved: Vec<(BackendDescriptor, PathBuf)>) -> Vec<(BackendDescriptor, PathBuf)> {
    let mut out: Vec<(BackendDescriptor, PathBuf)> = Vec::with_capacity(resolved.len());
    let mut by_name: HashMap<String, usize> = HashMap::new();

    for (descriptor, file) in resolved {
        match by_name.get(&descriptor.name) {
            Some(&idx) if out[idx].0.path == descriptor.path => {
                out[idx] = (descriptor, file);
            }
            Some(&idx) => {
                tracing::warn!(
                    backend = %descriptor.name,
                    kept = %out[idx].0.path,
                    dropped = %descriptor.path,
                    "duplicate backend name, keeping first"
                );
            }
            None => {
                by_name.insert(descriptor.name.clone(), out.len());
                out.push((descriptor, file));
            }
        }
    }
    out
}

// ─── Port Collisions ─────────────────────────────────────────────────────────

type PortRepair = (usize, PathBuf, Result<u16, RegistryError>);

/// Decide new ports for every enabled backend that shares a port with an
/// earlier enabled backend.
///
/// The i-th duplicate of port `p` gets the lowest port `>= p + i` not used
/// by any registry entry. The first holder of each port keeps it.
fn plan_port_repairs(resolved: &[(BackendDescriptor, PathBuf)]) -> Vec<PortRepair> {
    let mut used: BTreeSet<u16> = resolved
        .iter()
        .filter_map(|(d, _)| d.port)
        .filter(|p| *p != 0)
        .collect();

    let mut groups: Vec<(u16, Vec<usize>)> = Vec::new();
    for (idx, (descriptor, _)) in resolved.iter().enumerate() {
        let Some(port) = descriptor.port.filter(|p| *p != 0) else {
            continue;
        };
        if !descriptor.is_enabled() {
            continue;
        }
        match groups.iter_mut().find(|(p, _)| *p == port) {
            Some((_, members)) => members.push(idx),
            None => groups.push((port, vec![idx])),
        }
    }

    let mut repairs = Vec::new();
    for (port, members) in groups {
        for (offset, &idx) in members.iter().enumerate().skip(1) {
            let name = &resolved[idx].0.name;
            let assigned = next_free_port(&used, port, offset).ok_or_else(|| RegistryError::PortExhausted {
                name: name.clone(),
                port,
            });
            if let Ok(p) = assigned {
                used.insert(p);
            }
            repairs.push((idx, resolved[idx].1.clone(), assigned));
        }
    }
    repairs
}

fn next_free_port(used: &BTreeSet<u16>, port: u16, offset: usize) -> Option<u16> {
    let start = u32::from(port) + u32::try_from(offset).ok()?;
    (start..=u32::from(u16::MAX))
        .filter_map(|p| u16::try_from(p).ok())
        .find(|p| !used.contains(p))
}

/// Rewrite only the `port` key of a registry entry file.
fn persist_port(file: &Path, port: u16) -> Result<(), RegistryError> {
    let persist_err = |reason: String| RegistryError::Persist {
        path: file.display().to_string(),
        reason,
    };

    let text = std::fs::read_to_string(file).map_err(|e| persist_err(e.to_string()))?;
    let mut doc: serde_yaml::Mapping =
        serde_yaml::from_str(&text).map_err(|e| persist_err(e.to_string()))?;
    doc.insert(
        serde_yaml::Value::String("port".into()),
        serde_yaml::Value::Number(port.into()),
    );
    let text = serde_yaml::to_string(&doc).map_err(|e| persist_err(e.to_string()))?;
    write_atomic(file, &text).map_err(|e| persist_err(e.to_string()))
}

// ─── Tests ───────────────────────────────────────────────────────────────────
