//! Repository checkouts for git-hosted backends.
//!
//! Cloning and pulling are delegated to a `RepoSync` collaborator so that
//! discovery can be exercised without a network.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use super::errors::RegistryError;

/// Wall-clock budget for one `git` invocation.
const GIT_TIMEOUT: Duration = Duration::from_secs(120);

/// Ensures a local checkout of a repository exists (and optionally is fresh).
#[async_trait]
pub trait RepoSync: Send + Sync {
    /// Clone `repo` at `branch` into `checkout` when missing. With `update`,
    /// an existing checkout is also fast-forwarded.
    async fn sync(
        &self,
        name: &str,
        repo: &str,
        branch: &str,
        checkout: &Path,
        update: bool,
    ) -> Result<(), RegistryError>;
}

/// `RepoSync` backed by the `git` command-line client.
#[derive(Debug, Default, Clone, Copy)]
pub struct GitCli;

#[async_trait]
impl RepoSync for GitCli {
    async fn sync(
        &self,
        name: &str,
        repo: &str,
        branch: &str,
        checkout: &Path,
        update: bool,
    ) -> Result<(), RegistryError> {
        if checkout.join(".git").exists() {
            if !update {
                return Ok(());
            }
            tracing::info!(backend = name, branch, "updating checkout");
            let checkout = checkout.to_string_lossy();
            return run_git(name, &["-C", &checkout, "pull", "--ff-only", "origin", branch]).await;
        }

        if let Some(parent) = checkout.parent() {
            std::fs::create_dir_all(parent).map_err(|e| RegistryError::Sync {
                name: name.to_string(),
                reason: format!("cannot create {}: {e}", parent.display()),
            })?;
        }

        tracing::info!(backend = name, repo, branch, "cloning repository");
        let checkout = checkout.to_string_lossy();
        run_git(name, &["clone", "--depth", "1", "--branch", branch, repo, &checkout]).await
    }
}

async fn run_git(name: &str, args: &[&str]) -> Result<(), RegistryError> {
    let mut command = Command::new("git");
    command.args(args);
    run_with_timeout(name, &mut command, GIT_TIMEOUT).await
}

/// Run a command to completion, killing it when `timeout` elapses. Git is
/// told never to prompt for credentials.
async fn run_with_timeout(name: &str, command: &mut Command, timeout: Duration) -> Result<(), RegistryError> {
    let sync_err = |reason: String| RegistryError::Sync {
        name: name.to_string(),
        reason,
    };
    let child = command
        .env("GIT_TERMINAL_PROMPT", "0")
        .stdin(std::process::Stdio::null())
        .kill_on_drop(true)
        .output();
    let output = tokio::time::timeout(timeout, child)
        .await
        .map_err(|_| sync_err(format!("git timed out after {}s", timeout.as_secs())))?
        .map_err(|e| sync_err(format!("failed to run git: {e}")))?;

    if output.status.success() {
        Ok(())
    } else {
        Err(RegistryError::Sync {
            name: name.to_string(),
            reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

/// Directory name for a checkout, derived from the repository URL.
pub fn repo_dir_name(repo: &str) -> Option<String> {
    let last = repo
        .trim_end_matches('/')
        .rsplit(['/', ':'])
        .next()?
        .trim_end_matches(".git");
    if last.is_empty() || last == "." || last == ".." {
        None
    } else {
        Some(last.to_string())
    }
}
