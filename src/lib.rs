//! MCP Composer: aggregates tool backends behind virtual MCP servers.
//!
//! - `registry`: declarative backend discovery and capability manifests
//! - `proxy`: stdio and HTTP transports behind one router
//! - `virtual_server`, `prompts`: persisted compositions and custom prompts
//! - `dispatcher`: the JSON-RPC protocol surface
//! - `server`: HTTP endpoints and the management API
//! - `toolkit`: a tools directory served as a stdio backend

pub mod config;
pub mod dispatcher;
pub mod prompts;
pub mod proxy;
pub mod registry;
pub mod server;
pub mod storage;
pub mod toolkit;
pub mod virtual_server;

use std::path::Path;
use std::sync::Arc;

use config::ComposerConfig;
use dispatcher::{Dispatcher, Services};
use prompts::PromptManager;
use proxy::ProxyRouter;
use registry::{CapabilityReader, Registry};
use server::AppState;
use virtual_server::VirtualServerStore;

/// Log file name inside the configured log directory.
const LOG_FILE_NAME: &str = "composer.log";

/// Rotated log files kept next to the current one.
const LOG_FILES_KEPT: u32 = 3;

/// Wire every collaborator from the configuration.
pub fn build_state(config: &ComposerConfig) -> AppState {
    let root = &config.workspace_root;
    let services = Services {
        registry: Arc::new(Registry::new(root, config.registry_path())),
        router: Arc::new(ProxyRouter::standard(root, config.timeouts.transport_timeouts())),
        prompts: Arc::new(PromptManager::new(config.prompts_path())),
        capabilities: Arc::new(CapabilityReader::new(root)),
    };
    AppState::new(
        Dispatcher::new(services),
        VirtualServerStore::new(config.virtual_servers_path()),
        config.admin_token.clone(),
    )
}

/// Initialize the tracing subscriber.
///
/// Without a log directory, logs go to stderr (stdout may carry protocol
/// traffic). With one:
/// 1. Rotates existing logs (composer.log → .1 → .2 → .3, keeps last 3).
/// 2. Opens a fresh composer.log with a line-flushing writer.
///
/// Either way a startup banner records the version, workspace and pid.
pub fn init_tracing(log_dir: Option<&Path>, json: bool, workspace: &Path) -> std::io::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::fmt::writer::BoxMakeWriter;
    use tracing_subscriber::EnvFilter;

    let (writer, log_path) = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let log_path = dir.join(LOG_FILE_NAME);
            rotate_log_file(&log_path, LOG_FILES_KEPT);
            let log_file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&log_path)?;
            (BoxMakeWriter::new(FlushingWriter::new(log_file)), Some(log_path))
        }
        None => (BoxMakeWriter::new(std::io::stderr), None),
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("mcp_composer=info,warn"));

    let builder = fmt::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        workspace = %workspace.display(),
        log_file = ?log_path.as_ref().map(|p| p.display().to_string()),
        pid = std::process::id(),
        "=== MCP Composer starting ==="
    );
    Ok(())
}

/// Rotate log files: `composer.log` → `composer.log.1` → … → `.{keep}`.
///
/// Oldest file beyond `keep` is deleted. Missing files in the chain are skipped.
fn rotate_log_file(base_path: &Path, keep: u32) {
    let oldest = format!("{}.{keep}", base_path.display());
    let _ = std::fs::remove_file(&oldest);

    for i in (1..keep).rev() {
        let from = format!("{}.{i}", base_path.display());
        let to = format!("{}.{}", base_path.display(), i + 1);
        let _ = std::fs::rename(&from, &to);
    }

    if base_path.exists() {
        let to = format!("{}.1", base_path.display());
        let _ = std::fs::rename(base_path, &to);
    }
}

/// A writer that wraps `std::fs::File` and flushes after every write, so
/// each log line is on disk even if the process dies.
#[derive(Clone)]
struct FlushingWriter {
    file: Arc<std::sync::Mutex<std::fs::File>>,
}

impl FlushingWriter {
    fn new(file: std::fs::File) -> Self {
        Self {
            file: Arc::new(std::sync::Mutex::new(file)),
        }
    }
}

impl std::io::Write for FlushingWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut f = self
            .file
            .lock()
            .map_err(|e| std::io::Error::other(format!("lock poisoned: {e}")))?;
        let n = std::io::Write::write(&mut *f, buf)?;
        std::io::Write::flush(&mut *f)?;
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        let mut f = self
            .file
            .lock()
            .map_err(|e| std::io::Error::other(format!("lock poisoned: {e}")))?;
        std::io::Write::flush(&mut *f)
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for FlushingWriter {
    type Writer = FlushingWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
