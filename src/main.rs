use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};

use mcp_composer::config::{self, ComposerConfig};
use mcp_composer::toolkit::{InternalToolExecutor, ToolServer};

#[derive(Debug, Parser)]
#[command(
    name = "mcp-composer",
    version,
    about = "Aggregate MCP tool backends behind virtual servers"
)]
struct Args {
    /// Config file (default: `composer.yaml` found upward from the current directory).
    #[arg(long, global = true, env = "MCP_COMPOSER_CONFIG")]
    config: Option<PathBuf>,

    /// Workspace root, overriding the config file.
    #[arg(long, global = true, env = "MCP_COMPOSER_WORKSPACE")]
    workspace: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Serve the protocol endpoints and the management API.
    Serve {
        /// Address to bind, overriding the config file.
        #[arg(long, env = "MCP_COMPOSER_BIND")]
        bind: Option<String>,
    },
    /// Clone missing checkouts, run one discovery pass and print the
    /// registry snapshot as JSON.
    Discover {
        /// Also pull existing git checkouts.
        #[arg(long)]
        refresh: bool,
    },
    /// Serve a tools directory as a stdio backend.
    ToolServer {
        /// Directory holding one sub-directory per tool.
        #[arg(long)]
        tools_dir: PathBuf,
        /// Name reported in `initialize`.
        #[arg(long, default_value = "tool-server")]
        name: String,
    },
}

fn load_config(args: &Args) -> anyhow::Result<ComposerConfig> {
    let cwd = std::env::current_dir().context("resolve current directory")?;
    let mut config = config::load(args.config.as_deref(), &cwd).context("load configuration")?;
    if let Some(workspace) = &args.workspace {
        config.workspace_root = cwd.join(workspace);
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;

    mcp_composer::init_tracing(
        config.log_path().as_deref(),
        config.log_json,
        &config.workspace_root,
    )
    .context("initialize logging")?;

    match args.command {
        Command::Serve { bind } => {
            let bind = bind.unwrap_or_else(|| config.bind.clone());
            if config.admin_token.is_none() {
                tracing::warn!("no admin_token configured, management API is unauthenticated");
            }
            let state = mcp_composer::build_state(&config);
            let registry = state.dispatcher.services().registry.clone();
            tokio::spawn(async move {
                let backends = registry.prepare().await;
                tracing::info!(count = backends.len(), "initial discovery complete");
            });
            mcp_composer::server::serve(state, &bind)
                .await
                .with_context(|| format!("serve on {bind}"))?;
        }
        Command::Discover { refresh } => {
            let state = mcp_composer::build_state(&config);
            let registry = &state.dispatcher.services().registry;
            let backends = if refresh {
                registry.refresh().await
            } else {
                registry.prepare().await
            };
            let json = serde_json::to_string_pretty(&backends).context("encode registry snapshot")?;
            println!("{json}");
        }
        Command::ToolServer { tools_dir, name } => {
            let executor = InternalToolExecutor::load(&tools_dir)
                .with_timeout(config.timeouts.transport_timeouts().stdio);
            let server = ToolServer::new(name, executor);
            let stdin = tokio::io::BufReader::new(tokio::io::stdin());
            server
                .run(stdin, tokio::io::stdout())
                .await
                .context("tool server loop")?;
        }
    }

    Ok(())
}
