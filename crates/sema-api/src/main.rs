//! sema-server binary

use std::path::PathBuf;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use sema_api::ApiServer;
use sema_lsp::{default_registry, ConfigLoader};

#[derive(Parser, Debug)]
#[command(name = "sema-server", version, about = "Language-backend orchestration server")]
struct Args {
    /// Workspace root the backends operate on
    #[arg(long, default_value = ".")]
    workspace_root: PathBuf,

    /// Port to listen on (0 for an ephemeral port)
    #[arg(long, default_value_t = 7600)]
    port: u16,

    /// Backend configuration file overlaid on the built-in defaults
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();

    let registry = match &args.config {
        Some(path) => {
            let overlay = ConfigLoader::load_from_file(path)?;
            ConfigLoader::merge(default_registry(), vec![overlay])?
        }
        None => default_registry(),
    };

    let workspace_root = args.workspace_root.canonicalize()?;
    info!(root = %workspace_root.display(), "Starting sema");

    let server = ApiServer::start(registry, workspace_root, args.port).await?;
    server.setup_graceful_shutdown();
    server.wait().await
}
