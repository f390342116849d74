//! CLI command implementations

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Subcommand;
use magstream_core::config::MagstreamConfig;
use magstream_core::{MagnetLink, SimulatedSwarmFactory};
use tracing::info;

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Start the streaming server
    Server {
        /// Host to bind to [env: MAGSTREAM_HOST, default: 0.0.0.0]
        #[arg(long)]
        host: Option<String>,
        /// Port to bind to [env: MAGSTREAM_PORT, default: 3001]
        #[arg(short, long)]
        port: Option<u16>,
        /// Directory for downloaded data [env: MAGSTREAM_DOWNLOAD_DIR]
        #[arg(short, long)]
        download_dir: Option<PathBuf>,
        /// Keep downloaded data when a session is removed
        #[arg(long)]
        keep_data: bool,
    },
    /// Show what a magnet link identifies
    Inspect {
        /// Magnet URI
        magnet_link: String,
    },
}

/// Handle the CLI command
///
/// # Errors
/// Returns appropriate error based on the command that fails
pub async fn handle_command(command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Server {
            host,
            port,
            download_dir,
            keep_data,
        } => {
            let mut config = MagstreamConfig::from_env();
            apply_server_overrides(&mut config, host, port, download_dir, keep_data);
            start_server(config).await
        }
        Commands::Inspect { magnet_link } => inspect_magnet(&magnet_link),
    }
}

fn apply_server_overrides(
    config: &mut MagstreamConfig,
    host: Option<String>,
    port: Option<u16>,
    download_dir: Option<PathBuf>,
    keep_data: bool,
) {
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }
    if let Some(dir) = download_dir {
        config.storage.download_dir = dir;
    }
    if keep_data {
        config.session.keep_data_on_destroy = true;
    }
}

/// Runs the server against the simulated swarm until shutdown.
async fn start_server(config: MagstreamConfig) -> anyhow::Result<()> {
    info!(
        "Starting Magstream on {}:{} (downloads in {})",
        config.server.host,
        config.server.port,
        config.storage.download_dir.display()
    );
    let factory = Arc::new(SimulatedSwarmFactory::new(config.simulation.clone()));

    magstream_web::run_server(config, factory)
        .await
        .context("Streaming server failed")
}

fn inspect_magnet(magnet_link: &str) -> anyhow::Result<()> {
    let magnet: MagnetLink = magnet_link.parse().context("Could not parse magnet link")?;

    println!("Info hash: {}", magnet.info_hash);
    println!("Name:      {}", magnet.name());
    if magnet.trackers.is_empty() {
        println!("Trackers:  none");
    } else {
        println!("Trackers:");
        for tracker in &magnet.trackers {
            println!("  {tracker}");
        }
    }
    Ok(())
}
