use std::path::PathBuf;

use clap::Parser;
use driftsync_client::{ClusterClient, SyncEngine};
use driftsync_core::ClusterTopology;

/// Run one sync of a local directory against the cluster.
#[derive(Parser, Debug)]
#[command(name = "driftsync-client")]
struct Args {
    /// Path to the cluster config file (`count: N` / `<index>: host:port`).
    #[arg(long)]
    cluster_config: PathBuf,

    /// Directory to sync.
    #[arg(long)]
    base_dir: PathBuf,

    /// Block size in bytes used to chunk file contents.
    #[arg(long, default_value_t = 4096)]
    block_size: usize,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let contents = std::fs::read_to_string(&args.cluster_config)?;
    let topology = ClusterTopology::parse(&contents)?;

    let cluster = ClusterClient::new(topology.replicas);
    let engine = SyncEngine::new(cluster, args.base_dir, args.block_size);

    tracing::info!("starting sync");
    engine.sync().await?;
    tracing::info!("sync complete");
    Ok(())
}
