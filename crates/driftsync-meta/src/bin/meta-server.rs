use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use driftsync_core::ClusterTopology;
use driftsync_meta::{MetaServer, MetaStoreClient, RaftMetaStoreGrpcServer, ReplicatedMetaServer};
use tonic::transport::Server;

/// One replica of the replicated metadata server.
#[derive(Parser, Debug)]
#[command(name = "meta-server")]
struct Args {
    /// Path to the cluster config file (`count: N` / `<index>: host:port`).
    #[arg(long)]
    cluster_config: PathBuf,

    /// This process's replica index into the cluster config.
    #[arg(long)]
    index: usize,

    /// Address of the (separately running) block store this cluster uses.
    #[arg(long)]
    block_store_addr: SocketAddr,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let contents = std::fs::read_to_string(&args.cluster_config)?;
    let topology = ClusterTopology::parse(&contents)?;

    let self_addr: SocketAddr = topology.replicas[args.index].parse()?;

    let mut peers = Vec::new();
    for (peer_index, addr) in topology.replicas.iter().enumerate() {
        if peer_index == args.index {
            continue;
        }
        tracing::info!(%addr, peer_index, "connecting to peer replica");
        let client = MetaStoreClient::connect(format!("http://{addr}")).await?;
        peers.push((driftsync_core::ReplicaId(peer_index), client));
    }

    let replica_id = driftsync_core::ReplicaId(args.index);
    let server = ReplicatedMetaServer::new(replica_id, args.block_store_addr.to_string(), peers);
    let grpc_service = MetaServer::new(Arc::new(server));

    tracing::info!(%self_addr, replica_index = args.index, "starting replicated metadata server");
    Server::builder()
        .add_service(RaftMetaStoreGrpcServer::new(grpc_service))
        .serve(self_addr)
        .await?;
    Ok(())
}
