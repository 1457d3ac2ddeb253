use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use driftsync_block::{BlockServer, BlockStoreGrpcServer, InMemoryBlockStore};
use tonic::transport::Server;

/// Stand-alone block store server.
#[derive(Parser, Debug)]
#[command(name = "block-server")]
struct Args {
    /// Address to bind the block store service on, e.g. 127.0.0.1:9001.
    #[arg(long)]
    addr: SocketAddr,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let backend = Arc::new(InMemoryBlockStore::new());
    let server = BlockServer::new(backend);

    tracing::info!(%args.addr, "starting block store server");
    Server::builder()
        .add_service(BlockStoreGrpcServer::new(server))
        .serve(args.addr)
        .await?;
    Ok(())
}
