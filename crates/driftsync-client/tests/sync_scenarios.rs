//! On-disk + loopback-gRPC integration tests covering the first-upload,
//! idempotent-put, conflicting-edit, and deletion scenarios.

use std::net::TcpListener;
use std::sync::Arc;
use std::time::Duration;

use driftsync_block::{BlockServer, BlockStoreGrpcServer, InMemoryBlockStore};
use driftsync_client::{ClusterClient, SyncEngine};
use driftsync_core::ReplicaId;
use driftsync_meta::{MetaServer, MetaStoreClient, RaftMetaStoreGrpcServer, ReplicatedMetaServer};
use tempfile::TempDir;
use tonic::transport::Server;

fn find_available_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

/// One leader, `follower_count` followers, and a single block store, all
/// wired together and serving on loopback.
async fn spawn_cluster(follower_count: usize) -> Vec<String> {
    let block_addr = format!("127.0.0.1:{}", find_available_port());
    let block_backend = Arc::new(InMemoryBlockStore::new());
    let block_grpc = BlockServer::new(block_backend);
    let block_bind: std::net::SocketAddr = block_addr.parse().unwrap();
    tokio::spawn(async move {
        Server::builder()
            .add_service(BlockStoreGrpcServer::new(block_grpc))
            .serve(block_bind)
            .await
            .unwrap();
    });

    let meta_addrs: Vec<String> = (0..=follower_count)
        .map(|_| format!("127.0.0.1:{}", find_available_port()))
        .collect();

    for (index, addr) in meta_addrs.iter().enumerate() {
        let mut peers = Vec::new();
        for (peer_index, peer_addr) in meta_addrs.iter().enumerate() {
            if peer_index == index {
                continue;
            }
            // Lazy connect: peers are bound one at a time below, in the same
            // loop that constructs this one, so a peer's listener may not
            // exist yet.
            let client = MetaStoreClient::connect_lazy(format!("http://{peer_addr}")).unwrap();
            peers.push((ReplicaId(peer_index), client));
        }
        let server = ReplicatedMetaServer::new(ReplicaId(index), block_addr.clone(), peers);
        let grpc = MetaServer::new(Arc::new(server));
        let bind: std::net::SocketAddr = addr.parse().unwrap();
        tokio::spawn(async move {
            Server::builder()
                .add_service(RaftMetaStoreGrpcServer::new(grpc))
                .serve(bind)
                .await
                .unwrap();
        });
    }

    tokio::time::sleep(Duration::from_millis(50)).await;

    let mut leader = MetaStoreClient::connect(format!("http://{}", meta_addrs[0])).await.unwrap();
    leader.set_leader().await.unwrap();

    meta_addrs
}

#[tokio::test]
async fn first_upload_chunks_and_stores_blocks() {
    let meta_addrs = spawn_cluster(2).await;
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("a.txt"), b"hello").unwrap();

    let cluster = ClusterClient::new(meta_addrs);
    let engine = SyncEngine::new(cluster.clone(), dir.path().to_path_buf(), 4);
    engine.sync().await.unwrap();

    let remote = cluster.get_file_info_map().await.unwrap();
    let entry = remote.get("a.txt").unwrap();
    assert_eq!(entry.version, 1);
    assert_eq!(entry.block_hash_list.len(), 2);
}

#[tokio::test]
async fn repeated_sync_with_no_changes_is_a_no_op() {
    let meta_addrs = spawn_cluster(2).await;
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("a.txt"), b"hello").unwrap();

    let cluster = ClusterClient::new(meta_addrs);
    let engine = SyncEngine::new(cluster.clone(), dir.path().to_path_buf(), 4);
    engine.sync().await.unwrap();
    engine.sync().await.unwrap();

    let remote = cluster.get_file_info_map().await.unwrap();
    assert_eq!(remote.get("a.txt").unwrap().version, 1);
}

#[tokio::test]
async fn conflicting_edit_resolves_to_first_writer() {
    let meta_addrs = spawn_cluster(2).await;
    let dir_a = TempDir::new().unwrap();
    let dir_b = TempDir::new().unwrap();
    std::fs::write(dir_a.path().join("a.txt"), b"base").unwrap();
    std::fs::write(dir_b.path().join("a.txt"), b"base").unwrap();

    let cluster = ClusterClient::new(meta_addrs);
    let engine_a = SyncEngine::new(cluster.clone(), dir_a.path().to_path_buf(), 4);
    let engine_b = SyncEngine::new(cluster.clone(), dir_b.path().to_path_buf(), 4);

    engine_a.sync().await.unwrap();
    engine_b.sync().await.unwrap();

    std::fs::write(dir_a.path().join("a.txt"), b"from-a").unwrap();
    std::fs::write(dir_b.path().join("a.txt"), b"from-b").unwrap();

    engine_a.sync().await.unwrap();
    engine_b.sync().await.unwrap();

    let content_b = std::fs::read_to_string(dir_b.path().join("a.txt")).unwrap();
    assert_eq!(content_b, "from-a");

    let remote = cluster.get_file_info_map().await.unwrap();
    assert_eq!(remote.get("a.txt").unwrap().version, 2);
}

#[tokio::test]
async fn deletion_propagates_as_tombstone() {
    let meta_addrs = spawn_cluster(2).await;
    let dir_a = TempDir::new().unwrap();
    let dir_b = TempDir::new().unwrap();
    std::fs::write(dir_a.path().join("a.txt"), b"base").unwrap();

    let cluster = ClusterClient::new(meta_addrs);
    let engine_a = SyncEngine::new(cluster.clone(), dir_a.path().to_path_buf(), 4);
    let engine_b = SyncEngine::new(cluster.clone(), dir_b.path().to_path_buf(), 4);

    engine_a.sync().await.unwrap();
    engine_b.sync().await.unwrap();
    assert!(dir_b.path().join("a.txt").exists());

    std::fs::remove_file(dir_a.path().join("a.txt")).unwrap();
    engine_a.sync().await.unwrap();

    let remote = cluster.get_file_info_map().await.unwrap();
    assert_eq!(remote.get("a.txt").unwrap().version, 2);
    assert!(remote.get("a.txt").unwrap().is_tombstone());

    engine_b.sync().await.unwrap();
    assert!(!dir_b.path().join("a.txt").exists());
}
