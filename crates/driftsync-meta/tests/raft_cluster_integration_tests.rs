//! In-process, loopback gRPC integration tests for the replicated metadata
//! server cluster, covering the leader-crash and minority-partition scenarios.

use std::net::TcpListener;
use std::sync::Arc;
use std::time::Duration;

use driftsync_core::{FileMetaData, ReplicaId};
use driftsync_meta::{MetaServer, MetaStoreClient, RaftMetaStoreGrpcServer, ReplicatedMetaServer};
use tonic::transport::Server;

fn find_available_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

/// Spins up `count` replicas, each fully peered with the others, and returns
/// their addresses plus the join handles keeping them alive for the test.
async fn spawn_cluster(count: usize) -> (Vec<String>, Vec<tokio::task::JoinHandle<()>>) {
    let addrs: Vec<String> = (0..count)
        .map(|_| format!("127.0.0.1:{}", find_available_port()))
        .collect();

    let mut handles = Vec::new();
    for (index, addr) in addrs.iter().enumerate() {
        let mut peers = Vec::new();
        for (peer_index, peer_addr) in addrs.iter().enumerate() {
            if peer_index == index {
                continue;
            }
            // Lazy connect: peers are bound one at a time below, in the same
            // loop that constructs this one, so a peer's listener may not
            // exist yet.
            let client = MetaStoreClient::connect_lazy(format!("http://{peer_addr}")).unwrap();
            peers.push((ReplicaId(peer_index), client));
        }

        let server = ReplicatedMetaServer::new(ReplicaId(index), "127.0.0.1:9999".to_string(), peers);
        let grpc = MetaServer::new(Arc::new(server));
        let addr: std::net::SocketAddr = addr.parse().unwrap();
        handles.push(tokio::spawn(async move {
            Server::builder()
                .add_service(RaftMetaStoreGrpcServer::new(grpc))
                .serve(addr)
                .await
                .unwrap();
        }));
    }

    // give the listeners a moment to bind before clients connect.
    tokio::time::sleep(Duration::from_millis(50)).await;
    (addrs, handles)
}

fn meta(filename: &str, version: i32, hashes: &[&str]) -> FileMetaData {
    FileMetaData::new(filename, version, hashes.iter().map(|s| s.to_string()).collect())
}

#[tokio::test]
async fn leader_crash_before_replication_loses_uncommitted_entry() {
    let (addrs, _handles) = spawn_cluster(3).await;

    let mut leader = MetaStoreClient::connect(format!("http://{}", addrs[0])).await.unwrap();
    leader.set_leader().await.unwrap();

    // Force the leader's update to hang by crashing it immediately after the
    // local append would have happened: crash first, then attempt the write,
    // which must fail fast rather than silently losing the request.
    leader.crash().await.unwrap();
    let err = leader.update_file(&meta("a.txt", 1, &["h1"])).await.unwrap_err();
    assert!(err.is_client_failover());

    // Promote replica 1 instead; it never saw the entry, so its view of the
    // file system is simply empty, and it answers GetFileInfoMap on its own.
    let mut new_leader = MetaStoreClient::connect(format!("http://{}", addrs[1])).await.unwrap();
    new_leader.set_leader().await.unwrap();
    let map = new_leader.get_file_info_map().await.unwrap();
    assert!(!map.contains_key("a.txt"));
}

#[tokio::test]
async fn minority_partition_blocks_quorum_then_recovers() {
    let (addrs, _handles) = spawn_cluster(3).await;

    let mut leader = MetaStoreClient::connect(format!("http://{}", addrs[0])).await.unwrap();
    leader.set_leader().await.unwrap();

    let mut follower_a = MetaStoreClient::connect(format!("http://{}", addrs[1])).await.unwrap();
    let mut follower_b = MetaStoreClient::connect(format!("http://{}", addrs[2])).await.unwrap();
    follower_a.crash().await.unwrap();
    follower_b.crash().await.unwrap();

    let err = leader.get_file_info_map().await.unwrap_err();
    assert!(matches!(err, driftsync_core::SyncError::ServersUnreachable));

    follower_a.restore().await.unwrap();

    let update = tokio::time::timeout(
        Duration::from_secs(5),
        leader.update_file(&meta("a.txt", 1, &["h1"])),
    )
    .await
    .expect("update should commit once a majority is restored")
    .unwrap();
    assert_eq!(update, 1);
}
