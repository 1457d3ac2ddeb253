pub mod client;
pub mod meta_store;
pub mod raft;
pub mod server;

pub use client::MetaStoreClient;
pub use meta_store::{MetadataStore, UpdateOutcome};
pub use raft::{AppendEntriesRequest, AppendEntriesResponse, InternalStateSnapshot, ReplicatedMetaServer};
pub use server::{sync_error_to_status, MetaServer};

pub use driftsync_proto::raft_meta_store_server::RaftMetaStoreServer as RaftMetaStoreGrpcServer;
