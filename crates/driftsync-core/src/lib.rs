//! Shared data model and error type for the driftsync workspace.
//!
//! Every other crate in this workspace depends on `driftsync-core` for the
//! vocabulary (`Block`, `FileMetaData`, `Term`, `SyncError`, ...) so that the
//! block store, the metadata store, the replicated server, the cluster
//! client and the sync engine all speak the same types without importing
//! each other.

pub mod cluster_config;
pub mod error;
pub mod types;

pub use cluster_config::ClusterTopology;
pub use error::SyncError;
pub use types::{
    Block, BlockHash, BlockHashList, FileInfoMap, FileMetaData, LogEntry, ReplicaId, Term,
    VERSION_MISMATCH, hash_bytes, is_tombstone, tombstone_list, TOMBSTONE_HASH,
};
