pub mod cluster_client;
pub mod index_file;
pub mod sync_engine;

pub use cluster_client::ClusterClient;
pub use sync_engine::{decide_local_action, decide_remote_action, LocalAction, RemoteAction, SyncEngine};
