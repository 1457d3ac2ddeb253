//! The content-addressed block store (component C1): a trait, an in-memory
//! implementation, and the gRPC service/client adapters around it.

pub mod client;
pub mod server;
pub mod store;

pub use client::BlockStoreClient;
pub use server::BlockServer;
pub use store::{BlockStoreBackend, InMemoryBlockStore};

pub use driftsync_proto::block_store_server::BlockStoreServer as BlockStoreGrpcServer;
