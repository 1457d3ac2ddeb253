//! Client for talking to a single block store replica.
//!
//! The block store is unreplicated (§4.1), so unlike the metadata cluster
//! client this wraps exactly one tonic connection with no failover.

use std::time::Duration;
use tonic::transport::{Channel, Endpoint};
use tonic::{Request, Status};

use driftsync_core::{Block, BlockHash, SyncError};
use driftsync_proto::block_store_client::BlockStoreClient as TonicBlockStoreClient;
use driftsync_proto::{Block as ProtoBlock, BlockHash as ProtoBlockHash, BlockHashes};

const DEFAULT_DEADLINE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct BlockStoreClient {
    client: TonicBlockStoreClient<Channel>,
}

impl BlockStoreClient {
    pub async fn connect<D>(dst: D) -> Result<Self, SyncError>
    where
        D: TryInto<Endpoint>,
        D::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let endpoint = dst
            .try_into()
            .map_err(|e| SyncError::from_transport_error(e.into(), "invalid block store endpoint"))?;
        let client = TonicBlockStoreClient::connect(endpoint)
            .await
            .map_err(|e| SyncError::from_transport_error(e, "failed to connect to block store"))?;
        Ok(Self { client })
    }

    pub async fn get_block(&mut self, hash: &str) -> Result<Block, SyncError> {
        let mut request = Request::new(ProtoBlockHash {
            hash: hash.to_string(),
        });
        request.set_timeout(DEFAULT_DEADLINE);
        let response = self
            .client
            .get_block(request)
            .await
            .map_err(status_to_sync_error)?;
        Ok(Block::new(response.into_inner().data))
    }

    pub async fn put_block(&mut self, block: Block) -> Result<(), SyncError> {
        let mut request = Request::new(ProtoBlock { data: block.data });
        request.set_timeout(DEFAULT_DEADLINE);
        let response = self
            .client
            .put_block(request)
            .await
            .map_err(status_to_sync_error)?;
        if response.into_inner().success {
            Ok(())
        } else {
            Err(SyncError::from_transport_error("put rejected", "put_block"))
        }
    }

    /// Returns the subset of `hashes` missing on the server.
    pub async fn has_blocks(&mut self, hashes: &[BlockHash]) -> Result<Vec<BlockHash>, SyncError> {
        let mut request = Request::new(BlockHashes {
            hashes: hashes.to_vec(),
        });
        request.set_timeout(DEFAULT_DEADLINE);
        let response = self
            .client
            .has_blocks(request)
            .await
            .map_err(status_to_sync_error)?;
        Ok(response.into_inner().hashes)
    }
}

/// Convert a tonic `Status` to a [`SyncError`], recovering the specific kind
/// from the server-embedded tag when present.
pub fn status_to_sync_error(status: Status) -> SyncError {
    match status.code() {
        tonic::Code::NotFound => SyncError::not_found(status.message().to_string()),
        _ => SyncError::from_transport_error(status.message(), "block store RPC failed"),
    }
}
