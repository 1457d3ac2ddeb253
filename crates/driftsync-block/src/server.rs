//! gRPC adapter: translates `BlockStore` tonic requests into
//! [`BlockStoreBackend`] calls.

use std::sync::Arc;
use tonic::{Request, Response, Status};

use driftsync_core::{Block as CoreBlock, SyncError};
use driftsync_proto::block_store_server::BlockStore;
use driftsync_proto::{Block, BlockHash, BlockHashes, PutBlockResponse};

use crate::store::BlockStoreBackend;

#[derive(Debug)]
pub struct BlockServer<T: BlockStoreBackend> {
    backend: Arc<T>,
}

impl<T: BlockStoreBackend> BlockServer<T> {
    pub fn new(backend: Arc<T>) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &T {
        &self.backend
    }
}

#[tonic::async_trait]
impl<T: BlockStoreBackend + 'static> BlockStore for BlockServer<T> {
    async fn get_block(&self, request: Request<BlockHash>) -> Result<Response<Block>, Status> {
        let hash = request.into_inner().hash;
        let block = self
            .backend
            .get_block(&hash)
            .map_err(sync_error_to_status)?;
        Ok(Response::new(Block { data: block.data }))
    }

    async fn put_block(
        &self,
        request: Request<Block>,
    ) -> Result<Response<PutBlockResponse>, Status> {
        let block = CoreBlock::new(request.into_inner().data);
        self.backend.put_block(block).map_err(sync_error_to_status)?;
        Ok(Response::new(PutBlockResponse { success: true }))
    }

    async fn has_blocks(
        &self,
        request: Request<BlockHashes>,
    ) -> Result<Response<BlockHashes>, Status> {
        let hashes = request.into_inner().hashes;
        let missing = self.backend.has_blocks(&hashes);
        Ok(Response::new(BlockHashes { hashes: missing }))
    }
}

/// Map a [`SyncError`] to the `tonic::Code` closest to its meaning, embedding
/// the error's stable kind tag in the message so a client-side conversion can
/// recover it exactly instead of guessing from the code alone.
pub fn sync_error_to_status(error: SyncError) -> Status {
    match error {
        SyncError::NotFound { .. } => Status::not_found(error.to_string()),
        SyncError::Io { .. } => Status::internal(error.to_string()),
        _ => Status::internal(error.to_string()),
    }
}
