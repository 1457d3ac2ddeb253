//! The unreplicated content-addressed block store (component C1).

use driftsync_core::{Block, BlockHash, SyncError};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::collections::HashSet;

/// Business-logic surface of the block store, independent of any transport.
pub trait BlockStoreBackend: Send + Sync {
    /// Compute `H(block.data)`, insert it, and return the computed hash.
    /// Idempotent: putting the same bytes twice overwrites with an equal value.
    fn put_block(&self, block: Block) -> Result<BlockHash, SyncError>;

    fn get_block(&self, hash: &str) -> Result<Block, SyncError>;

    /// Returns the subset of `hashes` the store LACKS — the caller's upload
    /// worklist, not the hashes present.
    fn has_blocks(&self, hashes: &[BlockHash]) -> Vec<BlockHash>;
}

/// In-memory implementation backed by a `HashMap` guarded by a single lock.
/// No persistence across restarts; blocks live forever within a process.
#[derive(Default)]
pub struct InMemoryBlockStore {
    blocks: RwLock<HashMap<BlockHash, Block>>,
}

impl InMemoryBlockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blocks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl BlockStoreBackend for InMemoryBlockStore {
    fn put_block(&self, block: Block) -> Result<BlockHash, SyncError> {
        let hash = block.hash();
        self.blocks.write().insert(hash.clone(), block);
        Ok(hash)
    }

    fn get_block(&self, hash: &str) -> Result<Block, SyncError> {
        self.blocks
            .read()
            .get(hash)
            .cloned()
            .ok_or_else(|| SyncError::not_found(format!("block {hash}")))
    }

    fn has_blocks(&self, hashes: &[BlockHash]) -> Vec<BlockHash> {
        let present: HashSet<&BlockHash> = {
            let guard = self.blocks.read();
            hashes.iter().filter(|h| guard.contains_key(*h)).collect()
        };
        hashes
            .iter()
            .filter(|h| !present.contains(h))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_then_get_round_trips() {
        let store = InMemoryBlockStore::new();
        let block = Block::new(b"hello".to_vec());
        let hash = store.put_block(block.clone()).unwrap();
        assert_eq!(store.get_block(&hash).unwrap(), block);
    }

    #[test]
    fn put_is_idempotent() {
        let store = InMemoryBlockStore::new();
        let block = Block::new(b"hello".to_vec());
        store.put_block(block.clone()).unwrap();
        store.put_block(block.clone()).unwrap();
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn get_missing_is_not_found() {
        let store = InMemoryBlockStore::new();
        let err = store.get_block("nope").unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn has_blocks_returns_missing_subset() {
        let store = InMemoryBlockStore::new();
        let present = store.put_block(Block::new(b"hello".to_vec())).unwrap();
        let missing_hash = "deadbeef".to_string();

        let missing = store.has_blocks(&[present.clone(), missing_hash.clone()]);
        assert_eq!(missing, vec![missing_hash]);

        let none_missing = store.has_blocks(&[present]);
        assert!(none_missing.is_empty());
    }

    #[test]
    fn has_blocks_of_empty_store_returns_everything() {
        let store = InMemoryBlockStore::new();
        let hashes = vec!["a".to_string(), "b".to_string()];
        assert_eq!(store.has_blocks(&hashes), hashes);
    }
}
