//! Shared data model: blocks, file metadata, and the small newtypes that
//! stand in for the raw integers the replicated log passes around.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;

/// The block hash that means "this file is deleted". Never the hash of real
/// block bytes.
pub const TOMBSTONE_HASH: &str = "0";

/// A block's content hash, rendered as lowercase hex.
pub type BlockHash = String;

/// Ordered sequence of block hashes representing a file's content.
pub type BlockHashList = Vec<BlockHash>;

/// True if `hashes` is the single-element tombstone list.
pub fn is_tombstone(hashes: &[BlockHash]) -> bool {
    hashes.len() == 1 && hashes[0] == TOMBSTONE_HASH
}

/// The tombstone block hash list, as a fresh owned `Vec`.
pub fn tombstone_list() -> BlockHashList {
    vec![TOMBSTONE_HASH.to_string()]
}

/// Hash raw bytes the same way block identity is computed everywhere else.
pub fn hash_bytes(bytes: &[u8]) -> BlockHash {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// An immutable, content-addressed byte block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub data: Vec<u8>,
}

impl Block {
    pub fn new(data: Vec<u8>) -> Self {
        Block { data }
    }

    /// This block's identity: `H(data)`.
    pub fn hash(&self) -> BlockHash {
        hash_bytes(&self.data)
    }
}

/// A replica's monotonically non-decreasing election term.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Term(pub i64);

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Term {
    pub const ZERO: Term = Term(0);

    pub fn next(self) -> Term {
        Term(self.0 + 1)
    }
}

/// Identity of a peer replica within a cluster, independent of its network
/// address, so replication cursors can be keyed by identity rather than by
/// comparing host:port strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ReplicaId(pub usize);

impl fmt::Display for ReplicaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "replica-{}", self.0)
    }
}

/// A file's version and the ordered list of blocks that make up its content.
///
/// Version starts at 1 on first create and increases by exactly 1 per
/// accepted update. A tombstone block hash list is just another value here;
/// deletion is an update, not a removal of the entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetaData {
    pub filename: String,
    pub version: i32,
    pub block_hash_list: BlockHashList,
}

impl FileMetaData {
    pub fn new(filename: impl Into<String>, version: i32, block_hash_list: BlockHashList) -> Self {
        FileMetaData {
            filename: filename.into(),
            version,
            block_hash_list,
        }
    }

    pub fn is_tombstone(&self) -> bool {
        is_tombstone(&self.block_hash_list)
    }
}

/// Sentinel returned by `UpdateFile` in place of a version when the update is
/// rejected for a version mismatch.
pub const VERSION_MISMATCH: i32 = -1;

/// filename -> FileMetaData snapshot, as served by the metadata store and
/// persisted client-side as the sync engine's index file.
pub type FileInfoMap = HashMap<String, FileMetaData>;

/// A single entry in the replicated log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub term: Term,
    pub file_meta_data: FileMetaData,
}
