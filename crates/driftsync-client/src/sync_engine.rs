//! Component C5: the client-side three-way reconciliation sync engine.
//!
//! Reconciliation is split into a pure decision layer (`decide_local_action`,
//! `decide_remote_action`) and an imperative driver (`SyncEngine::sync`) that
//! walks the three maps — working directory, index file, remote — and calls
//! the decisions out to disk and network. Keeping the decisions pure makes
//! the full case table testable without a filesystem or a cluster.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use driftsync_block::BlockStoreClient;
use driftsync_core::{
    tombstone_list, Block, BlockHash, BlockHashList, FileInfoMap, FileMetaData, SyncError,
};

use crate::cluster_client::ClusterClient;
use crate::index_file::{self, DEFAULT_META_FILENAME};

/// What phase A (local vs. index) decides for one filename.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalAction {
    NoOp,
    Create,
    Modify,
    Delete,
}

/// `index` is the index file's current entry for this name, if any; `local`
/// is the hash list freshly computed from the working directory, if the file
/// is present there.
pub fn decide_local_action(
    index: Option<&FileMetaData>,
    local: Option<&BlockHashList>,
) -> LocalAction {
    match (index, local) {
        (None, None) => LocalAction::NoOp,
        (None, Some(_)) => LocalAction::Create,
        (Some(i), None) => {
            if i.is_tombstone() {
                LocalAction::NoOp
            } else {
                LocalAction::Delete
            }
        }
        (Some(i), Some(local)) => {
            if &i.block_hash_list == local {
                LocalAction::NoOp
            } else {
                LocalAction::Modify
            }
        }
    }
}

/// What phase B (index vs. remote) decides for one filename.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteAction {
    NoOp,
    /// Local and remote content agree; only the version number needs to
    /// catch up to remote's.
    AdoptVersionOnly,
    /// Remote wins; adopt its metadata. `download` is false for a tombstone.
    AdoptRemote { download: bool },
    /// Index is one version ahead of remote; push it.
    PushLocal,
}

pub fn decide_remote_action(
    index: Option<&FileMetaData>,
    remote: Option<&FileMetaData>,
) -> RemoteAction {
    match (index, remote) {
        (None, None) => RemoteAction::NoOp,
        (Some(_), None) => RemoteAction::PushLocal,
        (None, Some(r)) => RemoteAction::AdoptRemote {
            download: !r.is_tombstone(),
        },
        (Some(i), Some(r)) => {
            if i.block_hash_list == r.block_hash_list {
                if i.version != r.version {
                    RemoteAction::AdoptVersionOnly
                } else {
                    RemoteAction::NoOp
                }
            } else if i.version == r.version + 1 {
                RemoteAction::PushLocal
            } else {
                // Covers both "remote is strictly ahead" and any state this
                // replica's local bookkeeping can't have produced on its own;
                // remote is always the side to trust when index isn't
                // exactly one push ahead of it.
                RemoteAction::AdoptRemote {
                    download: !r.is_tombstone(),
                }
            }
        }
    }
}

pub struct SyncEngine {
    cluster: ClusterClient,
    base_dir: PathBuf,
    block_size: usize,
    index_path: PathBuf,
}

impl SyncEngine {
    pub fn new(cluster: ClusterClient, base_dir: PathBuf, block_size: usize) -> Self {
        let index_path = base_dir.join(DEFAULT_META_FILENAME);
        SyncEngine {
            cluster,
            base_dir,
            block_size,
            index_path,
        }
    }

    pub async fn sync(&self) -> Result<(), SyncError> {
        let (local_hashes, local_blocks) = scan_working_dir(&self.base_dir, &self.index_path, self.block_size)?;
        let mut index = index_file::load(&self.index_path)?;

        reconcile_local(&local_hashes, &mut index);

        let remote = self.cluster.get_file_info_map().await?;
        let mut block_client = self.cluster.connect_block_store().await?;

        let mut names: Vec<String> = remote.keys().cloned().collect();
        for name in &names {
            self.reconcile_one(name, &mut index, &remote, &local_blocks, &mut block_client)
                .await?;
        }

        names = index.keys().cloned().collect();
        for name in names {
            if name == DEFAULT_META_FILENAME || remote.contains_key(&name) {
                continue;
            }
            self.push_new_entry(&name, &mut index, &local_blocks, &mut block_client)
                .await?;
        }

        index_file::save(&self.index_path, &index)?;
        Ok(())
    }

    async fn reconcile_one(
        &self,
        name: &str,
        index: &mut FileInfoMap,
        remote: &FileInfoMap,
        local_blocks: &HashMap<BlockHash, Block>,
        block_client: &mut BlockStoreClient,
    ) -> Result<(), SyncError> {
        let remote_meta = remote.get(name);
        let action = decide_remote_action(index.get(name), remote_meta);
        match action {
            RemoteAction::NoOp => {}
            RemoteAction::AdoptVersionOnly => {
                if let (Some(entry), Some(r)) = (index.get_mut(name), remote_meta) {
                    entry.version = r.version;
                }
            }
            RemoteAction::AdoptRemote { download } => {
                let r = remote_meta.expect("AdoptRemote implies a remote entry").clone();
                if download {
                    fetch_and_write(&self.base_dir, &r, block_client).await?;
                } else {
                    remove_if_present(&self.base_dir, name)?;
                }
                index.insert(name.to_string(), r);
            }
            RemoteAction::PushLocal => {
                self.push_pending(name, index, remote, local_blocks, block_client)
                    .await?;
            }
        }
        Ok(())
    }

    async fn push_new_entry(
        &self,
        name: &str,
        index: &mut FileInfoMap,
        local_blocks: &HashMap<BlockHash, Block>,
        block_client: &mut BlockStoreClient,
    ) -> Result<(), SyncError> {
        let empty = FileInfoMap::new();
        self.push_pending(name, index, &empty, local_blocks, block_client)
            .await
    }

    /// Upload any missing blocks and call `UpdateFile` for `name`'s current
    /// index entry. On a version-mismatch reply, re-fetches the authoritative
    /// remote entry for this one file and adopts it.
    async fn push_pending(
        &self,
        name: &str,
        index: &mut FileInfoMap,
        remote_hint: &FileInfoMap,
        local_blocks: &HashMap<BlockHash, Block>,
        block_client: &mut BlockStoreClient,
    ) -> Result<(), SyncError> {
        let pending = index
            .get(name)
            .expect("push_pending called with an index entry present")
            .clone();

        if !pending.is_tombstone() {
            upload_missing_blocks(&pending.block_hash_list, local_blocks, block_client).await?;
        }

        let version = self.cluster.update_file(&pending).await?;
        if version != driftsync_core::VERSION_MISMATCH {
            return Ok(());
        }

        let authoritative = match remote_hint.get(name) {
            Some(meta) => meta.clone(),
            None => {
                let refreshed = self.cluster.get_file_info_map().await?;
                refreshed
                    .get(name)
                    .cloned()
                    .unwrap_or_else(|| pending.clone())
            }
        };

        if authoritative.is_tombstone() {
            remove_if_present(&self.base_dir, name)?;
        } else {
            fetch_and_write(&self.base_dir, &authoritative, block_client).await?;
        }
        index.insert(name.to_string(), authoritative);
        Ok(())
    }
}

/// Apply phase A (local vs. index) to every name the working directory or
/// the index currently mentions, mutating `index` in place.
fn reconcile_local(local: &HashMap<String, BlockHashList>, index: &mut FileInfoMap) {
    let mut names: Vec<String> = local.keys().chain(index.keys()).cloned().collect();
    names.sort();
    names.dedup();

    for name in names {
        let action = decide_local_action(index.get(&name), local.get(&name));
        match action {
            LocalAction::NoOp => {}
            LocalAction::Create => {
                let hashes = local.get(&name).expect("Create implies a local entry").clone();
                index.insert(name.clone(), FileMetaData::new(name, 1, hashes));
            }
            LocalAction::Modify => {
                let hashes = local.get(&name).expect("Modify implies a local entry").clone();
                let entry = index.get_mut(&name).expect("Modify implies an index entry");
                entry.version += 1;
                entry.block_hash_list = hashes;
            }
            LocalAction::Delete => {
                let entry = index.get_mut(&name).expect("Delete implies an index entry");
                entry.version += 1;
                entry.block_hash_list = tombstone_list();
            }
        }
    }
}

/// Read every regular file in `dir` other than the index file, chunking each
/// into `block_size`-byte blocks. Returns the per-file ordered hash list and
/// a global hash -> block map for upload.
fn scan_working_dir(
    dir: &Path,
    index_path: &Path,
    block_size: usize,
) -> Result<(HashMap<String, BlockHashList>, HashMap<BlockHash, Block>), SyncError> {
    let mut hashes = HashMap::new();
    let mut blocks = HashMap::new();

    let entries = std::fs::read_dir(dir)
        .map_err(|e| SyncError::from_io_error(e, format!("reading directory {}", dir.display())))?;

    for entry in entries {
        let entry = entry.map_err(|e| SyncError::from_io_error(e, "reading directory entry"))?;
        let path = entry.path();
        if path == index_path || !path.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        let contents = std::fs::read(&path)
            .map_err(|e| SyncError::from_io_error(e, format!("reading file {}", path.display())))?;

        // An empty file yields zero chunks here, so it gets an empty hash list
        // rather than a hash of the empty byte string.
        let mut file_hashes = Vec::new();
        for chunk in contents.chunks(block_size.max(1)) {
            let block = Block::new(chunk.to_vec());
            let hash = block.hash();
            file_hashes.push(hash.clone());
            blocks.insert(hash, block);
        }
        hashes.insert(name, file_hashes);
    }

    Ok((hashes, blocks))
}

async fn upload_missing_blocks(
    hashes: &[BlockHash],
    local_blocks: &HashMap<BlockHash, Block>,
    block_client: &mut BlockStoreClient,
) -> Result<(), SyncError> {
    let missing = block_client.has_blocks(hashes).await?;
    for hash in missing {
        if let Some(block) = local_blocks.get(&hash) {
            block_client.put_block(block.clone()).await?;
        }
    }
    Ok(())
}

async fn fetch_and_write(
    base_dir: &Path,
    meta: &FileMetaData,
    block_client: &mut BlockStoreClient,
) -> Result<(), SyncError> {
    let path = base_dir.join(&meta.filename);
    let mut contents = Vec::new();
    for hash in &meta.block_hash_list {
        if hash == driftsync_core::TOMBSTONE_HASH {
            continue;
        }
        let block = block_client.get_block(hash).await?;
        contents.extend_from_slice(&block.data);
    }
    std::fs::write(&path, contents)
        .map_err(|e| SyncError::from_io_error(e, format!("writing file {}", path.display())))
}

fn remove_if_present(base_dir: &Path, name: &str) -> Result<(), SyncError> {
    let path = base_dir.join(name);
    match std::fs::remove_file(&path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(SyncError::from_io_error(e, format!("removing file {}", path.display()))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(version: i32, hashes: &[&str]) -> FileMetaData {
        FileMetaData::new("a.txt", version, hashes.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn local_action_create_when_absent_from_index() {
        let local = vec!["h1".to_string()];
        assert_eq!(decide_local_action(None, Some(&local)), LocalAction::Create);
    }

    #[test]
    fn local_action_noop_when_unchanged() {
        let index = meta(1, &["h1"]);
        let local = vec!["h1".to_string()];
        assert_eq!(decide_local_action(Some(&index), Some(&local)), LocalAction::NoOp);
    }

    #[test]
    fn local_action_modify_on_hash_change() {
        let index = meta(1, &["h1"]);
        let local = vec!["h2".to_string()];
        assert_eq!(decide_local_action(Some(&index), Some(&local)), LocalAction::Modify);
    }

    #[test]
    fn local_action_delete_when_missing_locally() {
        let index = meta(1, &["h1"]);
        assert_eq!(decide_local_action(Some(&index), None), LocalAction::Delete);
    }

    #[test]
    fn local_action_does_not_re_tombstone() {
        let index = meta(2, &["0"]);
        assert_eq!(decide_local_action(Some(&index), None), LocalAction::NoOp);
    }

    #[test]
    fn remote_action_push_when_index_is_one_ahead() {
        let index = meta(2, &["h2"]);
        let remote = meta(1, &["h1"]);
        assert_eq!(decide_remote_action(Some(&index), Some(&remote)), RemoteAction::PushLocal);
    }

    #[test]
    fn remote_action_adopt_when_remote_is_ahead() {
        let index = meta(1, &["h1"]);
        let remote = meta(2, &["h2"]);
        assert_eq!(
            decide_remote_action(Some(&index), Some(&remote)),
            RemoteAction::AdoptRemote { download: true }
        );
    }

    #[test]
    fn remote_action_adopt_tombstone_does_not_download() {
        let index = meta(1, &["h1"]);
        let remote = meta(2, &["0"]);
        assert_eq!(
            decide_remote_action(Some(&index), Some(&remote)),
            RemoteAction::AdoptRemote { download: false }
        );
    }

    #[test]
    fn remote_action_version_catch_up_when_content_matches() {
        let index = meta(1, &["h1"]);
        let remote = meta(3, &["h1"]);
        assert_eq!(decide_remote_action(Some(&index), Some(&remote)), RemoteAction::AdoptVersionOnly);
    }

    #[test]
    fn remote_action_new_remote_file_is_adopted() {
        let remote = meta(1, &["h1"]);
        assert_eq!(
            decide_remote_action(None, Some(&remote)),
            RemoteAction::AdoptRemote { download: true }
        );
    }

    #[test]
    fn remote_action_new_local_only_file_is_pushed() {
        let index = meta(1, &["h1"]);
        assert_eq!(decide_remote_action(Some(&index), None), RemoteAction::PushLocal);
    }

    #[test]
    fn scan_working_dir_gives_empty_file_an_empty_hash_list() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("empty.txt"), b"").unwrap();
        let index_path = dir.path().join(DEFAULT_META_FILENAME);

        let (hashes, blocks) = scan_working_dir(dir.path(), &index_path, 4).unwrap();

        assert_eq!(hashes.get("empty.txt"), Some(&Vec::new()));
        assert!(blocks.is_empty());
    }
}
