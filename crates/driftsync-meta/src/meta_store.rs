//! The unreplicated metadata store (component C2): filename -> FileMetaData,
//! with the monotonic version rule. [`ReplicatedMetaServer`] wraps this
//! behind the leader/follower log; this type never talks to peers itself.

use driftsync_core::{FileInfoMap, FileMetaData, VERSION_MISMATCH};
use parking_lot::RwLock;

/// `UpdateFile`'s outcome: either the new version, or the version-mismatch
/// sentinel. Never a transport error — a mismatch is a normal reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    Accepted { version: i32 },
    VersionMismatch,
}

impl UpdateOutcome {
    pub fn version(&self) -> i32 {
        match self {
            UpdateOutcome::Accepted { version } => *version,
            UpdateOutcome::VersionMismatch => VERSION_MISMATCH,
        }
    }
}

#[derive(Default)]
pub struct MetadataStore {
    files: RwLock<FileInfoMap>,
}

impl MetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> FileInfoMap {
        self.files.read().clone()
    }

    /// Apply `meta` if it obeys the monotonic version rule: version 1 for an
    /// unknown filename, else `current.version + 1`. Stores `meta` verbatim
    /// on success and leaves state untouched on mismatch.
    pub fn update_file(&self, meta: FileMetaData) -> UpdateOutcome {
        let mut files = self.files.write();
        let expected = files.get(&meta.filename).map(|f| f.version + 1).unwrap_or(1);
        if meta.version != expected {
            return UpdateOutcome::VersionMismatch;
        }
        let version = meta.version;
        files.insert(meta.filename.clone(), meta);
        UpdateOutcome::Accepted { version }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(filename: &str, version: i32, hashes: &[&str]) -> FileMetaData {
        FileMetaData::new(
            filename,
            version,
            hashes.iter().map(|s| s.to_string()).collect(),
        )
    }

    #[test]
    fn first_update_requires_version_one() {
        let store = MetadataStore::new();
        assert_eq!(
            store.update_file(meta("a.txt", 2, &["h1"])),
            UpdateOutcome::VersionMismatch
        );
        assert_eq!(
            store.update_file(meta("a.txt", 1, &["h1"])),
            UpdateOutcome::Accepted { version: 1 }
        );
    }

    #[test]
    fn subsequent_update_requires_exact_increment() {
        let store = MetadataStore::new();
        store.update_file(meta("a.txt", 1, &["h1"]));

        assert_eq!(
            store.update_file(meta("a.txt", 3, &["h2"])),
            UpdateOutcome::VersionMismatch
        );
        assert_eq!(
            store.update_file(meta("a.txt", 2, &["h2"])),
            UpdateOutcome::Accepted { version: 2 }
        );

        let snapshot = store.snapshot();
        assert_eq!(snapshot["a.txt"].block_hash_list, vec!["h2".to_string()]);
    }

    #[test]
    fn mismatch_does_not_mutate_state() {
        let store = MetadataStore::new();
        store.update_file(meta("a.txt", 1, &["h1"]));
        store.update_file(meta("a.txt", 5, &["bad"]));

        let snapshot = store.snapshot();
        assert_eq!(snapshot["a.txt"].version, 1);
        assert_eq!(snapshot["a.txt"].block_hash_list, vec!["h1".to_string()]);
    }

    #[test]
    fn version_mismatch_reports_sentinel() {
        assert_eq!(UpdateOutcome::VersionMismatch.version(), VERSION_MISMATCH);
    }
}
