//! Snapshot storage backends
//!
//! The coordinator only talks to the [`SnapshotStore`] trait, so any cloud
//! save or peer sync service that can report conflicts on open can be
//! plugged in. Two backends ship with the crate:
//!
//! - [`MemoryStore`]: in-process, for tests and embedding
//! - [`FsSnapshotStore`]: a directory shared between devices

use async_trait::async_trait;

use crate::error::StorageError;

mod fs;
mod memory;
mod types;

pub use fs::FsSnapshotStore;
pub use memory::MemoryStore;
pub use types::*;

/// Snapshot storage backend trait
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Open a snapshot by name.
    ///
    /// With `create_if_missing` an unknown name opens as an empty snapshot
    /// that is persisted on first commit; without it the open fails with
    /// `NotFound`.
    async fn open(&self, name: &str, create_if_missing: bool) -> Result<OpenResult, StorageError>;

    /// Settle a conflict by submitting the contents to keep.
    ///
    /// Returns the snapshot as it stands afterwards, which may still be
    /// conflicted if more divergent revisions exist.
    async fn resolve_conflict(
        &self,
        conflict_id: &str,
        contents: &[u8],
    ) -> Result<OpenResult, StorageError>;

    /// Write new contents over an opened snapshot
    async fn commit(
        &self,
        handle: &SnapshotHandle,
        contents: &[u8],
        change: &SnapshotMetadataChange,
    ) -> Result<SnapshotMetadata, StorageError>;

    /// Stored snapshots, newest first
    async fn list(&self, max_count: usize) -> Result<Vec<SnapshotMetadata>, StorageError>;
}

/// UI side of the snapshot list: shows the entries and reports the choice
pub trait SnapshotPicker: Send + Sync {
    fn pick(
        &self,
        title: &str,
        snapshots: &[SnapshotMetadata],
        allow_add: bool,
        allow_delete: bool,
    ) -> SnapshotSelection;
}

/// Build a conflict id naming the snapshot and both revisions
fn conflict_id(name: &str, primary: &str, conflicting: &str) -> String {
    format!("{}:{}:{}", name, primary, conflicting)
}

/// Split a conflict id into (name, primary revision, conflicting revision)
fn parse_conflict_id(id: &str) -> Result<(&str, &str, &str), StorageError> {
    let mut parts = id.rsplitn(3, ':');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(conflicting), Some(primary), Some(name)) if !name.is_empty() => {
            Ok((name, primary, conflicting))
        }
        _ => Err(StorageError::NotFound(format!("conflict {}", id))),
    }
}
