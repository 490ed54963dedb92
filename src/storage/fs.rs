//! Directory-backed snapshot storage
//!
//! Intended for a folder replicated between devices. Each snapshot is a
//! directory of revisions:
//!
//! ```text
//! <root>/<name>/<revision>.json   metadata, written last
//! <root>/<name>/<revision>.bin    payload
//! <root>/<name>/<revision>.cover  optional cover image
//! ```
//!
//! A device commits by writing a new revision and removing the one it
//! opened. When two devices commit from the same base, both revisions
//! survive replication and the next open reports a conflict between the
//! oldest two.

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::types::{
    OpenResult, SnapshotConflict, SnapshotHandle, SnapshotMetadata, SnapshotMetadataChange,
};
use super::{conflict_id, parse_conflict_id, SnapshotStore};
use crate::error::StorageError;

/// Revision metadata file
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RevisionMeta {
    revision: String,
    #[serde(rename = "lastModified")]
    last_modified: DateTime<Utc>,
    description: String,
    #[serde(rename = "hasCover", default)]
    has_cover: bool,
}

/// Snapshot store over a shared directory
#[derive(Debug, Clone)]
pub struct FsSnapshotStore {
    root: PathBuf,
}

impl FsSnapshotStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn snapshot_dir(&self, name: &str) -> Result<PathBuf, StorageError> {
        let valid = !name.is_empty()
            && name != "."
            && name != ".."
            && !name.contains(['/', '\\']);
        if !valid {
            return Err(StorageError::NotFound(format!("invalid snapshot name '{}'", name)));
        }
        Ok(self.root.join(name))
    }

    async fn check_root(&self) -> Result<(), StorageError> {
        match tokio::fs::metadata(&self.root).await {
            Ok(meta) if meta.is_dir() => Ok(()),
            _ => Err(StorageError::FolderUnavailable(self.root.display().to_string())),
        }
    }

    /// Revision metadata in a snapshot directory, oldest first
    async fn load_revisions(&self, dir: &Path) -> Result<Vec<RevisionMeta>, StorageError> {
        let mut entries = match tokio::fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut revisions = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }

            let bytes = tokio::fs::read(&path).await?;
            match serde_json::from_slice::<RevisionMeta>(&bytes) {
                Ok(meta) => revisions.push(meta),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable revision metadata");
                }
            }
        }

        revisions.sort_by(|a, b| {
            a.last_modified
                .cmp(&b.last_modified)
                .then_with(|| a.revision.cmp(&b.revision))
        });
        Ok(revisions)
    }

    async fn read_handle(
        &self,
        name: &str,
        dir: &Path,
        meta: &RevisionMeta,
    ) -> Result<SnapshotHandle, StorageError> {
        let payload_path = dir.join(format!("{}.bin", meta.revision));
        let contents = tokio::fs::read(&payload_path).await.map_err(|e| {
            StorageError::ContentsUnavailable(format!("{}: {}", payload_path.display(), e))
        })?;

        Ok(SnapshotHandle {
            name: name.to_string(),
            revision: Some(meta.revision.clone()),
            last_modified: meta.last_modified,
            description: meta.description.clone(),
            contents,
        })
    }

    async fn open_dir(&self, name: &str, dir: &Path) -> Result<Option<OpenResult>, StorageError> {
        let revisions = self.load_revisions(dir).await?;
        let result = match revisions.as_slice() {
            [] => None,
            [only] => Some(OpenResult::Opened(self.read_handle(name, dir, only).await?)),
            [primary, conflicting, ..] => {
                tracing::debug!(
                    name = %name,
                    revisions = revisions.len(),
                    "Divergent revisions found"
                );
                Some(OpenResult::Conflict(SnapshotConflict {
                    conflict_id: conflict_id(name, &primary.revision, &conflicting.revision),
                    primary: self.read_handle(name, dir, primary).await?,
                    conflicting: self.read_handle(name, dir, conflicting).await?,
                }))
            }
        };
        Ok(result)
    }

    async fn write_revision(
        &self,
        dir: &Path,
        contents: &[u8],
        description: String,
        cover_image: Option<&[u8]>,
    ) -> Result<RevisionMeta, StorageError> {
        tokio::fs::create_dir_all(dir).await?;

        let meta = RevisionMeta {
            revision: Uuid::new_v4().to_string(),
            last_modified: Utc::now(),
            description,
            has_cover: cover_image.is_some(),
        };

        tokio::fs::write(dir.join(format!("{}.bin", meta.revision)), contents).await?;
        if let Some(image) = cover_image {
            tokio::fs::write(dir.join(format!("{}.cover", meta.revision)), image).await?;
        }

        // Metadata makes the revision visible, so it goes last
        let json = serde_json::to_vec_pretty(&meta)
            .map_err(|e| StorageError::Io(io::Error::new(io::ErrorKind::InvalidData, e)))?;
        let tmp = dir.join(format!("{}.json.tmp", meta.revision));
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, dir.join(format!("{}.json", meta.revision))).await?;

        Ok(meta)
    }

    async fn remove_revision(&self, dir: &Path, revision: &str) -> Result<(), StorageError> {
        for ext in ["json", "bin", "cover"] {
            match tokio::fs::remove_file(dir.join(format!("{}.{}", revision, ext))).await {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    /// Cover image stored with the current revision
    pub async fn cover_image(&self, name: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let dir = self.snapshot_dir(name)?;
        let revisions = self.load_revisions(&dir).await?;
        let Some(meta) = revisions.last() else {
            return Ok(None);
        };
        if !meta.has_cover {
            return Ok(None);
        }
        Ok(Some(
            tokio::fs::read(dir.join(format!("{}.cover", meta.revision))).await?,
        ))
    }
}

#[async_trait]
impl SnapshotStore for FsSnapshotStore {
    async fn open(&self, name: &str, create_if_missing: bool) -> Result<OpenResult, StorageError> {
        self.check_root().await?;
        let dir = self.snapshot_dir(name)?;

        match self.open_dir(name, &dir).await? {
            Some(result) => Ok(result),
            None if create_if_missing => Ok(OpenResult::Opened(SnapshotHandle::new_empty(name))),
            None => Err(StorageError::NotFound(name.to_string())),
        }
    }

    async fn resolve_conflict(
        &self,
        conflict_id: &str,
        contents: &[u8],
    ) -> Result<OpenResult, StorageError> {
        self.check_root().await?;
        let (name, primary, conflicting) = parse_conflict_id(conflict_id)?;
        let dir = self.snapshot_dir(name)?;

        let revisions = self.load_revisions(&dir).await?;
        let description = revisions
            .iter()
            .find(|meta| meta.revision == primary)
            .map(|meta| meta.description.clone())
            .ok_or_else(|| StorageError::NotFound(format!("revision {}", primary)))?;
        if !revisions.iter().any(|meta| meta.revision == conflicting) {
            return Err(StorageError::NotFound(format!("revision {}", conflicting)));
        }

        let resolved = self.write_revision(&dir, contents, description, None).await?;
        self.remove_revision(&dir, primary).await?;
        self.remove_revision(&dir, conflicting).await?;

        tracing::debug!(
            name = %name,
            revision = %resolved.revision,
            "Conflict resolved on disk"
        );

        self.open_dir(name, &dir)
            .await?
            .ok_or_else(|| StorageError::NotFound(name.to_string()))
    }

    async fn commit(
        &self,
        handle: &SnapshotHandle,
        contents: &[u8],
        change: &SnapshotMetadataChange,
    ) -> Result<SnapshotMetadata, StorageError> {
        self.check_root().await?;
        let dir = self.snapshot_dir(&handle.name)?;

        let description = change
            .description
            .clone()
            .unwrap_or_else(|| handle.description.clone());
        let meta = self
            .write_revision(&dir, contents, description, change.cover_image.as_deref())
            .await?;

        if let Some(base) = &handle.revision {
            self.remove_revision(&dir, base).await?;
        }

        tracing::debug!(
            name = %handle.name,
            revision = %meta.revision,
            bytes = contents.len(),
            "Snapshot committed"
        );

        Ok(SnapshotMetadata {
            name: handle.name.clone(),
            description: meta.description,
            last_modified: meta.last_modified,
        })
    }

    async fn list(&self, max_count: usize) -> Result<Vec<SnapshotMetadata>, StorageError> {
        self.check_root().await?;

        let mut listed = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };

            let revisions = self.load_revisions(&entry.path()).await?;
            if let Some(newest) = revisions.last() {
                listed.push(SnapshotMetadata {
                    name,
                    description: newest.description.clone(),
                    last_modified: newest.last_modified,
                });
            }
        }

        listed.sort_by(|a, b| b.last_modified.cmp(&a.last_modified));
        listed.truncate(max_count);
        Ok(listed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn opened(store: &FsSnapshotStore, name: &str) -> SnapshotHandle {
        match store.open(name, true).await.unwrap() {
            OpenResult::Opened(handle) => handle,
            OpenResult::Conflict(_) => panic!("unexpected conflict"),
        }
    }

    #[tokio::test]
    async fn test_missing_root_is_unavailable() {
        let temp_dir = TempDir::new().unwrap();
        let store = FsSnapshotStore::new(temp_dir.path().join("gone"));

        assert!(matches!(
            store.open("slot", true).await,
            Err(StorageError::FolderUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_open_missing_snapshot() {
        let temp_dir = TempDir::new().unwrap();
        let store = FsSnapshotStore::new(temp_dir.path());

        assert!(matches!(
            store.open("slot", false).await,
            Err(StorageError::NotFound(_))
        ));
        assert!(matches!(
            store.open("../escape", true).await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_commit_and_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let store = FsSnapshotStore::new(temp_dir.path());

        let handle = opened(&store, "slot").await;
        let change = SnapshotMetadataChange::modified_now().with_cover_image(Some(vec![7, 7]));
        store.commit(&handle, b"first", &change).await.unwrap();

        let handle = opened(&store, "slot").await;
        assert_eq!(handle.contents, b"first");
        assert!(handle.description.starts_with("Modified data at: "));
        assert_eq!(store.cover_image("slot").await.unwrap(), Some(vec![7, 7]));

        store
            .commit(&handle, b"second", &SnapshotMetadataChange::default())
            .await
            .unwrap();
        let handle = opened(&store, "slot").await;
        assert_eq!(handle.contents, b"second");
        assert_eq!(store.cover_image("slot").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_concurrent_commits_conflict() {
        let temp_dir = TempDir::new().unwrap();
        let store = FsSnapshotStore::new(temp_dir.path());

        let base = opened(&store, "slot").await;
        store
            .commit(&base, b"base", &SnapshotMetadataChange::default())
            .await
            .unwrap();

        // Two devices open the same revision and both commit
        let device_a = opened(&store, "slot").await;
        let device_b = device_a.clone();
        store
            .commit(&device_a, b"from a", &SnapshotMetadataChange::default())
            .await
            .unwrap();
        store
            .commit(&device_b, b"from b", &SnapshotMetadataChange::default())
            .await
            .unwrap();

        let conflict = match store.open("slot", false).await.unwrap() {
            OpenResult::Conflict(conflict) => conflict,
            OpenResult::Opened(_) => panic!("expected conflict"),
        };
        assert_eq!(conflict.primary.contents, b"from a");
        assert_eq!(conflict.conflicting.contents, b"from b");

        match store
            .resolve_conflict(&conflict.conflict_id, b"merged")
            .await
            .unwrap()
        {
            OpenResult::Opened(handle) => assert_eq!(handle.contents, b"merged"),
            OpenResult::Conflict(_) => panic!("expected resolution"),
        }
    }

    #[tokio::test]
    async fn test_missing_payload_is_contents_unavailable() {
        let temp_dir = TempDir::new().unwrap();
        let store = FsSnapshotStore::new(temp_dir.path());

        let handle = opened(&store, "slot").await;
        store
            .commit(&handle, b"data", &SnapshotMetadataChange::default())
            .await
            .unwrap();
        let revision = opened(&store, "slot").await.revision.unwrap();
        std::fs::remove_file(temp_dir.path().join("slot").join(format!("{}.bin", revision)))
            .unwrap();

        assert!(matches!(
            store.open("slot", false).await,
            Err(StorageError::ContentsUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_list() {
        let temp_dir = TempDir::new().unwrap();
        let store = FsSnapshotStore::new(temp_dir.path());

        for name in ["one", "two", "three"] {
            let handle = opened(&store, name).await;
            store
                .commit(&handle, name.as_bytes(), &SnapshotMetadataChange::default())
                .await
                .unwrap();
        }

        let listed = store.list(5).await.unwrap();
        assert_eq!(listed.len(), 3);
        assert_eq!(listed[0].name, "three");
        assert_eq!(store.list(1).await.unwrap().len(), 1);
    }
}
