//! In-memory snapshot storage
//!
//! Keeps every revision of every snapshot in process. Revisions are ordered
//! by arrival: the first is the primary, any further ones are divergent
//! copies that make the next open report a conflict.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::types::{
    OpenResult, SnapshotConflict, SnapshotHandle, SnapshotMetadata, SnapshotMetadataChange,
};
use super::{conflict_id, parse_conflict_id, SnapshotStore};
use crate::error::StorageError;

#[derive(Debug, Clone)]
struct Revision {
    id: String,
    last_modified: DateTime<Utc>,
    description: String,
    contents: Vec<u8>,
    cover_image: Option<Vec<u8>>,
}

impl Revision {
    fn new(contents: Vec<u8>, last_modified: DateTime<Utc>, description: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            last_modified,
            description,
            contents,
            cover_image: None,
        }
    }

    fn handle(&self, name: &str) -> SnapshotHandle {
        SnapshotHandle {
            name: name.to_string(),
            revision: Some(self.id.clone()),
            last_modified: self.last_modified,
            description: self.description.clone(),
            contents: self.contents.clone(),
        }
    }
}

/// In-process snapshot store
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<MemoryStoreInner>,
}

#[derive(Default)]
struct MemoryStoreInner {
    snapshots: RwLock<HashMap<String, Vec<Revision>>>,
    unavailable: AtomicBool,
    resolutions: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a revision as if another device had written it concurrently.
    ///
    /// Returns the new revision id.
    pub async fn inject_revision(
        &self,
        name: &str,
        contents: Vec<u8>,
        last_modified: DateTime<Utc>,
    ) -> String {
        let revision = Revision::new(contents, last_modified, "Written by another device".to_string());
        let id = revision.id.clone();

        let mut snapshots = self.inner.snapshots.write().await;
        snapshots.entry(name.to_string()).or_default().push(revision);
        id
    }

    /// Simulate the backing storage going away
    pub fn set_unavailable(&self, unavailable: bool) {
        self.inner.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of stored revisions for a snapshot
    pub async fn revision_count(&self, name: &str) -> usize {
        let snapshots = self.inner.snapshots.read().await;
        snapshots.get(name).map_or(0, Vec::len)
    }

    /// Contents of the primary revision
    pub async fn contents(&self, name: &str) -> Option<Vec<u8>> {
        let snapshots = self.inner.snapshots.read().await;
        snapshots
            .get(name)
            .and_then(|revs| revs.first())
            .map(|rev| rev.contents.clone())
    }

    /// Cover image of the primary revision
    pub async fn cover_image(&self, name: &str) -> Option<Vec<u8>> {
        let snapshots = self.inner.snapshots.read().await;
        snapshots
            .get(name)
            .and_then(|revs| revs.first())
            .and_then(|rev| rev.cover_image.clone())
    }

    /// How many conflict resolutions have been submitted
    pub fn resolutions(&self) -> usize {
        self.inner.resolutions.load(Ordering::SeqCst)
    }

    fn check_available(&self) -> Result<(), StorageError> {
        if self.inner.unavailable.load(Ordering::SeqCst) {
            return Err(StorageError::FolderUnavailable("memory store offline".to_string()));
        }
        Ok(())
    }

    fn open_revisions(name: &str, revisions: &[Revision]) -> Option<OpenResult> {
        match revisions {
            [] => None,
            [only] => Some(OpenResult::Opened(only.handle(name))),
            [primary, conflicting, ..] => Some(OpenResult::Conflict(SnapshotConflict {
                conflict_id: conflict_id(name, &primary.id, &conflicting.id),
                primary: primary.handle(name),
                conflicting: conflicting.handle(name),
            })),
        }
    }
}

#[async_trait]
impl SnapshotStore for MemoryStore {
    async fn open(&self, name: &str, create_if_missing: bool) -> Result<OpenResult, StorageError> {
        self.check_available()?;

        let snapshots = self.inner.snapshots.read().await;
        let opened = snapshots
            .get(name)
            .and_then(|revs| Self::open_revisions(name, revs));

        match opened {
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
        self.check_available()?;
        let (name, primary, conflicting) = parse_conflict_id(conflict_id)?;

        let mut snapshots = self.inner.snapshots.write().await;
        let revisions = snapshots
            .get_mut(name)
            .ok_or_else(|| StorageError::NotFound(name.to_string()))?;

        let description = revisions
            .iter()
            .find(|rev| rev.id == primary)
            .map(|rev| rev.description.clone())
            .ok_or_else(|| StorageError::NotFound(format!("revision {}", primary)))?;
        if !revisions.iter().any(|rev| rev.id == conflicting) {
            return Err(StorageError::NotFound(format!("revision {}", conflicting)));
        }

        revisions.retain(|rev| rev.id != primary && rev.id != conflicting);
        revisions.insert(0, Revision::new(contents.to_vec(), Utc::now(), description));
        self.inner.resolutions.fetch_add(1, Ordering::SeqCst);

        tracing::debug!(
            name = %name,
            remaining = revisions.len(),
            "Resolved conflict in memory store"
        );

        Self::open_revisions(name, revisions.as_slice())
            .ok_or_else(|| StorageError::NotFound(name.to_string()))
    }

    async fn commit(
        &self,
        handle: &SnapshotHandle,
        contents: &[u8],
        change: &SnapshotMetadataChange,
    ) -> Result<SnapshotMetadata, StorageError> {
        self.check_available()?;

        let mut revision = Revision::new(
            contents.to_vec(),
            Utc::now(),
            change
                .description
                .clone()
                .unwrap_or_else(|| handle.description.clone()),
        );
        revision.cover_image = change.cover_image.clone();
        let metadata = revision.handle(&handle.name).metadata();

        let mut snapshots = self.inner.snapshots.write().await;
        let revisions = snapshots.entry(handle.name.clone()).or_default();
        if let Some(base) = &handle.revision {
            revisions.retain(|rev| &rev.id != base);
        }
        revisions.push(revision);

        Ok(metadata)
    }

    async fn list(&self, max_count: usize) -> Result<Vec<SnapshotMetadata>, StorageError> {
        self.check_available()?;

        let snapshots = self.inner.snapshots.read().await;
        let mut listed: Vec<SnapshotMetadata> = snapshots
            .iter()
            .filter_map(|(name, revs)| {
                revs.iter()
                    .max_by_key(|rev| rev.last_modified)
                    .map(|rev| rev.handle(name).metadata())
            })
            .collect();

        listed.sort_by(|a, b| b.last_modified.cmp(&a.last_modified));
        listed.truncate(max_count);
        Ok(listed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    async fn opened(store: &MemoryStore, name: &str) -> SnapshotHandle {
        match store.open(name, true).await.unwrap() {
            OpenResult::Opened(handle) => handle,
            OpenResult::Conflict(_) => panic!("unexpected conflict"),
        }
    }

    #[tokio::test]
    async fn test_open_missing() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.open("nope", false).await,
            Err(StorageError::NotFound(_))
        ));

        let handle = opened(&store, "nope").await;
        assert!(handle.contents.is_empty());
        assert_eq!(store.revision_count("nope").await, 0);
    }

    #[tokio::test]
    async fn test_commit_replaces_base_revision() {
        let store = MemoryStore::new();
        let handle = opened(&store, "slot").await;
        store
            .commit(&handle, b"one", &SnapshotMetadataChange::modified_now())
            .await
            .unwrap();

        let handle = opened(&store, "slot").await;
        assert_eq!(handle.contents, b"one");
        store
            .commit(&handle, b"two", &SnapshotMetadataChange::default())
            .await
            .unwrap();

        assert_eq!(store.revision_count("slot").await, 1);
        assert_eq!(store.contents("slot").await.unwrap(), b"two");
    }

    #[tokio::test]
    async fn test_divergent_revision_conflicts_and_resolves() {
        let store = MemoryStore::new();
        let handle = opened(&store, "slot").await;
        store
            .commit(&handle, b"mine", &SnapshotMetadataChange::default())
            .await
            .unwrap();
        store
            .inject_revision("slot", b"theirs".to_vec(), Utc::now() - Duration::hours(1))
            .await;

        let conflict = match store.open("slot", false).await.unwrap() {
            OpenResult::Conflict(conflict) => conflict,
            OpenResult::Opened(_) => panic!("expected conflict"),
        };
        assert_eq!(conflict.primary.contents, b"mine");
        assert_eq!(conflict.conflicting.contents, b"theirs");

        let result = store
            .resolve_conflict(&conflict.conflict_id, b"settled")
            .await
            .unwrap();
        match result {
            OpenResult::Opened(handle) => assert_eq!(handle.contents, b"settled"),
            OpenResult::Conflict(_) => panic!("expected resolution"),
        }
        assert_eq!(store.resolutions(), 1);

        // A stale conflict id no longer matches anything
        assert!(store
            .resolve_conflict(&conflict.conflict_id, b"again")
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_unavailable() {
        let store = MemoryStore::new();
        store.set_unavailable(true);
        assert!(matches!(
            store.open("slot", true).await,
            Err(StorageError::FolderUnavailable(_))
        ));
        store.set_unavailable(false);
        assert!(store.open("slot", true).await.is_ok());
    }

    #[tokio::test]
    async fn test_list_newest_first() {
        let store = MemoryStore::new();
        let now = Utc::now();
        store.inject_revision("old", vec![], now - Duration::days(2)).await;
        store.inject_revision("new", vec![], now).await;
        store.inject_revision("mid", vec![], now - Duration::days(1)).await;

        let listed = store.list(2).await.unwrap();
        let names: Vec<&str> = listed.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["new", "mid"]);
    }
}
