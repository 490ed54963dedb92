//! Sync coordinator
//!
//! Opens snapshots through a [`SnapshotStore`], settles conflicts by
//! resubmitting resolved contents, and commits local progress.

use std::sync::Arc;

use tokio::task::JoinHandle;
use uuid::Uuid;

use super::conflict::{ConflictResolver, ResolutionPolicy};
use crate::config::SyncConfig;
use crate::error::{Result, SyncError};
use crate::save::SaveRecord;
use crate::storage::{
    OpenResult, SnapshotHandle, SnapshotMetadata, SnapshotMetadataChange, SnapshotPicker,
    SnapshotSelection, SnapshotStore,
};

/// Resubmissions allowed before giving up on a conflict
pub const MAX_RETRIES: u32 = 3;

/// Entries offered when the player picks a snapshot
pub const MAX_SNAPSHOTS_SHOWN: usize = 5;

/// Snapshot name used until the player picks another
pub const DEFAULT_SAVE_NAME: &str = "snapshotTemp";

/// Generate a unique name for a new snapshot
pub fn new_snapshot_name() -> String {
    format!("{}-{}", DEFAULT_SAVE_NAME, Uuid::new_v4().simple())
}

/// Outcome of asking the player for a snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotChoice {
    /// Load an existing snapshot
    Load(String),
    /// Start a new snapshot under this generated name
    Create(String),
    Cancelled,
}

/// Coordinates load and save flows against a snapshot store.
///
/// Callers must not run two flows for the same snapshot at once; the
/// coordinator holds no locks of its own.
#[derive(Clone)]
pub struct SyncCoordinator {
    inner: Arc<CoordinatorInner>,
}

struct CoordinatorInner {
    store: Arc<dyn SnapshotStore>,
    resolver: ConflictResolver,
    max_retries: u32,
}

impl SyncCoordinator {
    /// Create a coordinator with the default policy and retry bound
    pub fn new(store: Arc<dyn SnapshotStore>) -> Self {
        Self::with_policy(store, ResolutionPolicy::default(), MAX_RETRIES)
    }

    pub fn with_policy(
        store: Arc<dyn SnapshotStore>,
        policy: ResolutionPolicy,
        max_retries: u32,
    ) -> Self {
        Self {
            inner: Arc::new(CoordinatorInner {
                store,
                resolver: ConflictResolver::new(policy),
                max_retries,
            }),
        }
    }

    pub fn from_config(store: Arc<dyn SnapshotStore>, config: &SyncConfig) -> Self {
        Self::with_policy(store, config.resolution, config.max_retries)
    }

    pub fn store(&self) -> &dyn SnapshotStore {
        self.inner.store.as_ref()
    }

    pub fn policy(&self) -> ResolutionPolicy {
        self.inner.resolver.policy()
    }

    /// Load a snapshot.
    ///
    /// A missing snapshot is `NotFound`; the caller decides whether to fall
    /// back to local progress.
    pub async fn load(&self, name: &str) -> Result<SaveRecord> {
        let handle = self.open_resolved(name, false).await?;
        let record = SaveRecord::from_bytes(&handle.contents);

        tracing::info!(
            name = %name,
            stars = record.total_stars(),
            "Snapshot loaded"
        );
        Ok(record)
    }

    /// Save a record, creating the snapshot if needed.
    ///
    /// Nothing is written unless every conflict on the way was settled.
    pub async fn save(
        &self,
        name: &str,
        record: &SaveRecord,
        cover_image: Option<Vec<u8>>,
    ) -> Result<SnapshotMetadata> {
        let handle = self.open_resolved(name, true).await?;

        let change = SnapshotMetadataChange::modified_now().with_cover_image(cover_image);
        let metadata = self
            .inner
            .store
            .commit(&handle, &record.to_bytes(), &change)
            .await?;

        tracing::info!(
            name = %name,
            stars = record.total_stars(),
            "Snapshot saved"
        );
        Ok(metadata)
    }

    /// Run [`load`](Self::load) on a worker task
    pub fn spawn_load(&self, name: impl Into<String>) -> JoinHandle<Result<SaveRecord>> {
        let coordinator = self.clone();
        let name = name.into();
        tokio::spawn(async move { coordinator.load(&name).await })
    }

    /// Run [`save`](Self::save) on a worker task
    pub fn spawn_save(
        &self,
        name: impl Into<String>,
        record: SaveRecord,
        cover_image: Option<Vec<u8>>,
    ) -> JoinHandle<Result<SnapshotMetadata>> {
        let coordinator = self.clone();
        let name = name.into();
        tokio::spawn(async move { coordinator.save(&name, &record, cover_image).await })
    }

    /// Show stored snapshots to the player and return their choice
    pub async fn choose_snapshot(
        &self,
        picker: &dyn SnapshotPicker,
        title: &str,
        allow_add: bool,
        allow_delete: bool,
    ) -> Result<SnapshotChoice> {
        let snapshots = self.inner.store.list(MAX_SNAPSHOTS_SHOWN).await?;

        let choice = match picker.pick(title, &snapshots, allow_add, allow_delete) {
            SnapshotSelection::Existing(name) => SnapshotChoice::Load(name),
            SnapshotSelection::CreateNew if allow_add => SnapshotChoice::Create(new_snapshot_name()),
            SnapshotSelection::CreateNew => {
                tracing::warn!("Picker asked for a new snapshot where adding is not allowed");
                SnapshotChoice::Cancelled
            }
            SnapshotSelection::Cancelled => SnapshotChoice::Cancelled,
        };

        tracing::debug!(choice = ?choice, shown = snapshots.len(), "Snapshot chosen");
        Ok(choice)
    }

    /// Open a snapshot and settle any conflicts, resubmitting at most
    /// `max_retries` times.
    async fn open_resolved(&self, name: &str, create_if_missing: bool) -> Result<SnapshotHandle> {
        tracing::debug!(name = %name, create_if_missing, "Opening snapshot");
        let mut result = self.inner.store.open(name, create_if_missing).await?;
        let mut attempts = 0;

        loop {
            let conflict = match result {
                OpenResult::Opened(handle) => {
                    if attempts > 0 {
                        tracing::info!(name = %name, attempts, "Snapshot conflict resolved");
                    }
                    return Ok(handle);
                }
                OpenResult::Conflict(conflict) => conflict,
            };

            if attempts >= self.inner.max_retries {
                tracing::error!(name = %name, attempts, "Could not resolve snapshot conflicts");
                return Err(SyncError::ConflictUnresolved {
                    name: name.to_string(),
                    attempts,
                });
            }

            attempts += 1;
            let resolved = self.inner.resolver.resolve(&conflict);
            tracing::info!(
                name = %name,
                attempt = attempts,
                winner = ?resolved.winner,
                primary_modified = %conflict.primary.last_modified,
                conflicting_modified = %conflict.conflicting.last_modified,
                "Resubmitting conflicted snapshot"
            );

            result = self
                .inner
                .store
                .resolve_conflict(&conflict.conflict_id, &resolved.contents)
                .await?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Status, StorageError};
    use crate::storage::{FsSnapshotStore, MemoryStore, SnapshotConflict};
    use async_trait::async_trait;
    use chrono::{Duration, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Store whose every open and resolve reports a conflict
    #[derive(Default)]
    struct AlwaysConflicted {
        resolves: AtomicUsize,
        commits: AtomicUsize,
        fail_resolve: bool,
    }

    impl AlwaysConflicted {
        fn conflict() -> OpenResult {
            let mut primary = SnapshotHandle::new_empty("slot");
            primary.revision = Some("a".to_string());
            let mut conflicting = SnapshotHandle::new_empty("slot");
            conflicting.revision = Some("b".to_string());
            OpenResult::Conflict(SnapshotConflict {
                conflict_id: "slot:a:b".to_string(),
                primary,
                conflicting,
            })
        }
    }

    #[async_trait]
    impl SnapshotStore for AlwaysConflicted {
        async fn open(&self, _name: &str, _create: bool) -> std::result::Result<OpenResult, StorageError> {
            Ok(Self::conflict())
        }

        async fn resolve_conflict(
            &self,
            _conflict_id: &str,
            _contents: &[u8],
        ) -> std::result::Result<OpenResult, StorageError> {
            self.resolves.fetch_add(1, Ordering::SeqCst);
            if self.fail_resolve {
                return Err(StorageError::Transport("auth expired".to_string()));
            }
            Ok(Self::conflict())
        }

        async fn commit(
            &self,
            handle: &SnapshotHandle,
            _contents: &[u8],
            _change: &SnapshotMetadataChange,
        ) -> std::result::Result<SnapshotMetadata, StorageError> {
            self.commits.fetch_add(1, Ordering::SeqCst);
            Ok(handle.metadata())
        }

        async fn list(&self, _max: usize) -> std::result::Result<Vec<SnapshotMetadata>, StorageError> {
            Ok(Vec::new())
        }
    }

    struct FixedPicker(SnapshotSelection);

    impl SnapshotPicker for FixedPicker {
        fn pick(
            &self,
            _title: &str,
            snapshots: &[SnapshotMetadata],
            _allow_add: bool,
            _allow_delete: bool,
        ) -> SnapshotSelection {
            assert!(snapshots.len() <= MAX_SNAPSHOTS_SHOWN);
            self.0.clone()
        }
    }

    fn stars(world: u32, level: u32, count: i32) -> SaveRecord {
        let mut record = SaveRecord::new();
        record.set_stars(world, level, count);
        record
    }

    #[tokio::test]
    async fn test_load_missing_is_not_found() {
        let coordinator = SyncCoordinator::new(Arc::new(MemoryStore::new()));

        let result = coordinator.load("missing").await;
        assert!(matches!(result, Err(SyncError::NotFound(_))));
        assert_eq!(Status::of(&result), Status::NotFound);
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let store = MemoryStore::new();
        let coordinator = SyncCoordinator::new(Arc::new(store.clone()));
        let record = stars(2, 5, 3);

        let metadata = coordinator.save("slot", &record, Some(vec![9])).await.unwrap();
        assert!(metadata.description.starts_with("Modified data at: "));
        assert_eq!(store.cover_image("slot").await, Some(vec![9]));

        assert_eq!(coordinator.load("slot").await.unwrap(), record);
    }

    #[tokio::test]
    async fn test_one_shot_conflict_commits_record() {
        let store = MemoryStore::new();
        let coordinator =
            SyncCoordinator::with_policy(Arc::new(store.clone()), ResolutionPolicy::NewestWins, MAX_RETRIES);

        coordinator.save("slot", &stars(1, 1, 2), None).await.unwrap();
        store
            .inject_revision("slot", stars(1, 3, 1).to_bytes(), Utc::now() - Duration::hours(2))
            .await;

        let record = stars(1, 1, 4);
        let result = coordinator.save("slot", &record, None).await;

        assert_eq!(Status::of(&result), Status::Ok);
        assert_eq!(store.resolutions(), 1);
        assert_eq!(store.revision_count("slot").await, 1);
        assert_eq!(
            SaveRecord::from_bytes(&store.contents("slot").await.unwrap()),
            record
        );
    }

    #[tokio::test]
    async fn test_load_merges_conflicting_devices() {
        let store = MemoryStore::new();
        let coordinator = SyncCoordinator::new(Arc::new(store.clone()));

        coordinator.save("slot", &stars(1, 1, 5), None).await.unwrap();
        store
            .inject_revision("slot", stars(1, 2, 4).to_bytes(), Utc::now())
            .await;

        let loaded = coordinator.load("slot").await.unwrap();
        assert_eq!(loaded.stars(1, 1), 5);
        assert_eq!(loaded.stars(1, 2), 4);
        assert_eq!(store.resolutions(), 1);
    }

    #[tokio::test]
    async fn test_load_newest_wins_drops_older_device() {
        let store = MemoryStore::new();
        let coordinator =
            SyncCoordinator::with_policy(Arc::new(store.clone()), ResolutionPolicy::NewestWins, MAX_RETRIES);

        store
            .inject_revision("slot", stars(1, 1, 5).to_bytes(), Utc::now() - Duration::hours(1))
            .await;
        store
            .inject_revision("slot", stars(1, 2, 4).to_bytes(), Utc::now())
            .await;

        let loaded = coordinator.load("slot").await.unwrap();
        assert_eq!(loaded.stars(1, 1), 0);
        assert_eq!(loaded.stars(1, 2), 4);
    }

    #[tokio::test]
    async fn test_retries_are_bounded() {
        let store = Arc::new(AlwaysConflicted::default());
        let coordinator = SyncCoordinator::new(store.clone());

        let result = coordinator.save("slot", &stars(1, 1, 1), None).await;

        assert!(matches!(
            result,
            Err(SyncError::ConflictUnresolved { attempts: MAX_RETRIES, .. })
        ));
        assert_eq!(store.resolves.load(Ordering::SeqCst), MAX_RETRIES as usize);
        assert_eq!(store.commits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_many_divergent_revisions() {
        let store = MemoryStore::new();
        let coordinator = SyncCoordinator::new(Arc::new(store.clone()));
        for level in 1..=5 {
            store
                .inject_revision("slot", stars(1, level, 3).to_bytes(), Utc::now())
                .await;
        }

        // Five revisions need four resolutions; only three are allowed
        let result = coordinator.load("slot").await;
        assert_eq!(Status::of(&result), Status::ConflictUnresolved);
        assert_eq!(store.resolutions(), 3);

        // The next flow finishes the job and keeps every device's stars
        let loaded = coordinator.load("slot").await.unwrap();
        for level in 1..=5 {
            assert_eq!(loaded.stars(1, level), 3);
        }
        assert_eq!(store.resolutions(), 4);
    }

    #[tokio::test]
    async fn test_storage_errors_are_not_retried() {
        let store = Arc::new(AlwaysConflicted {
            fail_resolve: true,
            ..Default::default()
        });
        let coordinator = SyncCoordinator::new(store.clone());

        let result = coordinator.load("slot").await;
        assert_eq!(Status::of(&result), Status::TransportOrAuthError);
        assert_eq!(store.resolves.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unavailable_storage() {
        let store = MemoryStore::new();
        store.set_unavailable(true);
        let coordinator = SyncCoordinator::new(Arc::new(store));

        let result = coordinator.save("slot", &stars(1, 1, 1), None).await;
        assert_eq!(Status::of(&result), Status::StorageUnavailable);
    }

    #[tokio::test]
    async fn test_missing_snapshot_folder_is_unavailable() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let root = temp_dir.path().join("not-mounted");
        let coordinator = SyncCoordinator::new(Arc::new(FsSnapshotStore::new(&root)));

        let result = coordinator.load("slot").await;
        assert_eq!(Status::of(&result), Status::StorageUnavailable);

        let result = coordinator.save("slot", &stars(1, 1, 1), None).await;
        assert_eq!(Status::of(&result), Status::StorageUnavailable);
        assert!(!root.exists());
    }

    #[tokio::test]
    async fn test_spawned_flows() {
        let coordinator = SyncCoordinator::new(Arc::new(MemoryStore::new()));

        coordinator
            .spawn_save("slot", stars(4, 4, 4), None)
            .await
            .unwrap()
            .unwrap();
        let loaded = coordinator.spawn_load("slot").await.unwrap().unwrap();
        assert_eq!(loaded.stars(4, 4), 4);
    }

    #[tokio::test]
    async fn test_choose_snapshot() {
        let store = MemoryStore::new();
        let coordinator = SyncCoordinator::new(Arc::new(store.clone()));
        for i in 0..7 {
            coordinator
                .save(&format!("slot-{}", i), &stars(1, 1, 1), None)
                .await
                .unwrap();
        }

        let picker = FixedPicker(SnapshotSelection::Existing("slot-3".to_string()));
        let choice = coordinator
            .choose_snapshot(&picker, "Saved games", true, true)
            .await
            .unwrap();
        assert_eq!(choice, SnapshotChoice::Load("slot-3".to_string()));

        let picker = FixedPicker(SnapshotSelection::CreateNew);
        match coordinator.choose_snapshot(&picker, "Saved games", true, true).await.unwrap() {
            SnapshotChoice::Create(name) => assert!(name.starts_with("snapshotTemp-")),
            other => panic!("unexpected choice {:?}", other),
        }

        let choice = coordinator
            .choose_snapshot(&picker, "Load game", false, false)
            .await
            .unwrap();
        assert_eq!(choice, SnapshotChoice::Cancelled);
    }
}
