//! Game session
//!
//! The caller side of sync: keeps the player's current progress, mirrors it
//! to the local save so play continues offline, and pushes or pulls the
//! current snapshot through the coordinator.

use crate::error::{Result, SyncError};
use crate::save::{LocalSave, SaveRecord};
use crate::storage::SnapshotMetadata;
use crate::sync::{SnapshotChoice, SyncCoordinator};

/// One player's progress bound to a snapshot name.
///
/// Every flow takes `&mut self`, so a session never has two syncs in
/// flight. The offline copy is kept per snapshot name (see
/// [`LocalSave::for_slot`]).
pub struct GameSession {
    coordinator: SyncCoordinator,
    local_base: LocalSave,
    record: SaveRecord,
    save_name: String,
    loaded: bool,
}

impl GameSession {
    /// Start a session from the local save, before any remote sync
    pub async fn open(
        coordinator: SyncCoordinator,
        local_base: LocalSave,
        save_name: impl Into<String>,
    ) -> Result<Self> {
        let save_name = save_name.into();
        let local = local_base.for_slot(&save_name);
        let record = local.read().await.map_err(SyncError::LocalSave)?;

        tracing::info!(
            save_name = %save_name,
            path = %local.path().display(),
            stars = record.total_stars(),
            "Session started from local save"
        );

        Ok(Self {
            coordinator,
            local_base,
            record,
            save_name,
            loaded: false,
        })
    }

    pub fn record(&self) -> &SaveRecord {
        &self.record
    }

    pub fn save_name(&self) -> &str {
        &self.save_name
    }

    /// Offline copy of the current snapshot
    pub fn local(&self) -> LocalSave {
        self.local_base.for_slot(&self.save_name)
    }

    /// Whether remote progress has been pulled at least once
    pub fn has_loaded(&self) -> bool {
        self.loaded
    }

    /// Record a finished level, keep it locally, then push it.
    ///
    /// The local save is written first, so a failed push loses nothing.
    pub async fn complete_level(
        &mut self,
        world: u32,
        level: u32,
        stars: i32,
        cover_image: Option<Vec<u8>>,
    ) -> Result<SnapshotMetadata> {
        self.record.set_stars(world, level, stars);
        self.persist_local().await?;
        self.save(cover_image).await
    }

    /// Push current progress to the current snapshot
    pub async fn save(&mut self, cover_image: Option<Vec<u8>>) -> Result<SnapshotMetadata> {
        let result = self
            .coordinator
            .save(&self.save_name, &self.record, cover_image)
            .await;

        if let Err(e) = &result {
            tracing::warn!(
                save_name = %self.save_name,
                status = ?e.status(),
                "Save failed, progress kept locally"
            );
        }
        result
    }

    /// Pull the current snapshot and fold it into local progress
    pub async fn sync(&mut self) -> Result<()> {
        let remote = self.load_remote(&self.save_name).await?;
        self.loaded = true;
        self.record = self.record.merge(&remote);
        self.persist_local().await
    }

    /// Apply the player's snapshot choice.
    ///
    /// The session only moves to the new name once the switch succeeds; on
    /// error it stays on the current snapshot with its progress untouched.
    pub async fn switch_to(&mut self, choice: SnapshotChoice) -> Result<()> {
        match choice {
            SnapshotChoice::Load(name) => {
                let remote = self.load_remote(&name).await?;
                self.save_name = name;
                self.record = remote;
                self.loaded = true;
                self.persist_local().await
            }
            SnapshotChoice::Create(name) => {
                self.coordinator.save(&name, &self.record, None).await?;
                self.save_name = name;
                self.persist_local().await
            }
            SnapshotChoice::Cancelled => Ok(()),
        }
    }

    async fn load_remote(&self, name: &str) -> Result<SaveRecord> {
        self.coordinator.load(name).await.map_err(|e| {
            tracing::warn!(
                save_name = %name,
                status = ?e.status(),
                error = %e,
                "Load failed, keeping local progress"
            );
            e
        })
    }

    async fn persist_local(&self) -> Result<()> {
        self.local()
            .write(&self.record)
            .await
            .map_err(SyncError::LocalSave)
    }
}
