//! Sync module for cloud-replicated save data
//!
//! Provides:
//! - Conflict resolution between divergent snapshot revisions
//! - Load and save flows with bounded retries
//!
//! # Sync Protocol
//!
//! 1. Open the snapshot by name (creating it when saving)
//! 2. If the store reports a conflict, resolve it and resubmit
//! 3. Repeat until the snapshot opens cleanly or retries run out
//! 4. Read the payload (load) or commit the new payload (save)
//!
//! # Conflict Resolution
//!
//! - `MergeStars` keeps the best rating of each level from both revisions
//! - `NewestWins` keeps the most recently modified revision

mod conflict;
mod coordinator;

pub use conflict::{ConflictResolver, ConflictWinner, ResolutionPolicy, ResolvedConflict};
pub use coordinator::{
    new_snapshot_name, SnapshotChoice, SyncCoordinator, DEFAULT_SAVE_NAME, MAX_RETRIES,
    MAX_SNAPSHOTS_SHOWN,
};
