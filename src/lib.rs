//! Starsync Library
//!
//! Cloud-synchronized star progress for a game with several worlds of
//! levels, each rated from 0 to 5 stars. Progress is kept in a snapshot
//! store shared across devices; when two devices diverge, the conflict is
//! resolved and resubmitted a bounded number of times.
//!
//! # Modules
//!
//! - `save`: Star progress records and the local offline copy
//! - `storage`: Snapshot store contract and backends
//! - `sync`: Conflict resolution and the load/save coordinator
//! - `session`: Caller-side flow tying progress, local save and sync together

pub mod config;
pub mod error;
pub mod save;
pub mod session;
pub mod storage;
pub mod sync;

pub use error::{Result, Status, StorageError, SyncError};
pub use save::{LocalSave, SaveRecord};
pub use session::GameSession;
pub use storage::{FsSnapshotStore, MemoryStore, SnapshotStore};
pub use sync::{ResolutionPolicy, SyncCoordinator};
