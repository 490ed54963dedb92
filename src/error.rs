//! Error types for Starsync

use serde::Serialize;
use thiserror::Error;

/// Result type for sync flows
pub type Result<T> = std::result::Result<T, SyncError>;

/// Errors surfaced by the sync coordinator and game session
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Snapshot not found: {0}")]
    NotFound(String),

    #[error("Snapshot contents unavailable: {0}")]
    ContentsUnavailable(String),

    #[error("Snapshot storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Could not resolve snapshot conflicts for '{name}' after {attempts} attempts")]
    ConflictUnresolved { name: String, attempts: u32 },

    #[error("Transport or auth error: {0}")]
    TransportOrAuth(String),

    #[error("Local save error: {0}")]
    LocalSave(#[source] std::io::Error),

    #[error("Sync task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Storage backend errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Snapshot not found: {0}")]
    NotFound(String),

    #[error("Contents unavailable: {0}")]
    ContentsUnavailable(String),

    #[error("Snapshot folder unavailable: {0}")]
    FolderUnavailable(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<StorageError> for SyncError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(name) => SyncError::NotFound(name),
            StorageError::ContentsUnavailable(msg) => SyncError::ContentsUnavailable(msg),
            StorageError::FolderUnavailable(msg) => SyncError::StorageUnavailable(msg),
            StorageError::Transport(msg) => SyncError::TransportOrAuth(msg),
            StorageError::Io(e) => SyncError::StorageUnavailable(e.to_string()),
        }
    }
}

/// Outcome code handed to the UI collaborator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Ok,
    NotFound,
    ContentsUnavailable,
    StorageUnavailable,
    ConflictUnresolved,
    TransportOrAuthError,
    LocalSaveFailed,
    TaskFailed,
}

impl Status {
    /// Status of a finished flow
    pub fn of<T>(result: &Result<T>) -> Self {
        match result {
            Ok(_) => Status::Ok,
            Err(e) => e.status(),
        }
    }

    pub fn is_ok(self) -> bool {
        self == Status::Ok
    }
}

impl SyncError {
    /// Map this error onto the status taxonomy
    pub fn status(&self) -> Status {
        match self {
            SyncError::NotFound(_) => Status::NotFound,
            SyncError::ContentsUnavailable(_) => Status::ContentsUnavailable,
            SyncError::StorageUnavailable(_) => Status::StorageUnavailable,
            SyncError::ConflictUnresolved { .. } => Status::ConflictUnresolved,
            SyncError::TransportOrAuth(_) => Status::TransportOrAuthError,
            SyncError::LocalSave(_) => Status::LocalSaveFailed,
            SyncError::Task(_) => Status::TaskFailed,
        }
    }
}
