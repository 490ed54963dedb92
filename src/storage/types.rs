//! Snapshot storage types
//!
//! Defines what a storage backend hands back when a snapshot is opened:
//! - Opened snapshots with their payload
//! - Conflicts between two divergent revisions
//! - Metadata for commits and listings

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An opened snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotHandle {
    /// Unique snapshot name
    pub name: String,
    /// Backend revision this handle was opened from, `None` for a snapshot
    /// created by this open that has never been committed
    pub revision: Option<String>,
    /// When the revision was last written
    pub last_modified: DateTime<Utc>,
    /// Human readable description from the last commit
    pub description: String,
    /// Payload bytes
    pub contents: Vec<u8>,
}

impl SnapshotHandle {
    /// A freshly created snapshot with no committed revision
    pub fn new_empty(name: &str) -> Self {
        Self {
            name: name.to_string(),
            revision: None,
            last_modified: Utc::now(),
            description: String::new(),
            contents: Vec::new(),
        }
    }

    pub fn metadata(&self) -> SnapshotMetadata {
        SnapshotMetadata {
            name: self.name.clone(),
            description: self.description.clone(),
            last_modified: self.last_modified,
        }
    }
}

/// Two divergent revisions of one snapshot
#[derive(Debug, Clone)]
pub struct SnapshotConflict {
    /// Opaque id to pass back when resolving
    pub conflict_id: String,
    /// The revision the backend considers current
    pub primary: SnapshotHandle,
    /// The revision that diverged from it
    pub conflicting: SnapshotHandle,
}

/// Result of opening or resolving a snapshot
#[derive(Debug, Clone)]
pub enum OpenResult {
    Opened(SnapshotHandle),
    Conflict(SnapshotConflict),
}

/// Metadata written with a commit
#[derive(Debug, Clone, Default)]
pub struct SnapshotMetadataChange {
    pub description: Option<String>,
    /// Opaque image supplied by the UI
    pub cover_image: Option<Vec<u8>>,
}

impl SnapshotMetadataChange {
    /// Describe a save made now
    pub fn modified_now() -> Self {
        Self {
            description: Some(format!("Modified data at: {}", Utc::now().to_rfc2822())),
            cover_image: None,
        }
    }

    pub fn with_cover_image(mut self, image: Option<Vec<u8>>) -> Self {
        self.cover_image = image;
        self
    }
}

/// Listing entry for a stored snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    pub name: String,
    pub description: String,
    #[serde(rename = "lastModified")]
    pub last_modified: DateTime<Utc>,
}

/// What the player picked from the snapshot list
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotSelection {
    /// Load this existing snapshot
    Existing(String),
    /// Start a new snapshot
    CreateNew,
    /// Dismissed without choosing
    Cancelled,
}
