//! Conflict resolution
//!
//! Decides what to submit back to the store when two devices have written
//! divergent revisions of the same snapshot.

use serde::{Deserialize, Serialize};

use crate::save::SaveRecord;
use crate::storage::SnapshotConflict;

/// How to settle a conflicted snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionPolicy {
    /// Keep whichever revision was modified last, wholesale
    NewestWins,
    /// Keep the best rating of each level across both revisions
    #[default]
    MergeStars,
}

impl std::str::FromStr for ResolutionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "newest" | "newest_wins" => Ok(ResolutionPolicy::NewestWins),
            "merge" | "merge_stars" => Ok(ResolutionPolicy::MergeStars),
            other => Err(format!("unknown resolution policy '{}'", other)),
        }
    }
}

/// Conflict resolver with a configurable policy
#[derive(Debug, Clone, Copy, Default)]
pub struct ConflictResolver {
    policy: ResolutionPolicy,
}

impl ConflictResolver {
    pub fn new(policy: ResolutionPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> ResolutionPolicy {
        self.policy
    }

    /// Resolve a conflict and return the contents to resubmit
    pub fn resolve(&self, conflict: &SnapshotConflict) -> ResolvedConflict {
        let primary = &conflict.primary;
        let conflicting = &conflict.conflicting;

        match self.policy {
            ResolutionPolicy::NewestWins => {
                // Ties go to the primary
                if primary.last_modified < conflicting.last_modified {
                    ResolvedConflict {
                        winner: ConflictWinner::Conflicting,
                        contents: conflicting.contents.clone(),
                    }
                } else {
                    ResolvedConflict {
                        winner: ConflictWinner::Primary,
                        contents: primary.contents.clone(),
                    }
                }
            }
            ResolutionPolicy::MergeStars => {
                let merged = SaveRecord::from_bytes(&primary.contents)
                    .merge(&SaveRecord::from_bytes(&conflicting.contents));
                ResolvedConflict {
                    winner: ConflictWinner::Merged,
                    contents: merged.to_bytes(),
                }
            }
        }
    }
}

/// Result of conflict resolution
#[derive(Debug, Clone)]
pub struct ResolvedConflict {
    pub winner: ConflictWinner,
    pub contents: Vec<u8>,
}

/// Which side won the conflict
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictWinner {
    Primary,
    Conflicting,
    Merged,
}
