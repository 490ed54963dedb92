//! Star progress record
//!
//! Per-level star ratings across all worlds, with the byte encoding shared by
//! remote snapshots and the local offline copy.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// First world number
pub const WORLD_MIN: u32 = 1;
/// Last world number
pub const WORLD_MAX: u32 = 20;
/// Levels in every world, numbered from 1
pub const LEVELS_PER_WORLD: u32 = 12;
/// Best possible rating for a level
pub const MAX_STARS: u8 = 5;

/// Encoding version written into every blob
const FORMAT_VERSION: &str = "1.1";

/// A (world, level) coordinate
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LevelId {
    pub world: u32,
    pub level: u32,
}

impl LevelId {
    pub fn new(world: u32, level: u32) -> Self {
        Self { world, level }
    }

    /// Whether this coordinate lies on the world/level grid
    pub fn is_valid(&self) -> bool {
        (WORLD_MIN..=WORLD_MAX).contains(&self.world)
            && (1..=LEVELS_PER_WORLD).contains(&self.level)
    }

    fn key(&self) -> String {
        format!("{}-{}", self.world, self.level)
    }

    fn parse_key(key: &str) -> Option<Self> {
        let (world, level) = key.split_once('-')?;
        Some(Self::new(world.trim().parse().ok()?, level.trim().parse().ok()?))
    }
}

/// Star ratings for every level the player has cleared.
///
/// Levels never cleared have zero stars and are not stored, so equality
/// compares progress rather than history.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SaveRecord {
    levels: BTreeMap<LevelId, u8>,
}

/// Wire form of a record
#[derive(Serialize, Deserialize)]
struct SaveBlob {
    version: String,
    levels: BTreeMap<String, i64>,
}

impl SaveRecord {
    /// Create an empty record
    pub fn new() -> Self {
        Self::default()
    }

    /// Stars earned on a level, 0 if never cleared or off the grid
    pub fn stars(&self, world: u32, level: u32) -> u8 {
        self.levels
            .get(&LevelId::new(world, level))
            .copied()
            .unwrap_or(0)
    }

    /// Record a rating for a level, overwriting whatever was there.
    ///
    /// The value is clamped into `0..=5`. Returns `false` and leaves the
    /// record untouched when the coordinate is off the grid.
    pub fn set_stars(&mut self, world: u32, level: u32, stars: i32) -> bool {
        let id = LevelId::new(world, level);
        if !id.is_valid() {
            tracing::warn!(world, level, "Ignoring stars for level outside the grid");
            return false;
        }

        let stars = clamp_stars(stars.into());
        if stars == 0 {
            self.levels.remove(&id);
        } else {
            self.levels.insert(id, stars);
        }
        true
    }

    /// Stars for each level of a world, index 0 is level 1
    pub fn world_stars(&self, world: u32) -> [u8; LEVELS_PER_WORLD as usize] {
        let mut stars = [0u8; LEVELS_PER_WORLD as usize];
        for (i, slot) in stars.iter_mut().enumerate() {
            *slot = self.stars(world, i as u32 + 1);
        }
        stars
    }

    /// Sum of stars across all levels
    pub fn total_stars(&self) -> u32 {
        self.levels.values().map(|&s| u32::from(s)).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Cleared levels in world/level order
    pub fn levels(&self) -> impl Iterator<Item = (LevelId, u8)> + '_ {
        self.levels.iter().map(|(id, stars)| (*id, *stars))
    }

    /// Best of both records: every level keeps the higher rating.
    pub fn merge(&self, other: &SaveRecord) -> SaveRecord {
        let mut merged = self.clone();
        for (id, &stars) in &other.levels {
            let entry = merged.levels.entry(*id).or_insert(0);
            *entry = (*entry).max(stars);
        }
        merged
    }

    /// Encode for storage
    pub fn to_bytes(&self) -> Vec<u8> {
        let blob = SaveBlob {
            version: FORMAT_VERSION.to_string(),
            levels: self
                .levels
                .iter()
                .map(|(id, &stars)| (id.key(), i64::from(stars)))
                .collect(),
        };

        // A map of strings to integers always serializes
        serde_json::to_vec(&blob).unwrap_or_default()
    }

    /// Decode a stored record.
    ///
    /// Empty or unreadable bytes give an empty record, which is what a first
    /// run with no save looks like.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        if bytes.iter().all(|b| b.is_ascii_whitespace()) {
            return Self::new();
        }

        let blob: SaveBlob = match serde_json::from_slice(bytes) {
            Ok(blob) => blob,
            Err(e) => {
                tracing::warn!(error = %e, len = bytes.len(), "Unreadable save data, starting empty");
                return Self::new();
            }
        };

        if blob.version != FORMAT_VERSION {
            tracing::debug!(version = %blob.version, "Reading save data from another format version");
        }

        let mut record = Self::new();
        for (key, stars) in blob.levels {
            match LevelId::parse_key(&key) {
                Some(id) if id.is_valid() => {
                    let stars = clamp_stars(stars);
                    if stars > 0 {
                        record.levels.insert(id, stars);
                    }
                }
                _ => tracing::debug!(key = %key, "Dropping unknown level key"),
            }
        }
        record
    }
}

fn clamp_stars(stars: i64) -> u8 {
    stars.clamp(0, i64::from(MAX_STARS)) as u8
}
