//! Save data
//!
//! Star progress records and their offline copy.

mod local;
mod record;

pub use local::LocalSave;
pub use record::{LevelId, SaveRecord, LEVELS_PER_WORLD, MAX_STARS, WORLD_MAX, WORLD_MIN};
