//! Configuration management for Starsync

use std::env;
use std::path::PathBuf;

use serde::Deserialize;
use thiserror::Error;

use crate::sync::{ResolutionPolicy, DEFAULT_SAVE_NAME, MAX_RETRIES};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub sync: SyncConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    pub save_name: String,
    pub max_retries: u32,
    pub resolution: ResolutionPolicy,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Shared folder holding snapshot revisions
    pub snapshot_dir: PathBuf,
    /// Offline copy of the last known progress
    pub local_save: PathBuf,
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {message}")]
    Invalid { key: &'static str, message: String },
}

impl Default for Config {
    fn default() -> Self {
        Config {
            sync: SyncConfig {
                save_name: DEFAULT_SAVE_NAME.to_string(),
                max_retries: MAX_RETRIES,
                resolution: ResolutionPolicy::default(),
            },
            storage: StorageConfig {
                snapshot_dir: PathBuf::from("./snapshots"),
                local_save: PathBuf::from("./starsync-local.json"),
            },
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Config::default();

        let max_retries = match env::var("STARSYNC_MAX_RETRIES") {
            Ok(value) => value.trim().parse::<u32>().map_err(|e| ConfigError::Invalid {
                key: "STARSYNC_MAX_RETRIES",
                message: format!("{}", e),
            })?,
            Err(_) => defaults.sync.max_retries,
        };

        let resolution = match env::var("STARSYNC_RESOLUTION") {
            Ok(value) => value.parse::<ResolutionPolicy>().map_err(|message| ConfigError::Invalid {
                key: "STARSYNC_RESOLUTION",
                message,
            })?,
            Err(_) => defaults.sync.resolution,
        };

        Ok(Config {
            sync: SyncConfig {
                save_name: env::var("STARSYNC_SAVE_NAME").unwrap_or(defaults.sync.save_name),
                max_retries,
                resolution,
            },
            storage: StorageConfig {
                snapshot_dir: env::var("STARSYNC_SNAPSHOT_DIR")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.storage.snapshot_dir),
                local_save: env::var("STARSYNC_LOCAL_SAVE")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.storage.local_save),
            },
        })
    }
}
