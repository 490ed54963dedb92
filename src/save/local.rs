//! Offline copy of the last known progress
//!
//! Read at startup before any remote sync so the game works without a
//! network. Uses the same encoding as remote snapshot payloads.

use std::io;
use std::path::{Path, PathBuf};

use super::record::SaveRecord;

/// Local save file
#[derive(Debug, Clone)]
pub struct LocalSave {
    path: PathBuf,
}

impl LocalSave {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Local copy for one snapshot name, next to this file.
    ///
    /// `./starsync-local.json` becomes `./starsync-local-<name>.json`, so
    /// each save slot keeps its own offline progress.
    pub fn for_slot(&self, name: &str) -> LocalSave {
        let stem = self
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "starsync-local".to_string());
        let slot: String = name
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();

        let mut file_name = format!("{}-{}", stem, slot);
        if let Some(ext) = self.path.extension() {
            file_name.push('.');
            file_name.push_str(&ext.to_string_lossy());
        }
        LocalSave::new(self.path.with_file_name(file_name))
    }

    /// Read the saved record; a missing file is an empty record
    pub async fn read(&self) -> io::Result<SaveRecord> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(SaveRecord::from_bytes(&bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "No local save yet");
                Ok(SaveRecord::new())
            }
            Err(e) => Err(e),
        }
    }

    /// Replace the saved record.
    ///
    /// Writes to a sibling temp file and renames it over the old copy so a
    /// crash mid-write never leaves a truncated save.
    pub async fn write(&self, record: &SaveRecord) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, record.to_bytes()).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        tracing::debug!(
            path = %self.path.display(),
            stars = record.total_stars(),
            "Local save written"
        );
        Ok(())
    }
}
