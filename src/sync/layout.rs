//! Folder layout record (drive_config.json).
//!
//! Maps the logical folder paths created by `setup` to provider IDs so
//! later commands can skip the path walk.

use super::provider::{ensure_folder_path, RemoteStorage};
use crate::error::{Error, Result};
use crate::utils::{atomic_write, timestamp};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DriveLayout {
    /// Logical path -> folder ID
    #[serde(default)]
    pub folder_structure: BTreeMap<String, String>,
    #[serde(default, deserialize_with = "timestamp::deserialize_option")]
    pub created_at: Option<DateTime<Utc>>,
    /// Provider the IDs belong to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
}

impl DriveLayout {
    /// Read the record; a missing file gives an empty layout.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path).map_err(|e| Error::file(path, e))?;
        serde_json::from_str(&content).map_err(|e| {
            Error::config(format!(
                "Cannot parse folder layout {}: {}",
                path.display(),
                e
            ))
        })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        atomic_write(path, content.as_bytes())
    }

    /// Recorded ID of a logical folder, if it was recorded for `provider`.
    /// Records without a provider name are treated as Drive records.
    pub fn folder_id(&self, logical_path: &str, provider: &str) -> Option<&str> {
        let owner = self.provider.as_deref().unwrap_or("google_drive");
        if owner != provider {
            return None;
        }
        self.folder_structure.get(logical_path).map(String::as_str)
    }
}

/// Create every folder in `folders` (in order) and return the new layout.
pub fn setup_folders<S: RemoteStorage + ?Sized>(
    storage: &S,
    folders: &[String],
) -> Result<DriveLayout> {
    let mut layout = DriveLayout {
        folder_structure: BTreeMap::new(),
        created_at: Some(Utc::now()),
        provider: Some(storage.name().to_string()),
    };
    for folder in folders {
        let id = ensure_folder_path(storage, folder)?;
        layout.folder_structure.insert(folder.clone(), id);
    }
    Ok(layout)
}

/// ID of a logical folder: the layout record when it has one for this
/// provider, otherwise a fresh path walk (creating missing folders). The
/// record is updated with walked paths when it can be written.
pub fn resolve_folder<S: RemoteStorage + ?Sized>(
    storage: &S,
    layout_path: &Path,
    logical_path: &str,
) -> Result<String> {
    let mut layout = match DriveLayout::load(layout_path) {
        Ok(layout) => layout,
        Err(e) => {
            warn!("{}; resolving folders from scratch", e);
            DriveLayout::default()
        }
    };

    if let Some(id) = layout.folder_id(logical_path, storage.name()) {
        debug!("Folder '{}' from layout record: {}", logical_path, id);
        return Ok(id.to_string());
    }

    let id = ensure_folder_path(storage, logical_path)?;

    if layout.provider.as_deref().unwrap_or("google_drive") != storage.name() {
        // Stale record from another provider
        layout = DriveLayout {
            provider: Some(storage.name().to_string()),
            created_at: Some(Utc::now()),
            ..DriveLayout::default()
        };
    }
    layout
        .folder_structure
        .insert(logical_path.to_string(), id.clone());
    if let Err(e) = layout.save(layout_path) {
        warn!("Cannot update folder layout {}: {}", layout_path.display(), e);
    }
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::LocalProvider;
    use tempfile::TempDir;

    #[test]
    fn test_setup_records_every_folder() -> Result<()> {
        let temp = TempDir::new()?;
        let provider = LocalProvider::new(temp.path().join("remote"))?;
        let folders = vec![
            "Kaggle-CLI".to_string(),
            "Kaggle-CLI/Outputs".to_string(),
            "Kaggle-CLI/Projects".to_string(),
        ];

        let layout = setup_folders(&provider, &folders)?;
        assert_eq!(layout.folder_structure.len(), 3);
        assert_eq!(
            layout.folder_id("Kaggle-CLI/Outputs", "local"),
            Some("Kaggle-CLI/Outputs")
        );
        assert_eq!(layout.folder_id("Kaggle-CLI/Outputs", "google_drive"), None);

        let path = temp.path().join("drive_config.json");
        layout.save(&path)?;
        assert_eq!(DriveLayout::load(&path)?, layout);
        Ok(())
    }

    #[test]
    fn test_loads_record_with_naive_created_at() -> Result<()> {
        let path = std::path::PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("tests")
            .join("fixtures")
            .join("legacy_drive_config.json");
        let layout = DriveLayout::load(&path)?;

        assert_eq!(layout.provider, None);
        assert_eq!(
            layout.folder_id("Kaggle-CLI/Outputs", "google_drive"),
            Some("1AbCoutputs")
        );
        let created = layout.created_at.unwrap();
        assert_eq!(created.to_rfc3339(), "2024-04-30T08:00:00.500+00:00");
        Ok(())
    }

    #[test]
    fn test_resolve_folder_falls_back_to_path_walk() -> Result<()> {
        let temp = TempDir::new()?;
        let provider = LocalProvider::new(temp.path().join("remote"))?;
        let path = temp.path().join("drive_config.json");

        let id = resolve_folder(&provider, &path, "Kaggle-CLI/Outputs")?;
        assert!(temp.path().join("remote/Kaggle-CLI/Outputs").is_dir());

        let layout = DriveLayout::load(&path)?;
        assert_eq!(layout.folder_id("Kaggle-CLI/Outputs", "local"), Some(id.as_str()));
        Ok(())
    }

    #[test]
    fn test_legacy_record_without_provider_is_drive() -> Result<()> {
        let layout: DriveLayout = serde_json::from_str(
            r#"{"folder_structure": {"Kaggle-CLI": "1AbC"}, "created_at": "2024-05-01T10:00:00Z"}"#,
        )?;
        assert_eq!(layout.folder_id("Kaggle-CLI", "google_drive"), Some("1AbC"));
        assert_eq!(layout.folder_id("Kaggle-CLI", "local"), None);
        Ok(())
    }
}
