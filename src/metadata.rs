//! Metadata store - Local record of what has been synced (metadata.json).
//!
//! The whole document is read, changed in memory and written back on every
//! save. There is no locking: two kdcli processes saving at the same time
//! lose one of the updates (last writer wins).

use crate::error::{Error, Result};
use crate::utils::{atomic_write, timestamp};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// One output file that was uploaded for a kernel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadedFile {
    /// File name on Drive
    pub name: String,
    /// Drive file ID
    pub id: String,
    #[serde(deserialize_with = "timestamp::deserialize")]
    pub uploaded_at: DateTime<Utc>,
    /// Path relative to the kernel output directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relative_path: Option<String>,
    /// Hex SHA-256 of the uploaded content
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
}

/// Sync state of a single kernel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KernelSyncRecord {
    #[serde(deserialize_with = "timestamp::deserialize")]
    pub last_sync: DateTime<Utc>,
    #[serde(default)]
    pub files: Vec<UploadedFile>,
    /// Drive folder the outputs were uploaded to
    pub drive_folder: String,
}

impl KernelSyncRecord {
    /// Previously uploaded file with the same relative path and digest.
    pub fn find_unchanged(&self, relative_path: &str, sha256: &str) -> Option<&UploadedFile> {
        self.files.iter().find(|f| {
            f.relative_path.as_deref() == Some(relative_path) && f.sha256.as_deref() == Some(sha256)
        })
    }
}

/// Kind of recorded sync event. Types this version does not know are kept
/// verbatim so rewriting the document never changes old history entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SyncEventKind {
    KernelSync,
    Setup,
    Upload,
    ProjectCreate,
    Other(String),
}

impl SyncEventKind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::KernelSync => "kernel_sync",
            Self::Setup => "setup",
            Self::Upload => "upload",
            Self::ProjectCreate => "project_create",
            Self::Other(kind) => kind,
        }
    }
}

impl From<String> for SyncEventKind {
    fn from(kind: String) -> Self {
        match kind.as_str() {
            "kernel_sync" => Self::KernelSync,
            "setup" => Self::Setup,
            "upload" => Self::Upload,
            "project_create" => Self::ProjectCreate,
            _ => Self::Other(kind),
        }
    }
}

impl From<SyncEventKind> for String {
    fn from(kind: SyncEventKind) -> Self {
        match kind {
            SyncEventKind::Other(kind) => kind,
            known => known.as_str().to_string(),
        }
    }
}

impl std::fmt::Display for SyncEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Entry of the append-only sync history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncEvent {
    #[serde(rename = "type")]
    pub kind: SyncEventKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kernel: Option<String>,
    pub files_count: usize,
    #[serde(deserialize_with = "timestamp::deserialize")]
    pub timestamp: DateTime<Utc>,
}

impl SyncEvent {
    pub fn new(kind: SyncEventKind, kernel: Option<&str>, files_count: usize) -> Self {
        Self {
            kind,
            kernel: kernel.map(str::to_string),
            files_count,
            timestamp: Utc::now(),
        }
    }
}

/// The metadata document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(default)]
    pub kaggle_kernels: BTreeMap<String, KernelSyncRecord>,
    /// Reserved for file-level tracking
    #[serde(default)]
    pub drive_files: Map<String, Value>,
    /// Chronological, never pruned
    #[serde(default)]
    pub sync_history: Vec<SyncEvent>,
    #[serde(default, deserialize_with = "timestamp::deserialize_option")]
    pub last_sync: Option<DateTime<Utc>>,
}

impl Metadata {
    /// Replace the sync record of `kernel` and log a `kernel_sync` event.
    pub fn record_kernel_sync(
        &mut self,
        kernel: &str,
        files: Vec<UploadedFile>,
        drive_folder: &str,
    ) -> &KernelSyncRecord {
        let event = SyncEvent::new(SyncEventKind::KernelSync, Some(kernel), files.len());
        let now = event.timestamp;
        self.append_history(event);

        self.kaggle_kernels.insert(
            kernel.to_string(),
            KernelSyncRecord {
                last_sync: now,
                files,
                drive_folder: drive_folder.to_string(),
            },
        );
        &self.kaggle_kernels[kernel]
    }

    /// Append an event and bump `last_sync`.
    pub fn append_history(&mut self, event: SyncEvent) {
        self.last_sync = Some(match self.last_sync {
            Some(prev) if prev > event.timestamp => prev,
            _ => event.timestamp,
        });
        self.sync_history.push(event);
    }

    pub fn kernel(&self, name: &str) -> Option<&KernelSyncRecord> {
        self.kaggle_kernels.get(name)
    }

    /// The last `n` history entries, oldest first.
    pub fn recent_history(&self, n: usize) -> &[SyncEvent] {
        let start = self.sync_history.len().saturating_sub(n);
        &self.sync_history[start..]
    }
}

/// File-backed store for the metadata document.
#[derive(Debug, Clone)]
pub struct MetadataStore {
    path: PathBuf,
}

impl MetadataStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the document, or an empty one when the file does not exist yet.
    pub fn load(&self) -> Result<Metadata> {
        if !self.path.exists() {
            debug!("No metadata at {}, starting fresh", self.path.display());
            return Ok(Metadata::default());
        }

        let content = fs::read_to_string(&self.path).map_err(|e| Error::file(&self.path, e))?;
        let metadata = serde_json::from_str(&content).map_err(|e| {
            Error::config(format!(
                "Cannot parse metadata file {}: {}",
                self.path.display(),
                e
            ))
        })?;
        Ok(metadata)
    }

    /// Rewrite the whole document.
    pub fn save(&self, metadata: &Metadata) -> Result<()> {
        let content = serde_json::to_string_pretty(metadata)?;
        atomic_write(&self.path, content.as_bytes())?;
        debug!("Saved metadata to {}", self.path.display());
        Ok(())
    }

    /// Load, apply `f`, save.
    pub fn update<T>(&self, f: impl FnOnce(&mut Metadata) -> T) -> Result<T> {
        let mut metadata = self.load()?;
        let out = f(&mut metadata);
        self.save(&metadata)?;
        Ok(out)
    }
}
