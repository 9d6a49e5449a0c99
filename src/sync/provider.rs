//! RemoteStorage trait - Abstraction over the archive backend.
//!
//! Providers implement a handful of primitives (query, create, update,
//! download). Folder-path resolution, single-file upload/download and batch
//! upload are built on top of them here.

use crate::error::{Error, Result};
use crate::utils::{atomic_write, collect_files};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// MIME type Drive uses for folders.
pub const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

/// A file or folder on the remote side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteFile {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub mime_type: String,
}

impl RemoteFile {
    pub fn is_folder(&self) -> bool {
        self.mime_type == FOLDER_MIME_TYPE
    }
}

/// Name/parent/type scoped listing. Name matching is exact and case-sensitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileQuery<'a> {
    pub parent: &'a str,
    pub name: Option<&'a str>,
    pub mime_type: Option<&'a str>,
}

impl<'a> FileQuery<'a> {
    /// Everything directly under `parent`.
    pub fn children_of(parent: &'a str) -> Self {
        Self {
            parent,
            name: None,
            mime_type: None,
        }
    }

    pub fn named(mut self, name: &'a str) -> Self {
        self.name = Some(name);
        self
    }

    pub fn folders_only(mut self) -> Self {
        self.mime_type = Some(FOLDER_MIME_TYPE);
        self
    }

    /// Whether `file` satisfies the name and type constraints.
    pub fn matches(&self, file: &RemoteFile) -> bool {
        self.name.map_or(true, |n| n == file.name)
            && self.mime_type.map_or(true, |m| m == file.mime_type)
    }
}

/// Content handed to a provider.
#[derive(Debug, Clone, Copy)]
pub enum Media<'a> {
    /// Streamed from a local file
    File(&'a Path),
    Bytes(&'a [u8]),
}

/// Trait for all remote storage providers.
///
/// Every failure comes back as `Err`; there is no null-on-failure sentinel.
pub trait RemoteStorage {
    /// Provider name (google_drive, local)
    fn name(&self) -> &'static str;

    /// Identifier of the top-level container.
    fn root_id(&self) -> &str;

    /// List files matching `query`.
    fn find(&self, query: &FileQuery<'_>) -> Result<Vec<RemoteFile>>;

    /// Metadata of a single file.
    fn get(&self, file_id: &str) -> Result<RemoteFile>;

    /// Create a folder and return its ID.
    fn create_folder(&self, name: &str, parent_id: &str) -> Result<String>;

    /// Create a file and return its ID.
    fn create_file(
        &self,
        name: &str,
        parent_id: &str,
        media: Media<'_>,
        mime_type: &str,
    ) -> Result<String>;

    /// Replace the content of an existing file.
    fn update_file(&self, file_id: &str, media: Media<'_>, mime_type: &str) -> Result<String>;

    /// Full content of a file.
    fn download(&self, file_id: &str) -> Result<Vec<u8>>;
}

/// Best-effort MIME type from a file extension.
pub fn guess_mime_type(name: &str) -> &'static str {
    let ext = Path::new(name)
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "yaml" | "yml" => "text/yaml",
        "json" => "application/json",
        "csv" => "text/csv",
        "txt" | "log" => "text/plain",
        "md" => "text/markdown",
        "py" => "text/x-python",
        "ipynb" => "application/x-ipynb+json",
        "html" => "text/html",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "svg" => "image/svg+xml",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        "gz" | "tgz" => "application/gzip",
        _ => "application/octet-stream",
    }
}

/// First folder called `name` directly under `parent_id`.
pub fn find_folder<S: RemoteStorage + ?Sized>(
    storage: &S,
    name: &str,
    parent_id: &str,
) -> Result<Option<String>> {
    let query = FileQuery::children_of(parent_id).named(name).folders_only();
    Ok(storage.find(&query)?.into_iter().next().map(|f| f.id))
}

/// Resolve a slash-separated folder path to the ID of its last segment,
/// creating missing segments top-down from the root.
///
/// Lookup and creation are separate calls, so two processes resolving an
/// overlapping missing prefix at the same time can both create a folder
/// with the same name. kdcli assumes a single writer per account.
pub fn ensure_folder_path<S: RemoteStorage + ?Sized>(storage: &S, path: &str) -> Result<String> {
    ensure_folder_under(storage, storage.root_id(), path)
}

/// Same as [`ensure_folder_path`], starting from `parent_id`.
pub fn ensure_folder_under<S: RemoteStorage + ?Sized>(
    storage: &S,
    parent_id: &str,
    path: &str,
) -> Result<String> {
    let mut parent_id = parent_id.to_string();

    for segment in path.split('/').filter(|s| !s.is_empty()) {
        parent_id = match find_folder(storage, segment, &parent_id)? {
            Some(id) => id,
            None => {
                let id = storage.create_folder(segment, &parent_id)?;
                info!("[{}] Created folder '{}' ({})", storage.name(), segment, id);
                id
            }
        };
    }

    debug!("Resolved folder path '{}' to {}", path, parent_id);
    Ok(parent_id)
}

/// Upload a local file as a new remote file under `parent_id`.
pub fn upload_file<S: RemoteStorage + ?Sized>(
    storage: &S,
    local_path: &Path,
    parent_id: &str,
) -> Result<String> {
    if !local_path.is_file() {
        return Err(Error::storage(format!(
            "Not a file: {}",
            local_path.display()
        )));
    }
    let name = local_path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or_else(|| Error::storage(format!("No file name in {}", local_path.display())))?;

    storage.create_file(
        &name,
        parent_id,
        Media::File(local_path),
        guess_mime_type(&name),
    )
}

/// Download a remote file to `destination`; when `destination` is a
/// directory the remote name is used. The file is only written once the
/// whole content has been received. Returns the written path.
pub fn download_to<S: RemoteStorage + ?Sized>(
    storage: &S,
    file_id: &str,
    destination: &Path,
) -> Result<PathBuf> {
    let target = if destination.is_dir() {
        let meta = storage.get(file_id)?;
        destination.join(meta.name)
    } else {
        destination.to_path_buf()
    };

    let content = storage.download(file_id)?;
    atomic_write(&target, &content)?;
    info!(
        "[{}] Downloaded {} ({} bytes) to {}",
        storage.name(),
        file_id,
        content.len(),
        target.display()
    );
    Ok(target)
}

/// Outcome of a batch upload. Individual failures do not stop the batch.
#[derive(Debug, Default)]
pub struct UploadReport {
    pub uploaded: Vec<(PathBuf, String)>,
    pub failed: Vec<(PathBuf, Error)>,
}

impl UploadReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Upload one file, or every file below a directory, into `parent_id`.
/// Directory uploads are flat: each file lands in `parent_id` under its own name.
pub fn upload_path<S: RemoteStorage + ?Sized>(
    storage: &S,
    local_path: &Path,
    parent_id: &str,
    mut on_file: impl FnMut(&Path),
) -> Result<UploadReport> {
    let files = if local_path.is_dir() {
        collect_files(local_path)?
    } else if local_path.is_file() {
        vec![local_path.to_path_buf()]
    } else {
        return Err(Error::config(format!(
            "Path does not exist: {}",
            local_path.display()
        )));
    };

    let mut report = UploadReport::default();
    for file in files {
        on_file(&file);
        match upload_file(storage, &file, parent_id) {
            Ok(id) => report.uploaded.push((file, id)),
            Err(e) => {
                warn!("Failed to upload {}: {}", file.display(), e);
                report.failed.push((file, e));
            }
        }
    }
    Ok(report)
}
