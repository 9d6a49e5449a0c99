//! Kernel output archiving: fetch outputs with the Kaggle CLI, upload them,
//! record the sync in the metadata document.

use super::provider::{ensure_folder_under, guess_mime_type, Media, RemoteStorage};
use crate::error::{Error, Result};
use crate::kernel::KernelRunner;
use crate::metadata::{MetadataStore, UploadedFile};
use crate::utils::{collect_files, sha256_file};
use chrono::Utc;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, Default)]
pub struct SyncOptions {
    /// Upload every file even when an identical copy was uploaded before
    pub force: bool,
}

/// Progress notification for one output file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileEvent<'a> {
    Uploading(&'a str),
    Skipped(&'a str),
    Failed(&'a str),
}

/// Result of archiving one kernel's outputs.
#[derive(Debug, Default)]
pub struct SyncReport {
    pub kernel: String,
    pub folder_id: String,
    /// Files uploaded in this run
    pub uploaded: Vec<UploadedFile>,
    /// Relative paths unchanged since the previous sync
    pub skipped: Vec<String>,
    pub failed: Vec<(String, Error)>,
}

impl SyncReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Local directory that receives a kernel's outputs.
pub fn output_dir_for(temp_dir: &Path, kernel: &str) -> PathBuf {
    kernel
        .split('/')
        .filter(|s| !s.is_empty())
        .fold(temp_dir.to_path_buf(), |dir, part| dir.join(part))
}

fn relative_name(root: &Path, file: &Path) -> String {
    file.strip_prefix(root)
        .unwrap_or(file)
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Upload every file under `output_dir` to `folder_id` and record the sync.
///
/// Nested files go into remote subfolders mirroring their relative parent
/// directory, so `a/model.pt` and `b/model.pt` stay distinct.
///
/// Files whose relative path and SHA-256 match the kernel's previous record
/// in the same folder are kept without re-uploading, unless `force` is set.
/// Individual upload failures are collected in the report; the record lists
/// the files that are on the remote side after this run.
pub fn archive_outputs<S: RemoteStorage + ?Sized>(
    storage: &S,
    store: &MetadataStore,
    kernel: &str,
    output_dir: &Path,
    folder_id: &str,
    options: SyncOptions,
    mut on_file: impl FnMut(FileEvent<'_>),
) -> Result<SyncReport> {
    let mut metadata = store.load()?;
    let previous = metadata
        .kernel(kernel)
        .filter(|r| r.drive_folder == folder_id && !options.force)
        .cloned();

    let mut report = SyncReport {
        kernel: kernel.to_string(),
        folder_id: folder_id.to_string(),
        ..SyncReport::default()
    };
    let mut recorded = Vec::new();
    let mut subfolders: HashMap<String, String> = HashMap::new();

    for file in collect_files(output_dir)? {
        let relative = relative_name(output_dir, &file);
        let digest = match sha256_file(&file) {
            Ok(d) => d,
            Err(e) => {
                on_file(FileEvent::Failed(&relative));
                report.failed.push((relative, e));
                continue;
            }
        };

        if let Some(unchanged) = previous
            .as_ref()
            .and_then(|r| r.find_unchanged(&relative, &digest))
        {
            on_file(FileEvent::Skipped(&relative));
            recorded.push(unchanged.clone());
            report.skipped.push(relative);
            continue;
        }

        on_file(FileEvent::Uploading(&relative));
        let name = file
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| relative.clone());
        let uploaded = target_folder(storage, folder_id, &relative, &mut subfolders).and_then(
            |parent| storage.create_file(&name, &parent, Media::File(&file), guess_mime_type(&name)),
        );
        match uploaded {
            Ok(id) => {
                let entry = UploadedFile {
                    name,
                    id,
                    uploaded_at: Utc::now(),
                    relative_path: Some(relative),
                    sha256: Some(digest),
                };
                recorded.push(entry.clone());
                report.uploaded.push(entry);
            }
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!("Failed to upload {}: {}", relative, e);
                on_file(FileEvent::Failed(&relative));
                report.failed.push((relative, e));
            }
        }
    }

    metadata.record_kernel_sync(kernel, recorded, folder_id);
    store.save(&metadata)?;

    info!(
        "Synced {} from {}: {} uploaded, {} unchanged, {} failed",
        kernel,
        output_dir.display(),
        report.uploaded.len(),
        report.skipped.len(),
        report.failed.len()
    );
    Ok(report)
}

/// Remote folder for `relative`: `folder_id` itself for top-level files,
/// otherwise the matching subfolder, created on first use.
fn target_folder<S: RemoteStorage + ?Sized>(
    storage: &S,
    folder_id: &str,
    relative: &str,
    cache: &mut HashMap<String, String>,
) -> Result<String> {
    let Some((dir, _)) = relative.rsplit_once('/') else {
        return Ok(folder_id.to_string());
    };
    if let Some(id) = cache.get(dir) {
        return Ok(id.clone());
    }
    let id = ensure_folder_under(storage, folder_id, dir)?;
    cache.insert(dir.to_string(), id.clone());
    Ok(id)
}

/// Fetch a kernel's outputs into `<temp_dir>/<owner>/<slug>` and archive them.
/// A failed fetch aborts before anything is uploaded or recorded.
#[allow(clippy::too_many_arguments)]
pub fn sync_kernel<S: RemoteStorage + ?Sized>(
    runner: &KernelRunner,
    storage: &S,
    store: &MetadataStore,
    temp_dir: &Path,
    kernel: &str,
    folder_id: &str,
    options: SyncOptions,
    on_file: impl FnMut(FileEvent<'_>),
) -> Result<SyncReport> {
    let output_dir = output_dir_for(temp_dir, kernel);
    runner.fetch_outputs(kernel, &output_dir)?;
    archive_outputs(storage, store, kernel, &output_dir, folder_id, options, on_file)
}
