//! Sync module - Archives kernel outputs and project files to remote storage.
//!
//! This module contains:
//! - RemoteStorage trait and the folder-path helpers built on it
//! - Google Drive provider (REST API) and OAuth token handling
//! - Local directory provider (offline mirror, tests)
//! - Folder layout record and the kernel sync workflow

pub mod google_drive;
pub mod kernel_sync;
pub mod layout;
pub mod local;
pub mod oauth;
pub mod provider;

pub use google_drive::GoogleDriveProvider;
pub use kernel_sync::{archive_outputs, sync_kernel, FileEvent, SyncOptions, SyncReport};
pub use layout::{resolve_folder, setup_folders, DriveLayout};
pub use local::LocalProvider;
pub use provider::{
    download_to, ensure_folder_path, ensure_folder_under, find_folder, upload_file, upload_path,
    FileQuery, Media, RemoteFile, RemoteStorage, UploadReport, FOLDER_MIME_TYPE,
};

use crate::config::{Settings, StorageBackend};
use crate::error::Result;
use oauth::DeviceCode;

/// Open the storage backend named in `google_drive.backend`.
///
/// For Drive this authorizes first; `on_device_code` is only called when
/// the user has to approve access in a browser.
pub fn connect(
    settings: &Settings,
    on_device_code: impl FnOnce(&DeviceCode),
) -> Result<Box<dyn RemoteStorage>> {
    match settings.storage_backend()? {
        StorageBackend::Drive => {
            let token = oauth::authorize(settings, on_device_code)?;
            Ok(Box::new(GoogleDriveProvider::new(token.access_token)?))
        }
        StorageBackend::Local(root) => Ok(Box::new(LocalProvider::new(root)?)),
    }
}
