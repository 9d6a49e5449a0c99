use super::provider::{guess_mime_type, FileQuery, Media, RemoteFile, RemoteStorage, FOLDER_MIME_TYPE};
use crate::error::{Error, Result};
use crate::utils::atomic_write;
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

const ROOT_ID: &str = "root";

/// Local file system provider.
/// Mirrors the Drive folder layout under a directory (backup disk, mounted
/// share, or a scratch directory in tests). Folders are directories and an
/// ID is the path relative to the root, `/`-separated.
///
/// Unlike Drive, a directory cannot hold two entries with the same name:
/// creating an existing folder returns it, creating an existing file
/// replaces it.
pub struct LocalProvider {
    root: PathBuf,
}

impl LocalProvider {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| Error::file(&root, e))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute path of an ID. IDs that would escape the root are rejected.
    fn resolve(&self, id: &str) -> Result<PathBuf> {
        if id == ROOT_ID {
            return Ok(self.root.clone());
        }
        let relative = Path::new(id);
        let inside = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if !inside {
            return Err(Error::storage(format!("Invalid local file ID: {}", id)));
        }
        Ok(self.root.join(relative))
    }

    fn child_id(parent_id: &str, name: &str) -> String {
        if parent_id == ROOT_ID {
            name.to_string()
        } else {
            format!("{}/{}", parent_id, name)
        }
    }

    fn describe(id: String, path: &Path) -> RemoteFile {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let mime_type = if path.is_dir() {
            FOLDER_MIME_TYPE.to_string()
        } else {
            guess_mime_type(&name).to_string()
        };
        RemoteFile { id, name, mime_type }
    }

    fn write_media(path: &Path, media: Media<'_>) -> Result<()> {
        match media {
            Media::File(source) => {
                let content = fs::read(source).map_err(|e| Error::file(source, e))?;
                atomic_write(path, &content)
            }
            Media::Bytes(bytes) => atomic_write(path, bytes),
        }
    }
}

impl RemoteStorage for LocalProvider {
    fn name(&self) -> &'static str {
        "local"
    }

    fn root_id(&self) -> &str {
        ROOT_ID
    }

    fn find(&self, query: &FileQuery<'_>) -> Result<Vec<RemoteFile>> {
        let dir = self.resolve(query.parent)?;
        if !dir.is_dir() {
            return Err(Error::storage(format!("Folder not found: {}", query.parent)));
        }

        let mut files = Vec::new();
        for entry in fs::read_dir(&dir).map_err(|e| Error::file(&dir, e))? {
            let path = entry?.path();
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            // Temp files from an in-flight atomic write
            if name.starts_with('.') {
                continue;
            }
            let file = Self::describe(Self::child_id(query.parent, &name), &path);
            if query.matches(&file) {
                files.push(file);
            }
        }
        files.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(files)
    }

    fn get(&self, file_id: &str) -> Result<RemoteFile> {
        let path = self.resolve(file_id)?;
        if !path.exists() {
            return Err(Error::storage(format!("File not found: {}", file_id)));
        }
        Ok(Self::describe(file_id.to_string(), &path))
    }

    fn create_folder(&self, name: &str, parent_id: &str) -> Result<String> {
        let id = Self::child_id(parent_id, name);
        let path = self.resolve(&id)?;
        fs::create_dir_all(&path).map_err(|e| Error::file(&path, e))?;
        debug!("[Local] Folder {}", path.display());
        Ok(id)
    }

    fn create_file(
        &self,
        name: &str,
        parent_id: &str,
        media: Media<'_>,
        _mime_type: &str,
    ) -> Result<String> {
        let parent = self.resolve(parent_id)?;
        if !parent.is_dir() {
            return Err(Error::storage(format!("Folder not found: {}", parent_id)));
        }
        let id = Self::child_id(parent_id, name);
        let path = self.resolve(&id)?;
        Self::write_media(&path, media)?;
        debug!("[Local] Wrote {}", path.display());
        Ok(id)
    }

    fn update_file(&self, file_id: &str, media: Media<'_>, _mime_type: &str) -> Result<String> {
        let path = self.resolve(file_id)?;
        if !path.is_file() {
            return Err(Error::storage(format!("File not found: {}", file_id)));
        }
        Self::write_media(&path, media)?;
        Ok(file_id.to_string())
    }

    fn download(&self, file_id: &str) -> Result<Vec<u8>> {
        let path = self.resolve(file_id)?;
        if !path.is_file() {
            return Err(Error::storage(format!("File not found: {}", file_id)));
        }
        fs::read(&path).map_err(|e| Error::file(&path, e))
    }
}
