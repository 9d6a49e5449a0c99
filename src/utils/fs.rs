//! Filesystem helpers: atomic replace, recursive listing, content digests.

use crate::error::{Error, Result};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

/// Write `content` to a sibling temp file, then rename it over `path`.
///
/// Readers see either the old file or the complete new one, provided the
/// temp file and the target live on the same filesystem.
pub fn atomic_write(path: &Path, content: &[u8]) -> Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&parent).map_err(|e| Error::file(&parent, e))?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "kdcli".to_string());
    let tmp_path = parent.join(format!(".{}.{}.tmp", file_name, std::process::id()));

    {
        let mut tmp = fs::File::create(&tmp_path).map_err(|e| Error::file(&tmp_path, e))?;
        tmp.write_all(content)
            .and_then(|_| tmp.sync_all())
            .map_err(|e| Error::file(&tmp_path, e))?;
    }

    fs::rename(&tmp_path, path).map_err(|e| {
        let _ = fs::remove_file(&tmp_path);
        Error::file(path, e)
    })
}

/// All regular files below `dir`, sorted for stable output.
pub fn collect_files(dir: &Path) -> Result<Vec<PathBuf>> {
    fn walk(dir: &Path, files: &mut Vec<PathBuf>) -> Result<()> {
        for entry in fs::read_dir(dir).map_err(|e| Error::file(dir, e))? {
            let path = entry?.path();
            if path.is_dir() {
                walk(&path, files)?;
            } else if path.is_file() {
                files.push(path);
            }
        }
        Ok(())
    }

    let mut files = Vec::new();
    if dir.exists() {
        walk(dir, &mut files)?;
    }
    files.sort();
    Ok(files)
}

/// Hex SHA-256 of a file's contents, read in chunks.
pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file = fs::File::open(path).map_err(|e| Error::file(path, e))?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf).map_err(|e| Error::file(path, e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect())
}

/// Whether `path` matches one of the sensitive patterns.
///
/// A pattern ending in `/` names a directory anywhere in the path, a
/// pattern starting with `*` matches a file-name suffix, anything else must
/// equal the file name.
pub fn is_sensitive(path: &Path, patterns: &[String]) -> bool {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    patterns.iter().any(|pattern| {
        if let Some(dir) = pattern.strip_suffix('/') {
            path.components().any(|c| c.as_os_str() == dir)
        } else if let Some(suffix) = pattern.strip_prefix('*') {
            file_name.ends_with(suffix)
        } else {
            file_name == *pattern
        }
    })
}
