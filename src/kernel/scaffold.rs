//! New kernel directories: kernel-metadata.json, a starter script, `out/`.

use crate::error::{Error, Result};
use crate::project::slugify;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

pub const KERNEL_METADATA_FILE: &str = "kernel-metadata.json";

const STARTER_SCRIPT: &str = r#"#!/usr/bin/env python3
"""Runs on Kaggle. Anything written to the working directory becomes a kernel output."""

import json
import os


def main():
    print("Starting kernel...")
    os.makedirs("out", exist_ok=True)
    with open("out/results.json", "w") as f:
        json.dump({"status": "completed"}, f)
    print("Kernel finished.")


if __name__ == "__main__":
    main()
"#;

/// Contents of kernel-metadata.json as read by `kaggle kernels push`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KernelMetadata {
    pub id: String,
    pub title: String,
    pub code_file: String,
    pub language: String,
    pub kernel_type: String,
    pub enable_gpu: bool,
    pub enable_internet: bool,
    pub is_private: bool,
}

impl KernelMetadata {
    /// Metadata for `username/<slug of project_name>`, with fields from
    /// `kaggle.kernel_defaults` overriding the built-in defaults.
    pub fn for_project(project_name: &str, username: &str, defaults: &Map<String, Value>) -> Self {
        let text = |key: &str, fallback: &str| -> String {
            defaults
                .get(key)
                .and_then(Value::as_str)
                .unwrap_or(fallback)
                .to_string()
        };
        let flag = |key: &str, fallback: bool| -> bool {
            defaults.get(key).and_then(Value::as_bool).unwrap_or(fallback)
        };

        Self {
            id: format!("{}/{}", username, slugify(project_name)),
            title: format!("{} - Automated Kernel", project_name),
            code_file: text("code_file", "script.py"),
            language: text("language", "python"),
            kernel_type: text("kernel_type", "script"),
            enable_gpu: flag("enable_gpu", true),
            enable_internet: flag("enable_internet", false),
            is_private: flag("is_private", true),
        }
    }

    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(KERNEL_METADATA_FILE);
        let content = fs::read_to_string(&path).map_err(|e| Error::file(&path, e))?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// Create a kernel directory. Existing files are left untouched; the paths
/// that were actually written are returned.
pub fn scaffold_kernel_dir(dir: &Path, metadata: &KernelMetadata) -> Result<Vec<PathBuf>> {
    let mut created = Vec::new();

    for sub in [dir.to_path_buf(), dir.join("out")] {
        if !sub.exists() {
            fs::create_dir_all(&sub).map_err(|e| Error::file(&sub, e))?;
            created.push(sub);
        }
    }

    let metadata_path = dir.join(KERNEL_METADATA_FILE);
    if !metadata_path.exists() {
        let content = serde_json::to_string_pretty(metadata)?;
        fs::write(&metadata_path, content).map_err(|e| Error::file(&metadata_path, e))?;
        created.push(metadata_path);
    }

    let script_path = dir.join(&metadata.code_file);
    if !script_path.exists() {
        fs::write(&script_path, STARTER_SCRIPT).map_err(|e| Error::file(&script_path, e))?;
        created.push(script_path);
    }

    info!("Scaffolded kernel {} in {}", metadata.id, dir.display());
    Ok(created)
}
