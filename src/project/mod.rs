//! Project module - Per-project config documents stored next to the
//! project's files in remote storage (`project_config.yaml`).
//!
//! This module contains:
//! - ProjectConfigBuilder and the validation rules
//! - Template rendering for user-supplied config templates
//! - ProjectManager, which persists configs through a RemoteStorage

pub mod document;
pub mod template;

pub use document::{
    deep_merge, is_kernel_id, slugify, validate_project_config, ProjectConfigBuilder,
    REQUIRED_FIELDS,
};
pub use template::{render_template, substitute};

use crate::error::{Error, Result};
use crate::sync::{find_folder, FileQuery, Media, RemoteStorage};
use chrono::Utc;
use serde_json::{json, Value};
use std::fs;
use std::path::PathBuf;
use tracing::{debug, info, warn};

pub const PROJECT_CONFIG_FILE: &str = "project_config.yaml";

/// Subfolders created inside every project folder.
pub const PROJECT_SUBFOLDERS: [&str; 5] = ["code", "data", "outputs", "docs", "notebooks"];

/// A folder that holds a project config.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectSummary {
    pub name: String,
    pub folder_id: String,
    pub config: Value,
}

/// Validate, returning every violation as one error.
pub fn validate(config: &Value) -> Result<()> {
    let errors = validate_project_config(config);
    if errors.is_empty() {
        Ok(())
    } else {
        Err(Error::Validation(errors))
    }
}

pub struct ProjectManager<'a> {
    storage: &'a dyn RemoteStorage,
    /// User template; the typed builder is used when it does not exist
    template_path: Option<PathBuf>,
}

impl<'a> ProjectManager<'a> {
    pub fn new(storage: &'a dyn RemoteStorage) -> Self {
        Self {
            storage,
            template_path: None,
        }
    }

    pub fn with_template(mut self, path: impl Into<PathBuf>) -> Self {
        self.template_path = Some(path.into());
        self
    }

    /// New project config: the builder's document, with the user template
    /// (when one exists) merged on top.
    pub fn create_project_config(&self, builder: &ProjectConfigBuilder) -> Result<Value> {
        let mut config = builder.build();
        if let Some(path) = self.template_path.as_ref().filter(|p| p.exists()) {
            debug!("Rendering project config from {}", path.display());
            let template = fs::read_to_string(path).map_err(|e| Error::file(path, e))?;
            deep_merge(&mut config, render_template(&template, &builder.template_vars())?);
        }
        Ok(config)
    }

    /// Create a project under `root_id`: render and validate its config,
    /// then create the folders and save the config with the new folder ID.
    /// Nothing is created remotely when the config cannot be built.
    pub fn create_project(
        &self,
        root_id: &str,
        builder: &ProjectConfigBuilder,
    ) -> Result<ProjectSummary> {
        let name = builder.name();
        if self.find_project(root_id, name)?.is_some() {
            return Err(Error::Validation(vec![format!(
                "Project '{}' already exists",
                name
            )]));
        }

        let mut config = self.create_project_config(builder)?;
        validate(&config)?;

        let folder_id = self.create_project_structure(root_id, name)?;
        deep_merge(&mut config, json!({ "google_drive": { "folder_id": folder_id } }));
        self.save_config(&config, &folder_id)?;

        Ok(ProjectSummary {
            name: name.to_string(),
            folder_id,
            config,
        })
    }

    /// Create (or reuse) the project folder and its standard subfolders.
    pub fn create_project_structure(&self, parent_id: &str, project_name: &str) -> Result<String> {
        let project_id = self.ensure_child_folder(parent_id, project_name)?;
        for sub in PROJECT_SUBFOLDERS {
            self.ensure_child_folder(&project_id, sub)?;
        }
        info!("Project folder '{}' ready ({})", project_name, project_id);
        Ok(project_id)
    }

    fn ensure_child_folder(&self, parent_id: &str, name: &str) -> Result<String> {
        match find_folder(self.storage, name, parent_id)? {
            Some(id) => Ok(id),
            None => self.storage.create_folder(name, parent_id),
        }
    }

    fn config_file_id(&self, folder_id: &str) -> Result<Option<String>> {
        let query = FileQuery::children_of(folder_id).named(PROJECT_CONFIG_FILE);
        Ok(self
            .storage
            .find(&query)?
            .into_iter()
            .find(|f| !f.is_folder())
            .map(|f| f.id))
    }

    /// Write the config into `folder_id`, replacing the content of an
    /// existing config file. Last write wins.
    pub fn save_config(&self, config: &Value, folder_id: &str) -> Result<String> {
        let yaml = serde_yaml::to_string(config)?;
        let media = Media::Bytes(yaml.as_bytes());

        let id = match self.config_file_id(folder_id)? {
            Some(id) => self.storage.update_file(&id, media, "text/yaml")?,
            None => self
                .storage
                .create_file(PROJECT_CONFIG_FILE, folder_id, media, "text/yaml")?,
        };
        debug!("Saved {} in {} ({})", PROJECT_CONFIG_FILE, folder_id, id);
        Ok(id)
    }

    /// The config stored in `folder_id`, or `None` when the folder has none.
    pub fn load_config(&self, folder_id: &str) -> Result<Option<Value>> {
        let Some(file_id) = self.config_file_id(folder_id)? else {
            return Ok(None);
        };

        let content = self.storage.download(&file_id)?;
        let text = String::from_utf8_lossy(&content);
        let config: Value = serde_yaml::from_str(&text)?;
        match config {
            Value::Object(_) => Ok(Some(config)),
            Value::Null => Ok(None),
            _ => Err(Error::config(format!(
                "{} in folder {} is not a mapping",
                PROJECT_CONFIG_FILE, folder_id
            ))),
        }
    }

    /// Deep-merge `updates` into the stored config and save it.
    /// `dates.updated` is refreshed unless `updates` sets it.
    pub fn update_config(&self, folder_id: &str, updates: Value) -> Result<Option<Value>> {
        let Some(mut config) = self.load_config(folder_id)? else {
            return Ok(None);
        };

        deep_merge(
            &mut config,
            json!({ "dates": { "updated": Utc::now().to_rfc3339() } }),
        );
        deep_merge(&mut config, updates);
        self.save_config(&config, folder_id)?;
        Ok(Some(config))
    }

    /// Sub-folders of `root_id` that contain a project config. Folders whose
    /// config cannot be parsed are skipped with a warning.
    pub fn list_projects(&self, root_id: &str) -> Result<Vec<ProjectSummary>> {
        let folders = self
            .storage
            .find(&FileQuery::children_of(root_id).folders_only())?;

        let mut projects = Vec::new();
        for folder in folders {
            match self.load_config(&folder.id) {
                Ok(Some(config)) => projects.push(ProjectSummary {
                    name: folder.name,
                    folder_id: folder.id,
                    config,
                }),
                Ok(None) => {}
                Err(e @ (Error::Yaml(_) | Error::Configuration(_))) => {
                    warn!("Skipping folder '{}': {}", folder.name, e);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(projects)
    }

    /// Project folder called `name` directly under `root_id`.
    pub fn find_project(&self, root_id: &str, name: &str) -> Result<Option<ProjectSummary>> {
        let Some(folder_id) = find_folder(self.storage, name, root_id)? else {
            return Ok(None);
        };
        Ok(self.load_config(&folder_id)?.map(|config| ProjectSummary {
            name: name.to_string(),
            folder_id,
            config,
        }))
    }
}
