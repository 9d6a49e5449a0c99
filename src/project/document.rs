//! Project config documents: construction, merging, validation.

use crate::config::lookup;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::collections::BTreeMap;

/// Dotted fields every project config must have.
pub const REQUIRED_FIELDS: [&str; 3] = ["project.name", "project.kaggle_username", "kaggle.kernel_id"];

/// Placeholder stored until a project has a remote folder.
pub const UNASSIGNED_FOLDER: &str = "TBD";

/// Lowercase, spaces and underscores become hyphens.
pub fn slugify(name: &str) -> String {
    name.to_lowercase().replace([' ', '_'], "-")
}

/// Merge `updates` into `base`: mappings merge key by key, anything else
/// replaces the existing value outright.
pub fn deep_merge(base: &mut Value, updates: Value) {
    match (base, updates) {
        (Value::Object(base_map), Value::Object(update_map)) => {
            for (key, value) in update_map {
                match base_map.get_mut(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

/// Every violation in `config`; an empty list means valid.
///
/// A field is present when its key exists, even with a null value. An empty
/// or null `kaggle.kernel_id` is not checked for format.
pub fn validate_project_config(config: &Value) -> Vec<String> {
    let mut errors: Vec<String> = REQUIRED_FIELDS
        .iter()
        .filter(|field| lookup(config, field).is_none())
        .map(|field| format!("Missing required field: {}", field))
        .collect();

    let well_formed = match lookup(config, "kaggle.kernel_id") {
        None | Some(Value::Null) => true,
        Some(Value::String(id)) => id.is_empty() || is_kernel_id(id),
        Some(_) => false,
    };
    if !well_formed {
        errors.push("Invalid kernel_id format. Should be 'username/kernel-name'".to_string());
    }
    errors
}

/// Exactly one `/` with a non-empty owner and slug.
pub fn is_kernel_id(id: &str) -> bool {
    match id.split_once('/') {
        Some((owner, slug)) => !owner.is_empty() && !slug.is_empty() && !slug.contains('/'),
        None => false,
    }
}

/// Builds a project config document field by field.
#[derive(Debug, Clone)]
pub struct ProjectConfigBuilder {
    name: String,
    kaggle_username: String,
    description: Option<String>,
    drive_folder_id: Option<String>,
    created: DateTime<Utc>,
}

impl ProjectConfigBuilder {
    pub fn new(name: impl Into<String>, kaggle_username: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kaggle_username: kaggle_username.into(),
            description: None,
            drive_folder_id: None,
            created: Utc::now(),
        }
    }

    /// Empty descriptions are replaced by a generated one.
    pub fn description(mut self, description: impl Into<String>) -> Self {
        let description = description.into();
        self.description = (!description.is_empty()).then_some(description);
        self
    }

    pub fn drive_folder_id(mut self, id: impl Into<String>) -> Self {
        self.drive_folder_id = Some(id.into());
        self
    }

    pub fn created_at(mut self, created: DateTime<Utc>) -> Self {
        self.created = created;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kernel_slug(&self) -> String {
        slugify(&self.name)
    }

    pub fn kernel_id(&self) -> String {
        format!("{}/{}", self.kaggle_username, self.kernel_slug())
    }

    fn description_text(&self) -> String {
        self.description
            .clone()
            .unwrap_or_else(|| format!("Machine learning project: {}", self.name))
    }

    /// Values exposed to user templates.
    pub fn template_vars(&self) -> BTreeMap<String, String> {
        let created = self.created.to_rfc3339();
        BTreeMap::from([
            ("project_name".to_string(), self.name.clone()),
            ("project_description".to_string(), self.description_text()),
            ("created_date".to_string(), created),
            ("kaggle_username".to_string(), self.kaggle_username.clone()),
            ("kernel_slug".to_string(), self.kernel_slug()),
            ("kernel_id".to_string(), self.kernel_id()),
            (
                "drive_folder_id".to_string(),
                self.drive_folder_id
                    .clone()
                    .unwrap_or_else(|| UNASSIGNED_FOLDER.to_string()),
            ),
        ])
    }

    pub fn build(&self) -> Value {
        let created = self.created.to_rfc3339();
        json!({
            "project": {
                "name": self.name,
                "description": self.description_text(),
                "kaggle_username": self.kaggle_username,
                "status": "active",
            },
            "dates": {
                "created": created,
                "updated": created,
            },
            "kaggle": {
                "kernel_id": self.kernel_id(),
                "kernel_slug": self.kernel_slug(),
            },
            "google_drive": {
                "folder_id": self.drive_folder_id.as_deref().unwrap_or(UNASSIGNED_FOLDER),
            },
        })
    }
}
