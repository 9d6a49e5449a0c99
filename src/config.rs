//! Config module - Resolves kdcli settings (config/project.yaml).
//!
//! The settings document is a free-form hierarchical mapping. Values are read
//! with dotted paths (`paths.temp_dir`). Optional values fall back to a
//! default; required paths fail with a configuration error.

use crate::error::{Error, Result};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Top-level sections every settings document must have.
pub const REQUIRED_SECTIONS: [&str; 5] = ["project", "paths", "google_drive", "kaggle", "cli"];

/// Directories created by `ensure_directories`.
const MANAGED_DIRS: [&str; 4] = [
    "paths.config_dir",
    "paths.scripts_dir",
    "paths.templates_dir",
    "paths.temp_dir",
];

/// Environment variable that overrides the settings location.
pub const CONFIG_ENV: &str = "KDCLI_CONFIG";

/// Walk a dotted path through nested mappings.
///
/// Returns `None` when a segment is absent or when the value reached so far
/// is not a mapping.
pub fn lookup<'a>(doc: &'a Value, dotted_path: &str) -> Option<&'a Value> {
    dotted_path
        .split('.')
        .try_fold(doc, |current, key| current.as_object()?.get(key))
}

/// Service whose credential file location is configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    Kaggle,
    Drive,
}

impl Service {
    fn key(self) -> &'static str {
        match self {
            Self::Kaggle => "paths.kaggle_credentials",
            Self::Drive => "paths.drive_credentials",
        }
    }
}

impl std::str::FromStr for Service {
    type Err = Error;

    fn from_str(name: &str) -> Result<Self> {
        match name {
            "kaggle" => Ok(Self::Kaggle),
            "drive" => Ok(Self::Drive),
            other => Err(Error::config(format!("Unknown service: {}", other))),
        }
    }
}

/// Which remote storage provider to use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageBackend {
    /// Google Drive REST API
    Drive,
    /// Directories under a local root (offline mirror)
    Local(PathBuf),
}

/// Kernel polling settings (`kaggle.polling`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollingSettings {
    /// Seconds to wait after push before the first status check
    pub initial_delay_secs: u64,
    /// Seconds between status checks
    pub interval_secs: u64,
}

impl Default for PollingSettings {
    fn default() -> Self {
        Self {
            initial_delay_secs: 30,
            interval_secs: 60,
        }
    }
}

/// Output formatting settings (`cli.output`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputSettings {
    pub max_kernels_shown: usize,
    pub recent_history: usize,
}

/// Presence of the credential files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CredentialStatus {
    pub kaggle: bool,
    pub drive: bool,
}

/// Loaded settings document.
///
/// Constructed once by the CLI and passed by reference to every component.
#[derive(Debug, Clone)]
pub struct Settings {
    doc: Value,
    source: Option<PathBuf>,
}

impl Settings {
    /// Load settings from a YAML file (or TOML when the extension is `.toml`).
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::config(format!(
                "Configuration file not found: {}",
                path.display()
            )));
        }

        let content = std::fs::read_to_string(path).map_err(|e| Error::file(path, e))?;

        let is_toml = path.extension().is_some_and(|ext| ext == "toml");
        let doc: Value = if is_toml {
            toml::from_str(&content).map_err(|e| {
                Error::config(format!("Cannot parse config file {}: {}", path.display(), e))
            })?
        } else {
            serde_yaml::from_str(&content).map_err(|e| {
                Error::config(format!("Cannot parse config file {}: {}", path.display(), e))
            })?
        };

        // An empty YAML file parses as null
        let doc = match doc {
            Value::Null => Value::Object(Map::new()),
            Value::Object(_) => doc,
            _ => {
                return Err(Error::config(format!(
                    "Config file {} must contain a mapping at the top level",
                    path.display()
                )))
            }
        };

        debug!("Loaded settings from {}", path.display());
        Ok(Self {
            doc,
            source: Some(path.to_path_buf()),
        })
    }

    /// Build settings from an in-memory document.
    pub fn from_value(doc: Value) -> Self {
        Self { doc, source: None }
    }

    /// File the settings were loaded from, if any.
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// Exact value at a dotted path.
    pub fn get(&self, dotted_path: &str) -> Option<&Value> {
        lookup(&self.doc, dotted_path)
    }

    /// Soft lookup: the value at `dotted_path`, or `default` when it is
    /// absent or cannot be read as `T`.
    pub fn get_or<T: DeserializeOwned>(&self, dotted_path: &str, default: T) -> T {
        match self.get(dotted_path) {
            None | Some(Value::Null) => default,
            Some(value) => match serde_json::from_value(value.clone()) {
                Ok(v) => v,
                Err(e) => {
                    warn!("Ignoring setting {}: {}", dotted_path, e);
                    default
                }
            },
        }
    }

    /// Required path setting. `~/` expands to the home directory.
    pub fn get_path(&self, dotted_path: &str) -> Result<PathBuf> {
        match self.get(dotted_path) {
            None | Some(Value::Null) => Err(Error::config(format!(
                "Path not found in config: {}",
                dotted_path
            ))),
            Some(Value::String(s)) => Ok(expand_home(s)),
            Some(other) => Err(Error::config(format!(
                "Path setting {} must be a string, found {}",
                dotted_path, other
            ))),
        }
    }

    /// Credentials file for a named service (`kaggle` or `drive`).
    pub fn credentials_path(&self, service: &str) -> Result<PathBuf> {
        let service: Service = service.parse()?;
        self.get_path(service.key())
    }

    /// Logical Drive folder paths: the root, then `root/<sub>` per subfolder.
    pub fn drive_folders(&self) -> Result<Vec<String>> {
        let root: String = self.get_or("google_drive.folder_structure.root", String::new());
        if root.is_empty() {
            return Err(Error::config(
                "Missing setting: google_drive.folder_structure.root",
            ));
        }
        let subfolders: Vec<String> =
            self.get_or("google_drive.folder_structure.subfolders", Vec::new());

        let mut folders = Vec::with_capacity(subfolders.len() + 1);
        folders.push(root.clone());
        folders.extend(subfolders.iter().map(|sub| format!("{}/{}", root, sub)));
        Ok(folders)
    }

    /// Logical path of a well-known subfolder under the Drive root.
    pub fn drive_subfolder(&self, name: &str) -> Result<String> {
        let root = self
            .drive_folders()?
            .into_iter()
            .next()
            .unwrap_or_default();
        Ok(format!("{}/{}", root, name))
    }

    /// Sensitive file patterns followed by sensitive directory patterns.
    pub fn sensitive_patterns(&self) -> Vec<String> {
        let mut patterns: Vec<String> = self.get_or("security.sensitive_files", Vec::new());
        let dirs: Vec<String> = self.get_or("security.sensitive_dirs", Vec::new());
        patterns.extend(dirs);
        patterns
    }

    /// Python packages the kernel depends on.
    pub fn dependencies(&self) -> Vec<String> {
        self.get_or("dependencies.python_packages", Vec::new())
    }

    /// Default kernel-metadata.json fields.
    pub fn kernel_defaults(&self) -> Map<String, Value> {
        self.get_or("kaggle.kernel_defaults", Map::new())
    }

    pub fn polling(&self) -> PollingSettings {
        let defaults = PollingSettings::default();
        PollingSettings {
            initial_delay_secs: self
                .get_or("kaggle.polling.initial_delay", defaults.initial_delay_secs),
            interval_secs: self.get_or("kaggle.polling.interval", defaults.interval_secs),
        }
    }

    pub fn output_settings(&self) -> OutputSettings {
        OutputSettings {
            max_kernels_shown: self.get_or("cli.output.max_kernels_shown", 5),
            recent_history: self.get_or("cli.output.recent_history", 3),
        }
    }

    /// Command line that runs the Kaggle CLI (`kaggle` by default).
    pub fn kaggle_cli(&self) -> String {
        self.get_or("kaggle.cli_path", "kaggle".to_string())
    }

    pub fn storage_backend(&self) -> Result<StorageBackend> {
        let backend: String = self.get_or("google_drive.backend", "drive".to_string());
        match backend.as_str() {
            "drive" => Ok(StorageBackend::Drive),
            "local" => Ok(StorageBackend::Local(
                self.get_path("google_drive.local_root")?,
            )),
            other => Err(Error::config(format!(
                "Unknown storage backend in google_drive.backend: {}",
                other
            ))),
        }
    }

    /// OAuth scopes requested for Drive.
    pub fn drive_scopes(&self) -> Vec<String> {
        self.get_or(
            "google_drive.scopes",
            vec!["https://www.googleapis.com/auth/drive.file".to_string()],
        )
    }

    /// Missing required top-level sections (empty when valid).
    pub fn missing_sections(&self) -> Vec<&'static str> {
        REQUIRED_SECTIONS
            .iter()
            .copied()
            .filter(|section| self.doc.get(section).is_none())
            .collect()
    }

    /// Check every required section, reporting all missing ones together.
    pub fn validate(&self) -> Result<()> {
        let missing = self.missing_sections();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(Error::config(format!(
                "Missing required config sections: {}",
                missing.join(", ")
            )))
        }
    }

    /// Create the directories named in `paths`.
    pub fn ensure_directories(&self) -> Result<()> {
        for key in MANAGED_DIRS {
            let dir = self.get_path(key)?;
            std::fs::create_dir_all(&dir).map_err(|e| Error::file(&dir, e))?;
        }
        Ok(())
    }

    pub fn check_credentials(&self) -> Result<CredentialStatus> {
        Ok(CredentialStatus {
            kaggle: self.credentials_path("kaggle")?.exists(),
            drive: self.credentials_path("drive")?.exists(),
        })
    }
}

/// Starter settings document written by `kdcli init` when none exists.
pub fn starter_settings() -> Value {
    serde_json::json!({
        "project": { "name": "Kaggle-CLI", "version": "0.1.0" },
        "paths": {
            "config_dir": "./config",
            "scripts_dir": "./scripts",
            "templates_dir": "./templates",
            "temp_dir": "./temp_outputs",
            "metadata_file": "./config/metadata.json",
            "drive_config_file": "./config/drive_config.json",
            "kaggle_credentials": "~/.kaggle/kaggle.json",
            "drive_credentials": "./config/credentials.json",
            "drive_token": "./config/token.json",
        },
        "google_drive": {
            "backend": "drive",
            "scopes": ["https://www.googleapis.com/auth/drive.file"],
            "folder_structure": {
                "root": "Kaggle-CLI",
                "subfolders": ["Outputs", "Projects", "Uploads"],
            },
        },
        "kaggle": {
            "cli_path": "kaggle",
            "kernel_defaults": {
                "language": "python",
                "kernel_type": "script",
                "enable_gpu": true,
                "enable_internet": false,
                "is_private": true,
            },
            "polling": { "initial_delay": 30, "interval": 60 },
        },
        "cli": {
            "output": { "max_kernels_shown": 5, "recent_history": 3 },
        },
    })
}

fn expand_home(raw: &str) -> PathBuf {
    if let Some(rest) = raw.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn sample() -> Settings {
        Settings::from_value(json!({
            "project": { "name": "demo" },
            "paths": {
                "config_dir": "./config",
                "kaggle_credentials": "/creds/kaggle.json",
                "drive_credentials": "/creds/credentials.json",
                "weird": 42,
            },
            "google_drive": {
                "folder_structure": { "root": "Kaggle-CLI", "subfolders": ["Outputs", "Projects"] }
            },
            "kaggle": { "polling": { "interval": 5 } },
            "cli": {},
            "security": { "sensitive_files": ["*.json"], "sensitive_dirs": [".kaggle/"] },
        }))
    }

    #[test]
    fn test_lookup_returns_exact_nested_value() {
        let settings = sample();
        assert_eq!(settings.get("project.name"), Some(&json!("demo")));
        assert_eq!(settings.get("kaggle.polling"), Some(&json!({ "interval": 5 })));
    }

    #[test]
    fn test_lookup_stops_at_scalars_and_missing_keys() {
        let settings = sample();
        assert_eq!(settings.get("project.name.first"), None);
        assert_eq!(settings.get("project.missing"), None);
        assert_eq!(settings.get("nothing.at.all"), None);
        assert_eq!(settings.get_or("project.name.first", 7), 7);
    }

    #[test]
    fn test_get_or_falls_back_on_type_mismatch() {
        let settings = sample();
        assert_eq!(settings.get_or("project.name", 3u32), 3);
        assert_eq!(settings.get_or("kaggle.polling.interval", 60u64), 5);
    }

    #[test]
    fn test_get_path_requires_the_key() {
        let settings = sample();
        assert_eq!(settings.get_path("paths.config_dir").unwrap(), PathBuf::from("./config"));
        assert!(matches!(
            settings.get_path("paths.temp_dir"),
            Err(Error::Configuration(_))
        ));
        assert!(matches!(
            settings.get_path("paths.weird"),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_credentials_path_by_service() {
        let settings = sample();
        assert_eq!(
            settings.credentials_path("drive").unwrap(),
            PathBuf::from("/creds/credentials.json")
        );
        assert!(matches!(
            settings.credentials_path("dropbox"),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_drive_folders_keep_order() {
        let folders = sample().drive_folders().unwrap();
        assert_eq!(
            folders,
            vec!["Kaggle-CLI", "Kaggle-CLI/Outputs", "Kaggle-CLI/Projects"]
        );
    }

    #[test]
    fn test_sensitive_patterns_files_then_dirs() {
        assert_eq!(sample().sensitive_patterns(), vec!["*.json", ".kaggle/"]);
    }

    #[test]
    fn test_polling_partial_override() {
        let polling = sample().polling();
        assert_eq!(polling.initial_delay_secs, 30);
        assert_eq!(polling.interval_secs, 5);
    }

    #[test]
    fn test_validate_reports_all_missing_sections() {
        let settings = Settings::from_value(json!({ "project": {}, "cli": {} }));
        assert_eq!(settings.missing_sections(), vec!["paths", "google_drive", "kaggle"]);
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("paths, google_drive, kaggle"));
        assert!(sample().validate().is_ok());
    }

    #[test]
    fn test_load_yaml_and_toml() -> Result<()> {
        let temp = TempDir::new()?;

        let yaml_path = temp.path().join("project.yaml");
        std::fs::write(&yaml_path, "project:\n  name: yaml-demo\n")?;
        let settings = Settings::load(&yaml_path)?;
        assert_eq!(settings.get_or("project.name", String::new()), "yaml-demo");

        let toml_path = temp.path().join("project.toml");
        std::fs::write(&toml_path, "[project]\nname = \"toml-demo\"\n")?;
        let settings = Settings::load(&toml_path)?;
        assert_eq!(settings.get_or("project.name", String::new()), "toml-demo");
        Ok(())
    }

    #[test]
    fn test_load_missing_file_is_configuration_error() {
        let err = Settings::load(Path::new("/definitely/not/here.yaml")).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_starter_settings_are_valid() {
        let settings = Settings::from_value(starter_settings());
        assert!(settings.validate().is_ok());
        assert_eq!(settings.storage_backend().unwrap(), StorageBackend::Drive);
        assert_eq!(settings.drive_folders().unwrap().len(), 4);
    }

    #[test]
    fn test_local_backend_requires_root() {
        let settings = Settings::from_value(json!({ "google_drive": { "backend": "local" } }));
        assert!(settings.storage_backend().is_err());

        let settings = Settings::from_value(
            json!({ "google_drive": { "backend": "local", "local_root": "/tmp/mirror" } }),
        );
        assert_eq!(
            settings.storage_backend().unwrap(),
            StorageBackend::Local(PathBuf::from("/tmp/mirror"))
        );
    }
}
