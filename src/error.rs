//! Error types shared by every kdcli component.
//!
//! Configuration and template errors abort the current command. Remote storage
//! errors are returned per call so batch operations can keep going and report
//! partial success. Validation errors always carry the full list of violations.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for kdcli operations.
#[derive(Error, Debug)]
pub enum Error {
    /// A required setting or path is missing or malformed.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A template left placeholders unresolved or rendered to invalid data.
    #[error("Template error: {0}")]
    Template(String),

    /// The Kaggle CLI exited non-zero (or could not be started).
    #[error("Kaggle command `{command}` failed: {message}")]
    KernelOperation { command: String, message: String },

    /// A call to the remote storage provider failed.
    #[error("Remote storage error: {0}")]
    RemoteStorage(String),

    /// One or more field violations, all collected before reporting.
    #[error("Validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),

    #[error("IO error on {path}: {source}")]
    FileIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn template(msg: impl Into<String>) -> Self {
        Self::Template(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::RemoteStorage(msg.into())
    }

    pub fn kernel(command: impl Into<String>, message: impl Into<String>) -> Self {
        Self::KernelOperation {
            command: command.into(),
            message: message.into(),
        }
    }

    /// Attach the offending path to an IO error.
    pub fn file(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::FileIo {
            path: path.into(),
            source,
        }
    }

    /// Whether this error aborts the whole command rather than a single item.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Configuration(_) | Self::Template(_))
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Self::RemoteStorage(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_message_lists_every_violation() {
        let err = Error::Validation(vec!["a missing".into(), "b missing".into()]);
        assert_eq!(err.to_string(), "Validation failed: a missing; b missing");
    }

    #[test]
    fn test_fatal_classification() {
        assert!(Error::config("paths.temp_dir").is_fatal());
        assert!(Error::template("$name").is_fatal());
        assert!(!Error::storage("503").is_fatal());
        assert!(!Error::kernel("kaggle kernels list", "boom").is_fatal());
    }
}
