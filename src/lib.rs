//! kdcli - Push Kaggle kernels, archive their outputs to Google Drive and
//! keep track of what was synced.
//!
//! The library is organised around the pieces the `kdcli` binary wires
//! together: settings, the Kaggle CLI wrapper, remote storage, the local
//! metadata document and per-project config documents.

pub mod config;
pub mod error;
pub mod kernel;
pub mod metadata;
pub mod project;
pub mod sync;
pub mod utils;

pub use config::Settings;
pub use error::{Error, Result};
