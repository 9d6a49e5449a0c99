//! Utility functions shared across modules.

pub mod browser;
pub mod fs;
pub mod timestamp;

pub use browser::open_browser;
pub use fs::{atomic_write, collect_files, is_sensitive, sha256_file};
