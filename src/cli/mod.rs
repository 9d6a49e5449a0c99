//! CLI definitions for kdcli.

pub mod commands;

use clap::{Parser, Subcommand};
use kdcli::config::CONFIG_ENV;
use std::path::PathBuf;

/// kdcli - Kaggle kernels archived to Google Drive
#[derive(Parser)]
#[command(name = "kdcli")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Settings file
    #[arg(long, global = true, env = CONFIG_ENV, default_value = "config/project.yaml")]
    pub config: PathBuf,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create the Drive folder layout and local directories
    Setup,

    /// Show kernels, sync state and recent activity
    Status,

    /// Download a kernel's outputs and upload them to Drive
    Sync {
        /// Kernel reference (owner/slug)
        #[arg(short, long)]
        kernel: String,

        /// Upload into this project's outputs folder
        #[arg(short, long)]
        project: Option<String>,

        /// Re-upload files that did not change since the last sync
        #[arg(long)]
        force: bool,
    },

    /// List your Kaggle kernels
    List,

    /// Upload a file or directory to Drive
    Upload {
        #[arg(short, long)]
        file: PathBuf,

        /// Upload into this project's data folder
        #[arg(short, long)]
        project: Option<String>,
    },

    /// Download a Drive file by ID
    Download {
        /// Drive file ID
        #[arg(short, long)]
        file: String,

        /// Target file or directory
        #[arg(short, long, default_value = ".")]
        destination: PathBuf,
    },

    /// Create a project folder with its config on Drive
    CreateProject {
        #[arg(short, long)]
        project: String,

        /// Kaggle username that owns the project's kernel
        #[arg(short, long)]
        username: String,

        #[arg(short, long)]
        description: Option<String>,
    },

    /// List projects on Drive
    ListProjects,

    /// Show a project's config, validation result and sync record
    ProjectStatus {
        #[arg(short, long)]
        project: String,
    },

    /// Push a kernel directory, wait for it to finish, then sync its outputs
    Run {
        /// Kernel reference; read from kernel-metadata.json when omitted
        #[arg(short, long)]
        kernel: Option<String>,

        /// Directory holding kernel-metadata.json
        #[arg(long, default_value = ".")]
        dir: PathBuf,
    },

    /// Scaffold a kernel directory (kernel-metadata.json, starter script)
    Init {
        #[arg(short, long)]
        project: String,

        #[arg(short, long)]
        username: String,

        /// Target directory (default: ./<project slug>)
        #[arg(long)]
        dir: Option<PathBuf>,
    },
}
