//! kdcli - Kaggle kernels archived to Google Drive
//!
//! Usage:
//!   kdcli setup            - Create the Drive folder layout
//!   kdcli sync --kernel K  - Download kernel outputs and upload them
//!   kdcli run              - Push, wait, sync
//!   kdcli status           - Show kernels and sync history

mod cli;

use anyhow::Result;
use clap::Parser;
use cli::{commands, Cli, Commands};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive(format!("kdcli={}", log_level).parse()?),
        )
        .with_target(false)
        .init();

    let config = cli.config.as_path();
    match cli.command {
        Commands::Setup => commands::setup(config),
        Commands::Status => commands::status(config),
        Commands::Sync {
            kernel,
            project,
            force,
        } => commands::sync(config, &kernel, project.as_deref(), force),
        Commands::List => commands::list(config),
        Commands::Upload { file, project } => commands::upload(config, &file, project.as_deref()),
        Commands::Download { file, destination } => commands::download(config, &file, &destination),
        Commands::CreateProject {
            project,
            username,
            description,
        } => commands::create_project(config, &project, &username, description.as_deref()),
        Commands::ListProjects => commands::list_projects(config),
        Commands::ProjectStatus { project } => commands::project_status(config, &project),
        Commands::Run { kernel, dir } => commands::run(config, kernel.as_deref(), &dir),
        Commands::Init {
            project,
            username,
            dir,
        } => commands::init(config, &project, &username, dir.as_deref()),
    }
}
