//! Command implementations for the kdcli binary.
//!
//! Every command loads the settings itself; remote storage is only opened
//! (and authorized) by commands that need it.

use anyhow::{bail, Context, Result};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use kdcli::config::{lookup, starter_settings, Settings};
use kdcli::kernel::{scaffold_kernel_dir, KernelMetadata, KernelRunner};
use kdcli::metadata::{MetadataStore, SyncEvent, SyncEventKind};
use kdcli::project::{
    slugify, validate_project_config, ProjectConfigBuilder, ProjectManager, PROJECT_CONFIG_FILE,
};
use kdcli::sync::oauth::DeviceCode;
use kdcli::sync::{
    self, download_to, find_folder, resolve_folder, setup_folders, upload_path, DriveLayout,
    FileEvent, RemoteStorage, SyncOptions,
};
use kdcli::utils::{atomic_write, collect_files, is_sensitive, open_browser};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;

// ============ HELPERS ============

fn load_settings(path: &Path) -> Result<Settings> {
    Settings::load(path).with_context(|| {
        format!(
            "Cannot load settings from {} (run 'kdcli init' to create one)",
            path.display()
        )
    })
}

fn show_device_code(code: &DeviceCode) {
    println!();
    println!("To authorize Google Drive access:");
    println!("  1. Open: {}", code.verification_url.cyan().bold());
    println!("  2. Enter code: {}", code.user_code.yellow().bold());
    println!(
        "Waiting for authorization (expires in {} seconds)...",
        code.expires_in
    );
    if !open_browser(&code.verification_url) {
        println!("{}", "Could not open a browser, open the URL manually.".dimmed());
    }
}

fn connect(settings: &Settings) -> Result<Box<dyn RemoteStorage>> {
    sync::connect(settings, show_device_code).context("Cannot connect to remote storage")
}

fn kernel_runner(settings: &Settings) -> Result<KernelRunner> {
    Ok(KernelRunner::from_command_line(&settings.kaggle_cli())?)
}

fn metadata_store(settings: &Settings) -> Result<MetadataStore> {
    Ok(MetadataStore::new(settings.get_path("paths.metadata_file")?))
}

fn spinner(message: String) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("  {spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.enable_steady_tick(Duration::from_millis(100));
    pb.set_message(message);
    pb
}

/// ID of a well-known folder under the Drive root (Outputs, Projects, Uploads).
fn well_known_folder(settings: &Settings, storage: &dyn RemoteStorage, name: &str) -> Result<String> {
    let layout_path = settings.get_path("paths.drive_config_file")?;
    let logical = settings.drive_subfolder(name)?;
    Ok(resolve_folder(storage, &layout_path, &logical)?)
}

fn project_manager<'a>(settings: &Settings, storage: &'a dyn RemoteStorage) -> ProjectManager<'a> {
    let manager = ProjectManager::new(storage);
    match settings.get_path("paths.templates_dir") {
        Ok(dir) => manager.with_template(dir.join(PROJECT_CONFIG_FILE)),
        Err(_) => manager,
    }
}

/// A subfolder of an existing project, created if missing.
fn project_subfolder(
    settings: &Settings,
    storage: &dyn RemoteStorage,
    project_name: &str,
    sub: &str,
) -> Result<String> {
    let root = well_known_folder(settings, storage, "Projects")?;
    let manager = project_manager(settings, storage);
    let Some(project) = manager.find_project(&root, project_name)? else {
        bail!(
            "Project '{}' not found. Create it with 'kdcli create-project'.",
            project_name
        );
    };
    let id = match find_folder(storage, sub, &project.folder_id)? {
        Some(id) => id,
        None => storage.create_folder(sub, &project.folder_id)?,
    };
    Ok(id)
}

fn text_field<'a>(config: &'a Value, path: &str) -> &'a str {
    lookup(config, path).and_then(Value::as_str).unwrap_or("-")
}

/// Fetch, upload and record one kernel's outputs.
fn sync_outputs(
    settings: &Settings,
    runner: &KernelRunner,
    storage: &dyn RemoteStorage,
    kernel: &str,
    folder_id: &str,
    force: bool,
) -> Result<()> {
    let store = metadata_store(settings)?;
    let temp_dir = settings.get_path("paths.temp_dir")?;

    let pb = spinner(format!("Downloading outputs of {}...", kernel));
    let result = sync::sync_kernel(
        runner,
        storage,
        &store,
        &temp_dir,
        kernel,
        folder_id,
        SyncOptions { force },
        |event| match event {
            FileEvent::Uploading(name) => pb.set_message(format!("Uploading {}", name)),
            FileEvent::Skipped(name) => pb.set_message(format!("Unchanged {}", name)),
            FileEvent::Failed(name) => pb.set_message(format!("Failed {}", name)),
        },
    );
    pb.finish_and_clear();
    let report = result.with_context(|| format!("Error syncing kernel {}", kernel))?;

    println!(
        "  {} uploaded, {} unchanged",
        report.uploaded.len().to_string().green(),
        report.skipped.len().to_string().dimmed()
    );
    if !report.is_complete() {
        for (name, err) in &report.failed {
            println!("  {} {}: {}", "✗".red(), name, err);
        }
        bail!(
            "{} of {} files failed to upload",
            report.failed.len(),
            report.failed.len() + report.uploaded.len() + report.skipped.len()
        );
    }

    println!(
        "{}",
        format!(
            "✅ Synced {} files from {}",
            report.uploaded.len() + report.skipped.len(),
            kernel
        )
        .green()
        .bold()
    );
    Ok(())
}

// ============ SETUP COMMAND ============

pub fn setup(config: &Path) -> Result<()> {
    println!("{}", "🚀 kdcli Setup".bold().cyan());
    println!();

    let settings = load_settings(config)?;
    settings.validate()?;
    settings.ensure_directories()?;
    println!("{} Local directories ready", "✓".green());

    let creds = settings.check_credentials()?;
    for (name, present, service) in [
        ("Kaggle", creds.kaggle, "kaggle"),
        ("Drive", creds.drive, "drive"),
    ] {
        let path = settings.credentials_path(service)?;
        if present {
            println!("{} {} credentials: {}", "✓".green(), name, path.display());
        } else {
            println!(
                "{} {} credentials missing: {}",
                "!".yellow(),
                name,
                path.display().to_string().yellow()
            );
        }
    }

    let packages = settings.dependencies();
    if !packages.is_empty() {
        println!("  Kernel packages: {}", packages.join(", ").dimmed());
    }

    let storage = connect(&settings)?;
    let folders = settings.drive_folders()?;
    let layout = setup_folders(storage.as_ref(), &folders)?;
    layout.save(&settings.get_path("paths.drive_config_file")?)?;

    println!();
    println!("{}", "Folder layout:".bold());
    for (path, id) in &layout.folder_structure {
        println!("  {} {} {}", "✓".green(), path, id.dimmed());
    }

    metadata_store(&settings)?.update(|m| {
        m.append_history(SyncEvent::new(SyncEventKind::Setup, None, folders.len()))
    })?;

    println!();
    println!("{}", "✓ Setup complete!".green().bold());
    Ok(())
}

// ============ STATUS COMMAND ============

pub fn status(config: &Path) -> Result<()> {
    println!("{}", "📊 kdcli Status".bold().cyan());
    println!();

    let settings = load_settings(config)?;
    let output = settings.output_settings();
    println!(
        "Config:    {}",
        settings.source().unwrap_or(config).display()
    );

    let runner = kernel_runner(&settings)?;
    match runner.list_kernels() {
        Ok(kernels) => {
            println!("Kernels:   {}", kernels.len().to_string().cyan());
            for kernel in kernels.iter().take(output.max_kernels_shown) {
                println!("  • {} ({})", kernel.name, kernel.language);
            }
            if kernels.len() > output.max_kernels_shown {
                println!("  ... and {} more", kernels.len() - output.max_kernels_shown);
            }
        }
        Err(e) => println!("Kernels:   {}", format!("unavailable ({})", e).yellow()),
    }

    let layout = DriveLayout::load(&settings.get_path("paths.drive_config_file")?)?;
    if layout.folder_structure.is_empty() {
        println!("Drive:     {}", "not set up (run 'kdcli setup')".yellow());
    } else {
        println!(
            "Drive:     {} folders recorded",
            layout.folder_structure.len().to_string().cyan()
        );
    }

    let metadata = metadata_store(&settings)?.load()?;
    println!(
        "Synced:    {} kernels",
        metadata.kaggle_kernels.len().to_string().cyan()
    );
    match metadata.last_sync {
        Some(ts) => println!("Last sync: {}", ts.format("%Y-%m-%d %H:%M")),
        None => println!("Last sync: {}", "never".dimmed()),
    }

    let recent = metadata.recent_history(output.recent_history);
    if !recent.is_empty() {
        println!();
        println!("{}", "Recent activity:".bold());
        for event in recent {
            println!(
                "  • {}: {} ({})",
                event.kind,
                event.kernel.as_deref().unwrap_or("N/A"),
                event.timestamp.format("%Y-%m-%d %H:%M")
            );
        }
    }
    Ok(())
}

// ============ SYNC COMMAND ============

pub fn sync(config: &Path, kernel: &str, project: Option<&str>, force: bool) -> Result<()> {
    println!("{}", format!("📤 Syncing kernel: {}", kernel).bold().cyan());
    println!();

    let settings = load_settings(config)?;
    let runner = kernel_runner(&settings)?;
    let storage = connect(&settings)?;
    let folder_id = match project {
        Some(name) => project_subfolder(&settings, storage.as_ref(), name, "outputs")?,
        None => well_known_folder(&settings, storage.as_ref(), "Outputs")?,
    };

    sync_outputs(&settings, &runner, storage.as_ref(), kernel, &folder_id, force)
}

// ============ LIST COMMAND ============

pub fn list(config: &Path) -> Result<()> {
    let settings = load_settings(config)?;
    let kernels = kernel_runner(&settings)?
        .list_kernels()
        .context("Error listing Kaggle kernels")?;

    println!(
        "{}",
        format!("📋 Found {} Kaggle kernels:", kernels.len()).bold().cyan()
    );
    for kernel in &kernels {
        println!(
            "  • {} - {} {}",
            kernel.name,
            kernel.title,
            format!("[{} {}]", kernel.language, kernel.kernel_type).dimmed()
        );
    }
    Ok(())
}

// ============ UPLOAD / DOWNLOAD COMMANDS ============

pub fn upload(config: &Path, file: &Path, project: Option<&str>) -> Result<()> {
    println!("{}", format!("📤 Uploading {}", file.display()).bold().cyan());

    let settings = load_settings(config)?;
    let patterns = settings.sensitive_patterns();
    let candidates = if file.is_dir() {
        collect_files(file)?
    } else {
        vec![file.to_path_buf()]
    };
    let blocked: Vec<_> = candidates
        .iter()
        .filter(|path| is_sensitive(path, &patterns))
        .collect();
    if !blocked.is_empty() {
        for path in &blocked {
            println!("  {} {}", "✗".red(), path.display());
        }
        bail!(
            "Refusing to upload {} sensitive file(s) (security.sensitive_files)",
            blocked.len()
        );
    }

    let storage = connect(&settings)?;
    let parent = match project {
        Some(name) => project_subfolder(&settings, storage.as_ref(), name, "data")?,
        None => well_known_folder(&settings, storage.as_ref(), "Uploads")?,
    };

    let pb = spinner("Uploading...".to_string());
    let result = upload_path(storage.as_ref(), file, &parent, |path| {
        pb.set_message(format!("Uploading {}", path.display()))
    });
    pb.finish_and_clear();
    let report = result?;

    for (path, id) in &report.uploaded {
        println!("  {} {} {}", "✓".green(), path.display(), id.dimmed());
    }
    metadata_store(&settings)?.update(|m| {
        m.append_history(SyncEvent::new(
            SyncEventKind::Upload,
            None,
            report.uploaded.len(),
        ))
    })?;

    if !report.is_complete() {
        for (path, err) in &report.failed {
            println!("  {} {}: {}", "✗".red(), path.display(), err);
        }
        bail!(
            "{} of {} files failed to upload",
            report.failed.len(),
            report.failed.len() + report.uploaded.len()
        );
    }
    println!(
        "{}",
        format!("✅ Uploaded {} files", report.uploaded.len())
            .green()
            .bold()
    );
    Ok(())
}

pub fn download(config: &Path, file_id: &str, destination: &Path) -> Result<()> {
    let settings = load_settings(config)?;
    let storage = connect(&settings)?;

    let pb = spinner(format!("Downloading {}...", file_id));
    let result = download_to(storage.as_ref(), file_id, destination);
    pb.finish_and_clear();
    let path = result.with_context(|| format!("Error downloading file {}", file_id))?;

    println!("{} Downloaded to {}", "✓".green(), path.display());
    Ok(())
}

// ============ PROJECT COMMANDS ============

pub fn create_project(
    config: &Path,
    name: &str,
    username: &str,
    description: Option<&str>,
) -> Result<()> {
    println!("{}", format!("📁 Creating project: {}", name).bold().cyan());

    let settings = load_settings(config)?;
    let storage = connect(&settings)?;
    let root = well_known_folder(&settings, storage.as_ref(), "Projects")?;
    let manager = project_manager(&settings, storage.as_ref());

    let mut builder = ProjectConfigBuilder::new(name, username);
    if let Some(description) = description {
        builder = builder.description(description);
    }
    let project = manager.create_project(&root, &builder)?;

    let kernel_id = builder.kernel_id();
    metadata_store(&settings)?.update(|m| {
        m.append_history(SyncEvent::new(
            SyncEventKind::ProjectCreate,
            Some(kernel_id.as_str()),
            0,
        ))
    })?;

    println!("{}", "✅ Project created successfully!".green().bold());
    println!("   Folder ID: {}", project.folder_id);
    println!("   Config:    {}", PROJECT_CONFIG_FILE);
    println!("   Kernel:    {}", kernel_id.cyan());
    Ok(())
}

pub fn list_projects(config: &Path) -> Result<()> {
    let settings = load_settings(config)?;
    let storage = connect(&settings)?;
    let root = well_known_folder(&settings, storage.as_ref(), "Projects")?;
    let projects = project_manager(&settings, storage.as_ref()).list_projects(&root)?;

    println!(
        "{}",
        format!("📂 Found {} projects:", projects.len()).bold().cyan()
    );
    for project in &projects {
        let status = lookup(&project.config, "project.status")
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        println!("  • {} ({})", project.name, status);
    }
    Ok(())
}

pub fn project_status(config: &Path, name: &str) -> Result<()> {
    let settings = load_settings(config)?;
    let storage = connect(&settings)?;
    let root = well_known_folder(&settings, storage.as_ref(), "Projects")?;
    let Some(project) = project_manager(&settings, storage.as_ref()).find_project(&root, name)?
    else {
        bail!("Project '{}' not found", name);
    };

    println!("{}", format!("📊 Project: {}", project.name).bold().cyan());
    println!();
    println!("Folder:      {}", project.folder_id);
    println!("Status:      {}", text_field(&project.config, "project.status"));
    println!("Kernel:      {}", text_field(&project.config, "kaggle.kernel_id"));
    println!("Created:     {}", text_field(&project.config, "dates.created"));
    println!("Updated:     {}", text_field(&project.config, "dates.updated"));
    println!(
        "Description: {}",
        text_field(&project.config, "project.description")
    );

    println!();
    let errors = validate_project_config(&project.config);
    if errors.is_empty() {
        println!("{}", "✓ Config valid".green());
    } else {
        for error in &errors {
            println!("{} {}", "✗".red(), error);
        }
    }

    let metadata = metadata_store(&settings)?.load()?;
    let kernel_id = lookup(&project.config, "kaggle.kernel_id").and_then(Value::as_str);
    match kernel_id.and_then(|id| metadata.kernel(id)) {
        Some(record) => println!(
            "Last sync:   {} ({} files)",
            record.last_sync.format("%Y-%m-%d %H:%M"),
            record.files.len()
        ),
        None => println!("Last sync:   {}", "not synced yet".dimmed()),
    }

    if !errors.is_empty() {
        bail!("Project config has {} problem(s)", errors.len());
    }
    Ok(())
}

// ============ RUN COMMAND ============

pub fn run(config: &Path, kernel: Option<&str>, dir: &Path) -> Result<()> {
    let kernel_id = match kernel {
        Some(id) => id.to_string(),
        None => KernelMetadata::load(dir)
            .with_context(|| format!("No kernel given and no kernel metadata in {}", dir.display()))?
            .id,
    };
    println!("{}", format!("🏃 Running kernel: {}", kernel_id).bold().cyan());
    println!();

    let settings = load_settings(config)?;
    let runner = kernel_runner(&settings)?;
    let storage = connect(&settings)?;

    println!("{}", "Step 1/3: Pushing kernel...".bold());
    runner.push(dir)?;
    println!("  {} Pushed {}", "✓".green(), dir.display());

    println!("{}", "Step 2/3: Waiting for completion...".bold());
    let pb = spinner(format!("{} queued", kernel_id));
    let result = runner.wait_for_completion(&kernel_id, settings.polling(), |status| {
        pb.set_message(format!("{} is {}", kernel_id, status))
    });
    pb.finish_and_clear();
    let status = result?;
    println!("  {} Kernel {}", "✓".green(), status);

    println!("{}", "Step 3/3: Syncing outputs...".bold());
    let folder_id = well_known_folder(&settings, storage.as_ref(), "Outputs")?;
    sync_outputs(&settings, &runner, storage.as_ref(), &kernel_id, &folder_id, false)
}

// ============ INIT COMMAND ============

pub fn init(config: &Path, project: &str, username: &str, dir: Option<&Path>) -> Result<()> {
    println!("{}", format!("🧪 Initializing kernel: {}", project).bold().cyan());

    if !config.exists() {
        let yaml = serde_yaml::to_string(&starter_settings())?;
        atomic_write(config, yaml.as_bytes())?;
        println!("{} Created starter settings at {}", "✓".green(), config.display());
    }
    let settings = load_settings(config)?;

    let metadata = KernelMetadata::for_project(project, username, &settings.kernel_defaults());
    let dir = dir
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(slugify(project)));
    let created = scaffold_kernel_dir(&dir, &metadata)?;

    if created.is_empty() {
        println!("{}", "✓ Kernel directory already complete".green());
    }
    for path in &created {
        println!("  {} {}", "✓".green(), path.display());
    }
    println!();
    println!("Kernel: {}", metadata.id.cyan());
    println!(
        "Edit {} then run {}",
        dir.join(&metadata.code_file).display(),
        format!("kdcli run --dir {}", dir.display()).cyan()
    );
    Ok(())
}
