use super::{parse_kernel_list, KernelInfo, KernelStatus};
use crate::config::PollingSettings;
use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;
use tracing::{debug, info};

#[cfg(windows)]
use std::os::windows::process::CommandExt;

/// Windows flag to prevent console window from appearing
#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x08000000;

/// Kaggle kernel runner.
/// Wraps the `kaggle` command line tool; every call is one blocking
/// subprocess and a non-zero exit fails the call.
pub struct KernelRunner {
    kaggle_path: PathBuf,
    /// Arguments placed before the kernel verbs (`python -m kaggle`)
    base_args: Vec<String>,
}

impl KernelRunner {
    pub fn new(kaggle_path: impl Into<PathBuf>) -> Self {
        Self {
            kaggle_path: kaggle_path.into(),
            base_args: Vec::new(),
        }
    }

    /// Build from a command line such as `kaggle` or `python3 -m kaggle.cli`.
    pub fn from_command_line(command_line: &str) -> Result<Self> {
        let mut words = command_line.split_whitespace();
        let program = words
            .next()
            .ok_or_else(|| Error::config("kaggle.cli_path is empty"))?;
        Ok(Self::new(program).with_base_args(words.map(str::to_string).collect()))
    }

    pub fn with_base_args(mut self, base_args: Vec<String>) -> Self {
        self.base_args = base_args;
        self
    }

    pub fn kaggle_path(&self) -> &Path {
        &self.kaggle_path
    }

    /// Run `kaggle <args>` and return its stdout.
    fn run_kaggle(&self, args: &[&str]) -> Result<String> {
        let rendered = format!("kaggle {}", args.join(" "));
        debug!("[Kaggle] {}", rendered);

        let mut cmd = Command::new(&self.kaggle_path);
        cmd.args(&self.base_args)
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        #[cfg(windows)]
        cmd.creation_flags(CREATE_NO_WINDOW);

        let output = cmd
            .output()
            .map_err(|e| Error::kernel(&rendered, format!("cannot execute kaggle: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let message = if stderr.is_empty() {
                // The kaggle CLI reports some failures on stdout
                String::from_utf8_lossy(&output.stdout).trim().to_string()
            } else {
                stderr
            };
            return Err(Error::kernel(rendered, message));
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    /// Kernels owned by the authenticated user.
    pub fn list_kernels(&self) -> Result<Vec<KernelInfo>> {
        let output = self.run_kaggle(&["kernels", "list", "--mine"])?;
        Ok(parse_kernel_list(&output))
    }

    /// Push the kernel in `dir` (must contain kernel-metadata.json).
    pub fn push(&self, dir: &Path) -> Result<String> {
        let dir = dir.to_string_lossy();
        info!("[Kaggle] Pushing kernel from {}", dir);
        self.run_kaggle(&["kernels", "push", "-p", &dir])
    }

    pub fn status(&self, kernel_id: &str) -> Result<KernelStatus> {
        let output = self.run_kaggle(&["kernels", "status", kernel_id])?;
        Ok(KernelStatus::parse(&output))
    }

    /// Download the kernel's output files into `destination`.
    pub fn fetch_outputs(&self, kernel_id: &str, destination: &Path) -> Result<()> {
        std::fs::create_dir_all(destination).map_err(|e| Error::file(destination, e))?;
        let dest = destination.to_string_lossy();
        info!("[Kaggle] Downloading outputs of {} to {}", kernel_id, dest);
        self.run_kaggle(&["kernels", "output", kernel_id, "-p", &dest])?;
        Ok(())
    }

    /// Poll until the kernel finishes.
    ///
    /// Waits `initial_delay_secs`, then checks every `interval_secs` with no
    /// upper bound; interrupting the process is the only way to stop early.
    /// `on_tick` sees every observed status.
    pub fn wait_for_completion(
        &self,
        kernel_id: &str,
        polling: PollingSettings,
        mut on_tick: impl FnMut(&KernelStatus),
    ) -> Result<KernelStatus> {
        std::thread::sleep(Duration::from_secs(polling.initial_delay_secs));

        loop {
            let status = self.status(kernel_id)?;
            on_tick(&status);

            match status {
                KernelStatus::Complete => return Ok(status),
                KernelStatus::Error | KernelStatus::Cancelled => {
                    return Err(Error::kernel(
                        format!("kaggle kernels status {}", kernel_id),
                        format!("kernel finished with status {}", status),
                    ))
                }
                _ => std::thread::sleep(Duration::from_secs(polling.interval_secs)),
            }
        }
    }
}
