//! Open the OAuth verification page in the user's browser.

use std::process::{Command, Stdio};
use tracing::debug;

/// Launcher commands to try, in order, for the current platform.
fn launchers(url: &str) -> Vec<Command> {
    let mut candidates = Vec::new();

    if cfg!(target_os = "windows") {
        let mut cmd = Command::new("cmd");
        cmd.args(["/c", "start", "", url]);
        candidates.push(cmd);
    } else if cfg!(target_os = "macos") {
        let mut cmd = Command::new("open");
        cmd.arg(url);
        candidates.push(cmd);
    } else {
        // WSL has no xdg-open handler by default
        if running_under_wsl() {
            let mut cmd = Command::new("wslview");
            cmd.arg(url);
            candidates.push(cmd);
        }
        let mut cmd = Command::new("xdg-open");
        cmd.arg(url);
        candidates.push(cmd);
    }

    candidates
}

fn running_under_wsl() -> bool {
    std::fs::read_to_string("/proc/version")
        .map(|v| {
            let v = v.to_lowercase();
            v.contains("microsoft") || v.contains("wsl")
        })
        .unwrap_or(false)
}

/// Try to open `url`. Returns `false` when no launcher could be spawned, in
/// which case the caller should just print the URL.
pub fn open_browser(url: &str) -> bool {
    for mut cmd in launchers(url) {
        let spawned = cmd
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .is_ok();
        if spawned {
            return true;
        }
        debug!("Browser launcher {:?} unavailable", cmd.get_program());
    }
    false
}
