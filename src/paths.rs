//! Application path management.
//!
//! The block-list lives where the user keeps the executable, matching how the
//! tool is usually deployed (a folder with the binary and
//! `blocked_devices.txt` side by side).
//!
//! ## Lookup order
//!
//! 1. the current working directory, if it holds `blocked_devices.txt`;
//! 2. the executable's directory, if it holds `blocked_devices.txt`;
//! 3. the per-user config directory (`%APPDATA%\Audio KeepAlive` or the
//!    platform equivalent), if it holds `blocked_devices.txt`;
//! 4. otherwise the working directory (the list is then simply missing).
//!
//! The settings file and the `logs` directory sit next to the block-list.

use std::path::{Path, PathBuf};

/// Application name used for the per-user directory
const APP_NAME: &str = "Audio KeepAlive";

pub const BLOCKLIST_FILE: &str = "blocked_devices.txt";
pub const CONFIG_FILE: &str = "keepalive.yaml";

/// Resolved locations of the block-list, settings file and logs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppPaths {
    /// Path to the block-list file
    pub blocklist: PathBuf,
    /// Path to the optional settings file
    pub config: PathBuf,
    /// Path to the logs directory
    pub logs_dir: PathBuf,
}

impl AppPaths {
    /// Detect paths from the environment.
    ///
    /// Note: This is called before logging is initialized.
    pub fn detect() -> Self {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        let exe_dir = std::env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
            .unwrap_or_else(|| PathBuf::from("."));
        let user_dir = dirs::config_dir().map(|d| d.join(APP_NAME));

        let paths = Self::resolve(&cwd, &exe_dir, user_dir.as_deref());

        #[cfg(debug_assertions)]
        eprintln!("[paths] Base directory: {}", paths.base_dir().display());

        paths
    }

    /// Pick the first directory that holds a block-list
    pub fn resolve(cwd: &Path, exe_dir: &Path, user_dir: Option<&Path>) -> Self {
        let base = [Some(cwd), Some(exe_dir), user_dir]
            .into_iter()
            .flatten()
            .find(|dir| dir.join(BLOCKLIST_FILE).is_file())
            .unwrap_or(cwd);

        Self::in_dir(base)
    }

    /// All files inside one base directory
    pub fn in_dir(base: &Path) -> Self {
        Self {
            blocklist: base.join(BLOCKLIST_FILE),
            config: base.join(CONFIG_FILE),
            logs_dir: base.join("logs"),
        }
    }

    /// Get the base directory (for displaying in logs)
    pub fn base_dir(&self) -> PathBuf {
        self.blocklist
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_prefers_working_directory() {
        let cwd = TempDir::new().unwrap();
        let exe = TempDir::new().unwrap();
        fs::write(cwd.path().join(BLOCKLIST_FILE), "HDMI").unwrap();
        fs::write(exe.path().join(BLOCKLIST_FILE), "HDMI").unwrap();

        let paths = AppPaths::resolve(cwd.path(), exe.path(), None);
        assert_eq!(paths.blocklist, cwd.path().join(BLOCKLIST_FILE));
        assert_eq!(paths.logs_dir, cwd.path().join("logs"));
    }

    #[test]
    fn test_falls_back_to_exe_then_user_dir() {
        let cwd = TempDir::new().unwrap();
        let exe = TempDir::new().unwrap();
        let user = TempDir::new().unwrap();
        fs::write(user.path().join(BLOCKLIST_FILE), "HDMI").unwrap();

        let paths = AppPaths::resolve(cwd.path(), exe.path(), Some(user.path()));
        assert_eq!(paths.base_dir(), user.path());

        fs::write(exe.path().join(BLOCKLIST_FILE), "HDMI").unwrap();
        let paths = AppPaths::resolve(cwd.path(), exe.path(), Some(user.path()));
        assert_eq!(paths.config, exe.path().join(CONFIG_FILE));
    }

    #[test]
    fn test_no_blocklist_anywhere_uses_cwd() {
        let cwd = TempDir::new().unwrap();
        let exe = TempDir::new().unwrap();

        let paths = AppPaths::resolve(cwd.path(), exe.path(), None);
        assert_eq!(paths, AppPaths::in_dir(cwd.path()));
    }
}
