use std::env;
use std::path::{Path, PathBuf};

/// Directory name under the per-user application data root.
const APP_DIR: &str = "trellis-nn";

/// Resolves the application storage root.
///
/// `TRELLIS_NN_HOME` overrides the per-OS default, which keeps tests and
/// containers away from the real user profile.
pub fn data_root() -> PathBuf {
    if let Ok(home) = env::var("TRELLIS_NN_HOME") {
        return PathBuf::from(home);
    }
    platform_data_dir().join(APP_DIR)
}

#[cfg(target_os = "windows")]
fn platform_data_dir() -> PathBuf {
    env::var("APPDATA")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
}

#[cfg(target_os = "macos")]
fn platform_data_dir() -> PathBuf {
    home_dir().join("Library").join("Application Support")
}

#[cfg(not(any(target_os = "windows", target_os = "macos")))]
fn platform_data_dir() -> PathBuf {
    home_dir().join(".local").join("share")
}

#[cfg(not(target_os = "windows"))]
fn home_dir() -> PathBuf {
    env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
}

/// Directory holding one subdirectory per project.
pub fn project_files_dir(root: &Path) -> PathBuf {
    root.join("project_files")
}

pub fn project_dir(root: &Path, name: &str) -> PathBuf {
    project_files_dir(root).join(name)
}

pub fn config_path(root: &Path, name: &str) -> PathBuf {
    project_dir(root, name).join("config.json")
}

/// Where training leaves the model artifact for the named project.
pub fn model_path(root: &Path, name: &str) -> PathBuf {
    project_dir(root, name).join(format!("{}.json", name))
}

/// Rejects empty names and path traversal attempts before any of the
/// path helpers touch the filesystem.
pub fn is_safe_project_name(name: &str) -> bool {
    !name.is_empty() && !name.contains('/') && !name.contains('\\') && !name.contains("..")
}
