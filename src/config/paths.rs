//! Platform directories for config, data and state.

use directories::ProjectDirs;
use std::path::PathBuf;

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "cloudfs", "cloudfs-adapter")
}

/// `<config dir>/config.toml`
pub fn global_config_file() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().join("config.toml"))
}

/// Default link store location
pub fn default_link_store_path() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.data_dir().join("links"))
}

/// Directory for the default log file; falls back to the data dir on
/// platforms without a state dir
pub fn state_dir() -> Option<PathBuf> {
    project_dirs().map(|dirs| {
        dirs.state_dir()
            .unwrap_or_else(|| dirs.data_local_dir())
            .to_path_buf()
    })
}
