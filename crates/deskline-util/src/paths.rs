//! Default paths for deskline components
//!
//! Paths are user-writable by default (no root required):
//! - Config: `$XDG_CONFIG_HOME/deskline/config.toml` or `~/.config/deskline/config.toml`
//! - Data: `$XDG_DATA_HOME/deskline` or `~/.local/share/deskline`

use std::path::PathBuf;

/// Environment variable for overriding the config file path
pub const DESKLINE_CONFIG_ENV: &str = "DESKLINE_CONFIG";

/// Environment variable for overriding the data directory
pub const DESKLINE_DATA_DIR_ENV: &str = "DESKLINE_DATA_DIR";

/// Database filename within the data directory
pub const DATABASE_FILENAME: &str = "deskline.db";

/// Application subdirectory name
const APP_DIR: &str = "deskline";

/// Get the default config file path.
///
/// Order of precedence:
/// 1. `$DESKLINE_CONFIG` environment variable (if set)
/// 2. `$XDG_CONFIG_HOME/deskline/config.toml` (if XDG_CONFIG_HOME is set)
/// 3. `~/.config/deskline/config.toml` (fallback)
pub fn default_config_path() -> PathBuf {
    if let Ok(path) = std::env::var(DESKLINE_CONFIG_ENV) {
        return PathBuf::from(path);
    }

    config_path_without_env()
}

/// Get the config path without checking the DESKLINE_CONFIG env var.
pub fn config_path_without_env() -> PathBuf {
    xdg_dir("XDG_CONFIG_HOME", &[".config"], "config")
        .join("config.toml")
}

/// Get the default data directory.
///
/// Order of precedence:
/// 1. `$DESKLINE_DATA_DIR` environment variable (if set)
/// 2. `$XDG_DATA_HOME/deskline` (if XDG_DATA_HOME is set)
/// 3. `~/.local/share/deskline` (fallback)
pub fn default_data_dir() -> PathBuf {
    if let Ok(path) = std::env::var(DESKLINE_DATA_DIR_ENV) {
        return PathBuf::from(path);
    }

    data_dir_without_env()
}

/// Get the data directory without checking the DESKLINE_DATA_DIR env var.
/// Used for default values in configs where the env var is checked separately.
pub fn data_dir_without_env() -> PathBuf {
    xdg_dir("XDG_DATA_HOME", &[".local", "share"], "data")
}

fn xdg_dir(xdg_var: &str, home_fallback: &[&str], last_resort: &str) -> PathBuf {
    if let Ok(base) = std::env::var(xdg_var) {
        return PathBuf::from(base).join(APP_DIR);
    }

    if let Ok(home) = std::env::var("HOME") {
        let mut path = PathBuf::from(home);
        for part in home_fallback {
            path.push(part);
        }
        return path.join(APP_DIR);
    }

    PathBuf::from("/tmp").join(APP_DIR).join(last_resort)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_path_contains_deskline() {
        let path = config_path_without_env();
        assert!(path.to_string_lossy().contains("deskline"));
        assert!(path.to_string_lossy().ends_with("config.toml"));
    }

    #[test]
    fn data_dir_contains_deskline() {
        let path = data_dir_without_env();
        assert!(path.to_string_lossy().contains("deskline"));
    }
}
