//! Configuration file discovery and loading

use super::Config;
use crate::error::{Error, Result};
use crate::utils::path::APP_DIR;
use std::path::{Path, PathBuf};

/// A parsed configuration and where it came from
#[derive(Debug, Clone)]
pub struct ConfigFile {
    /// Empty when defaults were used
    pub path: PathBuf,
    pub config: Config,
}

/// Candidate location, with the form shown to users
#[derive(Debug, Clone)]
pub struct ConfigPath {
    pub path: PathBuf,
    pub description: &'static str,
}

const CONFIG_FILE_NAME: &str = "config.toml";

/// Search locations in priority order:
///
/// 1. `$XDG_CONFIG_HOME/keyhold/config.toml` (if set)
/// 2. `~/.config/keyhold/config.toml`
/// 3. `~/.keyhold/config.toml`
/// 4. `~/.keyhold.toml`
/// 5. `/etc/keyhold/config.toml` (unix)
pub fn config_search_paths() -> Vec<ConfigPath> {
    let mut paths = Vec::new();

    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        paths.push(ConfigPath {
            path: PathBuf::from(xdg).join(APP_DIR).join(CONFIG_FILE_NAME),
            description: "$XDG_CONFIG_HOME/keyhold/config.toml",
        });
    }

    if let Some(home) = dirs::home_dir() {
        let dotconfig = home.join(".config").join(APP_DIR).join(CONFIG_FILE_NAME);
        if !paths.iter().any(|p| p.path == dotconfig) {
            paths.push(ConfigPath {
                path: dotconfig,
                description: "~/.config/keyhold/config.toml",
            });
        }
        paths.push(ConfigPath {
            path: home.join(format!(".{}", APP_DIR)).join(CONFIG_FILE_NAME),
            description: "~/.keyhold/config.toml",
        });
        paths.push(ConfigPath {
            path: home.join(format!(".{}.toml", APP_DIR)),
            description: "~/.keyhold.toml",
        });
    }

    #[cfg(unix)]
    paths.push(ConfigPath {
        path: PathBuf::from("/etc").join(APP_DIR).join(CONFIG_FILE_NAME),
        description: "/etc/keyhold/config.toml",
    });

    paths
}

/// First existing file among [`config_search_paths`]
pub fn find_config_file() -> Option<PathBuf> {
    for cp in config_search_paths() {
        if cp.path.is_file() {
            tracing::debug!(path = %cp.path.display(), "Found configuration file");
            return Some(cp.path);
        }
    }

    tracing::debug!("No configuration file found in standard locations");
    None
}

/// Load configuration from the specified path
pub fn load_config(path: &Path) -> Result<ConfigFile> {
    tracing::debug!(path = %path.display(), "Loading configuration");

    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!(
            "Failed to read configuration file '{}': {}",
            path.display(),
            e
        ))
    })?;

    let config: Config = toml::from_str(&content).map_err(|e| {
        Error::Config(format!(
            "Failed to parse configuration file '{}': {}",
            path.display(),
            e
        ))
    })?;

    Ok(ConfigFile {
        path: path.to_path_buf(),
        config,
    })
}

impl ConfigFile {
    /// Load `path` if given, else the first file found, else defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path.map(Path::to_path_buf).or_else(find_config_file) {
            Some(path) => load_config(&path),
            None => Ok(Self {
                path: PathBuf::new(),
                config: Config::default(),
            }),
        }
    }
}
