//! Path expansion and default locations

use crate::error::{Error, Result};
use std::path::PathBuf;

/// Directory name used under the home directory and the config dirs
pub const APP_DIR: &str = "keyhold";

/// Expand `~` and `$VARS` in a user-supplied path
pub fn expand_path(path: &str) -> Result<PathBuf> {
    shellexpand::full(path)
        .map(|s| PathBuf::from(s.into_owned()))
        .map_err(|e| Error::Config(format!("Failed to expand path '{}': {}", path, e)))
}

/// `~/.keyhold`, or `.keyhold` in the working directory when there is no home
pub fn state_dir() -> PathBuf {
    let dot = format!(".{}", APP_DIR);
    match dirs::home_dir() {
        Some(home) => home.join(dot),
        None => PathBuf::from(dot),
    }
}
