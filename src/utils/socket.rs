//! Unix socket preparation and peer identification

use crate::agent::PeerCredentials;
use crate::error::{Error, Result};
use std::fs;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use tokio::net::UnixStream;

/// Remove a stale socket left behind by a previous run.
///
/// Symlinks are refused rather than followed or removed.
pub fn remove_stale_socket(path: &Path) -> Result<()> {
    match fs::symlink_metadata(path) {
        Ok(metadata) => {
            if metadata.file_type().is_symlink() {
                return Err(Error::Socket(format!(
                    "Refusing to replace symlink at {}",
                    path.display()
                )));
            }
            fs::remove_file(path).map_err(|e| {
                Error::Socket(format!(
                    "Failed to remove existing socket at {}: {}",
                    path.display(),
                    e
                ))
            })
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::Socket(format!(
            "Failed to check existing socket at {}: {}",
            path.display(),
            e
        ))),
    }
}

/// Create the socket's parent directory (mode 0700) if missing
pub fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        fs::create_dir_all(parent).map_err(|e| {
            Error::Socket(format!(
                "Failed to create directory {}: {}",
                parent.display(),
                e
            ))
        })?;
        fs::set_permissions(parent, fs::Permissions::from_mode(0o700))?;
    }
    Ok(())
}

/// Restrict a bound socket to its owner (0600)
pub fn set_owner_only(path: &Path) -> Result<()> {
    fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(|e| {
        Error::Socket(format!(
            "Failed to set permissions on socket at {}: {}",
            path.display(),
            e
        ))
    })
}

/// Everything that has to happen before `bind`
pub fn prepare_socket_path(path: &Path) -> Result<()> {
    remove_stale_socket(path)?;
    ensure_parent_dir(path)
}

/// Credentials of the process connected to `stream`
pub fn peer_credentials(stream: &UnixStream) -> Result<PeerCredentials> {
    let cred = stream
        .peer_cred()
        .map_err(|e| Error::Socket(format!("Failed to read peer credentials: {}", e)))?;
    Ok(PeerCredentials {
        uid: cred.uid(),
        gid: cred.gid(),
        pid: cred.pid(),
    })
}
