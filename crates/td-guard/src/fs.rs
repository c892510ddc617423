//! Atomic file persistence shared by the key container, checksum sidecars,
//! and the audit log.

use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum AtomicWriteError {
    #[error("Failed to persist temp file: {0}")]
    Persist(#[from] tempfile::PersistError),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Parent directory does not exist: {0}")]
    NoParentDir(PathBuf),
}

/// Atomically write content to a file.
///
/// Process: write to temp file in same directory -> fsync -> rename over
/// target -> fsync the directory entry. The file is either fully written or
/// not changed at all, even across a crash mid-write.
pub fn atomic_write(path: &Path, content: &[u8], mode: Option<u32>) -> Result<(), AtomicWriteError> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .ok_or_else(|| AtomicWriteError::NoParentDir(path.to_path_buf()))?;

    if !parent.exists() {
        return Err(AtomicWriteError::NoParentDir(parent.to_path_buf()));
    }

    // Temp file in the same directory so the rename stays on one filesystem.
    let mut temp = NamedTempFile::new_in(parent)?;
    temp.write_all(content)?;
    temp.as_file().sync_all()?;

    #[cfg(unix)]
    if let Some(m) = mode {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(temp.path(), std::fs::Permissions::from_mode(m))?;
    }
    #[cfg(not(unix))]
    let _ = mode;

    debug!(path = %path.display(), "Atomic write: persisting temp file");
    temp.persist(path)?;

    // Persist the directory entry as well.
    if let Ok(dir) = File::open(parent) {
        let _ = dir.sync_all();
    }

    Ok(())
}

/// Atomically write with standard permissions (0644 on Unix).
pub fn atomic_write_data(path: &Path, content: &[u8]) -> Result<(), AtomicWriteError> {
    atomic_write(path, content, Some(0o644))
}

/// Atomically write with restricted permissions (0600 on Unix), for files
/// holding secrets such as the key container or salt files.
pub fn atomic_write_secret(path: &Path, content: &[u8]) -> Result<(), AtomicWriteError> {
    atomic_write(path, content, Some(0o600))
}
