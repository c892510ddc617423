//! Tamper and corruption detection via checksum sidecar files.
//!
//! Every protected data file gets a `<name>.checksum` sidecar holding a
//! base64 SHA-256 digest, written at save time and compared at load time.
//! There is no secret key involved: this guards against accidental
//! corruption and out-of-band edits, not against an adversary who can
//! rewrite both files (authenticated encryption in `td-vault` is the
//! adversarial-tamper control). A missing sidecar means "cannot verify" and
//! is treated as untrusted, never as a pass.

use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, warn};

use crate::fs::{atomic_write_data, AtomicWriteError};

/// Extension appended to the protected file's full name.
const CHECKSUM_SUFFIX: &str = "checksum";

/// Buffer size for streamed file digests.
const DIGEST_BUF_SIZE: usize = 8 * 1024;

#[derive(Debug, Error)]
pub enum IntegrityError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Checksum sidecar missing for {0}")]
    ChecksumMissing(PathBuf),
    #[error("Checksum mismatch for {0}")]
    Mismatch(PathBuf),
    #[error("Atomic write failed: {0}")]
    Write(#[from] AtomicWriteError),
}

/// Base64 SHA-256 digest of an in-memory buffer.
pub fn digest_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    BASE64.encode(hasher.finalize())
}

/// Base64 SHA-256 digest of a file, streamed in fixed-size buffers.
pub fn digest_file(path: &Path) -> Result<String, IntegrityError> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; DIGEST_BUF_SIZE];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(BASE64.encode(hasher.finalize()))
}

/// Path of the checksum sidecar for `path`: `<file-name>.checksum` in the
/// same directory, keeping the original extension intact.
pub fn checksum_path(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!("{file_name}.{CHECKSUM_SUFFIX}"))
}

/// Write the digest line to the sidecar next to `path`.
pub fn save_checksum(path: &Path, digest: &str) -> Result<(), IntegrityError> {
    let sidecar = checksum_path(path);
    atomic_write_data(&sidecar, format!("{digest}\n").as_bytes())?;
    debug!(sidecar = %sidecar.display(), "Saved checksum sidecar");
    Ok(())
}

/// Read the digest from the sidecar, `Ok(None)` when it does not exist.
pub fn read_checksum(path: &Path) -> Result<Option<String>, IntegrityError> {
    let sidecar = checksum_path(path);
    match std::fs::read_to_string(&sidecar) {
        Ok(content) => Ok(Some(content.trim().to_owned())),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Verify a file against its sidecar.
///
/// Returns `false` when the sidecar is missing or unreadable ("cannot
/// verify"), when the file cannot be digested, or when the digests differ.
pub fn verify(path: &Path) -> bool {
    let expected = match read_checksum(path) {
        Ok(Some(digest)) => digest,
        Ok(None) => {
            warn!(path = %path.display(), "No checksum sidecar, cannot verify");
            return false;
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to read checksum sidecar");
            return false;
        }
    };

    match digest_file(path) {
        Ok(actual) => actual == expected,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to digest file");
            false
        }
    }
}

/// Atomically write `data` to `path` and record its checksum sidecar.
pub fn save_with_integrity_check(path: &Path, data: &[u8]) -> Result<(), IntegrityError> {
    atomic_write_data(path, data)?;
    save_checksum(path, &digest_bytes(data))?;
    Ok(())
}

/// Load `path` only if its checksum verifies.
///
/// Either returns verified bytes or fails: [`IntegrityError::ChecksumMissing`]
/// when the sidecar is absent, [`IntegrityError::Mismatch`] when the stored
/// digest does not match the file contents. Unverified data is never
/// returned.
pub fn load_with_integrity_check(path: &Path) -> Result<Vec<u8>, IntegrityError> {
    let data = std::fs::read(path)?;

    let expected = read_checksum(path)?
        .ok_or_else(|| IntegrityError::ChecksumMissing(path.to_path_buf()))?;

    if digest_bytes(&data) != expected {
        warn!(path = %path.display(), "Checksum mismatch, refusing to load");
        return Err(IntegrityError::Mismatch(path.to_path_buf()));
    }

    Ok(data)
}
