//! Passphrase key stretching with persisted salt sidecars.
//!
//! Turns a human passphrase plus a random salt into a 256-bit key via
//! PBKDF2-HMAC-SHA256. The salt is generated once per encrypted artifact and
//! persisted in a `<artifact>.salt` sidecar; it is not secret, but it is not
//! re-derivable either, so losing the sidecar makes the ciphertext
//! unrecoverable.

use std::io;
use std::path::{Path, PathBuf};

use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use sha2::Sha256;
use thiserror::Error;
use tracing::debug;

use td_guard::fs::{atomic_write_secret, AtomicWriteError};

use crate::keyring::{MasterKey, KEY_LEN};

/// Salt length in bytes.
pub const SALT_LEN: usize = 16;

/// PBKDF2-HMAC-SHA256 iteration count (OWASP 2023 recommendation).
pub const PBKDF2_ROUNDS: u32 = 210_000;

/// Extension appended to the artifact's full name for the salt sidecar.
const SALT_SUFFIX: &str = "salt";

#[derive(Debug, Error)]
pub enum KdfError {
    #[error("Salt file missing: {0}")]
    SaltMissing(PathBuf),

    #[error("Salt file malformed: {0}")]
    SaltInvalid(PathBuf),

    #[error("Failed to persist salt file: {0}")]
    Write(#[from] AtomicWriteError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Fresh random salt from the OS cryptographic random source.
pub fn generate_salt() -> [u8; SALT_LEN] {
    let mut salt = [0u8; SALT_LEN];
    rand::rngs::OsRng.fill_bytes(&mut salt);
    salt
}

/// Stretch a passphrase and salt into a 256-bit key.
pub fn derive_key(passphrase: &str, salt: &[u8]) -> MasterKey {
    derive_key_with_rounds(passphrase, salt, PBKDF2_ROUNDS)
}

pub(crate) fn derive_key_with_rounds(passphrase: &str, salt: &[u8], rounds: u32) -> MasterKey {
    let mut out = [0u8; KEY_LEN];
    pbkdf2_hmac::<Sha256>(passphrase.as_bytes(), salt, rounds, &mut out);
    MasterKey::from_bytes(out)
}

/// Path of the salt sidecar for `artifact`: `<file-name>.salt` in the same
/// directory, keeping the original extension intact.
pub fn salt_path(artifact: &Path) -> PathBuf {
    let file_name = artifact
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    artifact.with_file_name(format!("{file_name}.{SALT_SUFFIX}"))
}

/// Read the salt sidecar for `artifact`. A missing sidecar is
/// [`KdfError::SaltMissing`], never a freshly generated replacement: a new
/// salt would derive a different key and silently fail to open old
/// ciphertext.
pub fn load_salt(artifact: &Path) -> Result<[u8; SALT_LEN], KdfError> {
    let path = salt_path(artifact);
    let raw = match std::fs::read(&path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(KdfError::SaltMissing(path))
        }
        Err(e) => return Err(e.into()),
    };
    raw.try_into().map_err(|_| KdfError::SaltInvalid(path))
}

/// Read the salt sidecar for `artifact`, generating and persisting a fresh
/// one when it does not exist yet. Used on the encryption side only.
pub fn load_or_create_salt(artifact: &Path) -> Result<[u8; SALT_LEN], KdfError> {
    match load_salt(artifact) {
        Ok(salt) => Ok(salt),
        Err(KdfError::SaltMissing(path)) => {
            let salt = generate_salt();
            atomic_write_secret(&path, &salt)?;
            debug!(path = %path.display(), "Generated new salt sidecar");
            Ok(salt)
        }
        Err(e) => Err(e),
    }
}
