//! Password-protected storage for named master keys.
//!
//! All application master keys live in a single container file. The container
//! holds a JSON map of alias to key material, sealed with AES-256-GCM under a
//! key stretched from the container password, so the file is both confidential
//! and tamper-evident. Keys are generated once on first access and returned
//! unchanged forever after: regenerating a key silently would orphan every
//! ciphertext produced under the old one.
//!
//! # Container format
//!
//! `magic (8) || version (1) || salt (16) || sealed payload`, where the sealed
//! payload is a [`cipher`] single-shot blob (`IV || ciphertext || tag`) over
//! the serialized alias map. Written atomically with mode `0600` on Unix.
//!
//! # Password resolution
//!
//! The container password is looked up in order: the `TEAMDESK_VAULT_PASSWORD`
//! environment variable, then the explicit configuration value handed to
//! [`KeyManager::new`]. A built-in development fallback exists only behind the
//! `insecure-dev-password` cargo feature; without it, a missing password is a
//! configuration error, never a silent default.

use std::collections::{BTreeMap, HashMap};
use std::env;
use std::fmt;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};
use zeroize::{Zeroize, ZeroizeOnDrop};

use td_guard::fs::{atomic_write_secret, AtomicWriteError};
use td_guard::path as guard_path;

use crate::cipher::{self, CipherError};
use crate::kdf;

/// Length of master key material in bytes (256 bits).
pub const KEY_LEN: usize = 32;

/// Environment variable consulted first for the container password.
pub const PASSWORD_ENV: &str = "TEAMDESK_VAULT_PASSWORD";

/// Configuration property name under which deployments may supply the
/// container password instead of the environment variable.
pub const PASSWORD_CONFIG_KEY: &str = "vault.container_password";

const CONTAINER_MAGIC: &[u8; 8] = b"TDVAULT\0";
const CONTAINER_VERSION: u8 = 1;

#[cfg(feature = "insecure-dev-password")]
const DEV_FALLBACK_PASSWORD: &str = "teamdesk-dev-only";

#[derive(Debug, Error)]
pub enum KeyError {
    #[error(
        "Container password is not configured; set {PASSWORD_ENV} or the \
         {PASSWORD_CONFIG_KEY} configuration property"
    )]
    PasswordNotConfigured,

    #[error("Container authentication failed: wrong password or corrupted container")]
    ContainerAuthFailed,

    #[error("Container file malformed: {0}")]
    ContainerInvalid(String),

    #[error("Key not found: {0}")]
    KeyNotFound(String),

    #[error("Invalid key alias: {0}")]
    InvalidAlias(String),

    #[error("Portable key string is not valid base64 key material")]
    InvalidPortableKey,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Atomic write failed: {0}")]
    Write(#[from] AtomicWriteError),

    #[error("Container serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A 256-bit symmetric master key. Opaque to callers: the raw bytes are
/// zeroized on drop, never printed by `Debug`, and leave the process only
/// through [`KeyManager::export_portable`].
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct MasterKey([u8; KEY_LEN]);

impl MasterKey {
    /// Generate a fresh key from the OS cryptographic random source.
    pub fn generate() -> Self {
        let mut key = [0u8; KEY_LEN];
        rand::rngs::OsRng.fill_bytes(&mut key);
        Self(key)
    }

    pub(crate) fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    pub(crate) fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MasterKey(..)")
    }
}

/// The decrypted inner payload of the container file.
#[derive(Debug, Default, Serialize, Deserialize)]
struct ContainerPayload {
    /// Alias to base64-encoded key material.
    keys: BTreeMap<String, String>,
}

/// Resolve the container password: environment variable, then configuration,
/// then the feature-gated development fallback.
fn resolve_container_password(configured: Option<&str>) -> Result<String, KeyError> {
    if let Ok(value) = env::var(PASSWORD_ENV) {
        if !value.is_empty() {
            debug!(source = PASSWORD_ENV, "Resolved container password");
            return Ok(value);
        }
    }
    if let Some(value) = configured {
        if !value.is_empty() {
            debug!(source = PASSWORD_CONFIG_KEY, "Resolved container password");
            return Ok(value.to_owned());
        }
    }

    #[cfg(feature = "insecure-dev-password")]
    {
        warn!("Using built-in development container password; unsuitable for production");
        Ok(DEV_FALLBACK_PASSWORD.to_owned())
    }

    #[cfg(not(feature = "insecure-dev-password"))]
    Err(KeyError::PasswordNotConfigured)
}

/// Owns the key container file and hands out master keys by alias.
///
/// Constructed explicitly and passed to callers that need keys; there is no
/// process-wide instance. Safe to share across threads: first creation of an
/// alias is guarded by a per-alias lock so concurrent callers cannot race
/// into divergent keys, and container file writes are serialized.
pub struct KeyManager {
    container_path: PathBuf,
    password: String,
    kdf_rounds: u32,
    alias_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    file_lock: Mutex<()>,
}

impl KeyManager {
    /// Create a manager for `container_path`, resolving the container
    /// password from the environment or the supplied configuration value.
    pub fn new(
        container_path: impl Into<PathBuf>,
        configured_password: Option<&str>,
    ) -> Result<Self, KeyError> {
        let password = resolve_container_password(configured_password)?;
        Ok(Self::with_password(container_path, password))
    }

    /// Create a manager with an already-resolved container password.
    pub fn with_password(container_path: impl Into<PathBuf>, password: impl Into<String>) -> Self {
        Self {
            container_path: container_path.into(),
            password: password.into(),
            kdf_rounds: kdf::PBKDF2_ROUNDS,
            alias_locks: Mutex::new(HashMap::new()),
            file_lock: Mutex::new(()),
        }
    }

    /// Return the master key stored under `alias`, generating and persisting
    /// a fresh one on first use.
    ///
    /// An existing key is returned unchanged; this method never regenerates
    /// key material. Concurrent first-access calls for the same alias are
    /// serialized, so exactly one key is ever created per alias.
    pub fn get_or_create_master_key(&self, alias: &str) -> Result<MasterKey, KeyError> {
        self.validate_alias(alias)?;
        let creation_lock = self.alias_lock(alias);
        let _alias_guard = lock(&creation_lock);
        let _file_guard = lock(&self.file_lock);

        let mut payload = self.load_payload()?;
        if let Some(encoded) = payload.keys.get(alias) {
            debug!(alias, "Loaded existing master key");
            return decode_key(encoded);
        }

        let key = MasterKey::generate();
        payload
            .keys
            .insert(alias.to_owned(), BASE64.encode(key.as_bytes()));
        self.save_payload(&payload)?;
        info!(alias, "Generated and stored new master key");
        Ok(key)
    }

    /// Whether a key is stored under `alias`.
    pub fn exists(&self, alias: &str) -> Result<bool, KeyError> {
        self.validate_alias(alias)?;
        let _file_guard = lock(&self.file_lock);
        Ok(self.load_payload()?.keys.contains_key(alias))
    }

    /// Export the key under `alias` as a base64 string for backup.
    ///
    /// The returned string IS the key material; the caller must keep it out
    /// of logs and UI surfaces.
    pub fn export_portable(&self, alias: &str) -> Result<String, KeyError> {
        self.validate_alias(alias)?;
        let _file_guard = lock(&self.file_lock);
        let payload = self.load_payload()?;
        let encoded = payload
            .keys
            .get(alias)
            .ok_or_else(|| KeyError::KeyNotFound(alias.to_owned()))?;
        warn!(alias, "Exported key material as portable string");
        Ok(encoded.clone())
    }

    /// Import key material previously produced by [`export_portable`],
    /// storing it under `alias`. Replacing an existing alias is allowed for
    /// restore scenarios and logged loudly.
    pub fn import_portable(&self, alias: &str, portable: &str) -> Result<(), KeyError> {
        self.validate_alias(alias)?;
        let bytes = BASE64
            .decode(portable.trim())
            .map_err(|_| KeyError::InvalidPortableKey)?;
        let key: [u8; KEY_LEN] = bytes.try_into().map_err(|_| KeyError::InvalidPortableKey)?;

        let _file_guard = lock(&self.file_lock);
        let mut payload = self.load_payload()?;
        if payload
            .keys
            .insert(alias.to_owned(), BASE64.encode(key))
            .is_some()
        {
            warn!(alias, "Imported key replaced existing key material");
        } else {
            info!(alias, "Imported key from portable string");
        }
        self.save_payload(&payload)
    }

    /// Delete the container file and every key inside it. Idempotent.
    pub fn delete_container(&self) -> Result<(), KeyError> {
        let _file_guard = lock(&self.file_lock);
        match fs::remove_file(&self.container_path) {
            Ok(()) => {
                info!(path = %self.container_path.display(), "Deleted key container");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("Key container already absent, nothing to delete");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    // -----------------------------------------------------------------------
    // Internal helpers
    // -----------------------------------------------------------------------

    fn validate_alias(&self, alias: &str) -> Result<(), KeyError> {
        if guard_path::validate_file_name(alias) {
            Ok(())
        } else {
            Err(KeyError::InvalidAlias(alias.to_owned()))
        }
    }

    /// Lazily created per-alias creation lock, so unrelated aliases do not
    /// serialize on each other.
    fn alias_lock(&self, alias: &str) -> Arc<Mutex<()>> {
        let mut locks = lock(&self.alias_locks);
        locks.entry(alias.to_owned()).or_default().clone()
    }

    /// Read and unseal the container. A missing file is an empty container.
    fn load_payload(&self) -> Result<ContainerPayload, KeyError> {
        let raw = match fs::read(&self.container_path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Ok(ContainerPayload::default())
            }
            Err(e) => return Err(e.into()),
        };

        let header_len = CONTAINER_MAGIC.len() + 1 + kdf::SALT_LEN;
        if raw.len() < header_len {
            return Err(KeyError::ContainerInvalid("file too short".to_owned()));
        }
        if &raw[..CONTAINER_MAGIC.len()] != CONTAINER_MAGIC {
            return Err(KeyError::ContainerInvalid("bad magic".to_owned()));
        }
        let version = raw[CONTAINER_MAGIC.len()];
        if version != CONTAINER_VERSION {
            return Err(KeyError::ContainerInvalid(format!(
                "unsupported version {version}"
            )));
        }

        let salt = &raw[CONTAINER_MAGIC.len() + 1..header_len];
        let container_key = kdf::derive_key_with_rounds(&self.password, salt, self.kdf_rounds);
        let json = cipher::decrypt_bytes(&container_key, &raw[header_len..]).map_err(
            |e| match e {
                CipherError::AuthenticationFailed => KeyError::ContainerAuthFailed,
                other => KeyError::ContainerInvalid(other.to_string()),
            },
        )?;

        Ok(serde_json::from_slice(&json)?)
    }

    /// Seal and atomically persist the container with a fresh salt.
    fn save_payload(&self, payload: &ContainerPayload) -> Result<(), KeyError> {
        let salt = kdf::generate_salt();
        let container_key = kdf::derive_key_with_rounds(&self.password, &salt, self.kdf_rounds);
        let json = serde_json::to_vec(payload)?;
        let sealed = cipher::encrypt_bytes(&container_key, &json)
            .map_err(|e| KeyError::ContainerInvalid(e.to_string()))?;

        let mut out = Vec::with_capacity(CONTAINER_MAGIC.len() + 1 + salt.len() + sealed.len());
        out.extend_from_slice(CONTAINER_MAGIC);
        out.push(CONTAINER_VERSION);
        out.extend_from_slice(&salt);
        out.extend_from_slice(&sealed);

        atomic_write_secret(&self.container_path, &out)?;
        debug!(path = %self.container_path.display(), "Persisted key container");
        Ok(())
    }
}

impl fmt::Debug for KeyManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyManager")
            .field("container_path", &self.container_path)
            .finish_non_exhaustive()
    }
}

fn decode_key(encoded: &str) -> Result<MasterKey, KeyError> {
    let bytes = BASE64
        .decode(encoded)
        .map_err(|_| KeyError::ContainerInvalid("stored key is not base64".to_owned()))?;
    let key: [u8; KEY_LEN] = bytes
        .try_into()
        .map_err(|_| KeyError::ContainerInvalid("stored key has wrong length".to_owned()))?;
    Ok(MasterKey::from_bytes(key))
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
