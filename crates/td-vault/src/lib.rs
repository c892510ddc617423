//! Secrets-at-rest for the TeamDesk desktop application.
//!
//! This crate owns everything that touches key material: a password-protected
//! container of named 256-bit master keys, authenticated encryption for
//! strings, buffers, streams, and whole files, and passphrase key stretching
//! with persisted salts. Configuration values and database backups are sealed
//! through here; the authentication tag on every payload doubles as the
//! tamper-detection control for anything encrypted at rest.

pub mod cipher;
pub mod kdf;
pub mod keyring;

pub use cipher::CipherError;
pub use kdf::KdfError;
pub use keyring::{KeyError, KeyManager, MasterKey};
