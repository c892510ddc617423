//! Authenticated encryption for strings, buffers, streams, and files.
//!
//! Everything here is AES-256-GCM with a fresh random 96-bit IV per call and
//! a 128-bit authentication tag. Decryption fails closed: a tag mismatch
//! returns [`CipherError::AuthenticationFailed`] and never partial or garbage
//! plaintext, which is what makes these payloads tamper-evident at rest.
//!
//! # Payload formats
//!
//! Single-shot payloads are `IV || ciphertext || tag`, base64-encoded by the
//! string variants so they can sit inside config values. The IV travels with
//! the payload, so callers never do IV bookkeeping.
//!
//! Stream payloads (database backups, any file of unbounded size) start with
//! a magic and format-version header and the base IV, followed by
//! length-prefixed sealed chunks of 8 KiB plaintext. Each chunk is sealed
//! under `base IV XOR chunk index` with the chunk index and a final-chunk
//! flag in the additional authenticated data, so truncating, reordering, or
//! dropping chunks fails authentication. Memory use stays bounded for any
//! file size. The header also means "is this file encrypted?" is answered by
//! reading the marker, never by guessing at byte entropy.

use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;

use aes_gcm::aead::{Aead, Payload};
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use rand::RngCore;
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::debug;

use crate::kdf::{self, KdfError};
use crate::keyring::MasterKey;

/// Initialization vector length in bytes (96 bits, the GCM standard size).
pub const IV_LEN: usize = 12;

/// Authentication tag length in bytes (128 bits).
pub const TAG_LEN: usize = 16;

/// Plaintext bytes sealed per stream chunk.
pub const STREAM_CHUNK_SIZE: usize = 8 * 1024;

const STREAM_MAGIC: &[u8; 8] = b"TDSTREAM";
const STREAM_VERSION: u8 = 1;
const STREAM_HEADER_LEN: usize = 8 + 1 + IV_LEN;

#[derive(Debug, Error)]
pub enum CipherError {
    /// Tag verification failed: the payload was tampered with, corrupted, or
    /// sealed under a different key. Callers must abort the load.
    #[error("Authentication failed: payload was tampered with or corrupted")]
    AuthenticationFailed,

    /// The AEAD backend rejected the encryption request.
    #[error("Encryption failed")]
    EncryptionFailed,

    /// The payload framing is malformed (wrong marker, truncated framing,
    /// bad base64). Distinct from a failed tag check.
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// Key material could not be obtained (missing salt file, container or
    /// password problems). Distinct from tamper.
    #[error("Key unavailable: {0}")]
    KeyUnavailable(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl From<KdfError> for CipherError {
    fn from(e: KdfError) -> Self {
        match e {
            KdfError::Io(io) => Self::Io(io),
            KdfError::Write(w) => Self::Io(io::Error::new(io::ErrorKind::Other, w.to_string())),
            other => Self::KeyUnavailable(other.to_string()),
        }
    }
}

fn aes_cipher(key: &MasterKey) -> Aes256Gcm {
    Aes256Gcm::new(key.as_bytes().into())
}

/// Fresh random IV for one encryption call. IVs are never reused under the
/// same key; every call draws new randomness.
fn generate_iv() -> [u8; IV_LEN] {
    let mut iv = [0u8; IV_LEN];
    rand::rngs::OsRng.fill_bytes(&mut iv);
    iv
}

// ---------------------------------------------------------------------------
// Single-shot payloads
// ---------------------------------------------------------------------------

/// Encrypt a buffer into a self-describing `IV || ciphertext || tag` payload.
pub fn encrypt_bytes(key: &MasterKey, plaintext: &[u8]) -> Result<Vec<u8>, CipherError> {
    let cipher = aes_cipher(key);
    let iv = generate_iv();
    let sealed = cipher
        .encrypt(Nonce::from_slice(&iv), plaintext)
        .map_err(|_| CipherError::EncryptionFailed)?;

    let mut payload = Vec::with_capacity(IV_LEN + sealed.len());
    payload.extend_from_slice(&iv);
    payload.extend_from_slice(&sealed);
    Ok(payload)
}

/// Decrypt a payload produced by [`encrypt_bytes`]. Fails closed on any tag
/// mismatch.
pub fn decrypt_bytes(key: &MasterKey, payload: &[u8]) -> Result<Vec<u8>, CipherError> {
    if payload.len() < IV_LEN + TAG_LEN {
        return Err(CipherError::InvalidPayload(format!(
            "payload too short ({} bytes)",
            payload.len()
        )));
    }
    let (iv, sealed) = payload.split_at(IV_LEN);
    aes_cipher(key)
        .decrypt(Nonce::from_slice(iv), sealed)
        .map_err(|_| CipherError::AuthenticationFailed)
}

/// Encrypt a string into a base64 payload suitable for a config value.
pub fn encrypt_string(key: &MasterKey, plaintext: &str) -> Result<String, CipherError> {
    Ok(BASE64.encode(encrypt_bytes(key, plaintext.as_bytes())?))
}

/// Decrypt a base64 payload produced by [`encrypt_string`].
pub fn decrypt_string(key: &MasterKey, payload: &str) -> Result<String, CipherError> {
    let raw = BASE64
        .decode(payload.trim())
        .map_err(|_| CipherError::InvalidPayload("payload is not valid base64".to_owned()))?;
    let plaintext = decrypt_bytes(key, &raw)?;
    String::from_utf8(plaintext)
        .map_err(|_| CipherError::InvalidPayload("decrypted text is not UTF-8".to_owned()))
}

// ---------------------------------------------------------------------------
// Stream payloads
// ---------------------------------------------------------------------------

/// Per-chunk nonce: the base IV with the chunk index XORed into its first
/// eight bytes.
fn chunk_nonce(base_iv: &[u8; IV_LEN], index: u64) -> [u8; IV_LEN] {
    let mut nonce = *base_iv;
    for (n, i) in nonce.iter_mut().zip(index.to_le_bytes()) {
        *n ^= i;
    }
    nonce
}

/// Additional authenticated data binding a chunk to the stream format, its
/// position, and whether it is the last chunk.
fn chunk_aad(index: u64, is_final: bool) -> Vec<u8> {
    let mut aad = Vec::with_capacity(STREAM_MAGIC.len() + 1 + 8 + 1);
    aad.extend_from_slice(STREAM_MAGIC);
    aad.push(STREAM_VERSION);
    aad.extend_from_slice(&index.to_le_bytes());
    aad.push(is_final as u8);
    aad
}

/// Read up to one chunk of plaintext, tolerating short reads.
fn read_chunk<R: Read>(input: &mut R) -> io::Result<Vec<u8>> {
    let mut buf = vec![0u8; STREAM_CHUNK_SIZE];
    let mut filled = 0;
    while filled < buf.len() {
        let n = input.read(&mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    buf.truncate(filled);
    Ok(buf)
}

/// Read a chunk-length prefix. `None` on clean end of stream; an error when
/// the stream ends mid-prefix.
fn read_frame_len<R: Read>(input: &mut R) -> Result<Option<usize>, CipherError> {
    let mut len_bytes = [0u8; 4];
    let mut filled = 0;
    while filled < len_bytes.len() {
        let n = input.read(&mut len_bytes[filled..])?;
        if n == 0 {
            return if filled == 0 {
                Ok(None)
            } else {
                Err(CipherError::InvalidPayload(
                    "truncated chunk length".to_owned(),
                ))
            };
        }
        filled += n;
    }
    Ok(Some(u32::from_le_bytes(len_bytes) as usize))
}

fn map_read_err(e: io::Error, what: &str) -> CipherError {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        CipherError::InvalidPayload(format!("truncated {what}"))
    } else {
        CipherError::Io(e)
    }
}

/// Encrypt a byte stream into the chunked stream format.
///
/// Reads `input` in fixed-size buffers so memory use stays bounded no matter
/// how large the source is. Empty input produces a valid stream carrying one
/// empty final chunk.
pub fn encrypt_stream<R: Read, W: Write>(
    input: &mut R,
    output: &mut W,
    key: &MasterKey,
) -> Result<(), CipherError> {
    let cipher = aes_cipher(key);
    let base_iv = generate_iv();

    output.write_all(STREAM_MAGIC)?;
    output.write_all(&[STREAM_VERSION])?;
    output.write_all(&base_iv)?;

    let mut current = read_chunk(input)?;
    let mut index: u64 = 0;
    loop {
        let next = read_chunk(input)?;
        let is_final = next.is_empty();

        let nonce = chunk_nonce(&base_iv, index);
        let aad = chunk_aad(index, is_final);
        let sealed = cipher
            .encrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: &current,
                    aad: &aad,
                },
            )
            .map_err(|_| CipherError::EncryptionFailed)?;

        output.write_all(&(sealed.len() as u32).to_le_bytes())?;
        output.write_all(&sealed)?;

        if is_final {
            break;
        }
        current = next;
        index += 1;
    }
    output.flush()?;
    Ok(())
}

/// Decrypt a stream produced by [`encrypt_stream`].
///
/// Verifies the header marker, then unseals chunk by chunk; any chunk whose
/// tag does not verify (including a stream whose tail was cut off, which
/// makes an earlier chunk masquerade as final) aborts with
/// [`CipherError::AuthenticationFailed`] and nothing further is written.
pub fn decrypt_stream<R: Read, W: Write>(
    input: &mut R,
    output: &mut W,
    key: &MasterKey,
) -> Result<(), CipherError> {
    let cipher = aes_cipher(key);

    let mut header = [0u8; STREAM_HEADER_LEN];
    input
        .read_exact(&mut header)
        .map_err(|e| map_read_err(e, "stream header"))?;
    if &header[..STREAM_MAGIC.len()] != STREAM_MAGIC {
        return Err(CipherError::InvalidPayload(
            "not an encrypted stream".to_owned(),
        ));
    }
    let version = header[STREAM_MAGIC.len()];
    if version != STREAM_VERSION {
        return Err(CipherError::InvalidPayload(format!(
            "unsupported stream version {version}"
        )));
    }
    let mut base_iv = [0u8; IV_LEN];
    base_iv.copy_from_slice(&header[STREAM_MAGIC.len() + 1..]);

    let Some(mut frame_len) = read_frame_len(input)? else {
        return Err(CipherError::InvalidPayload(
            "stream carries no sealed chunks".to_owned(),
        ));
    };

    let mut index: u64 = 0;
    loop {
        if frame_len < TAG_LEN || frame_len > STREAM_CHUNK_SIZE + TAG_LEN {
            return Err(CipherError::InvalidPayload(format!(
                "sealed chunk length {frame_len} out of range"
            )));
        }
        let mut sealed = vec![0u8; frame_len];
        input
            .read_exact(&mut sealed)
            .map_err(|e| map_read_err(e, "sealed chunk"))?;

        let next = read_frame_len(input)?;
        let is_final = next.is_none();

        let nonce = chunk_nonce(&base_iv, index);
        let aad = chunk_aad(index, is_final);
        let plaintext = cipher
            .decrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: &sealed,
                    aad: &aad,
                },
            )
            .map_err(|_| CipherError::AuthenticationFailed)?;
        output.write_all(&plaintext)?;

        match next {
            None => break,
            Some(len) => {
                frame_len = len;
                index += 1;
            }
        }
    }
    output.flush()?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Whole-file operations
// ---------------------------------------------------------------------------

fn temp_dir_for(dest: &Path) -> &Path {
    dest.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
}

/// Encrypt `src` into the stream format at `dest`, atomically.
pub fn encrypt_file(key: &MasterKey, src: &Path, dest: &Path) -> Result<(), CipherError> {
    let mut input = File::open(src)?;
    let mut temp = NamedTempFile::new_in(temp_dir_for(dest))?;
    encrypt_stream(&mut input, &mut temp, key)?;
    temp.as_file().sync_all()?;
    temp.persist(dest).map_err(|e| CipherError::Io(e.error))?;
    debug!(dest = %dest.display(), "Encrypted file");
    Ok(())
}

/// Decrypt a stream-format file at `src` into `dest`, atomically. On any
/// authentication failure the destination is left untouched.
pub fn decrypt_file(key: &MasterKey, src: &Path, dest: &Path) -> Result<(), CipherError> {
    let mut input = File::open(src)?;
    let mut temp = NamedTempFile::new_in(temp_dir_for(dest))?;
    decrypt_stream(&mut input, &mut temp, key)?;
    temp.as_file().sync_all()?;
    temp.persist(dest).map_err(|e| CipherError::Io(e.error))?;
    debug!(dest = %dest.display(), "Decrypted file");
    Ok(())
}

/// Whether `path` starts with the encrypted-stream marker. Reads the header
/// only; no entropy guessing.
pub fn is_encrypted_file(path: &Path) -> Result<bool, CipherError> {
    let mut file = File::open(path)?;
    let mut header = [0u8; STREAM_MAGIC.len() + 1];
    let mut filled = 0;
    while filled < header.len() {
        let n = file.read(&mut header[filled..])?;
        if n == 0 {
            return Ok(false);
        }
        filled += n;
    }
    Ok(&header[..STREAM_MAGIC.len()] == STREAM_MAGIC && header[STREAM_MAGIC.len()] == STREAM_VERSION)
}

// ---------------------------------------------------------------------------
// Passphrase variants
// ---------------------------------------------------------------------------

/// Encrypt `src` to `dest` under a passphrase-derived key.
///
/// The salt is loaded from, or generated once into, the `<dest>.salt` sidecar.
/// Losing that sidecar makes the ciphertext unrecoverable by design.
pub fn encrypt_file_with_passphrase(
    passphrase: &str,
    src: &Path,
    dest: &Path,
) -> Result<(), CipherError> {
    let salt = kdf::load_or_create_salt(dest)?;
    let key = kdf::derive_key(passphrase, &salt);
    encrypt_file(&key, src, dest)
}

/// Decrypt `src` to `dest` under a passphrase-derived key, reading the salt
/// from the `<src>.salt` sidecar. A missing sidecar is a
/// [`CipherError::KeyUnavailable`], distinct from tamper.
pub fn decrypt_file_with_passphrase(
    passphrase: &str,
    src: &Path,
    dest: &Path,
) -> Result<(), CipherError> {
    let salt = kdf::load_salt(src)?;
    let key = kdf::derive_key(passphrase, &salt);
    decrypt_file(&key, src, dest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    // -- single-shot --------------------------------------------------------

    #[test]
    fn test_bytes_roundtrip() {
        let key = MasterKey::generate();
        let plaintext = b"database password: hunter2";
        let payload = encrypt_bytes(&key, plaintext).unwrap();
        assert_eq!(decrypt_bytes(&key, &payload).unwrap(), plaintext);
    }

    #[test]
    fn test_empty_plaintext_roundtrip() {
        let key = MasterKey::generate();
        let payload = encrypt_bytes(&key, b"").unwrap();
        assert_eq!(payload.len(), IV_LEN + TAG_LEN);
        assert!(decrypt_bytes(&key, &payload).unwrap().is_empty());
    }

    #[test]
    fn test_fresh_iv_per_call() {
        let key = MasterKey::generate();
        let a = encrypt_bytes(&key, b"same input").unwrap();
        let b = encrypt_bytes(&key, b"same input").unwrap();
        assert_ne!(a, b);
        assert_ne!(a[..IV_LEN], b[..IV_LEN]);
    }

    #[test]
    fn test_any_single_bit_flip_fails_authentication() {
        let key = MasterKey::generate();
        let payload = encrypt_bytes(&key, b"short but load-bearing").unwrap();

        for byte in 0..payload.len() {
            let mut tampered = payload.clone();
            tampered[byte] ^= 0x01;
            let result = decrypt_bytes(&key, &tampered);
            assert!(
                matches!(result, Err(CipherError::AuthenticationFailed)),
                "flip at byte {byte} must fail authentication"
            );
        }
    }

    #[test]
    fn test_wrong_key_fails() {
        let payload = encrypt_bytes(&MasterKey::generate(), b"secret").unwrap();
        let result = decrypt_bytes(&MasterKey::generate(), &payload);
        assert!(matches!(result, Err(CipherError::AuthenticationFailed)));
    }

    #[test]
    fn test_short_payload_is_invalid_not_auth_failure() {
        let key = MasterKey::generate();
        let result = decrypt_bytes(&key, &[0u8; IV_LEN + TAG_LEN - 1]);
        assert!(matches!(result, Err(CipherError::InvalidPayload(_))));
    }

    #[test]
    fn test_string_roundtrip_is_base64() {
        let key = MasterKey::generate();
        let payload = encrypt_string(&key, "smtp.password=s3cret").unwrap();
        assert!(BASE64.decode(&payload).is_ok());
        assert_eq!(decrypt_string(&key, &payload).unwrap(), "smtp.password=s3cret");
    }

    #[test]
    fn test_decrypt_string_rejects_bad_base64() {
        let key = MasterKey::generate();
        let result = decrypt_string(&key, "not base64 at all!");
        assert!(matches!(result, Err(CipherError::InvalidPayload(_))));
    }

    // -- streams ------------------------------------------------------------

    fn stream_roundtrip(plaintext: &[u8]) -> Vec<u8> {
        let key = MasterKey::generate();
        let mut sealed = Vec::new();
        encrypt_stream(&mut &plaintext[..], &mut sealed, &key).unwrap();

        let mut out = Vec::new();
        decrypt_stream(&mut &sealed[..], &mut out, &key).unwrap();
        out
    }

    #[test]
    fn test_stream_roundtrip_sizes() {
        for len in [
            0,
            1,
            STREAM_CHUNK_SIZE - 1,
            STREAM_CHUNK_SIZE,
            STREAM_CHUNK_SIZE * 2,
            STREAM_CHUNK_SIZE * 3 + 917,
        ] {
            let plaintext: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
            assert_eq!(stream_roundtrip(&plaintext), plaintext, "len {len}");
        }
    }

    #[test]
    fn test_stream_truncation_fails_authentication() {
        let key = MasterKey::generate();
        let plaintext = vec![0x42u8; STREAM_CHUNK_SIZE * 2 + 100];
        let mut sealed = Vec::new();
        encrypt_stream(&mut &plaintext[..], &mut sealed, &key).unwrap();

        // Drop the final sealed chunk; its predecessor now looks final.
        let mut offset = STREAM_HEADER_LEN;
        let mut last_frame_start = offset;
        while offset < sealed.len() {
            last_frame_start = offset;
            let len =
                u32::from_le_bytes(sealed[offset..offset + 4].try_into().unwrap()) as usize;
            offset += 4 + len;
        }
        sealed.truncate(last_frame_start);

        let mut out = Vec::new();
        let result = decrypt_stream(&mut &sealed[..], &mut out, &key);
        assert!(matches!(result, Err(CipherError::AuthenticationFailed)));
    }

    #[test]
    fn test_stream_chunk_reorder_fails_authentication() {
        let key = MasterKey::generate();
        let plaintext = vec![0x17u8; STREAM_CHUNK_SIZE * 2];
        let mut sealed = Vec::new();
        encrypt_stream(&mut &plaintext[..], &mut sealed, &key).unwrap();

        // Both chunks are full-size, so their frames are interchangeable
        // byte ranges. Swap them.
        let frame = 4 + STREAM_CHUNK_SIZE + TAG_LEN;
        let first = STREAM_HEADER_LEN..STREAM_HEADER_LEN + frame;
        let second = STREAM_HEADER_LEN + frame..STREAM_HEADER_LEN + 2 * frame;
        let mut swapped = sealed.clone();
        swapped.splice(first.clone(), sealed[second].to_vec());
        swapped.splice(
            STREAM_HEADER_LEN + frame..STREAM_HEADER_LEN + 2 * frame,
            sealed[first].to_vec(),
        );

        let mut out = Vec::new();
        let result = decrypt_stream(&mut &swapped[..], &mut out, &key);
        assert!(matches!(result, Err(CipherError::AuthenticationFailed)));
    }

    #[test]
    fn test_stream_bad_magic_is_invalid_payload() {
        let key = MasterKey::generate();
        let mut sealed = Vec::new();
        encrypt_stream(&mut &b"data"[..], &mut sealed, &key).unwrap();
        sealed[0] ^= 0xFF;

        let mut out = Vec::new();
        let result = decrypt_stream(&mut &sealed[..], &mut out, &key);
        assert!(matches!(result, Err(CipherError::InvalidPayload(_))));
    }

    #[test]
    fn test_stream_header_only_is_invalid_payload() {
        let key = MasterKey::generate();
        let mut sealed = Vec::new();
        encrypt_stream(&mut &b"data"[..], &mut sealed, &key).unwrap();
        sealed.truncate(STREAM_HEADER_LEN);

        let mut out = Vec::new();
        let result = decrypt_stream(&mut &sealed[..], &mut out, &key);
        assert!(matches!(result, Err(CipherError::InvalidPayload(_))));
    }

    // -- files --------------------------------------------------------------

    #[test]
    fn test_file_roundtrip() {
        let dir = TempDir::new().unwrap();
        let key = MasterKey::generate();
        let plain = dir.path().join("teamdesk.db");
        let sealed = dir.path().join("teamdesk.db.enc");
        let restored = dir.path().join("restored.db");

        let content = vec![0xC3u8; STREAM_CHUNK_SIZE + 512];
        fs::write(&plain, &content).unwrap();

        encrypt_file(&key, &plain, &sealed).unwrap();
        assert!(is_encrypted_file(&sealed).unwrap());
        assert!(!is_encrypted_file(&plain).unwrap());

        decrypt_file(&key, &sealed, &restored).unwrap();
        assert_eq!(fs::read(&restored).unwrap(), content);
    }

    #[test]
    fn test_decrypt_file_failure_leaves_destination_untouched() {
        let dir = TempDir::new().unwrap();
        let key = MasterKey::generate();
        let plain = dir.path().join("backup.db");
        let sealed = dir.path().join("backup.enc");
        let dest = dir.path().join("out.db");
        fs::write(&plain, b"snapshot").unwrap();
        encrypt_file(&key, &plain, &sealed).unwrap();

        // Corrupt the sealed body.
        let mut raw = fs::read(&sealed).unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0x01;
        fs::write(&sealed, &raw).unwrap();

        let result = decrypt_file(&key, &sealed, &dest);
        assert!(matches!(result, Err(CipherError::AuthenticationFailed)));
        assert!(!dest.exists());
    }

    #[test]
    fn test_is_encrypted_file_on_short_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tiny");
        fs::write(&path, b"TD").unwrap();
        assert!(!is_encrypted_file(&path).unwrap());
    }

    // -- passphrase ---------------------------------------------------------

    #[test]
    fn test_passphrase_file_roundtrip_and_salt_sidecar() {
        let dir = TempDir::new().unwrap();
        let plain = dir.path().join("export.db");
        let sealed = dir.path().join("export.enc");
        let restored = dir.path().join("export.restored");
        fs::write(&plain, b"weekly snapshot").unwrap();

        encrypt_file_with_passphrase("correct horse", &plain, &sealed).unwrap();
        assert!(kdf::salt_path(&sealed).exists());

        decrypt_file_with_passphrase("correct horse", &sealed, &restored).unwrap();
        assert_eq!(fs::read(&restored).unwrap(), b"weekly snapshot");
    }

    #[test]
    fn test_passphrase_wrong_passphrase_fails_authentication() {
        let dir = TempDir::new().unwrap();
        let plain = dir.path().join("export.db");
        let sealed = dir.path().join("export.enc");
        fs::write(&plain, b"snapshot").unwrap();
        encrypt_file_with_passphrase("right", &plain, &sealed).unwrap();

        let result =
            decrypt_file_with_passphrase("wrong", &sealed, &dir.path().join("out"));
        assert!(matches!(result, Err(CipherError::AuthenticationFailed)));
    }

    #[test]
    fn test_passphrase_missing_salt_is_key_unavailable() {
        let dir = TempDir::new().unwrap();
        let plain = dir.path().join("export.db");
        let sealed = dir.path().join("export.enc");
        fs::write(&plain, b"snapshot").unwrap();
        encrypt_file_with_passphrase("pass", &plain, &sealed).unwrap();

        fs::remove_file(kdf::salt_path(&sealed)).unwrap();
        let result = decrypt_file_with_passphrase("pass", &sealed, &dir.path().join("out"));
        assert!(matches!(result, Err(CipherError::KeyUnavailable(_))));
    }
}
