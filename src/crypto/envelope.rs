//! AES-256-GCM authenticated encryption and the compact containers
//! built on it.
//!
//! Two container shapes are produced, both strings of base64url
//! sections (no padding) joined by `.`:
//!
//! ```text
//! keyring wrap:  header . nonce . ciphertext . tag
//! item seal:     nonce . ciphertext . tag
//! ```
//!
//! The keyring header is a small JSON object carrying the KDF salt and
//! iteration count; its encoded bytes are the associated data, so the
//! derivation parameters are authenticated along with the payload.
//! Item seals take their associated data from the caller (the item id),
//! which binds each ciphertext to exactly one record.

use aes_gcm::aead::{Aead, KeyInit, OsRng, Payload};
use aes_gcm::{AeadCore, Aes256Gcm, Nonce};
use base64::engine::general_purpose::URL_SAFE_NO_PAD as B64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use super::kdf;
use crate::errors::{Result, VaultError};

/// Size of the AES-256-GCM nonce in bytes.
pub const NONCE_LEN: usize = 12;

/// Size of the GCM authentication tag in bytes.
pub const TAG_LEN: usize = 16;

/// Algorithm tag written into wrap headers.
const WRAP_ALG: &str = "PBES2-HS256+A256GCM";

/// Protected header of a wrapped keyring.  Serialized as the first
/// container section and authenticated as associated data.
#[derive(Debug, Serialize, Deserialize)]
struct WrapHeader {
    alg: String,
    /// KDF salt, base64url.
    p2s: String,
    /// KDF iteration count.
    p2c: u32,
}

// ---------------------------------------------------------------------------
// Raw seal/open
// ---------------------------------------------------------------------------

/// Encrypt `plaintext` under `key` with a fresh random nonce, binding
/// `aad` into the authentication tag.
///
/// Returns `(nonce, ciphertext, tag)`.
fn seal(key: &[u8], aad: &[u8], plaintext: &[u8]) -> Result<(Vec<u8>, Vec<u8>, Vec<u8>)> {
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| VaultError::InvalidMasterKey)?;

    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

    let mut sealed = cipher
        .encrypt(&nonce, Payload { msg: plaintext, aad })
        .map_err(|_| VaultError::AuthTagMismatch)?;

    // The aead crate appends the tag to the ciphertext; split it back
    // out so the container can carry it as its own section.
    let tag = sealed.split_off(sealed.len() - TAG_LEN);
    Ok((nonce.to_vec(), sealed, tag))
}

/// Decrypt a `(nonce, ciphertext, tag)` triple under `key` and `aad`.
fn open(key: &[u8], aad: &[u8], nonce: &[u8], ciphertext: &[u8], tag: &[u8]) -> Result<Vec<u8>> {
    if nonce.len() != NONCE_LEN || tag.len() != TAG_LEN {
        return Err(VaultError::AuthTagMismatch);
    }

    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| VaultError::AuthTagMismatch)?;

    let mut sealed = Vec::with_capacity(ciphertext.len() + TAG_LEN);
    sealed.extend_from_slice(ciphertext);
    sealed.extend_from_slice(tag);

    cipher
        .decrypt(Nonce::from_slice(nonce), Payload { msg: &sealed, aad })
        .map_err(|_| VaultError::AuthTagMismatch)
}

/// Split a compact container into its decoded sections, or `None` when
/// the section count or any base64 is wrong.
fn split_sections(blob: &str, expected: usize) -> Option<Vec<Vec<u8>>> {
    let parts: Vec<&str> = blob.split('.').collect();
    if parts.len() != expected {
        return None;
    }
    parts.iter().map(|p| B64.decode(p).ok()).collect()
}

// ---------------------------------------------------------------------------
// Item seal (nonce . ciphertext . tag)
// ---------------------------------------------------------------------------

/// Seal `plaintext` into a three-section compact string under `key`,
/// authenticating `aad`.
pub fn seal_compact(key: &[u8], aad: &[u8], plaintext: &[u8]) -> Result<String> {
    let (nonce, ciphertext, tag) = seal(key, aad, plaintext)?;
    Ok(format!(
        "{}.{}.{}",
        B64.encode(nonce),
        B64.encode(ciphertext),
        B64.encode(tag)
    ))
}

/// Open a three-section compact string produced by [`seal_compact`].
///
/// Fails `Corrupt` on a malformed container and `AuthTagMismatch` when
/// the key or associated data does not match.
pub fn open_compact(key: &[u8], aad: &[u8], blob: &str) -> Result<Vec<u8>> {
    let sections = split_sections(blob, 3)
        .ok_or_else(|| VaultError::Corrupt("malformed ciphertext container".into()))?;
    open(key, aad, &sections[0], &sections[1], &sections[2])
}

// ---------------------------------------------------------------------------
// Keyring wrap (header . nonce . ciphertext . tag)
// ---------------------------------------------------------------------------

/// Wrap `plaintext` (the serialized keyring) under a key derived from
/// `master`, `salt`, and `iterations`.
///
/// Never fails for a present master; every call uses a fresh nonce.
pub fn wrap(master: &[u8], salt: &[u8], iterations: u32, plaintext: &[u8]) -> Result<String> {
    let header = WrapHeader {
        alg: WRAP_ALG.to_string(),
        p2s: B64.encode(salt),
        p2c: iterations,
    };
    // Header serialization cannot fail for this struct.
    let header_b64 = B64.encode(serde_json::to_vec(&header).expect("serialize wrap header"));

    let mut key = kdf::derive_wrapping_key(master, salt, iterations)?;
    let result = seal(&key, header_b64.as_bytes(), plaintext);
    key.zeroize();

    let (nonce, ciphertext, tag) = result?;
    Ok(format!(
        "{}.{}.{}.{}",
        header_b64,
        B64.encode(nonce),
        B64.encode(ciphertext),
        B64.encode(tag)
    ))
}

/// Unwrap a blob produced by [`wrap`], deriving the key from the
/// header's own salt and iteration count.
///
/// Fails `InvalidMasterKey` on a malformed container or tag mismatch;
/// without the right master the two are indistinguishable.
pub fn unwrap(master: &[u8], blob: &str) -> Result<Vec<u8>> {
    let parts: Vec<&str> = blob.split('.').collect();
    if parts.len() != 4 {
        return Err(VaultError::InvalidMasterKey);
    }
    let header_b64 = parts[0];

    let header_bytes = B64
        .decode(header_b64)
        .map_err(|_| VaultError::InvalidMasterKey)?;
    let header: WrapHeader =
        serde_json::from_slice(&header_bytes).map_err(|_| VaultError::InvalidMasterKey)?;
    if header.alg != WRAP_ALG {
        return Err(VaultError::InvalidMasterKey);
    }

    let salt = B64
        .decode(&header.p2s)
        .map_err(|_| VaultError::InvalidMasterKey)?;
    let nonce = B64.decode(parts[1]).map_err(|_| VaultError::InvalidMasterKey)?;
    let ciphertext = B64.decode(parts[2]).map_err(|_| VaultError::InvalidMasterKey)?;
    let tag = B64.decode(parts[3]).map_err(|_| VaultError::InvalidMasterKey)?;

    let mut key = kdf::derive_wrapping_key(master, &salt, header.p2c)?;
    let plaintext = open(&key, header_b64.as_bytes(), &nonce, &ciphertext, &tag)
        .map_err(|_| VaultError::InvalidMasterKey);
    key.zeroize();

    plaintext
}
