//! Password-based derivation of the keyring wrapping key.
//!
//! The wrapping key is derived with PBKDF2-HMAC-SHA256 from the
//! user-supplied master secret, a random per-vault salt, and a stored
//! iteration count.  The master secret is prefixed with a fixed
//! domain-separation tag so the same passphrase used elsewhere can
//! never derive this vault's wrapping key.

use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use sha2::Sha256;
use zeroize::Zeroize;

use crate::errors::{Result, VaultError};

/// Domain-separation tag prepended to the master secret before
/// derivation.  Every wrapping key MUST be derived with this prefix.
pub const MASTER_PREFIX: &str = "-GV3ItzyNxfBGp3ZjtqVGswWWlT7tIMZjeXanHqhxm0";

/// Default PBKDF2 iteration count for new keyrings.
pub const DEFAULT_ITERATIONS: u32 = 8192;

/// Length of the per-vault salt in bytes (128 bits).
pub const SALT_LEN: usize = 16;

/// Length of the derived wrapping key in bytes (256 bits, AES-256).
pub const KEY_LEN: usize = 32;

/// Derive a 32-byte wrapping key from a master secret and salt.
///
/// The PBKDF2 password is `MASTER_PREFIX || master`.  The same master,
/// salt, and iteration count always produce the same key.
pub fn derive_wrapping_key(master: &[u8], salt: &[u8], iterations: u32) -> Result<[u8; KEY_LEN]> {
    if iterations == 0 {
        // A zero-round PBKDF2 never touches the output buffer.
        return Err(VaultError::InvalidMasterKey);
    }

    let mut password = Vec::with_capacity(MASTER_PREFIX.len() + master.len());
    password.extend_from_slice(MASTER_PREFIX.as_bytes());
    password.extend_from_slice(master);

    let mut key = [0u8; KEY_LEN];
    pbkdf2_hmac::<Sha256>(&password, salt, iterations, &mut key);
    password.zeroize();

    Ok(key)
}

/// Generate a cryptographically random 16-byte salt.
pub fn generate_salt() -> [u8; SALT_LEN] {
    let mut salt = [0u8; SALT_LEN];
    rand::rngs::OsRng.fill_bytes(&mut salt);
    salt
}
