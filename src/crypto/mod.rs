//! Cryptographic primitives for lockbox-store.
//!
//! This module provides:
//! - PBKDF2-HMAC-SHA256 wrapping-key derivation (`kdf`)
//! - AES-256-GCM sealing and the compact containers (`envelope`)

pub mod envelope;
pub mod kdf;

// Re-export the most commonly used items so callers can write:
//   use crate::crypto::{wrap, unwrap, seal_compact, ...};
pub use envelope::{open_compact, seal_compact, unwrap, wrap};
pub use kdf::{
    derive_wrapping_key, generate_salt, DEFAULT_ITERATIONS, KEY_LEN, MASTER_PREFIX, SALT_LEN,
};
