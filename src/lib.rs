//! Local encrypted credential store.
//!
//! Items are sealed per-record under independently random AES-256-GCM
//! keys; the keyring of item keys is wrapped under a key derived from
//! the user's master secret; everything persists in a single SQLite
//! bucket.  A closed vault exposes no cleartext until unlocked.

pub mod config;
pub mod crypto;
pub mod errors;
pub mod item;
pub mod keyring;
pub mod metrics;
pub mod store;
pub mod vault;

pub use config::VaultConfig;
pub use errors::{Result, VaultError};
pub use item::{diff, prepare, Entry, HistoryEntry, Item, ItemDraft};
pub use keyring::{Keyring, PersistedKeyring};
pub use metrics::{MetricsSink, Mutation, NoopSink};
pub use vault::{InitOptions, Vault, VaultState};
