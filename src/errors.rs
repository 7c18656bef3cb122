use thiserror::Error;
use uuid::Uuid;

/// All errors that can occur in lockbox-store.
#[derive(Debug, Error)]
pub enum VaultError {
    // --- Lifecycle errors ---
    #[error("Vault is not initialized")]
    NotInitialized,

    #[error("Vault is already initialized")]
    AlreadyInitialized,

    #[error("Vault is locked")]
    Locked,

    // --- Master-secret errors ---
    #[error("No master secret provided")]
    MissingAppKey,

    #[error("Invalid master key: wrong master secret or malformed keyring blob")]
    InvalidMasterKey,

    #[error("Keyring has never been saved, nothing to unwrap")]
    NotEncrypted,

    // --- Item errors ---
    #[error("Invalid item: {0}")]
    InvalidItem(String),

    #[error("No item with id {0}")]
    MissingItem(Uuid),

    #[error("No item key for id {0}")]
    UnknownKey(Uuid),

    // --- Crypto errors ---
    #[error("Authentication tag mismatch: wrong key or tampered ciphertext")]
    AuthTagMismatch,

    #[error("Corrupt record: {0}")]
    Corrupt(String),

    // --- Adapter errors ---
    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience type alias for lockbox-store results.
pub type Result<T> = std::result::Result<T, VaultError>;
