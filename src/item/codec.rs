//! Authenticated encryption of a single item, bound to its id.
//!
//! The item id string is the associated data on every seal, so a
//! ciphertext copied onto another record fails authentication instead
//! of silently decrypting under the wrong identity.

use uuid::Uuid;
use zeroize::Zeroize;

use super::Item;
use crate::crypto::envelope;
use crate::errors::{Result, VaultError};
use crate::keyring::Keyring;

/// Serialize `item` to canonical JSON and seal it under the keyring's
/// key for its id, generating the key on first encryption.
pub fn encrypt_item(keyring: &mut Keyring, item: &Item) -> Result<String> {
    let mut json =
        serde_json::to_vec(item).map_err(|e| VaultError::InvalidItem(e.to_string()))?;

    let aad = item.id.to_string();
    let key = keyring.add(item.id);
    let blob = envelope::seal_compact(key.as_bytes(), aad.as_bytes(), &json);
    json.zeroize();

    blob
}

/// Open the ciphertext stored for `id` and parse the item.
///
/// Fails `UnknownKey` when the keyring holds no key for `id`,
/// `AuthTagMismatch` when authentication fails (including a ciphertext
/// presented under a different id), and `Corrupt` when the container
/// or the decrypted JSON is malformed.
pub fn decrypt_item(keyring: &Keyring, id: &Uuid, blob: &str) -> Result<Item> {
    let key = keyring.get(id).ok_or(VaultError::UnknownKey(*id))?;

    let aad = id.to_string();
    let mut plaintext = envelope::open_compact(key.as_bytes(), aad.as_bytes(), blob)?;

    let item = serde_json::from_slice(&plaintext)
        .map_err(|e| VaultError::Corrupt(format!("item JSON: {e}")));
    plaintext.zeroize();

    item
}
