//! The item keyring: one independently random 256-bit AEAD key per
//! item, persisted as a single blob wrapped under the master secret.
//!
//! Item keys are never derived from the master: compromise of one
//! item's ciphertext must not threaten its siblings.  The raw master
//! secret is retained in memory only while the vault is unlocked and
//! is zeroized on lock and on drop.

use std::collections::{BTreeMap, HashMap};

use base64::engine::general_purpose::URL_SAFE_NO_PAD as B64;
use base64::Engine;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::crypto::envelope;
use crate::crypto::kdf::{self, DEFAULT_ITERATIONS, KEY_LEN, SALT_LEN};
use crate::errors::{Result, VaultError};

/// A 256-bit AEAD key bound to a single item.  Zeroized on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct ItemKey {
    bytes: [u8; KEY_LEN],
}

impl ItemKey {
    /// Generate a fresh random key from the OS RNG.
    fn generate() -> Self {
        let mut bytes = [0u8; KEY_LEN];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self { bytes }
    }

    /// Access the raw key bytes (to pass to the item codec).
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.bytes
    }
}

/// The user-supplied master secret, zeroized on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
struct MasterSecret {
    bytes: Vec<u8>,
}

/// JWK-style serialization of one item key inside the keyring JSON.
#[derive(Serialize, Deserialize)]
struct Jwk {
    kty: String,
    alg: String,
    k: String,
}

/// On-disk shape of a keyring, as stored in the `keystores` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedKeyring {
    /// Keyring tag; the empty string names the default keyring.
    pub group: String,
    /// KDF salt, base64url (16 bytes decoded).
    pub salt: String,
    /// PBKDF2 iteration count.
    pub iterations: u32,
    /// The latest wrapped blob, absent until the first save.
    pub encrypted: Option<String>,
}

/// In-memory mapping from item id to [`ItemKey`], plus the envelope
/// parameters needed to persist it.
pub struct Keyring {
    group: String,
    salt: [u8; SALT_LEN],
    iterations: u32,
    encrypted: Option<String>,
    master: Option<MasterSecret>,
    keys: HashMap<Uuid, ItemKey>,
}

impl Keyring {
    /// Create an empty keyring that has never been saved.
    pub fn new(group: &str) -> Self {
        Self {
            group: group.to_string(),
            salt: kdf::generate_salt(),
            iterations: DEFAULT_ITERATIONS,
            encrypted: None,
            master: None,
            keys: HashMap::new(),
        }
    }

    /// Rebuild a keyring from its persisted record.  The map stays
    /// empty until [`load`](Self::load) unwraps the blob.
    pub fn from_persisted(record: &PersistedKeyring) -> Result<Self> {
        let salt_bytes = B64
            .decode(&record.salt)
            .map_err(|_| VaultError::Corrupt("keystore salt is not base64url".into()))?;
        let salt: [u8; SALT_LEN] = salt_bytes
            .try_into()
            .map_err(|_| VaultError::Corrupt("keystore salt must be 16 bytes".into()))?;
        if record.iterations == 0 {
            return Err(VaultError::Corrupt("keystore iteration count must be positive".into()));
        }

        Ok(Self {
            group: record.group.clone(),
            salt,
            iterations: record.iterations,
            encrypted: record.encrypted.clone(),
            master: None,
            keys: HashMap::new(),
        })
    }

    /// The persisted shape of this keyring.
    pub fn to_persisted(&self) -> PersistedKeyring {
        PersistedKeyring {
            group: self.group.clone(),
            salt: B64.encode(self.salt),
            iterations: self.iterations,
            encrypted: self.encrypted.clone(),
        }
    }

    // ------------------------------------------------------------------
    // Map operations
    // ------------------------------------------------------------------

    /// Returns `true` if the keyring holds a key for `id`.
    pub fn has(&self, id: &Uuid) -> bool {
        self.keys.contains_key(id)
    }

    /// Look up the key for `id`.
    pub fn get(&self, id: &Uuid) -> Option<&ItemKey> {
        self.keys.get(id)
    }

    /// Number of item keys currently held.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Returns `true` when no item keys are held.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Return the key for `id`, generating and storing a fresh random
    /// key on first sight.  Idempotent.
    pub fn add(&mut self, id: Uuid) -> &ItemKey {
        self.keys.entry(id).or_insert_with(ItemKey::generate)
    }

    /// Remove (and zeroize) the key for `id`, if present.
    pub fn remove(&mut self, id: &Uuid) {
        // Dropping the ItemKey zeroizes it.
        self.keys.remove(id);
    }

    // ------------------------------------------------------------------
    // Wrap / unwrap
    // ------------------------------------------------------------------

    /// Unwrap the persisted blob and replace the in-memory map.
    ///
    /// Uses `master` when given, otherwise the already-held master.
    /// On success the provided master is retained for later saves.
    pub fn load(&mut self, master: Option<&[u8]>) -> Result<()> {
        let blob = self.encrypted.clone().ok_or(VaultError::NotEncrypted)?;

        let mut plaintext = match (master, &self.master) {
            (Some(m), _) => envelope::unwrap(m, &blob)?,
            (None, Some(held)) => envelope::unwrap(&held.bytes, &blob)?,
            (None, None) => return Err(VaultError::InvalidMasterKey),
        };

        let parsed: BTreeMap<String, Jwk> = serde_json::from_slice(&plaintext)
            .map_err(|e| VaultError::Corrupt(format!("keyring JSON: {e}")))?;
        plaintext.zeroize();

        let mut keys = HashMap::with_capacity(parsed.len());
        for (id_str, jwk) in parsed {
            let id = Uuid::parse_str(&id_str)
                .map_err(|_| VaultError::Corrupt(format!("keyring id '{id_str}' is not a UUID")))?;
            let mut raw = B64
                .decode(&jwk.k)
                .map_err(|_| VaultError::Corrupt("item key is not base64url".into()))?;
            if raw.len() != KEY_LEN {
                raw.zeroize();
                return Err(VaultError::Corrupt("item key must be 32 bytes".into()));
            }
            let mut bytes = [0u8; KEY_LEN];
            bytes.copy_from_slice(&raw);
            raw.zeroize();
            keys.insert(id, ItemKey { bytes });
        }

        self.keys = keys;
        if let Some(m) = master {
            self.master = Some(MasterSecret { bytes: m.to_vec() });
        }
        Ok(())
    }

    /// Re-wrap the current map under the held master and update the
    /// persisted blob.  Fails `InvalidMasterKey` when no master is held.
    pub fn save(&mut self) -> Result<()> {
        let master = self.master.as_ref().ok_or(VaultError::InvalidMasterKey)?;

        let mut json = self.to_json();
        let blob = envelope::wrap(&master.bytes, &self.salt, self.iterations, &json);
        json.zeroize();

        self.encrypted = Some(blob?);
        Ok(())
    }

    /// Adopt a new master secret (and optionally fresh envelope
    /// parameters), then re-wrap the current map under it.
    ///
    /// With an empty map this is the first-time initialization; with a
    /// populated one it rebases the keyring onto a new master.
    pub fn rebase(
        &mut self,
        master: &[u8],
        salt: Option<[u8; SALT_LEN]>,
        iterations: Option<u32>,
    ) -> Result<()> {
        self.salt = salt.unwrap_or_else(kdf::generate_salt);
        self.iterations = iterations.unwrap_or(DEFAULT_ITERATIONS);
        self.master = Some(MasterSecret {
            bytes: master.to_vec(),
        });
        self.save()
    }

    /// Drop the in-memory map and zeroize the master secret.  With
    /// `hard` the persisted blob is dropped too (used only by reset).
    pub fn clear(&mut self, hard: bool) {
        self.keys.clear();
        self.master = None;
        if hard {
            self.encrypted = None;
        }
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    /// Keyring tag (empty string for the default keyring).
    pub fn group(&self) -> &str {
        &self.group
    }

    /// Returns `true` when a wrapped blob exists (saved at least once).
    pub fn is_encrypted(&self) -> bool {
        self.encrypted.is_some()
    }

    /// Returns `true` while a master secret is held in memory.
    pub fn is_unlocked(&self) -> bool {
        self.master.is_some()
    }

    /// Canonical keyring JSON: `{ "<id>": jwk }` with sorted ids.
    fn to_json(&self) -> Vec<u8> {
        let map: BTreeMap<String, Jwk> = self
            .keys
            .iter()
            .map(|(id, key)| {
                (
                    id.to_string(),
                    Jwk {
                        kty: "oct".to_string(),
                        alg: "A256GCM".to_string(),
                        k: B64.encode(key.bytes),
                    },
                )
            })
            .collect();
        serde_json::to_vec(&map).expect("serialize keyring map")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_is_idempotent() {
        let mut keyring = Keyring::new("");
        let id = Uuid::new_v4();

        let first = *keyring.add(id).as_bytes();
        let second = *keyring.add(id).as_bytes();

        assert_eq!(first, second, "adding an existing id must return the same key");
        assert_eq!(keyring.len(), 1);
    }

    #[test]
    fn keys_are_independent() {
        let mut keyring = Keyring::new("");
        let a = *keyring.add(Uuid::new_v4()).as_bytes();
        let b = *keyring.add(Uuid::new_v4()).as_bytes();
        assert_ne!(a, b);
    }

    #[test]
    fn save_then_load_roundtrips() {
        let mut keyring = Keyring::new("");
        let id = Uuid::new_v4();
        keyring.rebase(b"master", None, Some(1000)).unwrap();
        let key = *keyring.add(id).as_bytes();
        keyring.save().unwrap();

        // Rebuild from the persisted record and unwrap.
        let mut restored = Keyring::from_persisted(&keyring.to_persisted()).unwrap();
        restored.load(Some(b"master")).unwrap();

        assert_eq!(restored.len(), 1);
        assert_eq!(*restored.get(&id).unwrap().as_bytes(), key);
    }

    #[test]
    fn load_without_blob_fails_not_encrypted() {
        let mut keyring = Keyring::new("");
        let err = keyring.load(Some(b"master")).unwrap_err();
        assert!(matches!(err, VaultError::NotEncrypted));
    }

    #[test]
    fn load_with_wrong_master_fails() {
        let mut keyring = Keyring::new("");
        keyring.rebase(b"right", None, Some(1000)).unwrap();

        let mut restored = Keyring::from_persisted(&keyring.to_persisted()).unwrap();
        let err = restored.load(Some(b"wrong")).unwrap_err();
        assert!(matches!(err, VaultError::InvalidMasterKey));
    }

    #[test]
    fn load_without_any_master_fails() {
        let mut keyring = Keyring::new("");
        keyring.rebase(b"master", None, Some(1000)).unwrap();

        let mut restored = Keyring::from_persisted(&keyring.to_persisted()).unwrap();
        let err = restored.load(None).unwrap_err();
        assert!(matches!(err, VaultError::InvalidMasterKey));
    }

    #[test]
    fn save_without_master_fails() {
        let mut keyring = Keyring::new("");
        let err = keyring.save().unwrap_err();
        assert!(matches!(err, VaultError::InvalidMasterKey));
    }

    #[test]
    fn clear_drops_master_but_keeps_blob() {
        let mut keyring = Keyring::new("");
        keyring.rebase(b"master", None, Some(1000)).unwrap();
        keyring.add(Uuid::new_v4());

        keyring.clear(false);
        assert!(keyring.is_empty());
        assert!(!keyring.is_unlocked());
        assert!(keyring.is_encrypted());

        keyring.clear(true);
        assert!(!keyring.is_encrypted());
    }

    #[test]
    fn rebase_changes_the_wrapping_master() {
        let mut keyring = Keyring::new("");
        let id = Uuid::new_v4();
        keyring.rebase(b"first", None, Some(1000)).unwrap();
        let key = *keyring.add(id).as_bytes();
        keyring.rebase(b"second", None, Some(1000)).unwrap();

        let mut restored = Keyring::from_persisted(&keyring.to_persisted()).unwrap();
        assert!(matches!(
            restored.load(Some(b"first")).unwrap_err(),
            VaultError::InvalidMasterKey
        ));
        restored.load(Some(b"second")).unwrap();
        assert_eq!(*restored.get(&id).unwrap().as_bytes(), key);
    }
}
