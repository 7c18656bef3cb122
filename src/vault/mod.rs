//! The vault: lifecycle state machine and guarded item operations.
//!
//! Every public operation first checks the derived lifecycle state
//! (`Fresh` / `Locked` / `Unlocked`), then delegates to the keyring
//! and item codec for crypto and commits through the store, in a
//! single transaction whenever the keyring changed alongside an item.

use std::collections::BTreeMap;

use chrono::Utc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::VaultConfig;
use crate::crypto::kdf::SALT_LEN;
use crate::errors::{Result, VaultError};
use crate::item::{self, codec, Item, ItemDraft};
use crate::keyring::Keyring;
use crate::metrics::{MetricsSink, Mutation};
use crate::store::{ItemRecord, Store};

/// Group tag of the default (and only) keyring.
const DEFAULT_GROUP: &str = "";

/// Lifecycle state, derived from the keyring's contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VaultState {
    /// No persisted keyring exists.
    Fresh,
    /// A persisted keyring exists but no master secret is in memory.
    Locked,
    /// The master secret is held and item keys are decrypted.
    Unlocked,
}

/// Options for [`Vault::initialize`].
#[derive(Debug, Default)]
pub struct InitOptions {
    /// KDF salt; freshly generated when absent.
    pub salt: Option<[u8; SALT_LEN]>,
    /// PBKDF2 iteration count; the default (8192) when absent.
    pub iterations: Option<u32>,
    /// Re-wrap an existing keyring under a new master instead of
    /// creating an empty one.
    pub rebase: bool,
}

/// A handle to one bucket's encrypted credential store.
pub struct Vault {
    store: Store,
    keyring: Keyring,
    metrics: Box<dyn MetricsSink>,
}

impl Vault {
    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Open the bucket database, run migrations, and load the persisted
    /// keyring when one exists (the vault comes up `Locked` then,
    /// `Fresh` otherwise).
    pub fn open(config: VaultConfig) -> Result<Self> {
        let store = Store::open(&config.dir, &config.bucket)?;

        let keyring = match store.get_keystore(DEFAULT_GROUP)? {
            Some(record) => Keyring::from_persisted(&record)?,
            None => match &config.keys {
                Some(seed) => Keyring::from_persisted(seed)?,
                None => Keyring::new(DEFAULT_GROUP),
            },
        };

        let vault = Self {
            store,
            keyring,
            metrics: config.metrics,
        };
        debug!(bucket = %config.bucket, state = ?vault.state(), "vault opened");
        Ok(vault)
    }

    /// The current lifecycle state.
    pub fn state(&self) -> VaultState {
        if self.keyring.is_unlocked() {
            VaultState::Unlocked
        } else if self.keyring.is_encrypted() {
            VaultState::Locked
        } else {
            VaultState::Fresh
        }
    }

    fn check_unlocked(&self) -> Result<()> {
        match self.state() {
            VaultState::Unlocked => Ok(()),
            VaultState::Locked => Err(VaultError::Locked),
            VaultState::Fresh => Err(VaultError::NotInitialized),
        }
    }

    /// Create (or with `rebase`, re-wrap) the keyring under `master`
    /// and persist it.  The vault ends up `Unlocked`.
    ///
    /// Without `rebase` this fails `AlreadyInitialized` when a
    /// persisted keyring exists.  With `rebase` it fails `Locked` when
    /// the vault is locked; on a `Fresh` vault it behaves as a plain
    /// initialize.
    pub fn initialize(&mut self, master: &str, options: InitOptions) -> Result<()> {
        if master.is_empty() {
            return Err(VaultError::MissingAppKey);
        }

        match (options.rebase, self.state()) {
            (false, VaultState::Fresh) => {}
            (false, _) => return Err(VaultError::AlreadyInitialized),
            (true, VaultState::Locked) => return Err(VaultError::Locked),
            (true, _) => {}
        }

        self.keyring
            .rebase(master.as_bytes(), options.salt, options.iterations)?;
        self.store.put_keystore(&self.keyring.to_persisted())?;
        debug!(rebase = options.rebase, "vault initialized");
        Ok(())
    }

    /// Unwrap the keyring under `master`.  A no-op on an already
    /// unlocked vault; fails `NotInitialized` on a fresh one and
    /// `InvalidMasterKey` on a wrong master, with no side effects.
    pub fn unlock(&mut self, master: &str) -> Result<()> {
        match self.state() {
            VaultState::Unlocked => Ok(()),
            VaultState::Fresh => Err(VaultError::NotInitialized),
            VaultState::Locked => {
                self.keyring.load(Some(master.as_bytes()))?;
                debug!("vault unlocked");
                Ok(())
            }
        }
    }

    /// Zeroize the master secret and every item key.  Idempotent.
    pub fn lock(&mut self) {
        self.keyring.clear(false);
        debug!("vault locked");
    }

    /// Drop every item and the keyring.  The vault ends up `Fresh`.
    pub fn reset(&mut self) -> Result<()> {
        self.store.clear()?;
        self.keyring.clear(true);
        debug!("vault reset");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Item operations
    // ------------------------------------------------------------------

    /// Decrypt and return every item, keyed by id.  A record that
    /// fails to decrypt propagates its error rather than being
    /// silently skipped.
    pub fn list(&self) -> Result<BTreeMap<Uuid, Item>> {
        self.check_unlocked()?;

        let mut items = BTreeMap::new();
        for record in self.store.all_items()? {
            let item = codec::decrypt_item(&self.keyring, &record.id, &record.encrypted)?;
            items.insert(record.id, item);
        }
        Ok(items)
    }

    /// Like [`list`](Self::list), but only records whose `active`
    /// index column marks them enabled.
    pub fn list_active(&self) -> Result<BTreeMap<Uuid, Item>> {
        self.check_unlocked()?;

        let mut items = BTreeMap::new();
        for record in self.store.active_items()? {
            let item = codec::decrypt_item(&self.keyring, &record.id, &record.encrypted)?;
            items.insert(record.id, item);
        }
        Ok(items)
    }

    /// Decrypt and return one item; `None` when the id is absent.
    pub fn get(&self, id: &Uuid) -> Result<Option<Item>> {
        self.check_unlocked()?;

        match self.store.get_item(id)? {
            Some(record) => {
                let item = codec::decrypt_item(&self.keyring, id, &record.encrypted)?;
                Ok(Some(item))
            }
            None => Ok(None),
        }
    }

    /// Validate and store a new item.
    ///
    /// The keyring gains a key, so the item record and the re-wrapped
    /// keystore are committed in one transaction.  Emits `added`.
    pub fn add(&mut self, draft: &ItemDraft) -> Result<Item> {
        self.check_unlocked()?;

        // 1. Normalize the draft into a complete item.
        let item = item::prepare(draft, None)?;

        // 2. Encrypt under a fresh item key and re-wrap the keyring.
        let encrypted = codec::encrypt_item(&mut self.keyring, &item)?;
        self.keyring.save()?;

        // 3. Commit both tables atomically.
        let record = ItemRecord {
            id: item.id,
            active: ItemRecord::active_flag(item.disabled).to_string(),
            encrypted,
        };
        self.store
            .put_item_and_keystore(&record, &self.keyring.to_persisted())?;

        self.emit(Mutation::Added, &item.id, None);
        Ok(item)
    }

    /// Apply a draft to an existing item.
    ///
    /// The keyring is unchanged for a decrypted item, so only the item
    /// record is written; should the key somehow be missing, the
    /// keystore is re-wrapped and committed alongside.  Emits
    /// `updated` with the changed-field list.
    pub fn update(&mut self, draft: &ItemDraft) -> Result<Item> {
        self.check_unlocked()?;

        let id = draft
            .id
            .ok_or_else(|| VaultError::InvalidItem("an id is required".into()))?;

        // 1. Read and decrypt the stored item.
        let existing = self
            .store
            .get_item(&id)?
            .ok_or(VaultError::MissingItem(id))?;
        let previous = codec::decrypt_item(&self.keyring, &id, &existing.encrypted)?;

        // 2. Normalize against the previous state and name the changes.
        let item = item::prepare(draft, Some(&previous))?;
        let fields = item::diff(&previous, &item);

        // 3. Re-encrypt and persist.
        let had_key = self.keyring.has(&id);
        let encrypted = codec::encrypt_item(&mut self.keyring, &item)?;
        let record = ItemRecord {
            id: item.id,
            active: ItemRecord::active_flag(item.disabled).to_string(),
            encrypted,
        };
        if had_key {
            self.store.put_item(&record)?;
        } else {
            self.keyring.save()?;
            self.store
                .put_item_and_keystore(&record, &self.keyring.to_persisted())?;
        }

        self.emit(Mutation::Updated, &id, Some(&fields));
        Ok(item)
    }

    /// Bump an item's `last_used` timestamp.  Emits `touched`.
    pub fn touch(&mut self, id: Uuid) -> Result<Item> {
        self.check_unlocked()?;

        let existing = self
            .store
            .get_item(&id)?
            .ok_or(VaultError::MissingItem(id))?;
        let mut item = codec::decrypt_item(&self.keyring, &id, &existing.encrypted)?;

        item.last_used = Utc::now();

        let encrypted = codec::encrypt_item(&mut self.keyring, &item)?;
        self.store.put_item(&ItemRecord {
            id: item.id,
            active: ItemRecord::active_flag(item.disabled).to_string(),
            encrypted,
        })?;

        self.emit(Mutation::Touched, &id, None);
        Ok(item)
    }

    /// Delete an item and its key.  Returns the decrypted item, or
    /// `None` (with no event) when the id is absent.
    ///
    /// The keyring shrinks, so the record deletion and the re-wrapped
    /// keystore are committed in one transaction.  Emits `deleted`.
    pub fn remove(&mut self, id: Uuid) -> Result<Option<Item>> {
        self.check_unlocked()?;

        let Some(existing) = self.store.get_item(&id)? else {
            return Ok(None);
        };
        let item = codec::decrypt_item(&self.keyring, &id, &existing.encrypted)?;

        self.keyring.remove(&id);
        self.keyring.save()?;
        self.store
            .delete_item_and_keystore(&id, &self.keyring.to_persisted())?;

        self.emit(Mutation::Deleted, &id, None);
        Ok(Some(item))
    }

    fn emit(&self, mutation: Mutation, id: &Uuid, fields: Option<&str>) {
        if let Err(error) = self.metrics.record(mutation, id, fields) {
            warn!(%mutation, %id, %error, "metrics sink failed");
        }
    }
}
