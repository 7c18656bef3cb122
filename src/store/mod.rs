//! SQLite persistence adapter: one database file per bucket, two
//! tables.
//!
//! `items` holds `{id, active, encrypted}` records with a secondary
//! index on `active`; `keystores` holds one persisted keyring per
//! group.  Mutations that touch both tables run in a single read-write
//! transaction so a crash can never strand an item without its key or
//! vice versa.  Schema evolution is by monotonic `PRAGMA user_version`,
//! upgraded on open.

use std::path::{Path, PathBuf};

use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;
use uuid::Uuid;

use crate::errors::{Result, VaultError};
use crate::keyring::PersistedKeyring;

/// Current schema version, tracked in `PRAGMA user_version`.
const SCHEMA_VERSION: i64 = 1;

/// On-disk item record.
#[derive(Debug, Clone)]
pub struct ItemRecord {
    pub id: Uuid,
    /// `"active"` when the item is enabled, empty when disabled.
    pub active: String,
    /// Compact AEAD string whose associated data is the id.
    pub encrypted: String,
}

impl ItemRecord {
    /// The `active` index value for a given disabled flag.
    pub fn active_flag(disabled: bool) -> &'static str {
        if disabled {
            ""
        } else {
            "active"
        }
    }
}

/// Handle to one bucket's database.
pub struct Store {
    conn: Connection,
    path: Option<PathBuf>,
}

impl Store {
    /// Open (or create) the bucket database at `<dir>/<bucket>.db` and
    /// run any pending schema migrations.
    pub fn open(dir: &Path, bucket: &str) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(format!("{bucket}.db"));
        let conn = Connection::open(&path)?;

        let mut store = Self {
            conn,
            path: Some(path),
        };
        store.migrate()?;
        Ok(store)
    }

    /// Open an in-memory bucket.  Useful for embedders' tests; nothing
    /// survives the handle.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let mut store = Self { conn, path: None };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&mut self) -> Result<()> {
        let version: i64 = self
            .conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))?;

        if version < 1 {
            let tx = self.conn.transaction()?;
            tx.execute_batch(
                "CREATE TABLE items (
                    id        TEXT PRIMARY KEY,
                    active    TEXT NOT NULL,
                    encrypted TEXT NOT NULL
                );
                CREATE INDEX idx_items_active ON items(active);
                CREATE TABLE keystores (
                    \"group\"    TEXT PRIMARY KEY,
                    salt       TEXT NOT NULL,
                    iterations INTEGER NOT NULL,
                    encrypted  TEXT
                );",
            )?;
            tx.pragma_update(None, "user_version", SCHEMA_VERSION)?;
            tx.commit()?;
            debug!(from = version, to = SCHEMA_VERSION, "bucket schema migrated");
        }

        Ok(())
    }

    // ------------------------------------------------------------------
    // Items
    // ------------------------------------------------------------------

    /// Read one item record.
    pub fn get_item(&self, id: &Uuid) -> Result<Option<ItemRecord>> {
        self.conn
            .query_row(
                "SELECT id, active, encrypted FROM items WHERE id = ?1",
                params![id.to_string()],
                map_item_row,
            )
            .optional()
            .map_err(VaultError::from)
    }

    /// Read every item record.
    pub fn all_items(&self) -> Result<Vec<ItemRecord>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, active, encrypted FROM items ORDER BY id")?;
        let rows = stmt.query_map([], map_item_row)?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    /// Read every record whose `active` column says enabled.
    pub fn active_items(&self) -> Result<Vec<ItemRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, active, encrypted FROM items WHERE active = 'active' ORDER BY id",
        )?;
        let rows = stmt.query_map([], map_item_row)?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    /// Insert or replace one item record.
    pub fn put_item(&self, record: &ItemRecord) -> Result<()> {
        put_item_on(&self.conn, record)
    }

    /// Delete one item record, if present.
    pub fn delete_item(&self, id: &Uuid) -> Result<()> {
        self.conn.execute(
            "DELETE FROM items WHERE id = ?1",
            params![id.to_string()],
        )?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Keystores
    // ------------------------------------------------------------------

    /// Read the persisted keyring for `group`.
    pub fn get_keystore(&self, group: &str) -> Result<Option<PersistedKeyring>> {
        self.conn
            .query_row(
                "SELECT \"group\", salt, iterations, encrypted FROM keystores WHERE \"group\" = ?1",
                params![group],
                map_keystore_row,
            )
            .optional()
            .map_err(VaultError::from)
    }

    /// Insert or replace the persisted keyring for its group.
    pub fn put_keystore(&self, record: &PersistedKeyring) -> Result<()> {
        put_keystore_on(&self.conn, record)
    }

    // ------------------------------------------------------------------
    // Compound mutations (single transaction)
    // ------------------------------------------------------------------

    /// Write an item record and the keystore atomically.  Used when a
    /// mutation changed the keyring (item added, or a key created).
    pub fn put_item_and_keystore(
        &mut self,
        record: &ItemRecord,
        keystore: &PersistedKeyring,
    ) -> Result<()> {
        let tx = self.conn.transaction()?;
        put_item_on(&tx, record)?;
        put_keystore_on(&tx, keystore)?;
        tx.commit()?;
        Ok(())
    }

    /// Delete an item record and write the shrunk keystore atomically.
    pub fn delete_item_and_keystore(
        &mut self,
        id: &Uuid,
        keystore: &PersistedKeyring,
    ) -> Result<()> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM items WHERE id = ?1", params![id.to_string()])?;
        put_keystore_on(&tx, keystore)?;
        tx.commit()?;
        Ok(())
    }

    /// Drop every row from both tables atomically.  Backs `reset`.
    pub fn clear(&mut self) -> Result<()> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM items", [])?;
        tx.execute("DELETE FROM keystores", [])?;
        tx.commit()?;
        Ok(())
    }

    /// Close the handle and remove the bucket file entirely.
    pub fn destroy(self) -> Result<()> {
        let path = self.path.clone();
        drop(self);
        if let Some(path) = path {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }
}

fn put_item_on(conn: &Connection, record: &ItemRecord) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO items (id, active, encrypted) VALUES (?1, ?2, ?3)",
        params![record.id.to_string(), record.active, record.encrypted],
    )?;
    Ok(())
}

fn put_keystore_on(conn: &Connection, record: &PersistedKeyring) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO keystores (\"group\", salt, iterations, encrypted)
         VALUES (?1, ?2, ?3, ?4)",
        params![record.group, record.salt, record.iterations, record.encrypted],
    )?;
    Ok(())
}

fn map_item_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ItemRecord> {
    let id_str: String = row.get(0)?;
    let id = Uuid::parse_str(&id_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(ItemRecord {
        id,
        active: row.get(1)?,
        encrypted: row.get(2)?,
    })
}

fn map_keystore_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<PersistedKeyring> {
    Ok(PersistedKeyring {
        group: row.get(0)?,
        salt: row.get(1)?,
        iterations: row.get(2)?,
        encrypted: row.get(3)?,
    })
}
