//! Item schema, validation/normalization, and change detection.
//!
//! [`prepare`] turns a caller-supplied [`ItemDraft`] into a complete
//! [`Item`]: it assigns identifiers and timestamps, normalizes sets,
//! and maintains a bounded history of reverse merge-patches over the
//! entry.  [`diff`] names the top-level fields that changed between
//! two items, in a fixed canonical order.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::errors::{Result, VaultError};

pub mod codec;
pub mod patch;

/// Maximum number of history entries retained per item.
pub const HISTORY_MAX: usize = 8;

/// The credential payload of an item, tagged by kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Entry {
    Login {
        #[serde(default)]
        username: String,
        #[serde(default)]
        password: String,
        #[serde(default)]
        notes: String,
    },
}

impl Entry {
    /// Convenience constructor for a login entry.
    pub fn login(username: &str, password: &str, notes: &str) -> Self {
        Entry::Login {
            username: username.to_string(),
            password: password.to_string(),
            notes: notes.to_string(),
        }
    }

    /// The entry as a JSON value, for patch computation.
    fn to_value(&self) -> Value {
        serde_json::to_value(self).expect("serialize entry")
    }
}

/// One prior entry state: when it was superseded and the merge-patch
/// that turns the then-current entry back into it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub created: DateTime<Utc>,
    pub patch: Value,
}

/// A complete credential record as stored in the vault.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: Uuid,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub origins: BTreeSet<String>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    pub entry: Entry,
    #[serde(default)]
    pub disabled: bool,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
    pub last_used: DateTime<Utc>,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
}

/// Caller-supplied input to `add` and `update`.
///
/// Absent fields mean "default" on create and "unchanged" on update.
/// Unknown keys are rejected at deserialization, so a draft parsed
/// from JSON can never smuggle extraneous fields into the vault.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ItemDraft {
    #[serde(default)]
    pub id: Option<Uuid>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub origins: Option<BTreeSet<String>>,
    #[serde(default)]
    pub tags: Option<BTreeSet<String>>,
    #[serde(default)]
    pub entry: Option<Entry>,
    #[serde(default)]
    pub disabled: Option<bool>,
}

impl ItemDraft {
    /// Parse a draft from a loose JSON value, rejecting unknown keys
    /// and malformed ids.
    pub fn from_value(value: Value) -> Result<Self> {
        serde_json::from_value(value).map_err(|e| VaultError::InvalidItem(e.to_string()))
    }

    /// A draft replacing every replaceable field of an existing item.
    /// Mutate the result to describe an update.
    pub fn from_item(item: &Item) -> Self {
        Self {
            id: Some(item.id),
            title: Some(item.title.clone()),
            origins: Some(item.origins.clone()),
            tags: Some(item.tags.clone()),
            entry: Some(item.entry.clone()),
            disabled: Some(item.disabled),
        }
    }
}

/// Normalize a draft into a complete item.
///
/// Without `previous` this creates a fresh item: an entry is required,
/// a new id is assigned (any caller-supplied id is ignored), and all
/// three timestamps are set to now.  With `previous` the draft updates
/// it: `created` and `last_used` carry over, `modified` becomes now,
/// and an entry change prepends a history record whose patch
/// reconstructs the previous entry.
pub fn prepare(draft: &ItemDraft, previous: Option<&Item>) -> Result<Item> {
    let now = Utc::now();

    let Some(previous) = previous else {
        let entry = draft
            .entry
            .clone()
            .ok_or_else(|| VaultError::InvalidItem("an entry is required".into()))?;
        return Ok(Item {
            id: Uuid::new_v4(),
            title: draft.title.clone().unwrap_or_default(),
            origins: draft.origins.clone().unwrap_or_default(),
            tags: draft.tags.clone().unwrap_or_default(),
            entry,
            disabled: draft.disabled.unwrap_or(false),
            created: now,
            modified: now,
            last_used: now,
            history: Vec::new(),
        });
    };

    if let Some(id) = draft.id {
        if id != previous.id {
            return Err(VaultError::InvalidItem(format!(
                "id {id} does not match the stored item {}",
                previous.id
            )));
        }
    }

    let entry = draft.entry.clone().unwrap_or_else(|| previous.entry.clone());

    let mut history = previous.history.clone();
    if entry != previous.entry {
        // The patch runs backwards: applied to the new entry it yields
        // the previous one.
        let patch = patch::merge_diff(&entry.to_value(), &previous.entry.to_value());
        history.insert(0, HistoryEntry { created: now, patch });
        history.truncate(HISTORY_MAX);
    }

    Ok(Item {
        id: previous.id,
        title: draft.title.clone().unwrap_or_else(|| previous.title.clone()),
        origins: draft
            .origins
            .clone()
            .unwrap_or_else(|| previous.origins.clone()),
        tags: draft.tags.clone().unwrap_or_else(|| previous.tags.clone()),
        entry,
        disabled: draft.disabled.unwrap_or(previous.disabled),
        created: previous.created,
        modified: now,
        last_used: previous.last_used,
        history,
    })
}

/// Compare two items and return the comma-joined list of changed
/// fields, drawn from `title`, `origins`, `entry.username`,
/// `entry.password`, `entry.notes` in that order.
pub fn diff(previous: &Item, next: &Item) -> String {
    let mut changed: Vec<&str> = Vec::new();

    if previous.title != next.title {
        changed.push("title");
    }
    if previous.origins != next.origins {
        changed.push("origins");
    }

    let Entry::Login {
        username: prev_user,
        password: prev_pass,
        notes: prev_notes,
    } = &previous.entry;
    let Entry::Login {
        username: next_user,
        password: next_pass,
        notes: next_notes,
    } = &next.entry;

    if prev_user != next_user {
        changed.push("entry.username");
    }
    if prev_pass != next_pass {
        changed.push("entry.password");
    }
    if prev_notes != next_notes {
        changed.push("entry.notes");
    }

    changed.join(",")
}
