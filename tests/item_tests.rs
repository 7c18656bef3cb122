//! Integration tests for item preparation, normalization, history,
//! and change detection.

use std::collections::BTreeSet;

use lockbox_store::item::patch::merge_apply;
use lockbox_store::item::HISTORY_MAX;
use lockbox_store::{diff, prepare, Entry, ItemDraft, VaultError};
use serde_json::json;

fn login_draft(title: &str, username: &str, password: &str) -> ItemDraft {
    ItemDraft {
        title: Some(title.to_string()),
        entry: Some(Entry::login(username, password, "")),
        ..ItemDraft::default()
    }
}

// ---------------------------------------------------------------------------
// Creating fresh items
// ---------------------------------------------------------------------------

#[test]
fn prepare_assigns_id_and_timestamps() {
    let item = prepare(&login_draft("My Item", "foo", "bar"), None).expect("prepare");

    assert_eq!(item.title, "My Item");
    assert!(item.history.is_empty());
    assert_eq!(item.created, item.modified);
    assert_eq!(item.last_used, item.created);
    assert!(!item.disabled);
    assert!(item.origins.is_empty());
    assert!(item.tags.is_empty());
}

#[test]
fn prepare_requires_an_entry() {
    let draft = ItemDraft {
        title: Some("No entry".to_string()),
        ..ItemDraft::default()
    };

    let result = prepare(&draft, None);
    assert!(matches!(result, Err(VaultError::InvalidItem(_))));
}

#[test]
fn prepare_ignores_a_caller_supplied_id_on_create() {
    let supplied = uuid::Uuid::new_v4();
    let draft = ItemDraft {
        id: Some(supplied),
        ..login_draft("Site", "u", "p")
    };

    let item = prepare(&draft, None).unwrap();
    assert_ne!(item.id, supplied, "fresh items get a fresh id");
}

#[test]
fn fresh_ids_are_unique() {
    let a = prepare(&login_draft("A", "u", "p"), None).unwrap();
    let b = prepare(&login_draft("B", "u", "p"), None).unwrap();
    assert_ne!(a.id, b.id);
}

// ---------------------------------------------------------------------------
// Draft validation
// ---------------------------------------------------------------------------

#[test]
fn drafts_reject_unknown_top_level_keys() {
    let result = ItemDraft::from_value(json!({
        "title": "Site",
        "entry": {"kind": "login", "username": "u", "password": "p"},
        "favourite": true
    }));
    assert!(matches!(result, Err(VaultError::InvalidItem(_))));
}

#[test]
fn drafts_reject_unknown_entry_kinds() {
    let result = ItemDraft::from_value(json!({
        "entry": {"kind": "warpdrive", "plutonium": "yes"}
    }));
    assert!(matches!(result, Err(VaultError::InvalidItem(_))));
}

#[test]
fn drafts_reject_malformed_ids() {
    let result = ItemDraft::from_value(json!({
        "id": "not-a-uuid",
        "entry": {"kind": "login"}
    }));
    assert!(matches!(result, Err(VaultError::InvalidItem(_))));
}

#[test]
fn draft_entry_fields_default_to_empty() {
    let draft = ItemDraft::from_value(json!({
        "entry": {"kind": "login", "username": "only-user"}
    }))
    .unwrap();

    let item = prepare(&draft, None).unwrap();
    assert_eq!(item.entry, Entry::login("only-user", "", ""));
}

#[test]
fn origins_deduplicate() {
    let draft = ItemDraft::from_value(json!({
        "origins": ["a.example", "b.example", "a.example"],
        "entry": {"kind": "login"}
    }))
    .unwrap();

    let item = prepare(&draft, None).unwrap();
    assert_eq!(item.origins.len(), 2);
}

// ---------------------------------------------------------------------------
// Updating against a previous item
// ---------------------------------------------------------------------------

#[test]
fn update_carries_created_and_bumps_modified() {
    let previous = prepare(&login_draft("Site", "u", "p"), None).unwrap();

    let mut draft = ItemDraft::from_item(&previous);
    draft.entry = Some(Entry::login("u", "p2", ""));
    let next = prepare(&draft, Some(&previous)).unwrap();

    assert_eq!(next.id, previous.id);
    assert_eq!(next.created, previous.created);
    assert!(next.modified >= previous.modified);
    assert!(next.history[0].created <= next.modified);
}

#[test]
fn update_with_mismatched_id_fails() {
    let previous = prepare(&login_draft("Site", "u", "p"), None).unwrap();

    let mut draft = ItemDraft::from_item(&previous);
    draft.id = Some(uuid::Uuid::new_v4());

    let result = prepare(&draft, Some(&previous));
    assert!(matches!(result, Err(VaultError::InvalidItem(_))));
}

#[test]
fn unchanged_entry_adds_no_history() {
    let previous = prepare(&login_draft("Site", "u", "p"), None).unwrap();

    let mut draft = ItemDraft::from_item(&previous);
    draft.title = Some("Renamed".to_string());
    let next = prepare(&draft, Some(&previous)).unwrap();

    assert!(next.history.is_empty(), "title-only change must not touch history");
}

#[test]
fn history_patch_reconstructs_the_previous_entry() {
    let previous = prepare(&login_draft("Site", "foo", "bar"), None).unwrap();

    let mut draft = ItemDraft::from_item(&previous);
    draft.entry = Some(Entry::login("foo", "baz", ""));
    let next = prepare(&draft, Some(&previous)).unwrap();

    assert_eq!(next.history.len(), 1);

    let new_entry = serde_json::to_value(&next.entry).unwrap();
    let restored = merge_apply(&new_entry, &next.history[0].patch);
    assert_eq!(restored, serde_json::to_value(&previous.entry).unwrap());
}

#[test]
fn history_replays_two_generations_back() {
    let v1 = prepare(&login_draft("Site", "u", "one"), None).unwrap();

    let mut draft = ItemDraft::from_item(&v1);
    draft.entry = Some(Entry::login("u", "two", ""));
    let v2 = prepare(&draft, Some(&v1)).unwrap();

    let mut draft = ItemDraft::from_item(&v2);
    draft.entry = Some(Entry::login("u", "three", ""));
    let v3 = prepare(&draft, Some(&v2)).unwrap();

    // Applying patches newest-first walks the entry back in time.
    let current = serde_json::to_value(&v3.entry).unwrap();
    let back_one = merge_apply(&current, &v3.history[0].patch);
    assert_eq!(back_one, serde_json::to_value(&v2.entry).unwrap());

    let back_two = merge_apply(&back_one, &v3.history[1].patch);
    assert_eq!(back_two, serde_json::to_value(&v1.entry).unwrap());
}

#[test]
fn history_is_bounded() {
    let mut item = prepare(&login_draft("Site", "u", "pw-0"), None).unwrap();

    for round in 1..=HISTORY_MAX + 3 {
        let mut draft = ItemDraft::from_item(&item);
        draft.entry = Some(Entry::login("u", &format!("pw-{round}"), ""));
        item = prepare(&draft, Some(&item)).unwrap();
    }

    assert_eq!(item.history.len(), HISTORY_MAX);
}

#[test]
fn omitted_draft_fields_carry_over() {
    let mut draft = login_draft("Site", "u", "p");
    draft.origins = Some(BTreeSet::from(["site.example".to_string()]));
    let previous = prepare(&draft, None).unwrap();

    // A draft naming only the id leaves everything else unchanged.
    let minimal = ItemDraft {
        id: Some(previous.id),
        ..ItemDraft::default()
    };
    let next = prepare(&minimal, Some(&previous)).unwrap();

    assert_eq!(next.title, previous.title);
    assert_eq!(next.origins, previous.origins);
    assert_eq!(next.entry, previous.entry);
    assert!(next.history.is_empty());
}

// ---------------------------------------------------------------------------
// Change detection
// ---------------------------------------------------------------------------

#[test]
fn diff_reports_single_entry_field() {
    let previous = prepare(&login_draft("Site", "foo", "bar"), None).unwrap();

    let mut draft = ItemDraft::from_item(&previous);
    draft.entry = Some(Entry::login("foo", "baz", ""));
    let next = prepare(&draft, Some(&previous)).unwrap();

    assert_eq!(diff(&previous, &next), "entry.password");
}

#[test]
fn diff_reports_fields_in_canonical_order() {
    let previous = prepare(&login_draft("My Item", "foo", "bar"), None).unwrap();

    let mut draft = ItemDraft::from_item(&previous);
    draft.title = Some("MY Item".to_string());
    draft.entry = Some(Entry::login("another-user", "zab", ""));
    let next = prepare(&draft, Some(&previous)).unwrap();

    assert_eq!(diff(&previous, &next), "title,entry.username,entry.password");
}

#[test]
fn diff_treats_origins_as_a_set() {
    let previous = prepare(&login_draft("Site", "u", "p"), None).unwrap();

    let mut draft = ItemDraft::from_item(&previous);
    draft.title = Some("New title".to_string());
    draft.origins = Some(BTreeSet::from(["someplace.example".to_string()]));
    let next = prepare(&draft, Some(&previous)).unwrap();

    assert_eq!(diff(&previous, &next), "title,origins");
}

#[test]
fn diff_is_empty_for_identical_items() {
    let item = prepare(&login_draft("Site", "u", "p"), None).unwrap();
    assert_eq!(diff(&item, &item), "");
}

#[test]
fn diff_ignores_tags_and_timestamps() {
    let previous = prepare(&login_draft("Site", "u", "p"), None).unwrap();

    let mut draft = ItemDraft::from_item(&previous);
    draft.tags = Some(BTreeSet::from(["work".to_string()]));
    let next = prepare(&draft, Some(&previous)).unwrap();

    assert_eq!(diff(&previous, &next), "");
}
