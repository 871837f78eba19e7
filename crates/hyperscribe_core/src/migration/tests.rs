use super::*;
use crate::clock::ManualClock;

const NOW: i64 = 1_700_000_000_000;

fn migrator() -> Migrator {
    Migrator::new(Arc::new(ManualClock::new(NOW)))
}

#[test]
fn empty_input_migrates_to_single_blank_note() {
    let state = migrator().run_migrations(json!({}), 0, CURRENT_VERSION);

    assert_eq!(state.version, CURRENT_VERSION);
    assert_eq!(state.notes.len(), 1);
    let note = &state.notes[0];
    assert_eq!(note.title, "My First Note");
    assert_eq!(note.content, "");
    assert_eq!(note.created, NOW);
    assert_eq!(note.modified, NOW);
    assert_eq!(state.active_note_id.as_deref(), Some(note.id.as_str()));
}

#[test]
fn legacy_note_becomes_first_note() {
    let raw = json!({ "note": "Hello\nWorld", "darkMode": true, "compactMode": true });
    let state = migrator().run_migrations(raw, 0, CURRENT_VERSION);

    assert_eq!(state.notes.len(), 1);
    assert_eq!(state.notes[0].title, "Hello");
    assert_eq!(state.notes[0].content, "Hello\nWorld");
    assert_eq!(state.theme, "default_dark");
    assert!(state.toolbar.compact);
    assert!(!state.extra.contains_key("note"));
    assert!(!state.extra.contains_key("darkMode"));
}

#[test]
fn legacy_title_is_truncated_to_fifty_chars() {
    let raw = json!({ "note": "a".repeat(120) });
    let state = migrator().run_migrations(raw, 0, 1);
    assert_eq!(state.notes[0].title.chars().count(), 50);
}

#[test]
fn malformed_legacy_field_defaults_instead_of_failing() {
    let raw = json!({ "note": 42, "font": { "size": 18 } });
    let state = migrator().run_migrations(raw, 0, 1);

    assert_eq!(state.notes[0].content, "");
    assert_eq!(state.notes[0].title, "My First Note");
    assert_eq!(state.font.size, 18);
    assert_eq!(state.font.family, "Inter, sans-serif");
}

#[test]
fn non_object_and_unshapeable_input_fall_back_to_default_document() {
    let from_string = migrator().run_migrations(json!("garbage"), 0, 1);
    assert_eq!(from_string.notes.len(), 1);

    let bad_notes = migrator().run_migrations(json!({ "version": 1, "notes": "nope" }), 1, 1);
    assert_eq!(bad_notes.version, 1);
    assert_eq!(bad_notes.notes.len(), 1);
    assert!(bad_notes.is_consistent());
}

#[test]
fn current_version_input_is_only_normalized() {
    let original = migrator().run_migrations(json!({ "note": "keep me" }), 0, 1);
    let raw = serde_json::to_value(&original).expect("serialize");

    let again = migrator().run_migrations(raw, 1, 1);
    assert_eq!(again, original);
}

#[test]
fn version_is_normalized_even_when_no_transform_runs() {
    let raw = json!({ "version": 0, "notes": [], "activeNoteId": null });
    let state = migrator().run_migrations(raw, 1, 1);
    assert_eq!(state.version, 1);
}

fn add_tag_v2(mut state: Map<String, Value>, _ctx: &MigrationContext) -> Map<String, Value> {
    if let Some(Value::Array(notes)) = state.get_mut("notes") {
        for note in notes {
            note["tags"] = json!(["migrated"]);
        }
    }
    state.insert("order".to_string(), json!(["v2"]));
    state
}

fn append_v3(mut state: Map<String, Value>, _ctx: &MigrationContext) -> Map<String, Value> {
    if let Some(Value::Array(order)) = state.get_mut("order") {
        order.push(json!("v3"));
    }
    state
}

#[test]
fn transforms_apply_in_ascending_order_without_skipping() {
    let migrator = migrator()
        .with_migration(3, append_v3)
        .with_migration(2, add_tag_v2);
    assert_eq!(migrator.latest_version(), 3);

    let state = migrator.run_migrations(json!({ "note": "x" }), 0, 3);
    assert_eq!(state.version, 3);
    assert_eq!(state.notes[0].tags, vec!["migrated".to_string()]);
    assert_eq!(state.extra.get("order"), Some(&json!(["v2", "v3"])));
}

#[test]
fn stored_version_reads_version_field() {
    assert_eq!(stored_version(&json!({ "version": 1 })), 1);
    assert_eq!(stored_version(&json!({ "version": "1" })), 0);
    assert_eq!(stored_version(&json!({})), 0);
    assert_eq!(stored_version(&json!(null)), 0);
}
