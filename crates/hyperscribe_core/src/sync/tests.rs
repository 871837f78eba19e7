use super::*;
use crate::constants::{STORAGE_KEY, SYNC_MANIFEST_KEY, SYNC_NOTE_KEY_PREFIX};
use crate::storage::{MemoryStore, StorageOp};
use crate::test_support::{
    init_store, settle, sync_harness, sync_harness_with, SyncHarness, TEST_DEBOUNCE, T0,
};

async fn enabled() -> SyncHarness {
    let h = sync_harness().await;
    let outcome = h.engine.enable().await;
    assert_eq!(
        outcome,
        SyncOutcome::Synced {
            pushed: 1,
            pulled: 0,
            removed: 0
        }
    );
    h
}

fn remote_copy(h: &SyncHarness, id: &str) -> Option<RemoteNote> {
    h.remote
        .peek(&remote::note_key(id))
        .map(|value| serde_json::from_value(value).expect("remote note"))
}

fn manifest_ids(h: &SyncHarness) -> Vec<String> {
    let value = h.remote.peek(SYNC_MANIFEST_KEY).expect("manifest");
    let manifest: SyncManifest = serde_json::from_value(value).expect("manifest shape");
    manifest.notes.into_iter().map(|entry| entry.id).collect()
}

/// Simulates another device writing a note to the mirror.
async fn remote_edit(h: &SyncHarness, id: &str, content: &str, at: i64) {
    let copy = RemoteNote {
        id: id.to_string(),
        title: content.lines().next().unwrap_or_default().to_string(),
        content: content.to_string(),
        last_modified: at,
    };
    remote::write_note(h.remote.as_ref(), &copy)
        .await
        .expect("remote write");
    remote::upsert_manifest(h.remote.as_ref(), &[copy])
        .await
        .expect("manifest write");
}

fn active_id(h: &SyncHarness) -> String {
    h.store
        .get_state()
        .active_note_id
        .clone()
        .expect("active note")
}

/// Enabled engine with a conflict on the active note: local edited at
/// `T0 + 5`, remote at `T0 + 3`.
async fn conflicted() -> (SyncHarness, String) {
    let h = enabled().await;
    let id = active_id(&h);
    h.clock.set(T0 + 5);
    h.store
        .update_active_content("local edit".to_string())
        .expect("local edit");
    remote_edit(&h, &id, "remote edit", T0 + 3).await;

    match h.engine.sync().await {
        SyncOutcome::Conflict { conflicts } => assert_eq!(conflicts.len(), 1),
        other => panic!("expected conflict, got {:?}", other),
    }
    (h, id)
}

#[tokio::test]
async fn test_missing_remote_disables_sync_without_error() {
    let h = init_store().await;
    let engine = SyncEngine::new(h.store.clone(), None, SyncOptions::default());

    assert_eq!(engine.status(), SyncState::Unavailable);
    assert!(!engine.is_available());
    assert_eq!(engine.enable().await, SyncOutcome::Unavailable);
    assert_eq!(engine.sync().await, SyncOutcome::Unavailable);
    assert_eq!(engine.disable().await, SyncOutcome::Unavailable);
    assert!(matches!(
        engine.calculate_sync_usage().await,
        Err(AppError::SyncUnavailable)
    ));
    assert!(!h.store.get_state().sync_enabled);
}

#[tokio::test]
async fn test_sync_while_disabled_does_nothing() {
    let h = sync_harness().await;
    assert_eq!(h.engine.status(), SyncState::Disabled);
    assert_eq!(h.engine.sync().await, SyncOutcome::Disabled);
    assert!(h.remote.keys().is_empty());
}

#[tokio::test]
async fn test_enable_pushes_local_notes_and_records_sync_time() {
    let h = enabled().await;
    let id = active_id(&h);
    let state = h.store.get_state();

    assert!(state.sync_enabled);
    assert_eq!(state.last_sync_time, Some(T0));
    assert_eq!(h.engine.status(), SyncState::Synced { at: T0 });

    let copy = remote_copy(&h, &id).expect("pushed");
    assert_eq!(copy.content, state.notes[0].content);
    assert_eq!(copy.last_modified, T0);
    assert_eq!(manifest_ids(&h), vec![id]);
}

#[tokio::test]
async fn test_local_edit_is_pushed() {
    let h = enabled().await;
    h.clock.set(T0 + 1);
    let note = h
        .store
        .update_active_content("# Draft\nnew words".to_string())
        .expect("edit");

    assert_eq!(
        h.engine.sync().await,
        SyncOutcome::Synced {
            pushed: 1,
            pulled: 0,
            removed: 0
        }
    );
    let copy = remote_copy(&h, &note.id).expect("pushed");
    assert_eq!(copy.content, "# Draft\nnew words");
    assert_eq!(copy.title, "Draft");
    assert_eq!(copy.last_modified, T0 + 1);
    assert_eq!(h.store.get_state().last_sync_time, Some(T0 + 1));
}

#[tokio::test]
async fn test_remote_edit_is_pulled() {
    let h = enabled().await;
    let id = active_id(&h);
    remote_edit(&h, &id, "from laptop", T0 + 10).await;
    h.clock.set(T0 + 20);

    assert_eq!(
        h.engine.sync().await,
        SyncOutcome::Synced {
            pushed: 0,
            pulled: 1,
            removed: 0
        }
    );
    let state = h.store.get_state();
    let note = state.note(&id).expect("note");
    assert_eq!(note.content, "from laptop");
    assert_eq!(note.modified, T0 + 10);
    assert_eq!(state.last_sync_time, Some(T0 + 20));
}

#[tokio::test]
async fn test_remote_only_note_is_pulled_without_switching_active() {
    let h = enabled().await;
    let active = active_id(&h);
    remote_edit(&h, "note_laptop", "Shopping\n- eggs", T0 + 2).await;
    h.clock.set(T0 + 3);

    let outcome = h.engine.sync().await;
    assert!(matches!(outcome, SyncOutcome::Synced { pulled: 1, .. }));
    let state = h.store.get_state();
    assert_eq!(state.notes.len(), 2);
    assert_eq!(state.notes[1].id, "note_laptop");
    assert_eq!(state.notes[1].title, "Shopping");
    assert_eq!(state.active_note_id.as_deref(), Some(active.as_str()));
}

#[tokio::test]
async fn test_locally_closed_note_is_removed_from_remote() {
    let h = sync_harness().await;
    let second = h
        .store
        .create_note(Some("Scratch"), "temp".to_string())
        .expect("create");
    assert!(matches!(
        h.engine.enable().await,
        SyncOutcome::Synced { pushed: 2, .. }
    ));

    h.clock.set(T0 + 1);
    h.store.close_note(&second.id).expect("close");
    let outcome = h.engine.sync().await;
    assert!(matches!(outcome, SyncOutcome::Synced { removed: 1, .. }));
    assert!(remote_copy(&h, &second.id).is_none());
    assert_eq!(manifest_ids(&h), vec![active_id(&h)]);
}

#[tokio::test]
async fn test_sync_with_nothing_to_do_leaves_store_and_mirror_alone() {
    let h = enabled().await;
    let revision = h.store.revision();
    let writes = h.remote.set_calls();
    h.clock.set(T0 + 5);

    assert_eq!(
        h.engine.sync().await,
        SyncOutcome::Synced {
            pushed: 0,
            pulled: 0,
            removed: 0
        }
    );
    assert_eq!(h.store.revision(), revision);
    assert_eq!(h.remote.set_calls(), writes);
    assert_eq!(h.store.get_state().last_sync_time, Some(T0));
    assert_eq!(h.engine.status(), SyncState::Synced { at: T0 });
}

#[tokio::test]
async fn test_offline_edit_pushed_late_reaches_device_that_synced_meanwhile() {
    let a = enabled().await;
    let id = active_id(&a);
    let b = sync_harness_with(a.remote.clone()).await;
    b.clock.set(T0 + 10);
    assert_eq!(
        b.engine.enable().await,
        SyncOutcome::Synced {
            pushed: 1,
            pulled: 1,
            removed: 0
        }
    );

    a.clock.set(T0 + 20);
    a.store
        .update_active_content("A offline edit".to_string())
        .expect("offline edit");
    b.clock.set(T0 + 30);
    assert!(matches!(b.engine.sync().await, SyncOutcome::Synced { pulled: 0, .. }));

    a.clock.set(T0 + 40);
    assert!(matches!(a.engine.sync().await, SyncOutcome::Synced { pushed: 1, .. }));
    assert_eq!(remote_copy(&a, &id).map(|copy| copy.last_modified), Some(T0 + 40));

    b.clock.set(T0 + 50);
    assert_eq!(
        b.engine.sync().await,
        SyncOutcome::Synced {
            pushed: 0,
            pulled: 1,
            removed: 0
        }
    );
    let state = b.store.get_state();
    assert_eq!(state.note(&id).map(|n| n.content.as_str()), Some("A offline edit"));
    assert_eq!(
        remote_copy(&b, &id).map(|copy| copy.content),
        Some("A offline edit".to_string())
    );
}

#[tokio::test]
async fn test_note_created_offline_elsewhere_is_pulled_not_deleted() {
    let a = enabled().await;
    let b = sync_harness_with(a.remote.clone()).await;
    b.clock.set(T0 + 1);
    assert!(matches!(b.engine.enable().await, SyncOutcome::Synced { pushed: 1, .. }));

    b.clock.set(T0 + 5);
    let offline = b
        .store
        .create_note(Some("Offline"), "written offline".to_string())
        .expect("create");
    a.clock.set(T0 + 10);
    assert!(matches!(a.engine.sync().await, SyncOutcome::Synced { pulled: 1, .. }));

    b.clock.set(T0 + 20);
    assert!(matches!(b.engine.sync().await, SyncOutcome::Synced { pushed: 1, .. }));

    a.clock.set(T0 + 30);
    assert_eq!(
        a.engine.sync().await,
        SyncOutcome::Synced {
            pushed: 0,
            pulled: 1,
            removed: 0
        }
    );
    let state = a.store.get_state();
    assert_eq!(
        state.note(&offline.id).map(|n| n.content.as_str()),
        Some("written offline")
    );
    assert!(remote_copy(&a, &offline.id).is_some());
    assert!(state.synced_note_ids.contains(&offline.id));
}

#[tokio::test]
async fn test_diverging_edits_raise_conflict_without_overwriting() {
    let (h, id) = conflicted().await;
    let state = h.store.get_state();

    let conflict = h.engine.pending_conflicts().remove(0);
    assert_eq!(conflict.note_id, id);
    assert_eq!(conflict.kind, ConflictKind::LocalNewer);
    assert_eq!(conflict.local.content, "local edit");
    assert_eq!(conflict.local.modified, T0 + 5);
    assert_eq!(conflict.remote.content, "remote edit");
    assert_eq!(conflict.remote.modified, T0 + 3);

    assert_eq!(state.note(&id).map(|n| n.content.as_str()), Some("local edit"));
    assert_eq!(
        remote_copy(&h, &id).map(|copy| copy.content),
        Some("remote edit".to_string())
    );
    assert_eq!(state.last_sync_time, Some(T0));
    assert_eq!(h.engine.status(), SyncState::Conflict { pending: 1 });
}

#[tokio::test]
async fn test_keep_both_preserves_both_versions() {
    let (h, id) = conflicted().await;
    h.clock.set(T0 + 6);

    let resolution = h
        .engine
        .resolve_conflict(&id, ResolutionStrategy::KeepBoth)
        .await
        .expect("resolve");
    assert_eq!(resolution.remaining, 0);
    let created = resolution.created_note_id.expect("duplicate note");

    let state = h.store.get_state();
    assert_eq!(state.notes.len(), 2);
    assert_eq!(state.notes[0].content, "local edit");
    assert_eq!(state.notes[1].id, created);
    assert_eq!(state.notes[1].content, "remote edit");
    assert_eq!(state.active_note_id.as_deref(), Some(id.as_str()));
    assert_eq!(state.last_sync_time, Some(T0 + 6));

    assert_eq!(
        remote_copy(&h, &id).map(|copy| copy.content),
        Some("local edit".to_string())
    );
    assert_eq!(
        remote_copy(&h, &created).map(|copy| copy.content),
        Some("remote edit".to_string())
    );
    assert_eq!(manifest_ids(&h), vec![id, created]);
    assert_eq!(h.engine.status(), SyncState::Synced { at: T0 + 6 });

    h.clock.set(T0 + 7);
    assert_eq!(
        h.engine.sync().await,
        SyncOutcome::Synced {
            pushed: 0,
            pulled: 0,
            removed: 0
        }
    );
}

#[tokio::test]
async fn test_keep_remote_overwrites_local_through_store() {
    let (h, id) = conflicted().await;
    h.clock.set(T0 + 8);

    h.engine
        .resolve_conflict(&id, ResolutionStrategy::KeepRemote)
        .await
        .expect("resolve");
    let state = h.store.get_state();
    let note = state.note(&id).expect("note");
    assert_eq!(note.content, "remote edit");
    assert_eq!(note.modified, T0 + 8);
    assert_eq!(state.last_sync_time, Some(T0 + 8));
    assert!(h.store.has_pending_write());
    assert!(h.engine.pending_conflicts().is_empty());
}

#[tokio::test]
async fn test_keep_local_overwrites_remote() {
    let (h, id) = conflicted().await;
    h.clock.set(T0 + 8);

    h.engine
        .resolve_current(ResolutionStrategy::KeepLocal)
        .await
        .expect("resolve");
    let copy = remote_copy(&h, &id).expect("remote copy");
    assert_eq!(copy.content, "local edit");
    assert_eq!(copy.last_modified, T0 + 8);
    assert_eq!(h.store.get_state().last_sync_time, Some(T0 + 8));
}

#[tokio::test]
async fn test_failed_resolution_stays_pending_for_retry() {
    let (h, id) = conflicted().await;
    h.remote.set_failpoint(StorageOp::Set, Some("quota exceeded"));

    let err = h
        .engine
        .resolve_conflict(&id, ResolutionStrategy::KeepBoth)
        .await
        .expect_err("remote write fails");
    assert!(err.is_storage_failure());
    assert_eq!(h.engine.pending_conflicts().len(), 1);
    assert_eq!(h.store.get_state().notes.len(), 1);
    assert_eq!(h.store.get_state().last_sync_time, Some(T0));

    h.remote.set_failpoint(StorageOp::Set, None);
    h.engine
        .resolve_conflict(&id, ResolutionStrategy::KeepBoth)
        .await
        .expect("retry");
    assert_eq!(h.store.get_state().notes.len(), 2);
}

#[tokio::test]
async fn test_keep_both_retry_after_manifest_failure_reuses_duplicate() {
    let (h, id) = conflicted().await;
    h.clock.set(T0 + 6);
    let conflict = h.engine.pending_conflicts().remove(0);
    h.remote
        .set_key_failpoint(SYNC_MANIFEST_KEY, Some("quota exceeded"));

    let err = h
        .engine
        .resolve_conflict(&id, ResolutionStrategy::KeepBoth)
        .await
        .expect_err("manifest write fails");
    assert!(err.is_storage_failure());
    assert_eq!(h.engine.pending_conflicts().len(), 1);
    assert_eq!(h.store.get_state().notes.len(), 1);

    h.remote.set_key_failpoint(SYNC_MANIFEST_KEY, None);
    h.clock.set(T0 + 7);
    let resolution = h
        .engine
        .resolve_conflict(&id, ResolutionStrategy::KeepBoth)
        .await
        .expect("retry");
    assert_eq!(
        resolution.created_note_id.as_deref(),
        Some(conflict.duplicate_id.as_str())
    );

    let note_keys = h
        .remote
        .keys()
        .into_iter()
        .filter(|key| key.starts_with(SYNC_NOTE_KEY_PREFIX))
        .count();
    assert_eq!(note_keys, 2);
    assert_eq!(manifest_ids(&h), vec![id, conflict.duplicate_id.clone()]);
    assert_eq!(h.store.get_state().notes.len(), 2);
}

#[tokio::test]
async fn test_unknown_conflict_is_not_found() {
    let h = enabled().await;
    let err = h
        .engine
        .resolve_conflict("note_missing", ResolutionStrategy::KeepLocal)
        .await
        .expect_err("nothing pending");
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn test_multiple_conflicts_navigate_and_resolve_in_turn() {
    let h = sync_harness().await;
    let second = h
        .store
        .create_note(None, "second".to_string())
        .expect("create");
    let first = h.store.get_state().notes[0].id.clone();
    h.engine.enable().await;

    h.clock.set(T0 + 5);
    h.store
        .update_note_content(&first, "first local".to_string())
        .expect("edit");
    h.store
        .update_note_content(&second.id, "second local".to_string())
        .expect("edit");
    remote_edit(&h, &first, "first remote", T0 + 3).await;
    remote_edit(&h, &second.id, "second remote", T0 + 7).await;

    let outcome = h.engine.sync().await;
    assert!(matches!(outcome, SyncOutcome::Conflict { ref conflicts } if conflicts.len() == 2));

    let (current, position) = h.engine.current_conflict().expect("current");
    assert_eq!(current.note_id, first);
    assert_eq!(position, (0, 2));
    let next = h.engine.next_conflict().expect("next");
    assert_eq!(next.note_id, second.id);
    assert_eq!(next.kind, ConflictKind::RemoteNewer);
    assert_eq!(h.engine.previous_conflict().map(|c| c.note_id), Some(first.clone()));
    assert_eq!(h.engine.pending_conflicts().len(), 2);

    h.clock.set(T0 + 10);
    let resolution = h
        .engine
        .resolve_current(ResolutionStrategy::KeepLocal)
        .await
        .expect("resolve first");
    assert_eq!(resolution.remaining, 1);
    assert_eq!(h.store.get_state().last_sync_time, Some(T0));
    assert_eq!(h.engine.status(), SyncState::Conflict { pending: 1 });
    assert_eq!(
        h.engine.current_conflict().map(|(c, _)| c.note_id),
        Some(second.id.clone())
    );

    h.engine
        .resolve_current(ResolutionStrategy::KeepRemote)
        .await
        .expect("resolve second");
    assert_eq!(h.store.get_state().last_sync_time, Some(T0 + 10));
    assert_eq!(h.engine.status(), SyncState::Synced { at: T0 + 10 });
}

#[tokio::test]
async fn test_remote_failure_reports_error_and_keeps_local_state() {
    let h = enabled().await;
    h.clock.set(T0 + 1);
    h.store
        .update_active_content("unsent".to_string())
        .expect("edit");
    let before = h.store.get_state();
    h.remote.set_failpoint(StorageOp::Get, Some("network down"));

    let outcome = h.engine.sync().await;
    assert!(matches!(outcome, SyncOutcome::Error { ref message } if message.contains("network down")));
    assert!(matches!(h.engine.status(), SyncState::Error { .. }));
    assert_eq!(h.store.get_state(), before);
    assert!(!h.engine.is_syncing());

    h.remote.set_failpoint(StorageOp::Get, None);
    assert!(matches!(h.engine.sync().await, SyncOutcome::Synced { pushed: 1, .. }));
}

#[tokio::test]
async fn test_quota_exceeded_surfaces_as_error() {
    let h = sync_harness_with(Arc::new(MemoryStore::with_quota(StorageQuota {
        total_bytes: 100 * 1024,
        per_item_bytes: Some(256),
    })))
    .await;
    h.store
        .update_active_content("x".repeat(1024))
        .expect("big note");

    match h.engine.enable().await {
        SyncOutcome::Error { message } => assert!(message.contains("Quota exceeded")),
        other => panic!("expected quota error, got {:?}", other),
    }
    assert!(h.store.get_state().sync_enabled);
    assert_eq!(h.store.get_state().last_sync_time, None);
}

#[tokio::test]
async fn test_concurrent_sync_is_rejected() {
    let h = sync_harness().await;
    h.store.save(StatePatch::sync_enabled(true));
    h.remote.hold();

    let in_flight = {
        let engine = h.engine.clone();
        tokio::spawn(async move { engine.sync().await })
    };
    settle().await;
    assert!(h.engine.is_syncing());
    assert_eq!(h.engine.status(), SyncState::Syncing);
    assert_eq!(h.engine.sync().await, SyncOutcome::Rejected);

    h.remote.release();
    let outcome = in_flight.await.expect("join");
    assert!(matches!(outcome, SyncOutcome::Synced { pushed: 1, .. }));
    assert!(!h.engine.is_syncing());
}

#[tokio::test]
async fn test_disable_during_sync_completes_then_settles_disabled() {
    let h = sync_harness().await;
    h.store.save(StatePatch::sync_enabled(true));
    h.remote.hold();

    let in_flight = {
        let engine = h.engine.clone();
        tokio::spawn(async move { engine.sync().await })
    };
    settle().await;
    assert_eq!(h.engine.disable().await, SyncOutcome::Disabled);
    assert_eq!(h.engine.sync().await, SyncOutcome::Disabled);

    h.remote.release();
    let outcome = in_flight.await.expect("join");
    assert!(matches!(outcome, SyncOutcome::Synced { .. }));
    assert_eq!(h.engine.status(), SyncState::Disabled);
    assert!(!h.store.get_state().sync_enabled);
    // The in-flight writes landed; remote data survives disable.
    assert_eq!(manifest_ids(&h).len(), 1);
}

#[tokio::test]
async fn test_has_newer_cloud_data_is_read_only() {
    let h = enabled().await;
    let id = active_id(&h);
    let comparison = h.engine.has_newer_cloud_data().await.expect("compare");
    assert!(!comparison.has_newer);

    remote_edit(&h, &id, "newer elsewhere", T0 + 50).await;
    let comparison = h.engine.has_newer_cloud_data().await.expect("compare");
    assert!(comparison.has_newer);
    assert_eq!(comparison.cloud_modified, Some(T0 + 50));
    assert_eq!(comparison.local_modified, Some(T0));
    assert_ne!(
        h.store.get_state().notes[0].content,
        "newer elsewhere".to_string()
    );
}

#[tokio::test]
async fn test_load_from_sync_previews_without_applying() {
    let h = sync_harness().await;
    let err = h.engine.load_from_sync().await.expect_err("empty mirror");
    assert!(matches!(err, AppError::NotFound(_)));

    h.engine.enable().await;
    let id = active_id(&h);
    remote_edit(&h, &id, "preview me", T0 + 1).await;

    let preview = h.engine.load_from_sync().await.expect("preview");
    assert_eq!(preview.note.id, id);
    assert_eq!(preview.note.content, "preview me");
    assert_eq!(preview.notes.len(), 1);
    assert!(preview.metadata.is_some());
    assert_eq!(h.store.get_state().notes[0].content, "");
}

#[tokio::test]
async fn test_clear_sync_data_keeps_local_state() {
    let h = enabled().await;
    let before = h.store.get_state();

    h.engine.clear_sync_data().await.expect("clear remote");
    assert!(h.remote.keys().is_empty());
    assert_eq!(h.store.get_state(), before);

    h.clock.set(T0 + 1);
    assert!(matches!(h.engine.sync().await, SyncOutcome::Synced { pushed: 1, .. }));
}

#[tokio::test]
async fn test_sync_usage_reports_quota_share() {
    let h = enabled().await;
    let usage = h.engine.calculate_sync_usage().await.expect("usage");
    assert!(usage.used > 0);
    assert_eq!(usage.total, 100 * 1024);
    let expected = (usage.used as f64 / usage.total as f64 * 1000.0).round() / 10.0;
    assert!((usage.percentage - expected).abs() < f64::EPSILON);
    assert!(usage.formatted.ends_with("/ 100.0 KB"));
    assert!(h.local.peek(STORAGE_KEY).is_some());
}

#[tokio::test(start_paused = true)]
async fn test_auto_sync_pushes_after_persisted_edit() {
    let h = enabled().await;
    let handle = h.engine.spawn_auto_sync();
    let id = active_id(&h);

    h.clock.set(T0 + 1);
    h.store
        .update_active_content("typed quickly".to_string())
        .expect("edit");
    tokio::time::sleep(TEST_DEBOUNCE * 2).await;
    settle().await;

    assert_eq!(
        remote_copy(&h, &id).map(|copy| copy.content),
        Some("typed quickly".to_string())
    );
    assert_eq!(h.store.get_state().last_sync_time, Some(T0 + 1));
    handle.abort();
}

#[test]
fn test_default_options_match_browser_quota() {
    let options = SyncOptions::default();
    assert_eq!(options.quota.total_bytes, 102_400);
    assert_eq!(options.quota.per_item_bytes, Some(8_192));
}
