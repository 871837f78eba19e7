//! Shared test-only helpers for hyperscribe_core.

use crate::clock::ManualClock;
use crate::models::PersistedState;
use crate::storage::MemoryStore;
use crate::store::{StateStore, StoreOptions};
use crate::sync::{SyncEngine, SyncOptions};
use std::sync::Arc;
use std::time::Duration;

/// Epoch-millisecond instant every test clock starts at.
pub(crate) const T0: i64 = 1_700_000_000_000;

/// Debounce window used by store tests.
pub(crate) const TEST_DEBOUNCE: Duration = Duration::from_millis(200);

/// A store wired to in-memory storage and a manual clock.
pub(crate) struct StoreHarness {
    pub store: StateStore,
    pub local: Arc<MemoryStore>,
    pub clock: Arc<ManualClock>,
}

/// Builds an uninitialized store over a fresh [`MemoryStore`].
pub(crate) fn store_harness() -> StoreHarness {
    store_harness_with(Arc::new(MemoryStore::new()))
}

/// Builds an uninitialized store over `local`.
pub(crate) fn store_harness_with(local: Arc<MemoryStore>) -> StoreHarness {
    let clock = Arc::new(ManualClock::new(T0));
    let store = StateStore::new(
        local.clone(),
        clock.clone(),
        StoreOptions {
            save_debounce: TEST_DEBOUNCE,
        },
    );
    StoreHarness {
        store,
        local,
        clock,
    }
}

/// Builds a store and runs `init()` on it.
pub(crate) async fn init_store() -> StoreHarness {
    let harness = store_harness();
    harness.store.init().await;
    harness
}

/// Asserts the active-note invariant holds for `state`.
///
/// # Panics
/// Panics when `activeNoteId` and `notes` disagree.
pub(crate) fn assert_consistent(state: &PersistedState) {
    assert!(
        state.is_consistent(),
        "active note {:?} does not match notes {:?}",
        state.active_note_id,
        state.notes.iter().map(|note| &note.id).collect::<Vec<_>>()
    );
}

/// Lets spawned tasks run until they block again.
pub(crate) async fn settle() {
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }
}

/// A store plus a sync engine over an in-memory remote area.
pub(crate) struct SyncHarness {
    pub store: StateStore,
    pub local: Arc<MemoryStore>,
    pub remote: Arc<MemoryStore>,
    pub clock: Arc<ManualClock>,
    pub engine: SyncEngine,
}

/// Builds an initialized store and an engine over `remote`.
pub(crate) async fn sync_harness_with(remote: Arc<MemoryStore>) -> SyncHarness {
    let StoreHarness {
        store,
        local,
        clock,
    } = init_store().await;
    let engine = SyncEngine::new(store.clone(), Some(remote.clone()), SyncOptions::default());
    SyncHarness {
        store,
        local,
        remote,
        clock,
        engine,
    }
}

/// Builds an initialized store and an engine over an unbounded remote area.
pub(crate) async fn sync_harness() -> SyncHarness {
    sync_harness_with(Arc::new(MemoryStore::new())).await
}
