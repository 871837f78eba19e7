//! The state store: owner of the live document.
//!
//! Every mutation goes through [`StateStore`]. The in-memory copy updates
//! synchronously and subscribers are notified immediately; persistence to
//! the local storage area trails behind a debounce window. All writes to the
//! area are serialized through one lock, so they never overlap.

/// Note-level operations.
mod notes;
/// Single-slot debounce scheduler.
mod scheduler;
/// Settings export/import.
mod settings;


pub use notes::StorageUsage;
pub use settings::{settings_file_name, ImportReport};

use crate::clock::Clock;
use crate::constants::{CURRENT_VERSION, DEFAULT_SAVE_DEBOUNCE_MS, STORAGE_KEY};
use crate::error::AppError;
use crate::migration::{stored_version, Migrator};
use crate::models::{PersistedState, StatePatch};
use crate::storage::KeyValueStore;
use scheduler::WriteScheduler;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Store tuning.
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// Quiet period after the last `save()` before the document is written.
    pub save_debounce: Duration,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            save_debounce: Duration::from_millis(DEFAULT_SAVE_DEBOUNCE_MS),
        }
    }
}

/// Notifications published by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    /// The in-memory document changed; sent synchronously on every mutation.
    Changed { revision: u64 },
    /// The document at `revision` reached local storage.
    Persisted { revision: u64 },
    /// A local storage read or write failed. The in-memory document is kept.
    PersistFailed { message: String },
    /// The document was reset by `clear()`.
    Cleared,
}

struct Live {
    state: Arc<PersistedState>,
    revision: u64,
}

struct StoreInner {
    storage: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    migrator: Migrator,
    scheduler: WriteScheduler,
    live: Mutex<Live>,
    write_lock: tokio::sync::Mutex<()>,
    events: broadcast::Sender<StoreEvent>,
}

/// Cheaply cloneable handle to the single live document.
#[derive(Clone)]
pub struct StateStore {
    inner: Arc<StoreInner>,
}

impl StateStore {
    /// Build a store over `storage`.
    ///
    /// Until [`StateStore::init`] runs, the store holds the default document.
    pub fn new(
        storage: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        options: StoreOptions,
    ) -> Self {
        let migrator = Migrator::new(clock.clone());
        let state = migrator.default_state();
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(StoreInner {
                storage,
                clock,
                migrator,
                scheduler: WriteScheduler::new(options.save_debounce),
                live: Mutex::new(Live {
                    state: Arc::new(state),
                    revision: 0,
                }),
                write_lock: tokio::sync::Mutex::new(()),
                events,
            }),
        }
    }

    /// Load the persisted document, migrating it when it is behind
    /// [`CURRENT_VERSION`], and adopt it as the live state.
    ///
    /// A missing document seeds the migrated empty document. A failed read
    /// falls back to the default in memory and reports through
    /// [`StoreEvent::PersistFailed`].
    pub async fn init(&self) -> Arc<PersistedState> {
        let migrator = &self.inner.migrator;
        let (state, persist) = match self.inner.storage.get(STORAGE_KEY).await {
            Ok(Some(raw)) => {
                let from = stored_version(&raw);
                if from < CURRENT_VERSION {
                    info!(
                        "Migrating stored state from version {} to {}",
                        from, CURRENT_VERSION
                    );
                    (migrator.run_migrations(raw, from, CURRENT_VERSION), true)
                } else {
                    if from > CURRENT_VERSION {
                        warn!(
                            "Stored state version {} is newer than supported version {}",
                            from, CURRENT_VERSION
                        );
                    }
                    (migrator.run_migrations(raw, from, from), false)
                }
            }
            Ok(None) => {
                info!("No stored state; seeding default document");
                (migrator.default_state(), true)
            }
            Err(err) => {
                warn!("Unable to load stored state, using defaults: {}", err);
                self.emit(StoreEvent::PersistFailed {
                    message: err.to_string(),
                });
                (migrator.default_state(), false)
            }
        };

        self.replace(state);
        if persist {
            // Failures are already logged and published as events.
            let _ = self.flush().await;
        }
        self.get_state()
    }

    /// Current document snapshot. Mutate only through the store.
    pub fn get_state(&self) -> Arc<PersistedState> {
        self.lock_live().state.clone()
    }

    /// Revision counter, bumped on every in-memory change.
    pub fn revision(&self) -> u64 {
        self.lock_live().revision
    }

    /// Subscribe to store notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.inner.events.subscribe()
    }

    /// Current time from the injected clock.
    pub fn now_ms(&self) -> i64 {
        self.inner.clock.now_ms()
    }

    /// `true` while a debounced write is armed but not yet written.
    pub fn has_pending_write(&self) -> bool {
        self.inner.scheduler.is_pending()
    }

    /// Shallow-merge `patch` into the live document.
    ///
    /// The new snapshot is visible and [`StoreEvent::Changed`] is sent before
    /// this returns; the write to storage happens once no further `save()`
    /// arrives within the debounce window.
    pub fn save(&self, patch: StatePatch) -> Arc<PersistedState> {
        // Merging a patch is infallible.
        let _ = self.mutate(|state| {
            patch.apply(state);
            Ok(())
        });
        self.get_state()
    }

    /// Apply `f` to a copy of the document and publish it on success.
    ///
    /// On error nothing changes and nothing is scheduled.
    pub(crate) fn mutate<T>(
        &self,
        f: impl FnOnce(&mut PersistedState) -> Result<T, AppError>,
    ) -> Result<T, AppError> {
        let (output, revision) = {
            let mut live = self.lock_live();
            let mut next = (*live.state).clone();
            let output = f(&mut next)?;
            next.repair_active_note();
            live.state = Arc::new(next);
            live.revision += 1;
            (output, live.revision)
        };
        self.emit(StoreEvent::Changed { revision });
        self.schedule_persist();
        Ok(output)
    }

    /// Write the live document now, cancelling any armed debounced write.
    pub async fn flush(&self) -> Result<(), AppError> {
        self.inner.scheduler.cancel();
        let _guard = self.inner.write_lock.lock().await;
        self.write_current().await
    }

    /// Reset to the default document: cancel the pending write, delete the
    /// stored key, and persist the default before returning.
    pub async fn clear(&self) -> Arc<PersistedState> {
        self.inner.scheduler.cancel();
        let _guard = self.inner.write_lock.lock().await;
        if let Err(err) = self.inner.storage.remove(STORAGE_KEY).await {
            warn!("Failed to delete stored state: {}", err);
            self.emit(StoreEvent::PersistFailed {
                message: err.to_string(),
            });
        }
        self.replace(self.inner.migrator.default_state());
        self.emit(StoreEvent::Cleared);
        info!("Cleared all stored data");
        // Failures are already logged and published as events.
        let _ = self.write_current().await;
        self.get_state()
    }

    /// Swap in a whole document without scheduling a write.
    fn replace(&self, state: PersistedState) -> u64 {
        let revision = {
            let mut live = self.lock_live();
            live.state = Arc::new(state);
            live.revision += 1;
            live.revision
        };
        self.emit(StoreEvent::Changed { revision });
        revision
    }

    fn schedule_persist(&self) {
        let ticket = self.inner.scheduler.arm();
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("No async runtime; debounced write deferred until flush");
            return;
        };
        let weak: Weak<StoreInner> = Arc::downgrade(&self.inner);
        let delay = self.inner.scheduler.delay();
        runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(inner) = weak.upgrade() else {
                return;
            };
            if !inner.scheduler.fire(ticket) {
                debug!("Debounced write {} superseded", ticket);
                return;
            }
            let store = StateStore { inner };
            let _guard = store.inner.write_lock.lock().await;
            // Failures are already logged and published as events.
            let _ = store.write_current().await;
        });
    }

    /// Serialize and write the live document. Caller holds `write_lock`.
    async fn write_current(&self) -> Result<(), AppError> {
        let (state, revision) = {
            let live = self.lock_live();
            (live.state.clone(), live.revision)
        };
        let result = match serde_json::to_value(&*state) {
            Ok(value) => self.inner.storage.set(STORAGE_KEY, value).await,
            Err(err) => Err(err.into()),
        };
        match &result {
            Ok(()) => {
                debug!("Persisted state revision {}", revision);
                self.emit(StoreEvent::Persisted { revision });
            }
            Err(err) => {
                error!("Failed to persist state revision {}: {}", revision, err);
                self.emit(StoreEvent::PersistFailed {
                    message: err.to_string(),
                });
            }
        }
        result
    }

    fn emit(&self, event: StoreEvent) {
        // No subscribers is fine.
        let _ = self.inner.events.send(event);
    }

    fn lock_live(&self) -> MutexGuard<'_, Live> {
        self.inner.live.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
