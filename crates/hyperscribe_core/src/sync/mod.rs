//! Mirroring notes to a quota-limited remote area.
//!
//! [`SyncEngine`] reconciles every local note with its mirrored copy, using
//! `lastSyncTime` to tell which side moved. Diverging edits are queued as
//! conflicts for the user to settle; nothing is overwritten on either side
//! while a conflict is pending.
//!
//! `sync()`, `enable()` and `disable()` always return a [`SyncOutcome`];
//! remote failures surface as [`SyncOutcome::Error`] and never touch local
//! state.

/// Per-note reconciliation decision.
pub mod classify;
/// Conflict descriptors and queue.
pub mod conflict;
/// Remote area layout.
pub mod remote;
/// Conflict resolution.
mod resolver;

#[cfg(test)]
mod tests;

pub use classify::{classify, SyncAction};
pub use conflict::{Conflict, ConflictKind, ConflictQueue, ConflictSide, ResolutionStrategy};
pub use remote::{CloudComparison, RemoteNote, RemotePreview, SyncManifest, SyncUsage};
pub use resolver::Resolution;

use crate::constants::{DEFAULT_SYNC_QUOTA_BYTES, DEFAULT_SYNC_QUOTA_BYTES_PER_ITEM};
use crate::error::AppError;
use crate::models::{Note, StatePatch};
use crate::storage::{KeyValueStore, StorageQuota};
use crate::store::{StateStore, StoreEvent};
use crate::text::format_bytes;
use remote::ManifestEntry;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Sync tuning.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Quota reported by usage when the remote area does not declare one.
    pub quota: StorageQuota,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            quota: StorageQuota {
                total_bytes: DEFAULT_SYNC_QUOTA_BYTES,
                per_item_bytes: Some(DEFAULT_SYNC_QUOTA_BYTES_PER_ITEM),
            },
        }
    }
}

/// Observable engine state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncState {
    /// No remote area exists; the feature is off.
    Unavailable,
    Disabled,
    /// Enabled and idle.
    Enabled,
    Syncing,
    Synced { at: i64 },
    Conflict { pending: usize },
    Error { message: String },
}

/// Result of `sync()`, `enable()` or `disable()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Synced {
        pushed: usize,
        pulled: usize,
        removed: usize,
    },
    /// Nothing was overwritten; resolve the conflicts to finish.
    Conflict { conflicts: Vec<Conflict> },
    Error { message: String },
    Disabled,
    /// Another sync was still running.
    Rejected,
    Unavailable,
}

struct SyncInner {
    store: StateStore,
    remote: Option<Arc<dyn KeyValueStore>>,
    options: SyncOptions,
    in_flight: AtomicBool,
    status: watch::Sender<SyncState>,
    conflicts: Mutex<ConflictQueue>,
}

/// Cheaply cloneable handle to the sync engine.
#[derive(Clone)]
pub struct SyncEngine {
    inner: Arc<SyncInner>,
}

/// Clears the in-flight flag when the operation ends, however it ends.
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl SyncEngine {
    /// Build an engine over `store`. `remote` is `None` when the platform has
    /// no sync area, which disables the feature without error.
    pub fn new(
        store: StateStore,
        remote: Option<Arc<dyn KeyValueStore>>,
        options: SyncOptions,
    ) -> Self {
        let initial = match &remote {
            None => {
                info!("Sync storage unavailable; sync disabled");
                SyncState::Unavailable
            }
            Some(_) if store.get_state().sync_enabled => SyncState::Enabled,
            Some(_) => SyncState::Disabled,
        };
        let (status, _) = watch::channel(initial);
        Self {
            inner: Arc::new(SyncInner {
                store,
                remote,
                options,
                in_flight: AtomicBool::new(false),
                status,
                conflicts: Mutex::new(ConflictQueue::default()),
            }),
        }
    }

    /// `true` when a remote area exists.
    pub fn is_available(&self) -> bool {
        self.inner.remote.is_some()
    }

    /// `true` when available and switched on.
    pub fn is_enabled(&self) -> bool {
        self.is_available() && self.inner.store.get_state().sync_enabled
    }

    pub fn is_syncing(&self) -> bool {
        self.inner.in_flight.load(Ordering::SeqCst)
    }

    pub fn status(&self) -> SyncState {
        self.inner.status.borrow().clone()
    }

    /// Watch state transitions.
    pub fn subscribe_status(&self) -> watch::Receiver<SyncState> {
        self.inner.status.subscribe()
    }

    /// Switch mirroring on and run the initial reconciliation.
    pub async fn enable(&self) -> SyncOutcome {
        if !self.is_available() {
            return SyncOutcome::Unavailable;
        }
        if !self.inner.store.get_state().sync_enabled {
            self.inner.store.save(StatePatch::sync_enabled(true));
            info!("Sync enabled");
        }
        if !self.is_syncing() {
            self.set_status(SyncState::Enabled);
        }
        self.sync().await
    }

    /// Switch mirroring off. Remote data is kept.
    ///
    /// A sync already in flight finishes its writes and then settles in
    /// [`SyncState::Disabled`]; later `sync()` calls return
    /// [`SyncOutcome::Disabled`].
    pub async fn disable(&self) -> SyncOutcome {
        if !self.is_available() {
            return SyncOutcome::Unavailable;
        }
        if self.inner.store.get_state().sync_enabled {
            self.inner.store.save(StatePatch::sync_enabled(false));
            info!("Sync disabled");
        }
        *self.lock_conflicts() = ConflictQueue::default();
        if !self.is_syncing() {
            self.set_status(SyncState::Disabled);
        }
        SyncOutcome::Disabled
    }

    /// Reconcile every local note with the remote mirror.
    ///
    /// Not reentrant: a call while another sync (or a resolution) is running
    /// returns [`SyncOutcome::Rejected`].
    pub async fn sync(&self) -> SyncOutcome {
        let Some(remote) = self.inner.remote.clone() else {
            return SyncOutcome::Unavailable;
        };
        if !self.is_enabled() {
            return SyncOutcome::Disabled;
        }
        let Some(_in_flight) = InFlight::acquire(&self.inner.in_flight) else {
            debug!("Sync already in flight; rejecting");
            return SyncOutcome::Rejected;
        };
        self.set_status(SyncState::Syncing);

        let outcome = match self.reconcile(remote.as_ref()).await {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!("Sync failed: {}", err);
                SyncOutcome::Error {
                    message: err.to_string(),
                }
            }
        };
        self.settle(&outcome);
        outcome
    }

    async fn reconcile(&self, remote: &dyn KeyValueStore) -> Result<SyncOutcome, AppError> {
        let started = self.inner.store.now_ms();
        let state = self.inner.store.get_state();
        let last_sync = state.last_sync_time;
        let snapshot = remote::read_snapshot(remote).await?;

        let mut pushes: Vec<RemoteNote> = Vec::new();
        let mut pulls: Vec<RemoteNote> = Vec::new();
        let mut conflicts: Vec<Conflict> = Vec::new();
        let mut manifest: Vec<(ManifestEntry, i64)> = Vec::new();

        for note in &state.notes {
            let mirrored = snapshot.get(&note.id);
            let action = classify(
                note.modified,
                mirrored.map(|copy| copy.last_modified),
                last_sync,
                mirrored.is_some_and(|copy| copy.content == note.content),
            );
            match (action, mirrored) {
                (SyncAction::Push, _) | (_, None) => {
                    manifest.push((manifest_entry(&note.id, &note.title), started));
                    pushes.push(RemoteNote::from_note(note, started));
                }
                (action, Some(copy)) => {
                    manifest.push((manifest_entry(&copy.id, &copy.title), copy.last_modified));
                    match action {
                        SyncAction::Pull => pulls.push(copy.clone()),
                        SyncAction::Conflict(_) => conflicts.push(Conflict::new(note, copy)),
                        _ => {}
                    }
                }
            }
        }

        let mut removed = Vec::new();
        for copy in &snapshot.notes {
            if state.note(&copy.id).is_some() {
                continue;
            }
            let changed = last_sync.map_or(true, |synced| copy.last_modified > synced);
            if !changed && state.synced_note_ids.contains(&copy.id) {
                // Mirrored from here before and untouched since, so it was closed here.
                removed.push(copy.id.clone());
            } else {
                manifest.push((manifest_entry(&copy.id, &copy.title), copy.last_modified));
                pulls.push(copy.clone());
            }
        }

        for note in &pushes {
            remote::write_note(remote, note).await?;
        }
        for id in &removed {
            remote::delete_note(remote, id).await?;
        }
        if !pushes.is_empty() || !removed.is_empty() || snapshot.manifest.is_none() {
            let last_modified = manifest.iter().map(|(_, at)| *at).max().unwrap_or(0);
            remote::write_manifest(
                remote,
                manifest.iter().map(|(entry, _)| entry.clone()).collect(),
                last_modified,
            )
            .await?;
        }

        let mirrored: BTreeSet<String> = manifest.into_iter().map(|(entry, _)| entry.id).collect();
        let moved = last_sync.is_none()
            || !pushes.is_empty()
            || !pulls.is_empty()
            || !removed.is_empty();
        let sync_time = (conflicts.is_empty() && moved).then_some(started);
        let pulled = self.apply_pass(&pulls, &state.notes, mirrored, sync_time)?;

        if conflicts.is_empty() {
            *self.lock_conflicts() = ConflictQueue::default();
            info!(
                "Sync complete: {} pushed, {} pulled, {} removed",
                pushes.len(),
                pulled,
                removed.len()
            );
            Ok(SyncOutcome::Synced {
                pushed: pushes.len(),
                pulled,
                removed: removed.len(),
            })
        } else {
            info!("Sync found {} conflict(s)", conflicts.len());
            *self.lock_conflicts() = ConflictQueue::new(conflicts.clone());
            Ok(SyncOutcome::Conflict { conflicts })
        }
    }

    /// Write pulled copies, the mirrored id set and the new `lastSyncTime`
    /// into the store. Notes edited locally while the sync ran are left for
    /// the next sync. A pass that changed nothing leaves the store alone.
    fn apply_pass(
        &self,
        pulls: &[RemoteNote],
        seen: &[Note],
        mirrored: BTreeSet<String>,
        sync_time: Option<i64>,
    ) -> Result<usize, AppError> {
        if pulls.is_empty()
            && sync_time.is_none()
            && self.inner.store.get_state().synced_note_ids == mirrored
        {
            return Ok(0);
        }
        self.inner.store.mutate(|state| {
            let mut applied = 0;
            for copy in pulls {
                let before = seen.iter().find(|note| note.id == copy.id);
                match (state.notes.iter_mut().find(|note| note.id == copy.id), before) {
                    (Some(note), Some(before)) if note.modified == before.modified => {
                        note.content = copy.content.clone();
                        note.title = copy.title.clone();
                        note.modified = copy.last_modified.max(note.created);
                        applied += 1;
                    }
                    (Some(_), _) => debug!("Skipping pull of {}: edited during sync", copy.id),
                    (None, None) => {
                        state.notes.push(copy.to_note());
                        applied += 1;
                    }
                    (None, Some(_)) => debug!("Skipping pull of {}: closed during sync", copy.id),
                }
            }
            state.synced_note_ids = mirrored;
            if let Some(at) = sync_time {
                state.last_sync_time = Some(at);
            }
            Ok(applied)
        })
    }

    fn settle(&self, outcome: &SyncOutcome) {
        if !self.is_enabled() {
            self.set_status(SyncState::Disabled);
            return;
        }
        let next = match outcome {
            SyncOutcome::Synced { .. } => SyncState::Synced {
                at: self
                    .inner
                    .store
                    .get_state()
                    .last_sync_time
                    .unwrap_or_else(|| self.inner.store.now_ms()),
            },
            SyncOutcome::Conflict { conflicts } => SyncState::Conflict {
                pending: conflicts.len(),
            },
            SyncOutcome::Error { message } => SyncState::Error {
                message: message.clone(),
            },
            SyncOutcome::Disabled => SyncState::Disabled,
            SyncOutcome::Unavailable => SyncState::Unavailable,
            SyncOutcome::Rejected => return,
        };
        self.set_status(next);
    }

    /// Remote area usage against its quota.
    pub async fn calculate_sync_usage(&self) -> Result<SyncUsage, AppError> {
        let remote = self.remote()?;
        let used = remote.bytes_in_use(None).await?;
        let total = remote
            .quota()
            .unwrap_or(self.inner.options.quota)
            .total_bytes;
        let percentage = if total == 0 {
            0.0
        } else {
            (used as f64 / total as f64 * 1000.0).round() / 10.0
        };
        Ok(SyncUsage {
            used,
            total,
            percentage,
            formatted: format!("{} / {}", format_bytes(used), format_bytes(total)),
        })
    }

    /// Compare the mirror's latest change with the latest local edit or
    /// sync, whichever is later. Read-only.
    pub async fn has_newer_cloud_data(&self) -> Result<CloudComparison, AppError> {
        let remote = self.remote()?;
        let snapshot = remote::read_snapshot(remote.as_ref()).await?;
        let cloud_modified = snapshot.last_modified();
        let state = self.inner.store.get_state();
        let local_modified = state.latest_modified();
        let seen_up_to = local_modified.max(state.last_sync_time);
        Ok(CloudComparison {
            has_newer: match (cloud_modified, seen_up_to) {
                (Some(cloud), Some(seen)) => cloud > seen,
                (Some(_), None) => true,
                _ => false,
            },
            cloud_modified,
            local_modified,
        })
    }

    /// Delete the remote mirror. Local notes are untouched.
    pub async fn clear_sync_data(&self) -> Result<(), AppError> {
        let remote = self.remote()?;
        let _in_flight =
            InFlight::acquire(&self.inner.in_flight).ok_or(AppError::SyncInProgress)?;
        let removed = remote::clear(remote.as_ref()).await?;
        *self.lock_conflicts() = ConflictQueue::default();
        info!("Cleared sync data ({} note(s))", removed);
        Ok(())
    }

    /// Fetch the mirror without applying it.
    ///
    /// # Errors
    /// [`AppError::NotFound`] when nothing is mirrored.
    pub async fn load_from_sync(&self) -> Result<RemotePreview, AppError> {
        let remote = self.remote()?;
        let snapshot = remote::read_snapshot(remote.as_ref()).await?;
        let active = self.inner.store.get_state().active_note_id.clone();
        let note = active
            .and_then(|id| snapshot.get(&id).cloned())
            .or_else(|| snapshot.notes.first().cloned())
            .ok_or_else(|| AppError::NotFound("synced data".to_string()))?;
        Ok(RemotePreview {
            note,
            notes: snapshot.notes,
            metadata: snapshot.manifest,
        })
    }

    /// Pending conflicts in display order.
    pub fn pending_conflicts(&self) -> Vec<Conflict> {
        self.lock_conflicts().items().to_vec()
    }

    /// The conflict on display and its `(index, len)` position.
    pub fn current_conflict(&self) -> Option<(Conflict, (usize, usize))> {
        let queue = self.lock_conflicts();
        Some((queue.current()?.clone(), queue.position()?))
    }

    /// Show the next pending conflict without resolving the current one.
    pub fn next_conflict(&self) -> Option<Conflict> {
        self.lock_conflicts().show_next().cloned()
    }

    /// Show the previous pending conflict without resolving the current one.
    pub fn previous_conflict(&self) -> Option<Conflict> {
        self.lock_conflicts().show_previous().cloned()
    }

    /// Sync after each persisted local edit while enabled.
    ///
    /// Runs until the returned handle is aborted.
    pub fn spawn_auto_sync(&self) -> JoinHandle<()> {
        let engine = self.clone();
        let mut events = self.inner.store.subscribe();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(StoreEvent::Persisted { .. }) => {
                        if engine.is_enabled() && engine.has_unsynced_changes() {
                            debug!("Auto-sync after local save");
                            engine.sync().await;
                        }
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!("Auto-sync skipped {} store events", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    /// `true` when a local note changed after the last successful sync.
    pub fn has_unsynced_changes(&self) -> bool {
        let state = self.inner.store.get_state();
        match (state.latest_modified(), state.last_sync_time) {
            (Some(latest), Some(synced)) => latest > synced,
            (Some(_), None) => true,
            (None, _) => false,
        }
    }

    fn remote(&self) -> Result<Arc<dyn KeyValueStore>, AppError> {
        self.inner.remote.clone().ok_or(AppError::SyncUnavailable)
    }

    fn set_status(&self, next: SyncState) {
        self.inner.status.send_replace(next);
    }

    fn lock_conflicts(&self) -> MutexGuard<'_, ConflictQueue> {
        self.inner
            .conflicts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

fn manifest_entry(id: &str, title: &str) -> ManifestEntry {
    ManifestEntry {
        id: id.to_string(),
        title: title.to_string(),
    }
}
