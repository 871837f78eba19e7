//! Settling queued conflicts.
//!
//! Remote writes happen before any local change, so a failed resolution
//! leaves both sides and the queue as they were and can simply be retried.

use super::remote::{self, RemoteNote};
use super::{Conflict, InFlight, ResolutionStrategy, SyncEngine, SyncState};
use crate::error::AppError;
use crate::models::{Note, StatePatch};
use crate::storage::KeyValueStore;
use tracing::{info, warn};

/// A settled conflict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub note_id: String,
    pub strategy: ResolutionStrategy,
    /// Note holding the remote content, for `keep-both`.
    pub created_note_id: Option<String>,
    /// Conflicts still pending.
    pub remaining: usize,
}

impl SyncEngine {
    /// Settle the pending conflict for `note_id`.
    ///
    /// Once the queue empties, `lastSyncTime` advances. On error the conflict
    /// stays pending.
    pub async fn resolve_conflict(
        &self,
        note_id: &str,
        strategy: ResolutionStrategy,
    ) -> Result<Resolution, AppError> {
        let remote = self.remote()?;
        if !self.is_enabled() {
            return Err(AppError::SyncDisabled);
        }
        let _in_flight =
            InFlight::acquire(&self.inner.in_flight).ok_or(AppError::SyncInProgress)?;
        let conflict = self
            .lock_conflicts()
            .get(note_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("conflict for note '{}'", note_id)))?;

        let created_note_id = match self.apply(remote.as_ref(), &conflict, strategy).await {
            Ok(created) => created,
            Err(err) => {
                if err.is_storage_failure() {
                    warn!(
                        "Resolving conflict on {} with {} failed; still pending: {}",
                        note_id, strategy, err
                    );
                }
                return Err(err);
            }
        };

        let remaining = {
            let mut queue = self.lock_conflicts();
            queue.remove(note_id);
            queue.len()
        };
        if remaining == 0 {
            let now = self.inner.store.now_ms();
            self.inner.store.save(StatePatch::last_sync_time(now));
            self.set_status(SyncState::Synced { at: now });
        } else {
            self.set_status(SyncState::Conflict { pending: remaining });
        }
        info!(
            "Resolved conflict on {} with {} ({} remaining)",
            note_id, strategy, remaining
        );
        Ok(Resolution {
            note_id: note_id.to_string(),
            strategy,
            created_note_id,
            remaining,
        })
    }

    /// Settle the conflict currently on display.
    pub async fn resolve_current(
        &self,
        strategy: ResolutionStrategy,
    ) -> Result<Resolution, AppError> {
        let note_id = self
            .lock_conflicts()
            .current()
            .map(|conflict| conflict.note_id.clone())
            .ok_or_else(|| AppError::NotFound("pending conflict".to_string()))?;
        self.resolve_conflict(&note_id, strategy).await
    }

    async fn apply(
        &self,
        remote: &dyn KeyValueStore,
        conflict: &Conflict,
        strategy: ResolutionStrategy,
    ) -> Result<Option<String>, AppError> {
        let store = &self.inner.store;
        match strategy {
            ResolutionStrategy::KeepLocal => {
                let local = self.local_note(&conflict.note_id)?;
                let copy = RemoteNote::from_note(&local, store.now_ms());
                remote::write_note(remote, &copy).await?;
                remote::upsert_manifest(remote, &[copy]).await?;
                Ok(None)
            }
            ResolutionStrategy::KeepRemote => {
                store.update_note_content(&conflict.note_id, conflict.remote.content.clone())?;
                Ok(None)
            }
            ResolutionStrategy::KeepBoth => {
                let local = self.local_note(&conflict.note_id)?;
                let now = store.now_ms();
                // The duplicate id is fixed per conflict, so a retry after a
                // partial remote write overwrites instead of orphaning.
                let mut duplicate = Note::new(None, conflict.remote.content.clone(), now);
                duplicate.id = conflict.duplicate_id.clone();
                let copies = [
                    RemoteNote::from_note(&local, now),
                    RemoteNote::from_note(&duplicate, now),
                ];
                for copy in &copies {
                    remote::write_note(remote, copy).await?;
                }
                remote::upsert_manifest(remote, &copies).await?;

                let id = duplicate.id.clone();
                store.mutate(|state| {
                    if state.note(&duplicate.id).is_none() {
                        state.notes.push(duplicate);
                    }
                    state.synced_note_ids.insert(local.id);
                    state.synced_note_ids.insert(id.clone());
                    Ok(())
                })?;
                Ok(Some(id))
            }
        }
    }

    fn local_note(&self, id: &str) -> Result<Note, AppError> {
        self.inner
            .store
            .get_state()
            .note(id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("note '{}'", id)))
    }
}
