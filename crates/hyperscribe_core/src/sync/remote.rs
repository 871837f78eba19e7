//! Remote sync area layout.
//!
//! The remote area holds a manifest listing the mirrored notes plus one
//! entry per note. Only content and small metadata are mirrored; local
//! preferences never leave the device.

use crate::constants::{SYNC_MANIFEST_KEY, SYNC_NOTE_KEY_PREFIX};
use crate::error::AppError;
use crate::models::Note;
use crate::storage::KeyValueStore;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Manifest format version.
pub const MANIFEST_VERSION: u32 = 1;

/// Remote key holding the note `id`.
pub fn note_key(id: &str) -> String {
    format!("{}{}", SYNC_NOTE_KEY_PREFIX, id)
}

/// Mirrored projection of one note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteNote {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    pub last_modified: i64,
}

impl RemoteNote {
    /// Projection of `note` as pushed at `pushed_at`.
    ///
    /// `lastModified` records when the mirror changed, not when the note was
    /// edited, so other devices compare it against their own `lastSyncTime`.
    pub fn from_note(note: &Note, pushed_at: i64) -> Self {
        Self {
            id: note.id.clone(),
            title: note.title.clone(),
            content: note.content.clone(),
            last_modified: pushed_at,
        }
    }

    /// A new local note holding this remote copy.
    pub fn to_note(&self) -> Note {
        Note {
            id: self.id.clone(),
            title: self.title.clone(),
            content: self.content.clone(),
            created: self.last_modified,
            modified: self.last_modified,
            tags: Vec::new(),
            pinned: false,
            archived: false,
            custom_title: false,
        }
    }
}

/// One manifest row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub id: String,
    #[serde(default)]
    pub title: String,
}

/// Index of the mirrored notes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncManifest {
    pub version: u32,
    #[serde(default)]
    pub notes: Vec<ManifestEntry>,
    #[serde(default)]
    pub last_modified: i64,
}

/// Everything currently mirrored, in manifest order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteSnapshot {
    pub manifest: Option<SyncManifest>,
    pub notes: Vec<RemoteNote>,
}

impl RemoteSnapshot {
    pub fn is_empty(&self) -> bool {
        self.manifest.is_none() && self.notes.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&RemoteNote> {
        self.notes.iter().find(|note| note.id == id)
    }

    /// Latest `lastModified` across the mirror.
    pub fn last_modified(&self) -> Option<i64> {
        let notes = self.notes.iter().map(|note| note.last_modified).max();
        let manifest = self.manifest.as_ref().map(|manifest| manifest.last_modified);
        notes.max(manifest)
    }
}

/// Read the manifest and every note it lists.
///
/// Manifest rows whose note entry is missing are skipped.
pub async fn read_snapshot(remote: &dyn KeyValueStore) -> Result<RemoteSnapshot, AppError> {
    let Some(raw) = remote.get(SYNC_MANIFEST_KEY).await? else {
        return Ok(RemoteSnapshot::default());
    };
    let manifest: SyncManifest = serde_json::from_value(raw)?;
    let mut notes = Vec::with_capacity(manifest.notes.len());
    for entry in &manifest.notes {
        match remote.get(&note_key(&entry.id)).await? {
            Some(value) => notes.push(serde_json::from_value(value)?),
            None => warn!("Sync manifest lists note {} with no stored copy", entry.id),
        }
    }
    Ok(RemoteSnapshot {
        manifest: Some(manifest),
        notes,
    })
}

/// Write one mirrored note.
pub async fn write_note(remote: &dyn KeyValueStore, note: &RemoteNote) -> Result<(), AppError> {
    remote
        .set(&note_key(&note.id), serde_json::to_value(note)?)
        .await
}

/// Delete one mirrored note.
pub async fn delete_note(remote: &dyn KeyValueStore, id: &str) -> Result<(), AppError> {
    remote.remove(&note_key(id)).await
}

/// Replace the manifest.
pub async fn write_manifest(
    remote: &dyn KeyValueStore,
    notes: Vec<ManifestEntry>,
    last_modified: i64,
) -> Result<SyncManifest, AppError> {
    let manifest = SyncManifest {
        version: MANIFEST_VERSION,
        notes,
        last_modified,
    };
    remote
        .set(SYNC_MANIFEST_KEY, serde_json::to_value(&manifest)?)
        .await?;
    Ok(manifest)
}

/// Add or retitle manifest rows for `notes`, keeping every other row.
pub async fn upsert_manifest(
    remote: &dyn KeyValueStore,
    notes: &[RemoteNote],
) -> Result<SyncManifest, AppError> {
    let (mut entries, mut last_modified) = match remote.get(SYNC_MANIFEST_KEY).await? {
        Some(raw) => {
            let manifest: SyncManifest = serde_json::from_value(raw)?;
            (manifest.notes, manifest.last_modified)
        }
        None => (Vec::new(), 0),
    };
    for note in notes {
        match entries.iter_mut().find(|entry| entry.id == note.id) {
            Some(entry) => entry.title = note.title.clone(),
            None => entries.push(ManifestEntry {
                id: note.id.clone(),
                title: note.title.clone(),
            }),
        }
        last_modified = last_modified.max(note.last_modified);
    }
    write_manifest(remote, entries, last_modified).await
}

/// Remove the manifest and every note it lists.
pub async fn clear(remote: &dyn KeyValueStore) -> Result<usize, AppError> {
    let ids: Vec<String> = match remote.get(SYNC_MANIFEST_KEY).await? {
        Some(raw) => match serde_json::from_value::<SyncManifest>(raw) {
            Ok(manifest) => manifest.notes.into_iter().map(|entry| entry.id).collect(),
            Err(err) => {
                warn!("Discarding unreadable sync manifest: {}", err);
                Vec::new()
            }
        },
        None => Vec::new(),
    };
    for id in &ids {
        delete_note(remote, id).await?;
    }
    remote.remove(SYNC_MANIFEST_KEY).await?;
    Ok(ids.len())
}

/// Remote area usage for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncUsage {
    pub used: u64,
    pub total: u64,
    pub percentage: f64,
    pub formatted: String,
}

/// Outcome of comparing the remote mirror with local notes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CloudComparison {
    pub has_newer: bool,
    pub cloud_modified: Option<i64>,
    pub local_modified: Option<i64>,
}

/// Read-only view of the remote mirror.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemotePreview {
    /// Remote copy of the active note, or the first mirrored note.
    pub note: RemoteNote,
    pub notes: Vec<RemoteNote>,
    pub metadata: Option<SyncManifest>,
}
