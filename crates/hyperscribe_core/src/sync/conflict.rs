//! Conflict descriptors and the pending-conflict queue.

use super::remote::RemoteNote;
use crate::error::AppError;
use crate::models::Note;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Which side of a conflict was edited last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictKind {
    LocalNewer,
    RemoteNewer,
    /// Same timestamp on both sides.
    Divergent,
}

impl ConflictKind {
    pub fn from_timestamps(local_modified: i64, remote_modified: i64) -> Self {
        match local_modified.cmp(&remote_modified) {
            std::cmp::Ordering::Greater => Self::LocalNewer,
            std::cmp::Ordering::Less => Self::RemoteNewer,
            std::cmp::Ordering::Equal => Self::Divergent,
        }
    }
}

/// One side of a conflict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConflictSide {
    pub title: String,
    pub content: String,
    pub modified: i64,
}

/// Diverging local and remote versions of one note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Conflict {
    pub note_id: String,
    pub kind: ConflictKind,
    pub local: ConflictSide,
    pub remote: ConflictSide,
    /// Id `keep-both` gives the note holding the remote side. Derived from
    /// the conflicting pair, so retries write the same remote key.
    pub duplicate_id: String,
}

/// Stable note id for the remote side of the conflict on `note_id`.
pub fn duplicate_note_id(note_id: &str, remote_modified: i64) -> String {
    let name = format!("{}@{}", note_id, remote_modified);
    format!(
        "note_{}",
        Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes()).simple()
    )
}

impl Conflict {
    pub fn new(local: &Note, remote: &RemoteNote) -> Self {
        Self {
            note_id: local.id.clone(),
            kind: ConflictKind::from_timestamps(local.modified, remote.last_modified),
            local: ConflictSide {
                title: local.title.clone(),
                content: local.content.clone(),
                modified: local.modified,
            },
            remote: ConflictSide {
                title: remote.title.clone(),
                content: remote.content.clone(),
                modified: remote.last_modified,
            },
            duplicate_id: duplicate_note_id(&local.id, remote.last_modified),
        }
    }
}

/// How to settle a conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionStrategy {
    KeepLocal,
    KeepRemote,
    KeepBoth,
}

impl ResolutionStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::KeepLocal => "keep-local",
            Self::KeepRemote => "keep-remote",
            Self::KeepBoth => "keep-both",
        }
    }
}

impl fmt::Display for ResolutionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResolutionStrategy {
    type Err = AppError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim() {
            "keep-local" => Ok(Self::KeepLocal),
            "keep-remote" => Ok(Self::KeepRemote),
            "keep-both" => Ok(Self::KeepBoth),
            other => Err(AppError::Validation(format!(
                "unknown resolution strategy '{}'",
                other
            ))),
        }
    }
}

/// Ordered pending conflicts with a display cursor.
///
/// Moving the cursor never resolves anything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConflictQueue {
    items: Vec<Conflict>,
    cursor: usize,
}

impl ConflictQueue {
    pub fn new(items: Vec<Conflict>) -> Self {
        Self { items, cursor: 0 }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn items(&self) -> &[Conflict] {
        &self.items
    }

    /// The conflict on display.
    pub fn current(&self) -> Option<&Conflict> {
        self.items.get(self.cursor)
    }

    /// `(index, len)` of the conflict on display.
    pub fn position(&self) -> Option<(usize, usize)> {
        (!self.items.is_empty()).then_some((self.cursor, self.items.len()))
    }

    /// Advance the cursor; stays on the last conflict.
    pub fn show_next(&mut self) -> Option<&Conflict> {
        if self.cursor + 1 < self.items.len() {
            self.cursor += 1;
        }
        self.current()
    }

    /// Move the cursor back; stays on the first conflict.
    pub fn show_previous(&mut self) -> Option<&Conflict> {
        self.cursor = self.cursor.saturating_sub(1);
        self.current()
    }

    pub fn get(&self, note_id: &str) -> Option<&Conflict> {
        self.items.iter().find(|conflict| conflict.note_id == note_id)
    }

    /// Drop the conflict for `note_id`, keeping the cursor on the conflict
    /// that follows it.
    pub fn remove(&mut self, note_id: &str) -> Option<Conflict> {
        let index = self
            .items
            .iter()
            .position(|conflict| conflict.note_id == note_id)?;
        let removed = self.items.remove(index);
        if index < self.cursor || self.cursor >= self.items.len() {
            self.cursor = self.cursor.saturating_sub(1);
        }
        Some(removed)
    }
}
