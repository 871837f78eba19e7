//! The persisted document root and its local-only preferences.

use super::note::Note;
use crate::constants::{
    DEFAULT_THEME, KNOWN_THEMES, RESIZE_MAX_HEIGHT, RESIZE_MAX_WIDTH, RESIZE_MIN_HEIGHT,
    RESIZE_MIN_WIDTH,
};
use crate::templates::Template;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// Full application state as stored under [`crate::constants::STORAGE_KEY`].
///
/// Keys the current schema does not know about are kept in `extra` so a
/// round trip through load/save/export never drops them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedState {
    #[serde(default)]
    pub version: u32,
    #[serde(default)]
    pub notes: Vec<Note>,
    #[serde(default)]
    pub active_note_id: Option<String>,
    #[serde(default = "default_theme")]
    pub theme: String,
    #[serde(default)]
    pub font: FontSettings,
    #[serde(default)]
    pub toolbar: ToolbarLayout,
    #[serde(default)]
    pub window: WindowGeometry,
    #[serde(default)]
    pub dont_ask_again: BTreeMap<String, bool>,
    #[serde(default)]
    pub custom_templates: Vec<Template>,
    #[serde(default)]
    pub sync_enabled: bool,
    #[serde(default)]
    pub last_sync_time: Option<i64>,
    /// Ids mirrored by the last sync pass. A remote-only note is deleted as
    /// "closed here" only when its id is listed.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub synced_note_ids: BTreeSet<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_theme() -> String {
    DEFAULT_THEME.to_string()
}

/// Editor font descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FontSettings {
    pub size: u32,
    pub family: String,
    pub weight: String,
    pub style: String,
}

impl Default for FontSettings {
    fn default() -> Self {
        Self {
            size: 16,
            family: "Inter, sans-serif".to_string(),
            weight: "normal".to_string(),
            style: "normal".to_string(),
        }
    }
}

/// Toolbar button order and density.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolbarLayout {
    pub order: Vec<String>,
    pub compact: bool,
}

impl Default for ToolbarLayout {
    fn default() -> Self {
        Self {
            order: ["copy", "download", "clear", "theme", "font", "sync"]
                .into_iter()
                .map(str::to_string)
                .collect(),
            compact: false,
        }
    }
}

/// Popup size in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowGeometry {
    pub width: u32,
    pub height: u32,
}

impl Default for WindowGeometry {
    fn default() -> Self {
        Self {
            width: 400,
            height: 500,
        }
    }
}

impl WindowGeometry {
    /// Clamp to the popup resize bounds.
    pub fn clamped(self) -> Self {
        Self {
            width: self.width.clamp(RESIZE_MIN_WIDTH, RESIZE_MAX_WIDTH),
            height: self.height.clamp(RESIZE_MIN_HEIGHT, RESIZE_MAX_HEIGHT),
        }
    }
}

impl Default for PersistedState {
    fn default() -> Self {
        Self {
            version: 0,
            notes: Vec::new(),
            active_note_id: None,
            theme: default_theme(),
            font: FontSettings::default(),
            toolbar: ToolbarLayout::default(),
            window: WindowGeometry::default(),
            dont_ask_again: BTreeMap::new(),
            custom_templates: Vec::new(),
            sync_enabled: false,
            last_sync_time: None,
            synced_note_ids: BTreeSet::new(),
            extra: Map::new(),
        }
    }
}

impl PersistedState {
    /// The note currently displayed, if any.
    pub fn active_note(&self) -> Option<&Note> {
        let id = self.active_note_id.as_deref()?;
        self.notes.iter().find(|note| note.id == id)
    }

    pub(crate) fn active_note_mut(&mut self) -> Option<&mut Note> {
        let id = self.active_note_id.clone()?;
        self.notes.iter_mut().find(|note| note.id == id)
    }

    pub fn note(&self, id: &str) -> Option<&Note> {
        self.notes.iter().find(|note| note.id == id)
    }

    /// Latest `modified` across all notes.
    pub fn latest_modified(&self) -> Option<i64> {
        self.notes.iter().map(|note| note.modified).max()
    }

    /// Re-point `active_note_id` so it resolves whenever notes exist and is
    /// `None` when they don't.
    pub fn repair_active_note(&mut self) {
        let resolves = self
            .active_note_id
            .as_deref()
            .is_some_and(|id| self.notes.iter().any(|note| note.id == id));
        if !resolves {
            self.active_note_id = self.notes.first().map(|note| note.id.clone());
        }
    }

    /// Bring a freshly loaded document into a valid shape.
    ///
    /// Applied on load and import only; in-session merges rely on
    /// [`PersistedState::repair_active_note`].
    pub fn normalize(&mut self) {
        let mut seen = HashSet::new();
        for note in &mut self.notes {
            if note.id.trim().is_empty() || !seen.insert(note.id.clone()) {
                note.id = Note::new_id();
                seen.insert(note.id.clone());
            }
            if note.modified < note.created {
                note.modified = note.created;
            }
        }
        if !KNOWN_THEMES.contains(&self.theme.as_str()) {
            self.theme = default_theme();
        }
        if self.font.size == 0 {
            self.font.size = FontSettings::default().size;
        }
        self.window = self.window.clamped();
        self.repair_active_note();
    }

    /// `true` when the active-note invariant holds.
    pub fn is_consistent(&self) -> bool {
        match self.active_note_id.as_deref() {
            None => self.notes.is_empty(),
            Some(id) => self.notes.iter().any(|note| note.id == id),
        }
    }
}
