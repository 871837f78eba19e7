//! Partial updates merged into the live document by `StateStore::save`.

use super::note::Note;
use super::state::{FontSettings, PersistedState, ToolbarLayout, WindowGeometry};
use crate::templates::Template;
use std::collections::BTreeMap;

/// Shallow top-level update: every `Some` field replaces the current value.
///
/// `active_note_id` and `last_sync_time` are doubly optional so a patch can
/// distinguish "leave alone" (`None`) from "set to null" (`Some(None)`).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatePatch {
    pub notes: Option<Vec<Note>>,
    pub active_note_id: Option<Option<String>>,
    pub theme: Option<String>,
    pub font: Option<FontSettings>,
    pub toolbar: Option<ToolbarLayout>,
    pub window: Option<WindowGeometry>,
    pub dont_ask_again: Option<BTreeMap<String, bool>>,
    pub custom_templates: Option<Vec<Template>>,
    pub sync_enabled: Option<bool>,
    pub last_sync_time: Option<Option<i64>>,
}

impl StatePatch {
    pub fn notes(notes: Vec<Note>) -> Self {
        Self {
            notes: Some(notes),
            ..Self::default()
        }
    }

    pub fn theme(theme: impl Into<String>) -> Self {
        Self {
            theme: Some(theme.into()),
            ..Self::default()
        }
    }

    pub fn sync_enabled(enabled: bool) -> Self {
        Self {
            sync_enabled: Some(enabled),
            ..Self::default()
        }
    }

    pub fn last_sync_time(at_ms: i64) -> Self {
        Self {
            last_sync_time: Some(Some(at_ms)),
            ..Self::default()
        }
    }

    pub fn with_active_note(mut self, id: Option<String>) -> Self {
        self.active_note_id = Some(id);
        self
    }

    pub fn with_last_sync_time(mut self, at_ms: i64) -> Self {
        self.last_sync_time = Some(Some(at_ms));
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Merge into `state`, then re-establish the active-note invariant.
    pub fn apply(self, state: &mut PersistedState) {
        if let Some(notes) = self.notes {
            state.notes = notes;
        }
        if let Some(active) = self.active_note_id {
            state.active_note_id = active;
        }
        if let Some(theme) = self.theme {
            state.theme = theme;
        }
        if let Some(font) = self.font {
            state.font = font;
        }
        if let Some(toolbar) = self.toolbar {
            state.toolbar = toolbar;
        }
        if let Some(window) = self.window {
            state.window = window.clamped();
        }
        if let Some(flags) = self.dont_ask_again {
            state.dont_ask_again = flags;
        }
        if let Some(templates) = self.custom_templates {
            state.custom_templates = templates;
        }
        if let Some(enabled) = self.sync_enabled {
            state.sync_enabled = enabled;
        }
        if let Some(at) = self.last_sync_time {
            state.last_sync_time = at;
        }
        state.repair_active_note();
    }
}
