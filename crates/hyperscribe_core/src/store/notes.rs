//! Note-level operations layered on the store's write path.
//!
//! Each operation edits a copy of the live document and goes through the
//! same debounced persistence as `save()`.

use super::StateStore;
use crate::error::AppError;
use crate::models::Note;
use crate::templates::{self, Template};
use crate::text::{format_bytes, normalize_optional_nonempty};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::info;

/// Local storage usage for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StorageUsage {
    pub bytes: u64,
    pub formatted: String,
}

impl StateStore {
    /// Append a note and make it active.
    ///
    /// # Returns
    /// The created note.
    pub fn create_note(&self, title: Option<&str>, content: String) -> Result<Note, AppError> {
        let now = self.now_ms();
        self.mutate(|state| {
            let note = Note::new(title, content, now);
            state.active_note_id = Some(note.id.clone());
            state.notes.push(note.clone());
            Ok(note)
        })
    }

    /// Create a note from the rendered template `template_id`.
    ///
    /// # Errors
    /// [`AppError::NotFound`] when no template has that id.
    pub fn create_note_from_template(
        &self,
        template_id: &str,
        variables: &BTreeMap<String, String>,
    ) -> Result<Note, AppError> {
        let content =
            templates::apply_template(&self.get_state().custom_templates, template_id, variables)?;
        self.create_note(None, content)
    }

    /// Switch the displayed note.
    pub fn set_active_note(&self, id: &str) -> Result<(), AppError> {
        self.mutate(|state| {
            if state.note(id).is_none() {
                return Err(AppError::NotFound(format!("note '{}'", id)));
            }
            state.active_note_id = Some(id.to_string());
            Ok(())
        })
    }

    /// Replace the active note's content.
    pub fn update_active_content(&self, content: String) -> Result<Note, AppError> {
        let now = self.now_ms();
        self.mutate(|state| {
            let note = state
                .active_note_mut()
                .ok_or_else(|| AppError::NotFound("active note".to_string()))?;
            note.set_content(content, now);
            Ok(note.clone())
        })
    }

    /// Replace the content of note `id`.
    pub fn update_note_content(&self, id: &str, content: String) -> Result<Note, AppError> {
        let now = self.now_ms();
        self.mutate(|state| {
            let note = note_mut(&mut state.notes, id)?;
            note.set_content(content, now);
            Ok(note.clone())
        })
    }

    /// Give note `id` an explicit title.
    ///
    /// # Errors
    /// [`AppError::Validation`] for a blank title.
    pub fn rename_note(&self, id: &str, title: &str) -> Result<Note, AppError> {
        let title = normalize_optional_nonempty(Some(title.to_string()))
            .ok_or_else(|| AppError::Validation("note title cannot be empty".to_string()))?;
        let now = self.now_ms();
        self.mutate(|state| {
            let note = note_mut(&mut state.notes, id)?;
            note.rename(title, now);
            Ok(note.clone())
        })
    }

    /// Close (delete) note `id`. Closing the active note activates the note
    /// that took its place, or the previous one when it was last.
    ///
    /// # Errors
    /// [`AppError::Validation`] when `id` is the only note left.
    pub fn close_note(&self, id: &str) -> Result<Note, AppError> {
        self.mutate(|state| {
            let index = state
                .notes
                .iter()
                .position(|note| note.id == id)
                .ok_or_else(|| AppError::NotFound(format!("note '{}'", id)))?;
            if state.notes.len() == 1 {
                return Err(AppError::Validation(
                    "cannot close the last remaining note".to_string(),
                ));
            }
            let removed = state.notes.remove(index);
            if state.active_note_id.as_deref() == Some(id) {
                let neighbour = index.min(state.notes.len() - 1);
                state.active_note_id = Some(state.notes[neighbour].id.clone());
            }
            info!("Closed note {}", removed.id);
            Ok(removed)
        })
    }

    /// Empty the active note's content.
    pub fn clear_active_note(&self) -> Result<Note, AppError> {
        self.update_active_content(String::new())
    }

    /// Validate and store a custom template.
    pub fn add_custom_template(&self, template: Template) -> Result<(), AppError> {
        self.mutate(|state| {
            state.custom_templates =
                templates::add_custom_template(&state.custom_templates, template)?;
            Ok(())
        })
    }

    /// Remove a custom template; built-ins are rejected.
    pub fn remove_custom_template(&self, id: &str) -> Result<(), AppError> {
        self.mutate(|state| {
            state.custom_templates = templates::remove_custom_template(&state.custom_templates, id)?;
            Ok(())
        })
    }

    /// Bytes the local storage area currently uses.
    pub async fn storage_usage(&self) -> Result<StorageUsage, AppError> {
        let bytes = self.inner.storage.bytes_in_use(None).await?;
        Ok(StorageUsage {
            bytes,
            formatted: format_bytes(bytes),
        })
    }
}

fn note_mut<'a>(notes: &'a mut [Note], id: &str) -> Result<&'a mut Note, AppError> {
    notes
        .iter_mut()
        .find(|note| note.id == id)
        .ok_or_else(|| AppError::NotFound(format!("note '{}'", id)))
}
