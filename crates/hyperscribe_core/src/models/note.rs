//! Note model.

use crate::constants::UNTITLED_NOTE_TITLE;
use crate::text::extract_title;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single user document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub created: i64,
    #[serde(default)]
    pub modified: i64,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub pinned: bool,
    #[serde(default)]
    pub archived: bool,
    /// Set once the user renames the note; content edits stop re-deriving it.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub custom_title: bool,
}

impl Note {
    /// Create a new note stamped at `now_ms`.
    ///
    /// # Arguments
    /// - `title`: Explicit title; blank falls back to one derived from content.
    /// - `content`: Initial content.
    /// - `now_ms`: Creation instant (epoch milliseconds).
    pub fn new(title: Option<&str>, content: String, now_ms: i64) -> Self {
        let explicit = title.map(str::trim).filter(|title| !title.is_empty());
        let title = match explicit {
            Some(title) => title.to_string(),
            None => derived_title(&content),
        };
        Self {
            id: Self::new_id(),
            title,
            content,
            created: now_ms,
            modified: now_ms,
            tags: Vec::new(),
            pinned: false,
            archived: false,
            custom_title: explicit.is_some(),
        }
    }

    /// Generate a fresh opaque note identifier.
    pub fn new_id() -> String {
        format!("note_{}", Uuid::new_v4().simple())
    }

    /// Replace the content, bump `modified`, and re-derive the title unless
    /// it was set explicitly.
    pub fn set_content(&mut self, content: String, now_ms: i64) {
        if !self.custom_title {
            self.title = derived_title(&content);
        }
        self.content = content;
        self.touch(now_ms);
    }

    /// Set an explicit title.
    pub fn rename(&mut self, title: String, now_ms: i64) {
        self.title = title;
        self.custom_title = true;
        self.touch(now_ms);
    }

    fn touch(&mut self, now_ms: i64) {
        self.modified = now_ms.max(self.created);
    }
}

fn derived_title(content: &str) -> String {
    let title = extract_title(content);
    if title.is_empty() {
        UNTITLED_NOTE_TITLE.to_string()
    } else {
        title
    }
}
