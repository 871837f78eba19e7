//! Keyboard-shortcut commands.
//!
//! Tokens arrive from an external dispatcher. Store-side effects happen here;
//! everything the UI must do is returned as a [`CommandEffect`].

use crate::error::AppError;
use crate::models::{Note, PersistedState};
use crate::store::StateStore;
use crate::text::note_file_name;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Commands a shortcut can trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    CopyAll,
    DownloadNote,
    ClearNote,
    ToggleThemePanel,
}

impl Command {
    pub const ALL: [Command; 4] = [
        Command::CopyAll,
        Command::DownloadNote,
        Command::ClearNote,
        Command::ToggleThemePanel,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::CopyAll => "copy-all",
            Self::DownloadNote => "download-note",
            Self::ClearNote => "clear-note",
            Self::ToggleThemePanel => "toggle-theme-panel",
        }
    }

    /// `true` when the command asks before acting and the user has not
    /// opted out through `dontAskAgain`.
    pub fn needs_confirmation(self, state: &PersistedState) -> bool {
        match self {
            Self::ClearNote => !state
                .dont_ask_again
                .get(self.as_str())
                .copied()
                .unwrap_or(false),
            _ => false,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Command {
    type Err = AppError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|command| command.as_str() == raw.trim())
            .ok_or_else(|| AppError::Validation(format!("unknown command '{}'", raw.trim())))
    }
}

/// What the caller must do after a command ran.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandEffect {
    /// Put this text on the clipboard.
    Copy(String),
    /// Offer this file for download.
    Download { file_name: String, content: String },
    /// The active note was emptied.
    Cleared(Note),
    ToggleThemePanel,
}

/// Run `command` against the store.
///
/// # Errors
/// [`AppError::NotFound`] when no note is active.
pub fn dispatch(store: &StateStore, command: Command) -> Result<CommandEffect, AppError> {
    debug!("Dispatching command {}", command);
    let state = store.get_state();
    let active = || {
        state
            .active_note()
            .cloned()
            .ok_or_else(|| AppError::NotFound("active note".to_string()))
    };
    match command {
        Command::CopyAll => Ok(CommandEffect::Copy(active()?.content)),
        Command::DownloadNote => {
            let note = active()?;
            Ok(CommandEffect::Download {
                file_name: note_file_name(&note.title),
                content: note.content,
            })
        }
        Command::ClearNote => Ok(CommandEffect::Cleared(store.clear_active_note()?)),
        Command::ToggleThemePanel => Ok(CommandEffect::ToggleThemePanel),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::StatePatch;
    use crate::test_support::init_store;
    use std::collections::BTreeMap;

    #[test]
    fn tokens_parse_and_display() {
        for command in Command::ALL {
            assert_eq!(command.to_string().parse::<Command>().ok(), Some(command));
        }
        assert!(matches!(
            "paste-all".parse::<Command>(),
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn dispatch_copies_downloads_and_clears_active_note() {
        let h = init_store().await;
        h.store
            .create_note(Some("Meeting Notes"), "agenda".to_string())
            .expect("create");

        assert_eq!(
            dispatch(&h.store, Command::CopyAll).expect("copy"),
            CommandEffect::Copy("agenda".to_string())
        );
        assert_eq!(
            dispatch(&h.store, Command::DownloadNote).expect("download"),
            CommandEffect::Download {
                file_name: "meeting-notes.txt".to_string(),
                content: "agenda".to_string(),
            }
        );
        assert_eq!(
            dispatch(&h.store, Command::ToggleThemePanel).expect("toggle"),
            CommandEffect::ToggleThemePanel
        );

        let effect = dispatch(&h.store, Command::ClearNote).expect("clear");
        assert!(matches!(effect, CommandEffect::Cleared(ref note) if note.content.is_empty()));
        let state = h.store.get_state();
        assert_eq!(state.active_note().map(|n| n.content.as_str()), Some(""));
        assert_eq!(state.notes.len(), 2);
    }

    #[tokio::test]
    async fn clear_confirmation_respects_dont_ask_again() {
        let h = init_store().await;
        assert!(Command::ClearNote.needs_confirmation(&h.store.get_state()));
        assert!(!Command::CopyAll.needs_confirmation(&h.store.get_state()));

        h.store.save(StatePatch {
            dont_ask_again: Some(BTreeMap::from([("clear-note".to_string(), true)])),
            ..StatePatch::default()
        });
        assert!(!Command::ClearNote.needs_confirmation(&h.store.get_state()));
    }
}
