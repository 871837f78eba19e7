//! Document data models.

/// Note model.
pub mod note;
/// Partial-update type used by the state store.
pub mod patch;
/// Persisted document root and preferences.
pub mod state;


pub use note::Note;
pub use patch::StatePatch;
pub use state::{FontSettings, PersistedState, ToolbarLayout, WindowGeometry};
