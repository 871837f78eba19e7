//! Core library for Hyperscribe: the note document, its storage areas,
//! schema migration, and sync with a remote area.

/// Time sources.
pub mod clock;
/// Keyboard-shortcut commands.
pub mod commands;
/// Configuration loading and defaults.
pub mod config;
/// Shared constants.
pub mod constants;
#[cfg(test)]
pub(crate) mod env;
/// Application error types (storage/sync/domain).
pub mod error;
/// Versioned schema migration.
pub mod migration;
/// Document data models.
pub mod models;
/// Key-value storage areas.
pub mod storage;
/// Live document ownership and persistence.
pub mod store;
/// Remote sync and conflict resolution.
pub mod sync;
/// Note templates.
pub mod templates;
/// Text helpers.
pub mod text;

#[cfg(test)]
mod test_support;

pub use clock::{Clock, ManualClock, SystemClock};
pub use commands::{dispatch, Command, CommandEffect};
pub use config::Config;
pub use error::AppError;
pub use migration::Migrator;
pub use models::{Note, PersistedState, StatePatch};
pub use storage::{JsonFileStore, KeyValueStore, MemoryStore, StorageQuota};
pub use store::{ImportReport, StateStore, StoreEvent, StoreOptions};
pub use sync::{
    Conflict, Resolution, ResolutionStrategy, SyncEngine, SyncOptions, SyncOutcome, SyncState,
};
