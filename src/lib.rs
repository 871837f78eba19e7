//! Root crate facade for Hyperscribe.
//!
//! Re-exports the core library so embedders depend on one crate.

pub use hyperscribe_core::{
    clock, commands, config, constants, error, migration, models, storage, store, sync,
    templates, text, AppError, Clock, Command, CommandEffect, Config, ImportReport,
    JsonFileStore, KeyValueStore, ManualClock, MemoryStore, Migrator, Note, PersistedState,
    Resolution, ResolutionStrategy, StatePatch, StateStore, StorageQuota, StoreEvent,
    StoreOptions, SyncEngine, SyncOptions, SyncOutcome, SyncState, SystemClock,
};
