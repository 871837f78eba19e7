//! Shared constants used across Hyperscribe crates.

/// Key holding the entire serialized document in the local storage area.
pub const STORAGE_KEY: &str = "hyperscribe-data";

/// Schema version produced by the newest registered migration.
pub const CURRENT_VERSION: u32 = 1;

/// Default debounce delay for `save()` in milliseconds.
pub const DEFAULT_SAVE_DEBOUNCE_MS: u64 = 200;

/// Remote sync area total quota (browser sync storage allows ~100KB).
pub const DEFAULT_SYNC_QUOTA_BYTES: u64 = 100 * 1024;
/// Remote sync area per-item quota.
pub const DEFAULT_SYNC_QUOTA_BYTES_PER_ITEM: u64 = 8 * 1024;

/// Remote key listing which notes are mirrored.
pub const SYNC_MANIFEST_KEY: &str = "hyperscribe-sync-manifest";
/// Prefix for remote keys holding one mirrored note each.
pub const SYNC_NOTE_KEY_PREFIX: &str = "hyperscribe-sync-note:";

/// Legacy titles are truncated to this many characters.
pub const LEGACY_TITLE_MAX_CHARS: usize = 50;
/// Title used when migrating an empty legacy note.
pub const LEGACY_DEFAULT_TITLE: &str = "My First Note";
/// Title used when a note has no usable first line.
pub const UNTITLED_NOTE_TITLE: &str = "Untitled Note";

/// Popup window resize bounds.
pub const RESIZE_MIN_WIDTH: u32 = 320;
/// Minimum popup height.
pub const RESIZE_MIN_HEIGHT: u32 = 360;
/// Maximum popup width.
pub const RESIZE_MAX_WIDTH: u32 = 640;
/// Maximum popup height.
pub const RESIZE_MAX_HEIGHT: u32 = 599;

/// Theme applied when none (or an unknown one) is stored.
pub const DEFAULT_THEME: &str = "default_bright";
/// Theme ids the popup knows how to render.
pub const KNOWN_THEMES: &[&str] = &["default_bright", "default_dark", "monokai", "nord", "dracula"];

/// File name of the local storage area inside the data directory.
pub const LOCAL_AREA_FILE_NAME: &str = "local-storage.json";
