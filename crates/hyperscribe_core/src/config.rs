//! Configuration loading from environment variables.

use crate::constants::{
    DEFAULT_SAVE_DEBOUNCE_MS, DEFAULT_SYNC_QUOTA_BYTES, DEFAULT_SYNC_QUOTA_BYTES_PER_ITEM,
    LOCAL_AREA_FILE_NAME,
};
use crate::storage::StorageQuota;
use crate::store::StoreOptions;
use crate::sync::SyncOptions;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Runtime configuration for Hyperscribe.
#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    /// Remote sync area file. `None` means the sync API is absent.
    pub sync_path: Option<PathBuf>,
    pub save_debounce_ms: u64,
    pub sync_quota_bytes: u64,
    pub sync_quota_bytes_per_item: u64,
    pub auto_sync: bool,
}

/// Expand tilde (~) in paths to the user's home directory
fn expand_tilde(path: String) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = resolve_home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

fn resolve_home_dir() -> Option<PathBuf> {
    // Prefer explicit HOME if set (Unix, some Windows shells)
    if let Ok(home) = env::var("HOME") {
        if !home.trim().is_empty() {
            return Some(PathBuf::from(home));
        }
    }

    // Windows USERPROFILE (standard)
    if let Ok(profile) = env::var("USERPROFILE") {
        if !profile.trim().is_empty() {
            return Some(PathBuf::from(profile));
        }
    }

    std::env::current_dir().ok()
}

/// Parse a boolean-like environment flag value.
///
/// # Supported Values
/// - Truthy: `1`, `true`, `yes`, `on`
/// - Falsy: `0`, `false`, `no`, `off`, empty string
///
/// Matching is case-insensitive and ignores surrounding whitespace.
///
/// # Returns
/// `Some(bool)` when the value is recognized, otherwise `None`.
pub fn parse_env_flag(value: &str) -> Option<bool> {
    let normalized = value.trim().to_ascii_lowercase();
    match normalized.as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "" | "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Read a boolean flag from the environment.
///
/// Missing or unrecognized values are treated as `false`.
pub fn env_flag_enabled(name: &str) -> bool {
    env::var(name)
        .ok()
        .and_then(|value| parse_env_flag(&value))
        .unwrap_or(false)
}

fn env_number(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|raw| raw.trim().parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Returns
    /// A populated [`Config`] with defaults applied when env vars are missing.
    pub fn from_env() -> Self {
        Self {
            data_dir: env::var("HYPERSCRIBE_DATA_DIR")
                .map(expand_tilde)
                .unwrap_or_else(|_| {
                    let home = resolve_home_dir().unwrap_or_else(|| PathBuf::from("."));
                    home.join(".cache").join("hyperscribe")
                }),
            sync_path: env::var("HYPERSCRIBE_SYNC_PATH")
                .ok()
                .filter(|raw| !raw.trim().is_empty())
                .map(expand_tilde),
            save_debounce_ms: env_number("HYPERSCRIBE_SAVE_DEBOUNCE_MS", DEFAULT_SAVE_DEBOUNCE_MS),
            sync_quota_bytes: env_number("HYPERSCRIBE_SYNC_QUOTA_BYTES", DEFAULT_SYNC_QUOTA_BYTES),
            sync_quota_bytes_per_item: env_number(
                "HYPERSCRIBE_SYNC_QUOTA_PER_ITEM",
                DEFAULT_SYNC_QUOTA_BYTES_PER_ITEM,
            ),
            auto_sync: env_flag_enabled("HYPERSCRIBE_AUTO_SYNC"),
        }
    }

    /// Path of the file backing the local storage area.
    pub fn local_area_path(&self) -> PathBuf {
        self.data_dir.join(LOCAL_AREA_FILE_NAME)
    }

    /// Store tuning derived from this configuration.
    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            save_debounce: Duration::from_millis(self.save_debounce_ms),
        }
    }

    /// Quota enforced on the remote sync area.
    pub fn sync_quota(&self) -> StorageQuota {
        StorageQuota {
            total_bytes: self.sync_quota_bytes,
            per_item_bytes: Some(self.sync_quota_bytes_per_item),
        }
    }

    pub fn sync_options(&self) -> SyncOptions {
        SyncOptions {
            quota: self.sync_quota(),
        }
    }
}
