//! Key-value storage areas.
//!
//! Both the local area (one key holding the whole document) and the remote
//! sync area (a quota-limited projection) implement [`KeyValueStore`]. Values
//! are plain JSON.

/// JSON-file backed storage area.
pub mod file;
/// In-memory storage area with failure injection.
pub mod memory;

pub use file::JsonFileStore;
pub use memory::{MemoryStore, StorageOp};

use crate::error::AppError;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;

/// Byte limits enforced by a storage area.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageQuota {
    pub total_bytes: u64,
    pub per_item_bytes: Option<u64>,
}

/// Asynchronous key-value storage area.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read `key`, `None` when absent.
    async fn get(&self, key: &str) -> Result<Option<Value>, AppError>;

    /// Write `key`, replacing any previous value.
    ///
    /// # Errors
    /// [`AppError::QuotaExceeded`] when the write would break the area quota.
    async fn set(&self, key: &str, value: Value) -> Result<(), AppError>;

    /// Delete `key`; deleting an absent key is not an error.
    async fn remove(&self, key: &str) -> Result<(), AppError>;

    /// Bytes used by `keys`, or by the whole area when `None`.
    async fn bytes_in_use(&self, keys: Option<&[String]>) -> Result<u64, AppError>;

    /// Limits of this area, `None` when unbounded.
    fn quota(&self) -> Option<StorageQuota>;
}

/// Accounted size of one entry: key length plus compact JSON length.
pub fn item_size(key: &str, value: &Value) -> u64 {
    let encoded = serde_json::to_string(value).map(|json| json.len()).unwrap_or(0);
    (key.len() + encoded) as u64
}

pub(crate) fn usage_of(entries: &BTreeMap<String, Value>, keys: Option<&[String]>) -> u64 {
    match keys {
        None => entries
            .iter()
            .map(|(key, value)| item_size(key, value))
            .sum(),
        Some(keys) => keys
            .iter()
            .filter_map(|key| entries.get(key).map(|value| item_size(key, value)))
            .sum(),
    }
}

/// Reject a write of `key = value` that would exceed `quota`.
pub(crate) fn check_quota(
    quota: Option<StorageQuota>,
    entries: &BTreeMap<String, Value>,
    key: &str,
    value: &Value,
) -> Result<(), AppError> {
    let Some(quota) = quota else {
        return Ok(());
    };
    let item = item_size(key, value);
    if let Some(per_item) = quota.per_item_bytes {
        if item > per_item {
            return Err(AppError::QuotaExceeded {
                used: item,
                quota: per_item,
            });
        }
    }
    let previous = entries
        .get(key)
        .map(|existing| item_size(key, existing))
        .unwrap_or(0);
    let total = usage_of(entries, None) - previous + item;
    if total > quota.total_bytes {
        return Err(AppError::QuotaExceeded {
            used: total,
            quota: quota.total_bytes,
        });
    }
    Ok(())
}
