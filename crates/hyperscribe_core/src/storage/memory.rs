//! In-memory storage area.
//!
//! Used for tests and as the fallback when no durable area is configured.
//! Supports failpoints per operation and a gate that suspends every call
//! until released, so callers can observe in-flight I/O.

use super::{check_quota, usage_of, KeyValueStore, StorageQuota};
use crate::error::AppError;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::sync::watch;

/// Operations a failpoint can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageOp {
    Get,
    Set,
    Remove,
}

#[derive(Debug, Default)]
struct Failpoints {
    get: Option<String>,
    set: Option<String>,
    remove: Option<String>,
    /// Writes to these keys fail even when `set` is open.
    set_keys: BTreeMap<String, String>,
}

impl Failpoints {
    fn slot(&mut self, op: StorageOp) -> &mut Option<String> {
        match op {
            StorageOp::Get => &mut self.get,
            StorageOp::Set => &mut self.set,
            StorageOp::Remove => &mut self.remove,
        }
    }
}

/// Storage area held entirely in memory.
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, Value>>,
    quota: Option<StorageQuota>,
    failpoints: Mutex<Failpoints>,
    gate: watch::Sender<bool>,
    set_calls: AtomicUsize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Unbounded area.
    pub fn new() -> Self {
        let (gate, _) = watch::channel(true);
        Self {
            entries: Mutex::new(BTreeMap::new()),
            quota: None,
            failpoints: Mutex::new(Failpoints::default()),
            gate,
            set_calls: AtomicUsize::new(0),
        }
    }

    /// Area enforcing `quota` on writes.
    pub fn with_quota(quota: StorageQuota) -> Self {
        Self {
            quota: Some(quota),
            ..Self::new()
        }
    }

    /// Make every call of `op` fail with `message` until cleared with `None`.
    pub fn set_failpoint(&self, op: StorageOp, message: Option<&str>) {
        let mut failpoints = self.failpoints.lock().unwrap_or_else(|e| e.into_inner());
        *failpoints.slot(op) = message.map(str::to_string);
    }

    /// Make writes to `key` alone fail with `message` until cleared with `None`.
    pub fn set_key_failpoint(&self, key: &str, message: Option<&str>) {
        let mut failpoints = self.failpoints.lock().unwrap_or_else(|e| e.into_inner());
        match message {
            Some(message) => failpoints.set_keys.insert(key.to_string(), message.to_string()),
            None => failpoints.set_keys.remove(key),
        };
    }

    /// Suspend all operations until [`MemoryStore::release`] is called.
    pub fn hold(&self) {
        self.gate.send_replace(false);
    }

    /// Resume operations suspended by [`MemoryStore::hold`].
    pub fn release(&self) {
        self.gate.send_replace(true);
    }

    /// Number of `set` calls that reached the area, failed ones included.
    pub fn set_calls(&self) -> usize {
        self.set_calls.load(Ordering::SeqCst)
    }

    /// Synchronous snapshot of one entry, bypassing gate and failpoints.
    pub fn peek(&self, key: &str) -> Option<Value> {
        self.lock_entries().get(key).cloned()
    }

    /// Synchronous write bypassing quota, gate and failpoints.
    pub fn insert_raw(&self, key: &str, value: Value) {
        self.lock_entries().insert(key.to_string(), value);
    }

    pub fn keys(&self) -> Vec<String> {
        self.lock_entries().keys().cloned().collect()
    }

    fn lock_entries(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, Value>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn enter(&self, op: StorageOp, key: Option<&str>) -> Result<(), AppError> {
        let mut gate = self.gate.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = gate.wait_for(|open| *open).await;
        let mut failpoints = self.failpoints.lock().unwrap_or_else(|e| e.into_inner());
        let keyed = match (op, key) {
            (StorageOp::Set, Some(key)) => failpoints.set_keys.get(key).cloned(),
            _ => None,
        };
        match keyed.or_else(|| failpoints.slot(op).clone()) {
            Some(message) => Err(AppError::Storage(message)),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, AppError> {
        self.enter(StorageOp::Get, Some(key)).await?;
        Ok(self.lock_entries().get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), AppError> {
        self.set_calls.fetch_add(1, Ordering::SeqCst);
        self.enter(StorageOp::Set, Some(key)).await?;
        let mut entries = self.lock_entries();
        check_quota(self.quota, &entries, key, &value)?;
        entries.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), AppError> {
        self.enter(StorageOp::Remove, Some(key)).await?;
        self.lock_entries().remove(key);
        Ok(())
    }

    async fn bytes_in_use(&self, keys: Option<&[String]>) -> Result<u64, AppError> {
        self.enter(StorageOp::Get, None).await?;
        Ok(usage_of(&self.lock_entries(), keys))
    }

    fn quota(&self) -> Option<StorageQuota> {
        self.quota
    }
}
