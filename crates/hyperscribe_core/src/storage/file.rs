//! Storage area persisted as a single JSON object file.
//!
//! The file is read lazily on first access and rewritten atomically (temp
//! file + rename) on every mutation.

use super::{check_quota, usage_of, KeyValueStore, StorageQuota};
use crate::error::AppError;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::debug;

/// JSON-file backed storage area.
pub struct JsonFileStore {
    path: PathBuf,
    quota: Option<StorageQuota>,
    entries: Mutex<Option<BTreeMap<String, Value>>>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            quota: None,
            entries: Mutex::new(None),
        }
    }

    pub fn with_quota(path: impl Into<PathBuf>, quota: StorageQuota) -> Self {
        Self {
            quota: Some(quota),
            ..Self::new(path)
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<BTreeMap<String, Value>, AppError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) if contents.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(contents) => Ok(serde_json::from_str(&contents)?),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(err) => Err(err.into()),
        }
    }

    async fn write(&self, entries: &BTreeMap<String, Value>) -> Result<(), AppError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let tmp = self.path.with_extension("json.tmp");
        let contents = serde_json::to_string_pretty(entries)?;
        tokio::fs::write(&tmp, contents).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        debug!("Wrote storage area {:?} ({} keys)", self.path, entries.len());
        Ok(())
    }

    /// Run `f` against the loaded entries, loading them on first use.
    async fn with_entries<T>(
        &self,
        f: impl FnOnce(&mut BTreeMap<String, Value>) -> Result<(T, bool), AppError>,
    ) -> Result<T, AppError> {
        let mut guard = self.entries.lock().await;
        if guard.is_none() {
            *guard = Some(self.load().await?);
        }
        let Some(entries) = guard.as_mut() else {
            return Err(AppError::Storage("storage area failed to load".to_string()));
        };
        let mut staged = entries.clone();
        let (result, dirty) = f(&mut staged)?;
        if dirty {
            self.write(&staged).await?;
            *entries = staged;
        }
        Ok(result)
    }
}

#[async_trait]
impl KeyValueStore for JsonFileStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, AppError> {
        self.with_entries(|entries| Ok((entries.get(key).cloned(), false)))
            .await
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), AppError> {
        let quota = self.quota;
        self.with_entries(|entries| {
            check_quota(quota, entries, key, &value)?;
            entries.insert(key.to_string(), value);
            Ok(((), true))
        })
        .await
    }

    async fn remove(&self, key: &str) -> Result<(), AppError> {
        self.with_entries(|entries| {
            let removed = entries.remove(key).is_some();
            Ok(((), removed))
        })
        .await
    }

    async fn bytes_in_use(&self, keys: Option<&[String]>) -> Result<u64, AppError> {
        self.with_entries(|entries| Ok((usage_of(entries, keys), false)))
            .await
    }

    fn quota(&self) -> Option<StorageQuota> {
        self.quota
    }
}
