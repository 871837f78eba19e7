//! Settings export and import.
//!
//! Export is the full document as plain JSON. Import validates the shape,
//! migrates older documents, and replaces the live document only once the
//! replacement has been written to storage.

use super::{StateStore, StoreEvent};
use crate::constants::{CURRENT_VERSION, STORAGE_KEY};
use crate::error::AppError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

/// Outcome of [`StateStore::import_settings`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub success: bool,
    pub message: String,
}

impl ImportReport {
    fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// Download name for an export taken at `now_ms`.
pub fn settings_file_name(now_ms: i64) -> String {
    let date = DateTime::<Utc>::from_timestamp_millis(now_ms)
        .unwrap_or_default()
        .format("%Y-%m-%d");
    format!("hyperscribe-settings-{}.json", date)
}

impl StateStore {
    /// Plain JSON snapshot of the live document.
    pub fn export_settings(&self) -> Result<Value, AppError> {
        Ok(serde_json::to_value(&*self.get_state())?)
    }

    /// Export formatted for a settings file (2-space indentation).
    pub fn export_settings_json(&self) -> Result<String, AppError> {
        Ok(serde_json::to_string_pretty(&*self.get_state())?)
    }

    /// Parse and import a settings file.
    pub async fn import_settings_str(&self, raw: &str) -> ImportReport {
        match serde_json::from_str::<Value>(raw) {
            Ok(value) => self.import_settings(value).await,
            Err(err) => {
                warn!("Rejected settings import: invalid JSON: {}", err);
                ImportReport::failed(format!("Invalid JSON: {}", err))
            }
        }
    }

    /// Replace the live document with an imported one and persist it
    /// immediately.
    ///
    /// Malformed input is reported in the returned [`ImportReport`] and leaves
    /// the current document untouched, as does a failed write.
    pub async fn import_settings(&self, parsed: Value) -> ImportReport {
        let object = match parsed {
            Value::Object(object) => object,
            _ => return ImportReport::failed("Settings must be a JSON object"),
        };
        let from = match object.get("version").map(Value::as_u64) {
            None => return ImportReport::failed("Missing required field: version"),
            Some(None) => {
                return ImportReport::failed("Field 'version' must be a non-negative integer")
            }
            Some(Some(version)) => u32::try_from(version).unwrap_or(u32::MAX),
        };
        let has_notes = object.get("notes").is_some_and(Value::is_array);
        let has_legacy_note = object.get("note").is_some_and(Value::is_string);
        if !has_notes && !has_legacy_note {
            return ImportReport::failed("Settings must contain 'notes' or a legacy 'note'");
        }

        if from > CURRENT_VERSION {
            return ImportReport::failed(format!(
                "Settings version {} is newer than supported version {}",
                from, CURRENT_VERSION
            ));
        }

        let imported = match self
            .inner
            .migrator
            .try_run_migrations(object, from, CURRENT_VERSION)
        {
            Ok(state) => state,
            Err(err) => return ImportReport::failed(format!("Invalid settings: {}", err)),
        };
        let value = match serde_json::to_value(&imported) {
            Ok(value) => value,
            Err(err) => return ImportReport::failed(format!("Invalid settings: {}", err)),
        };

        let _guard = self.inner.write_lock.lock().await;
        if let Err(err) = self.inner.storage.set(STORAGE_KEY, value).await {
            warn!("Failed to persist imported settings: {}", err);
            self.emit(StoreEvent::PersistFailed {
                message: err.to_string(),
            });
            return ImportReport::failed(format!("Failed to save imported settings: {}", err));
        }
        self.inner.scheduler.cancel();
        let count = imported.notes.len();
        let revision = self.replace(imported);
        self.emit(StoreEvent::Persisted { revision });
        info!("Imported settings with {} note(s) from version {}", count, from);
        ImportReport::ok(format!("Imported {} note(s)", count))
    }
}
