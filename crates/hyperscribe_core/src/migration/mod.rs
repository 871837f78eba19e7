//! Schema migrations for the persisted document.
//!
//! Transforms operate on the raw JSON object so they can read fields the
//! current schema no longer has. Only a fully migrated, normalized
//! [`PersistedState`] leaves this module.

use crate::clock::Clock;
use crate::constants::{CURRENT_VERSION, LEGACY_DEFAULT_TITLE};
use crate::models::{Note, PersistedState};
use crate::text::legacy_title;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

#[cfg(test)]
mod tests;

/// Inputs shared by every transform of one migration run.
#[derive(Debug, Clone, Copy)]
pub struct MigrationContext {
    /// Instant the migration runs at (epoch milliseconds).
    pub now_ms: i64,
}

/// Converts a document at version `N - 1` into version `N`.
///
/// Transforms must be total: missing or malformed legacy fields default to
/// blank equivalents instead of failing.
pub type MigrationFn = fn(Map<String, Value>, &MigrationContext) -> Map<String, Value>;

/// Sequential version-upgrade engine.
pub struct Migrator {
    migrations: BTreeMap<u32, MigrationFn>,
    clock: Arc<dyn Clock>,
}

impl Migrator {
    /// Migrator with every built-in transform registered.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        let mut migrations: BTreeMap<u32, MigrationFn> = BTreeMap::new();
        migrations.insert(1, introduce_multi_note);
        Self { migrations, clock }
    }

    /// Register (or replace) the transform that produces `target`.
    pub fn with_migration(mut self, target: u32, migration: MigrationFn) -> Self {
        self.migrations.insert(target, migration);
        self
    }

    /// Highest version a registered transform produces.
    pub fn latest_version(&self) -> u32 {
        self.migrations
            .keys()
            .next_back()
            .copied()
            .unwrap_or(CURRENT_VERSION)
    }

    /// Upgrade `raw` from `from` to `to`, applying transforms `from + 1..=to`
    /// in ascending order.
    ///
    /// The result always carries `version == to`, even when no transform ran.
    /// Input that cannot be shaped into a document after migrating is
    /// replaced by the migrated empty document rather than failing.
    pub fn run_migrations(&self, raw: Value, from: u32, to: u32) -> PersistedState {
        let ctx = MigrationContext {
            now_ms: self.clock.now_ms(),
        };
        let object = match raw {
            Value::Object(object) => object,
            Value::Null => Map::new(),
            other => {
                warn!("Discarding non-object persisted state of type {}", json_kind(&other));
                Map::new()
            }
        };

        match self.transform(object, from, to, &ctx) {
            Ok(state) => state,
            Err(err) => {
                warn!(
                    "Migrated state failed validation ({}); falling back to defaults",
                    err
                );
                self.transform(Map::new(), 0, to, &ctx).unwrap_or_else(|_| PersistedState {
                    version: to,
                    ..PersistedState::default()
                })
            }
        }
    }

    /// Like [`Migrator::run_migrations`], but report input that cannot be
    /// shaped into a document instead of substituting defaults.
    pub fn try_run_migrations(
        &self,
        raw: Map<String, Value>,
        from: u32,
        to: u32,
    ) -> Result<PersistedState, serde_json::Error> {
        let ctx = MigrationContext {
            now_ms: self.clock.now_ms(),
        };
        self.transform(raw, from, to, &ctx)
    }

    /// The document a fresh install starts from.
    pub fn default_state(&self) -> PersistedState {
        self.run_migrations(Value::Object(Map::new()), 0, CURRENT_VERSION)
    }

    fn transform(
        &self,
        mut object: Map<String, Value>,
        from: u32,
        to: u32,
        ctx: &MigrationContext,
    ) -> Result<PersistedState, serde_json::Error> {
        for target in from.saturating_add(1)..=to {
            match self.migrations.get(&target) {
                Some(migration) => {
                    object = migration(object, ctx);
                    info!("Applied state migration to version {}", target);
                }
                None => warn!("No migration registered for version {}", target),
            }
        }
        object.insert("version".to_string(), json!(to));

        let mut state: PersistedState = serde_json::from_value(Value::Object(object))?;
        state.version = to;
        state.normalize();
        Ok(state)
    }
}

/// Version recorded in a raw persisted blob (`0` when absent or malformed).
pub fn stored_version(raw: &Value) -> u32 {
    raw.get("version")
        .and_then(Value::as_u64)
        .and_then(|version| u32::try_from(version).ok())
        .unwrap_or(0)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// v0 → v1: the flat `note` string becomes the first entry of `notes`.
fn introduce_multi_note(
    mut state: Map<String, Value>,
    ctx: &MigrationContext,
) -> Map<String, Value> {
    let legacy = match state.remove("note") {
        Some(Value::String(text)) => text,
        _ => String::new(),
    };
    let title = match legacy_title(&legacy) {
        title if title.is_empty() => LEGACY_DEFAULT_TITLE.to_string(),
        title => title,
    };
    let id = Note::new_id();

    state.insert(
        "notes".to_string(),
        json!([{
            "id": id,
            "title": title,
            "content": legacy,
            "created": ctx.now_ms,
            "modified": ctx.now_ms,
            "tags": [],
            "pinned": false,
            "archived": false,
        }]),
    );
    state.insert("activeNoteId".to_string(), json!(id));

    if let Some(dark) = state.remove("darkMode") {
        if !state.contains_key("theme") {
            let theme = if dark.as_bool().unwrap_or(false) {
                "default_dark"
            } else {
                "default_bright"
            };
            state.insert("theme".to_string(), json!(theme));
        }
    }

    if let Some(Value::Bool(compact)) = state.remove("compactMode") {
        if !state.contains_key("toolbar") {
            state.insert("toolbar".to_string(), json!({ "compact": compact }));
        }
    }

    state.insert("version".to_string(), json!(1));
    state
}
