//! Application error types for core storage, sync, and domain logic.
use thiserror::Error;

/// Top-level application error type.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Quota exceeded: {used} bytes would exceed the {quota} byte limit")]
    QuotaExceeded { used: u64, quota: u64 },

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Sync storage is unavailable")]
    SyncUnavailable,

    #[error("A sync is already in progress")]
    SyncInProgress,

    #[error("Sync is disabled")]
    SyncDisabled,
}

impl AppError {
    /// `true` for failures caused by the storage backend rather than the caller.
    pub fn is_storage_failure(&self) -> bool {
        matches!(
            self,
            Self::Storage(_) | Self::Io(_) | Self::QuotaExceeded { .. } | Self::Serialization(_)
        )
    }
}
