//! Errors surfaced by the lifecycle hooks.

use chansync_core::StoreError;
use chansync_storage::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Path resolution or relocation failed. Relocation has already been
    /// rolled back when this is returned.
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Task queue error: {0}")]
    Queue(#[source] anyhow::Error),

    /// Uniqueness violation during the transactional metadata fold. Handled
    /// by the fallback merge and never returned from a hook.
    #[error("Metadata merge conflict: {0}")]
    MetadataMergeConflict(String),

    #[error("Failed to encode task payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("Blocking filesystem task failed: {0}")]
    Blocking(String),
}

pub type ReconcileResult<T> = Result<T, ReconcileError>;
