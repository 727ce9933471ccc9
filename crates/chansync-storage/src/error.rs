use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Filesystem operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Path not found: {}", path.display())]
    PathNotFound { path: PathBuf },

    #[error("Path {} resolves outside the download root {}", path.display(), root.display())]
    OutsideRoot { path: PathBuf, root: PathBuf },

    #[error("Failed to relocate {} to {}: {source}", from.display(), to.display())]
    RelocationFailed {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to delete artifact {}: {source}", path.display())]
    ArtifactDeletionFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;
