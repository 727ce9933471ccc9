//! Chansync Storage Library
//!
//! Blocking filesystem components operating below the single download root:
//!
//! - [`PathResolver`] maps a source to its directory and checks root containment.
//! - [`DirectoryRelocator`] moves a source directory with rollback on failure.
//! - [`ArtifactSweeper`] removes every file derived from a deleted media file.
//!
//! Nothing here is async. Callers on a runtime go through `spawn_blocking`.

pub mod error;
pub mod fs;
pub mod paths;
pub mod relocate;
pub mod sweep;

// Re-export commonly used types
pub use error::{StorageError, StorageResult};
pub use fs::{FileOps, LocalFs};
pub use paths::PathResolver;
pub use relocate::{DirectoryRelocator, MergeReport, RelocationOutcome};
pub use sweep::{ArtifactSweeper, SweepReport};
