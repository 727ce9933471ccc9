use std::path::PathBuf;

use chansync_core::models::{Media, Source};

/// Download rules owned by the indexing side of the system.
pub trait MediaPolicy: Send + Sync {
    /// Format selector for downloading `media`, or `None` when nothing
    /// available satisfies the source's requirements.
    fn format_for(&self, media: &Media, source: &Source) -> Option<String>;

    /// Recompute `media.skip` from the source's filters. Returns true when
    /// the flag changed.
    fn apply_filters(&self, media: &mut Media, source: &Source) -> bool;

    /// Where the downloaded file is expected to be written.
    fn expected_file_path(&self, media: &Media, source: &Source) -> Option<PathBuf>;
}
