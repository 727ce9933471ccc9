//! Removal of a media file and every artifact named after it.
//!
//! Failures on individual paths are logged and recorded in the
//! [`SweepReport`]; they never stop the rest of the sweep.

use std::io;
use std::path::{Path, PathBuf};

use crate::error::StorageError;
use crate::fs::{FileOps, LocalFs};

/// Sidecar suffixes appended to the artifact base as `<base>.<suffix>`.
pub const SIDECAR_SUFFIXES: &[&str] = &["nfo", "jpg", "webp", "info.json"];
/// Companion artifacts appended directly to the artifact base.
pub const COMPANION_SUFFIXES: &[&str] = &[".trickplay", "-poster.jpg", "-poster.webp"];
const SUBTITLE_EXTENSION: &str = ".vtt";

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    pub removed: Vec<PathBuf>,
    pub failed: Vec<PathBuf>,
}

impl SweepReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Debug, Default, Clone)]
pub struct ArtifactSweeper<F: FileOps = LocalFs> {
    fs: F,
}

impl ArtifactSweeper<LocalFs> {
    pub fn new() -> Self {
        Self { fs: LocalFs }
    }
}

impl<F: FileOps> ArtifactSweeper<F> {
    pub fn with_fs(fs: F) -> Self {
        Self { fs }
    }

    /// Remove `media_file` and everything derived from its base name.
    #[tracing::instrument(skip(self), fields(path = %media_file.display()))]
    pub fn sweep(&self, media_file: &Path) -> SweepReport {
        let mut report = SweepReport::default();
        let base = artifact_base(media_file);
        let (Some(dir), Some(base_name)) = (base.parent(), base.file_name()) else {
            return report;
        };
        let base_name = base_name.to_string_lossy().into_owned();

        self.remove_path(media_file, &mut report);

        for suffix in SIDECAR_SUFFIXES {
            self.remove_path(&dir.join(format!("{}.{}", base_name, suffix)), &mut report);
        }

        for path in list_dir(dir) {
            let name = file_name(&path);
            if is_subtitle_of(&name, &base_name) {
                self.remove_path(&path, &mut report);
            }
        }

        for suffix in COMPANION_SUFFIXES {
            self.remove_path(&dir.join(format!("{}{}", base_name, suffix)), &mut report);
        }

        // Anything else still named after the media file.
        for path in list_dir(dir) {
            if shares_base(&file_name(&path), &base_name) && !is_dir(&path) {
                self.remove_path(&path, &mut report);
            }
        }

        if report.is_clean() {
            tracing::debug!(removed = report.removed.len(), "Artifact sweep finished");
        } else {
            tracing::warn!(
                removed = report.removed.len(),
                failed = report.failed.len(),
                "Artifact sweep left files behind"
            );
        }
        report
    }

    /// Remove each of `paths` that exists, directories included.
    pub fn remove_all(&self, paths: &[PathBuf]) -> SweepReport {
        let mut report = SweepReport::default();
        for path in paths {
            self.remove_path(path, &mut report);
        }
        report
    }

    fn remove_path(&self, path: &Path, report: &mut SweepReport) {
        if is_dir(path) {
            self.remove_tree(path, report);
        } else if path.symlink_metadata().is_ok() {
            self.remove_file(path, report);
        }
    }

    fn remove_file(&self, path: &Path, report: &mut SweepReport) {
        match self.fs.remove_file(path) {
            Ok(()) => report.removed.push(path.to_path_buf()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(source) => {
                let err = StorageError::ArtifactDeletionFailed {
                    path: path.to_path_buf(),
                    source,
                };
                tracing::warn!(error = %err, path = %path.display(), "Failed to delete artifact");
                report.failed.push(path.to_path_buf());
            }
        }
    }

    /// Delete every file under `dir`, then its subdirectories deepest first,
    /// repeating at most once per path discovered up front.
    fn remove_tree(&self, dir: &Path, report: &mut SweepReport) {
        let (files, dirs) = walk(dir);
        let passes = (files.len() + dirs.len()).max(1);

        for _ in 0..passes {
            let (files, mut dirs) = walk(dir);
            for file in &files {
                self.remove_file(file, report);
            }
            dirs.sort_by_key(|d| std::cmp::Reverse(d.components().count()));
            for sub in &dirs {
                if let Err(e) = self.fs.remove_dir(sub) {
                    tracing::debug!(error = %e, path = %sub.display(), "Directory not yet empty");
                }
            }
            match self.fs.remove_dir(dir) {
                Ok(()) => {
                    report.removed.push(dir.to_path_buf());
                    return;
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => return,
                Err(e) => {
                    tracing::debug!(error = %e, path = %dir.display(), "Directory not yet empty");
                }
            }
        }

        tracing::warn!(path = %dir.display(), "Failed to remove artifact directory");
        report.failed.push(dir.to_path_buf());
    }
}

/// `media_file` without its extension.
pub fn artifact_base(media_file: &Path) -> PathBuf {
    media_file.with_extension("")
}

/// True for `base` itself or `base` followed by a `.` or `-` separator, so
/// `Ep1` does not claim `Ep10.mp4`.
fn shares_base(name: &str, base: &str) -> bool {
    match name.strip_prefix(base) {
        Some("") => true,
        Some(rest) => rest.starts_with('.') || rest.starts_with('-'),
        None => false,
    }
}

/// `<base>.vtt` or a language-coded `<base>.<lang>.vtt`.
fn is_subtitle_of(name: &str, base: &str) -> bool {
    name.strip_prefix(base)
        .map(|rest| rest.starts_with('.') && rest.ends_with(SUBTITLE_EXTENSION))
        .unwrap_or(false)
}

fn is_dir(path: &Path) -> bool {
    path.symlink_metadata()
        .map(|m| m.file_type().is_dir())
        .unwrap_or(false)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn list_dir(dir: &Path) -> Vec<PathBuf> {
    std::fs::read_dir(dir)
        .map(|entries| entries.filter_map(Result::ok).map(|e| e.path()).collect())
        .unwrap_or_default()
}

/// All non-directory entries and all directories below `dir`, without
/// following symlinks.
fn walk(dir: &Path) -> (Vec<PathBuf>, Vec<PathBuf>) {
    let mut files = Vec::new();
    let mut dirs = Vec::new();
    let mut stack = vec![dir.to_path_buf()];
    while let Some(current) = stack.pop() {
        for path in list_dir(&current) {
            if is_dir(&path) {
                dirs.push(path.clone());
                stack.push(path);
            } else {
                files.push(path);
            }
        }
    }
    (files, dirs)
}
