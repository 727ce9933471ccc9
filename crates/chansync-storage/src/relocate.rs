//! Source directory relocation.
//!
//! The old directory is parked in a staging directory created next to it,
//! whatever already occupies the new path is parked beside it, and only then
//! is the old tree renamed into place. Until that last rename succeeds the
//! [`StagingGuard`] puts everything back when dropped.

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};

use chansync_core::models::Source;
use tempfile::TempDir;

use crate::error::{StorageError, StorageResult};
use crate::fs::{FileOps, LocalFs};
use crate::paths::PathResolver;

const PREVIOUS: &str = "previous";
const EXISTED: &str = "existed";
const EXISTED_HIDDEN: &str = ".existed";

/// What happened to content that was already at the destination.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MergeReport {
    /// Entries moved into the destination.
    pub migrated: Vec<PathBuf>,
    /// Entries left in the hidden directory because the name was taken.
    pub conflicts: Vec<PathBuf>,
    /// Where a non-directory that occupied the destination was moved.
    pub set_aside: Option<PathBuf>,
    /// Staging directory kept on disk because the old content could not be moved out.
    pub stranded: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelocationOutcome {
    pub from: PathBuf,
    pub to: PathBuf,
    pub merge: Option<MergeReport>,
}

pub struct DirectoryRelocator<F: FileOps = LocalFs> {
    resolver: PathResolver,
    fs: F,
}

impl DirectoryRelocator<LocalFs> {
    pub fn new(resolver: PathResolver) -> Self {
        Self {
            resolver,
            fs: LocalFs,
        }
    }
}

impl<F: FileOps> DirectoryRelocator<F> {
    pub fn with_fs(resolver: PathResolver, fs: F) -> Self {
        Self { resolver, fs }
    }

    pub fn resolver(&self) -> &PathResolver {
        &self.resolver
    }

    /// Move `previous`'s directory to where `updated` says it should be.
    /// Returns `None` when both resolve to the same path.
    pub fn relocate(
        &self,
        previous: &Source,
        updated: &Source,
    ) -> StorageResult<Option<RelocationOutcome>> {
        let new_path = self.resolver.resolve(updated, false)?;
        let old_path = self.resolver.resolve(previous, true)?;
        if old_path == new_path {
            return Ok(None);
        }
        let depth = self.resolver.directory_depth(previous);
        self.relocate_paths(&old_path, &new_path, depth).map(Some)
    }

    /// Move `old_path` to `new_path`. `depth` is the number of components of
    /// the old source directory and bounds how far up the staging area is placed.
    #[tracing::instrument(skip(self), fields(from = %old_path.display(), to = %new_path.display()))]
    pub fn relocate_paths(
        &self,
        old_path: &Path,
        new_path: &Path,
        depth: usize,
    ) -> StorageResult<RelocationOutcome> {
        for path in [old_path, new_path] {
            if !self.resolver.is_within_root(path) || self.resolver.is_root(path) {
                return Err(StorageError::OutsideRoot {
                    path: path.to_path_buf(),
                    root: self.resolver.download_root().to_path_buf(),
                });
            }
        }
        if !old_path.is_dir() {
            return Err(StorageError::PathNotFound {
                path: old_path.to_path_buf(),
            });
        }
        let failed = |source: io::Error| StorageError::RelocationFailed {
            from: old_path.to_path_buf(),
            to: new_path.to_path_buf(),
            source,
        };
        if new_path.starts_with(old_path) {
            return Err(failed(io::Error::new(
                io::ErrorKind::InvalidInput,
                "destination is inside the directory being moved",
            )));
        }

        let work_dir = self.work_directory(old_path, depth);
        let new_name = new_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let staging = tempfile::Builder::new()
            .prefix(".tmp.")
            .suffix(&format!(".{}", new_name))
            .tempdir_in(&work_dir)
            .map_err(failed)?;

        let mut guard = StagingGuard::new(&self.fs, staging, old_path, new_path);

        self.fs
            .rename(old_path, &guard.previous)
            .map_err(failed)?;
        guard.moved_previous = true;

        if new_path.symlink_metadata().is_ok() {
            self.fs.rename(new_path, &guard.existed).map_err(failed)?;
            guard.moved_existed = true;
        }

        if let Some(parent) = new_path.parent() {
            self.fs.create_dir_all(parent).map_err(failed)?;
        }
        self.fs.rename(&guard.previous, new_path).map_err(failed)?;
        guard.committed = true;

        tracing::info!("Relocated source directory");

        let merge = if guard.moved_existed {
            Some(self.merge_existed(&mut guard, new_path))
        } else {
            None
        };

        Ok(RelocationOutcome {
            from: old_path.to_path_buf(),
            to: new_path.to_path_buf(),
            merge,
        })
    }

    /// Ancestor `depth` levels above `old_path`, never above the download root.
    fn work_directory(&self, old_path: &Path, depth: usize) -> PathBuf {
        let mut dir = old_path.to_path_buf();
        for _ in 0..depth.max(1) {
            if self.resolver.is_root(&dir) {
                break;
            }
            match dir.parent() {
                Some(parent) => dir = parent.to_path_buf(),
                None => break,
            }
        }
        dir
    }

    fn merge_existed(&self, guard: &mut StagingGuard<'_, F>, new_path: &Path) -> MergeReport {
        let mut report = MergeReport::default();
        let existed = guard.existed.clone();

        if !existed.is_dir() {
            let name = new_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let target = unused_name(new_path, &format!("{}-{}", EXISTED_HIDDEN, name));
            match self.fs.rename(&existed, &target) {
                Ok(()) => {
                    tracing::warn!(path = %target.display(), "Moved aside non-directory found at destination");
                    report.set_aside = Some(target);
                }
                Err(error) => {
                    tracing::error!(error = %error, path = %existed.display(), "Failed to move aside content found at destination");
                    report.stranded = guard.keep_staging();
                }
            }
            return report;
        }

        let hidden = unused_name(new_path, EXISTED_HIDDEN);
        if let Err(error) = self.fs.rename(&existed, &hidden) {
            tracing::error!(error = %error, path = %existed.display(), "Failed to move existing directory into destination");
            report.stranded = guard.keep_staging();
            return report;
        }

        let entries = match std::fs::read_dir(&hidden) {
            Ok(entries) => entries.filter_map(Result::ok).map(|e| e.file_name()).collect(),
            Err(error) => {
                tracing::error!(error = %error, path = %hidden.display(), "Failed to list existing directory");
                Vec::<OsString>::new()
            }
        };

        for name in entries {
            let from = hidden.join(&name);
            let to = new_path.join(&name);
            if to.symlink_metadata().is_ok() {
                tracing::warn!(path = %from.display(), "Name already taken in destination, leaving in place");
                report.conflicts.push(from);
                continue;
            }
            match self.fs.rename(&from, &to) {
                Ok(()) => report.migrated.push(to),
                Err(error) => {
                    tracing::warn!(error = %error, path = %from.display(), "Failed to migrate entry");
                    report.conflicts.push(from);
                }
            }
        }

        if report.conflicts.is_empty() {
            if let Err(error) = self.fs.remove_dir(&hidden) {
                tracing::warn!(error = %error, path = %hidden.display(), "Failed to remove merged directory");
            }
        }
        report
    }
}

/// `dir/name`, or `dir/name-N` for the first `N` that is free.
fn unused_name(dir: &Path, name: &str) -> PathBuf {
    let candidate = dir.join(name);
    if candidate.symlink_metadata().is_err() {
        return candidate;
    }
    (1..)
        .map(|n| dir.join(format!("{}-{}", name, n)))
        .find(|p| p.symlink_metadata().is_err())
        .unwrap_or(candidate)
}

/// Owns the staging directory for one relocation and undoes partial moves
/// when dropped before `committed` is set.
struct StagingGuard<'a, F: FileOps> {
    fs: &'a F,
    staging: Option<TempDir>,
    old_path: PathBuf,
    new_path: PathBuf,
    previous: PathBuf,
    existed: PathBuf,
    moved_previous: bool,
    moved_existed: bool,
    committed: bool,
}

impl<'a, F: FileOps> StagingGuard<'a, F> {
    fn new(fs: &'a F, staging: TempDir, old_path: &Path, new_path: &Path) -> Self {
        let previous = staging.path().join(PREVIOUS);
        let existed = staging.path().join(EXISTED);
        Self {
            fs,
            staging: Some(staging),
            old_path: old_path.to_path_buf(),
            new_path: new_path.to_path_buf(),
            previous,
            existed,
            moved_previous: false,
            moved_existed: false,
            committed: false,
        }
    }

    /// Leave the staging directory on disk instead of deleting it.
    fn keep_staging(&mut self) -> Option<PathBuf> {
        let kept = self.staging.take().map(TempDir::keep)?;
        tracing::error!(path = %kept.display(), "Staging directory kept to avoid data loss");
        Some(kept)
    }

    fn rollback(&mut self) {
        let mut restored = true;
        if self.moved_previous {
            if let Err(error) = self.fs.rename(&self.previous, &self.old_path) {
                tracing::error!(error = %error, path = %self.old_path.display(), "Failed to restore source directory");
                restored = false;
            }
        }
        if self.moved_existed {
            if let Err(error) = self.fs.rename(&self.existed, &self.new_path) {
                tracing::error!(error = %error, path = %self.new_path.display(), "Failed to restore destination content");
                restored = false;
            }
        }
        if restored {
            tracing::warn!(path = %self.old_path.display(), "Relocation rolled back");
        } else {
            self.keep_staging();
        }
    }
}

impl<F: FileOps> Drop for StagingGuard<'_, F> {
    fn drop(&mut self) {
        if !self.committed {
            self.rollback();
        }
    }
}
