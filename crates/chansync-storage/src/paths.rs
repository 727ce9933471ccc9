use std::env;
use std::path::{Component, Path, PathBuf};

use chansync_core::models::{Source, SourceKind};
use chansync_core::Config;

use crate::error::{StorageError, StorageResult};

/// Computes source directories below the download root.
#[derive(Debug, Clone)]
pub struct PathResolver {
    root: PathBuf,
    prefix: bool,
    video_dir: String,
    audio_dir: String,
}

impl PathResolver {
    /// Resolver with kind prefixes enabled and the default `video`/`audio` names.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let defaults = Config::default();
        Self {
            root: root.into(),
            prefix: defaults.source_directory_prefix,
            video_dir: defaults.download_video_dir,
            audio_dir: defaults.download_audio_dir,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            root: config.download_root.clone(),
            prefix: config.source_directory_prefix,
            video_dir: config.download_video_dir.clone(),
            audio_dir: config.download_audio_dir.clone(),
        }
    }

    pub fn with_prefix(mut self, enabled: bool) -> Self {
        self.prefix = enabled;
        self
    }

    pub fn download_root(&self) -> &Path {
        &self.root
    }

    /// Path of the source directory relative to the download root.
    pub fn relative_path(&self, source: &Source) -> PathBuf {
        self.relative_dir(source.kind, &source.directory)
    }

    /// Number of components in the source's `directory` field.
    pub fn directory_depth(&self, source: &Source) -> usize {
        Self::depth_of(&source.directory)
    }

    pub fn depth_of(directory: &str) -> usize {
        Path::new(directory)
            .components()
            .filter(|c| matches!(c, Component::Normal(_)))
            .count()
    }

    /// Absolute directory of `source`. With `strict` the directory must exist.
    pub fn resolve(&self, source: &Source, strict: bool) -> StorageResult<PathBuf> {
        self.resolve_dir(source.kind, &source.directory, strict)
    }

    pub fn resolve_dir(
        &self,
        kind: SourceKind,
        directory: &str,
        strict: bool,
    ) -> StorageResult<PathBuf> {
        let relative = self.relative_dir(kind, directory);
        let escapes = Path::new(directory)
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        let path = self.root.join(&relative);

        if escapes || !self.is_within_root(&path) {
            return Err(StorageError::OutsideRoot {
                path,
                root: self.root.clone(),
            });
        }
        if strict && !path.is_dir() {
            return Err(StorageError::PathNotFound { path });
        }
        Ok(path)
    }

    /// True when `path` is the root or a descendant of it once symlinks in
    /// the existing part of the path are resolved.
    pub fn is_within_root(&self, path: &Path) -> bool {
        let root = resolve_existing(&self.root);
        resolve_existing(path).starts_with(root)
    }

    /// True when `path` is exactly the download root.
    pub fn is_root(&self, path: &Path) -> bool {
        resolve_existing(path) == resolve_existing(&self.root)
    }

    /// Create the source directory if it is missing.
    pub fn ensure_directory(&self, source: &Source) -> StorageResult<PathBuf> {
        let path = self.resolve(source, false)?;
        if !path.is_dir() {
            std::fs::create_dir_all(&path)?;
            tracing::info!(path = %path.display(), source = %source.name, "Created source directory");
        }
        Ok(path)
    }

    fn relative_dir(&self, kind: SourceKind, directory: &str) -> PathBuf {
        let mut relative = PathBuf::new();
        if self.prefix {
            relative.push(match kind {
                SourceKind::Video => &self.video_dir,
                SourceKind::Audio => &self.audio_dir,
            });
        }
        relative.push(directory);
        relative
    }
}

/// Absolute, `..`-free form of `path`.
fn normalize(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };

    let mut out = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Canonicalize the longest existing ancestor of `path` and re-append the rest.
fn resolve_existing(path: &Path) -> PathBuf {
    let normalized = normalize(path);
    let mut existing = normalized.as_path();
    let mut missing = Vec::new();

    loop {
        if let Ok(canonical) = existing.canonicalize() {
            let mut out = canonical;
            for name in missing.iter().rev() {
                out.push(name);
            }
            return out;
        }
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                missing.push(name.to_os_string());
                existing = parent;
            }
            _ => return normalized,
        }
    }
}
