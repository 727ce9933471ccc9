//! Operator commands over the download root and the task table.
//!
//! Each command returns a serializable report; `main` prints it as JSON.

use std::path::{Path, PathBuf};

use anyhow::Context;
use chansync_core::models::SourceKind;
use chansync_storage::{ArtifactSweeper, DirectoryRelocator, PathResolver, RelocationOutcome, SweepReport};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ResolveReport {
    pub path: PathBuf,
    pub exists: bool,
}

#[derive(Debug, Serialize)]
pub struct RelocateReport {
    pub from: PathBuf,
    pub to: PathBuf,
    pub migrated: Vec<PathBuf>,
    pub conflicts: Vec<PathBuf>,
    pub set_aside: Option<PathBuf>,
    pub stranded: Option<PathBuf>,
}

impl From<RelocationOutcome> for RelocateReport {
    fn from(outcome: RelocationOutcome) -> Self {
        let merge = outcome.merge.unwrap_or_default();
        Self {
            from: outcome.from,
            to: outcome.to,
            migrated: merge.migrated,
            conflicts: merge.conflicts,
            set_aside: merge.set_aside,
            stranded: merge.stranded,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SweepSummary {
    pub removed: Vec<PathBuf>,
    pub failed: Vec<PathBuf>,
}

impl From<SweepReport> for SweepSummary {
    fn from(report: SweepReport) -> Self {
        Self {
            removed: report.removed,
            failed: report.failed,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PruneReport {
    pub older_than_days: i32,
    pub deleted: u64,
}

pub fn source_kind(audio: bool) -> SourceKind {
    if audio {
        SourceKind::Audio
    } else {
        SourceKind::Video
    }
}

pub fn resolve(resolver: &PathResolver, kind: SourceKind, directory: &str) -> anyhow::Result<ResolveReport> {
    let path = resolver
        .resolve_dir(kind, directory, false)
        .with_context(|| format!("Failed to resolve source directory {:?}", directory))?;
    Ok(ResolveReport {
        exists: path.is_dir(),
        path,
    })
}

pub fn relocate(
    resolver: &PathResolver,
    kind: SourceKind,
    from: &str,
    to: &str,
) -> anyhow::Result<RelocateReport> {
    let old_path = resolver.resolve_dir(kind, from, true)?;
    let new_path = resolver.resolve_dir(kind, to, false)?;
    let outcome = DirectoryRelocator::new(resolver.clone())
        .relocate_paths(&old_path, &new_path, PathResolver::depth_of(from))
        .with_context(|| format!("Failed to move {:?} to {:?}", from, to))?;
    Ok(outcome.into())
}

pub fn sweep(media_file: &Path) -> SweepSummary {
    ArtifactSweeper::new().sweep(media_file).into()
}

pub fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    let out = serde_json::to_string_pretty(value).context("Serialize report")?;
    println!("{}", out);
    Ok(())
}

/// Initialize tracing for the CLI binary.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("chansync=info")),
        )
        .init();
}
