//! Media lifecycle hooks.

use std::path::{Path, PathBuf};

use chansync_core::models::{
    DownloadMediaFilePayload, Media, Priority, Source, TaskKind, METADATA_DELETED_MARKER,
    METADATA_SITE_FIELD, METADATA_THUMBNAIL_FIELD,
};
use chansync_core::{DedupePolicy, MediaUpdate, ScheduleOutcome, ScheduledAction};
use chansync_storage::{ArtifactSweeper, SweepReport};
use serde_json::{json, Value as JsonValue};
use uuid::Uuid;

use crate::error::{ReconcileError, ReconcileResult};
use crate::folder::{FoldOutcome, MetadataFolder};
use crate::reconciler::{blocking, Reconciler};
use crate::tasks::{DiskState, PendingWork, TaskReconciler};

/// Sidecars removed with the media file on a redownload.
const REDOWNLOAD_SIDECARS: &[&str] = &["jpg", "nfo"];

/// What the save hook did.
#[derive(Debug, Default)]
pub struct MediaReport {
    pub update: MediaUpdate,
    pub outcomes: Vec<ScheduleOutcome>,
}

/// What the post-delete hook did.
#[derive(Debug, Default)]
pub struct DeletionReport {
    pub sweep: Option<SweepReport>,
    pub placeholder: Option<Media>,
    pub fold: Option<FoldOutcome>,
}

impl Reconciler {
    /// Derive and enqueue the work implied by a saved media item.
    #[tracing::instrument(skip(self, media), fields(media_id = %media.id, key = %media.key))]
    pub async fn media_saved(&self, media: &Media) -> ReconcileResult<MediaReport> {
        if media.manual_skip {
            return Ok(MediaReport::default());
        }
        let Some(source) = self.owning_source(media).await? else {
            tracing::debug!("Media has no source, nothing to reconcile");
            return Ok(MediaReport::default());
        };

        let pending = self.pending_work(media.id).await?;
        let disk = self.disk_state(media, &source).await?;
        let plan = TaskReconciler::new(self.policy.as_ref())
            .with_download_delay(self.config.download_media_delay_secs())
            .plan_media(media, &source, &pending, &disk)?;

        if !plan.update.is_empty() {
            self.media.update_fields(media.id, &plan.update).await?;
            tracing::debug!(update = ?plan.update, "Updated media flags");
        }

        let mut outcomes = Vec::with_capacity(plan.actions.len());
        for action in plan.actions {
            outcomes.push(self.schedule(action).await?);
        }

        Ok(MediaReport {
            update: plan.update,
            outcomes,
        })
    }

    /// The media item is about to be deleted: drop its cached thumbnail,
    /// keep the site and thumbnail URL in its metadata and make it inert.
    #[tracing::instrument(skip(self, media), fields(media_id = %media.id, key = %media.key))]
    pub async fn media_deleting(&self, media: &mut Media) -> ReconcileResult<()> {
        if let Some(thumb) = media.thumb.take().filter(|t| !t.is_empty()) {
            let path = self.absolute(&thumb);
            let report = blocking(move || ArtifactSweeper::new().remove_all(&[path])).await?;
            if !report.is_clean() {
                tracing::warn!(failed = ?report.failed, "Failed to remove thumbnail");
            }
        }

        let site = media.site();
        let thumbnail = media.thumbnail_url().map(JsonValue::String).unwrap_or(JsonValue::Null);
        media.update_metadata_object(|metadata| {
            metadata.insert(METADATA_SITE_FIELD.to_string(), JsonValue::String(site));
            metadata.insert(METADATA_THUMBNAIL_FIELD.to_string(), thumbnail);
        });
        media.manual_skip = true;

        let update = MediaUpdate {
            thumb: Some(None),
            metadata: Some(media.metadata.clone()),
            manual_skip: Some(true),
            ..Default::default()
        };
        self.media.update_fields(media.id, &update).await?;
        Ok(())
    }

    /// The media row is gone: sweep its files when the source asks for it,
    /// then recreate an inert placeholder and fold orphaned metadata into it.
    #[tracing::instrument(skip(self, media), fields(media_id = %media.id, key = %media.key))]
    pub async fn media_deleted(&self, media: &Media) -> ReconcileResult<DeletionReport> {
        let mut report = DeletionReport::default();
        let source = self.owning_source(media).await?;

        let media_file = media.media_file.as_deref().filter(|f| !f.is_empty());
        if let (Some(source), Some(file), true) = (&source, media_file, media.downloaded) {
            if source.delete_files_on_disk {
                let path = self.absolute(file);
                tracing::info!(path = %path.display(), "Deleting files for media");
                report.sweep = Some(blocking(move || ArtifactSweeper::new().sweep(&path)).await?);
            }
        }

        if media.skip && media.manual_skip {
            return Ok(report);
        }

        let (placeholder, created) = self.media.get_or_create(media.source_id, &media.key).await?;
        if !created {
            tracing::debug!(placeholder_id = %placeholder.id, "Media row already recreated");
            report.placeholder = Some(placeholder);
            return Ok(report);
        }

        let site = media.metadata_str(METADATA_SITE_FIELD).map(str::to_string);
        let update = MediaUpdate {
            downloaded: Some(false),
            duration: Some(media.duration),
            metadata: Some(Some(json!({
                METADATA_DELETED_MARKER: true,
                METADATA_SITE_FIELD: site,
                METADATA_THUMBNAIL_FIELD: media.thumbnail_url(),
            }))),
            published: Some(media.published),
            title: Some(media.title.clone()),
            skip: Some(true),
            manual_skip: Some(true),
            ..Default::default()
        };
        self.media.update_fields(placeholder.id, &update).await?;
        let mut placeholder = placeholder;
        update.apply_to(&mut placeholder);
        tracing::info!(placeholder_id = %placeholder.id, "Recreated media for indexing");

        let folder = MetadataFolder::new(self.metadata.as_ref());
        report.fold = Some(folder.fold(placeholder.id, &media.site(), &placeholder.key).await?);
        report.placeholder = Some(placeholder);
        Ok(report)
    }

    /// Throw away a media item's files and download state so it is fetched
    /// again. A previously downloadable item gets a forced download.
    #[tracing::instrument(skip(self, media), fields(media_id = %media.id, key = %media.key))]
    pub async fn reset_for_redownload(&self, media: &Media) -> ReconcileResult<MediaReport> {
        let mut doomed: Vec<PathBuf> = Vec::new();
        if let Some(thumb) = media.thumb.as_deref().filter(|t| !t.is_empty()) {
            doomed.push(self.absolute(thumb));
        }
        if let Some(file) = media.media_file.as_deref().filter(|f| !f.is_empty()) {
            let path = self.absolute(file);
            let base = chansync_storage::sweep::artifact_base(&path);
            for suffix in REDOWNLOAD_SIDECARS {
                doomed.push(PathBuf::from(format!("{}.{}", base.display(), suffix)));
            }
            doomed.push(path);
        }
        if !doomed.is_empty() {
            let removed = blocking(move || ArtifactSweeper::new().remove_all(&doomed)).await?;
            tracing::info!(removed = removed.removed.len(), "Removed files for redownload");
        }

        let update = MediaUpdate {
            thumb: Some(None),
            media_file: Some(None),
            downloaded: Some(false),
            skip: Some(false),
            manual_skip: Some(false),
            ..Default::default()
        };
        self.media.update_fields(media.id, &update).await?;
        let mut reset = media.clone();
        update.apply_to(&mut reset);

        let mut forced = Vec::new();
        if reset.can_download {
            let action = ScheduledAction::new(&DownloadMediaFilePayload {
                media_id: reset.id,
                override_existing: true,
            })?
            .dedupe_on_subject(DedupePolicy::ReplacePending)
            .priority(Priority::High)
            .label(format!("Downloading media for \"{}\"", reset.name()));
            forced.push(self.schedule(action).await?);
        }

        let mut report = self.media_saved(&reset).await?;
        forced.append(&mut report.outcomes);
        report.outcomes = forced;
        Ok(report)
    }

    async fn owning_source(&self, media: &Media) -> ReconcileResult<Option<Source>> {
        let Some(source_id) = media.source_id else {
            return Ok(None);
        };
        match self.sources.get(source_id).await {
            Ok(source) => Ok(Some(source)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn pending_work(&self, media_id: Uuid) -> ReconcileResult<PendingWork> {
        Ok(PendingWork {
            download: self.is_pending(TaskKind::DownloadMediaFile, media_id).await?,
            metadata: self.is_pending(TaskKind::DownloadMediaMetadata, media_id).await?,
            thumbnail: self.is_pending(TaskKind::DownloadMediaThumbnail, media_id).await?,
        })
    }

    async fn is_pending(&self, kind: TaskKind, media_id: Uuid) -> ReconcileResult<bool> {
        let found = self
            .queue
            .pending(kind, media_id)
            .await
            .map_err(ReconcileError::Queue)?;
        Ok(found.is_some())
    }

    async fn disk_state(&self, media: &Media, source: &Source) -> ReconcileResult<DiskState> {
        let expected = self.policy.expected_file_path(media, source);
        let thumb = media.thumb.clone().filter(|t| !t.is_empty()).map(|t| self.absolute(&t));
        let file = media.media_file.clone().filter(|f| !f.is_empty()).map(|f| self.absolute(&f));
        blocking(move || DiskState {
            thumb_exists: thumb.map(|p| p.is_file()).unwrap_or(false),
            media_file_exists: file.map(|p| p.is_file()).unwrap_or(false)
                || expected.map(|p| p.exists()).unwrap_or(false),
        })
        .await
    }

    /// Stored file references may be relative to the download root.
    fn absolute(&self, stored: &str) -> PathBuf {
        let path = Path::new(stored);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.resolver.download_root().join(path)
        }
    }
}
