//! Source lifecycle hooks.

use chansync_core::models::{
    DeleteAllMediaForSourcePayload, DownloadSourceImagesPayload,
    IndexSourcePayload, SaveAllMediaForSourcePayload, Source, TaskKind,
};
use chansync_core::{DedupePolicy, ScheduleOutcome, ScheduledAction};
use chansync_storage::{DirectoryRelocator, RelocationOutcome};
use chrono::Utc;

use crate::error::{ReconcileError, ReconcileResult};
use crate::event::AfterCommit;
use crate::reconciler::{blocking, Reconciler};

impl Reconciler {
    /// A new source was saved: create its directory, fetch channel images
    /// when enabled and schedule the first indexing run.
    #[tracing::instrument(skip(self, source), fields(source_id = %source.id, source = %source.name))]
    pub async fn source_created(&self, source: &Source) -> ReconcileResult<Vec<ScheduleOutcome>> {
        self.check_source_directory(source).await?;

        let mut outcomes = Vec::new();
        if source.copy_channel_images {
            outcomes.push(self.schedule(images_action(source)?).await?);
        }
        if source.is_active {
            tracing::info!("Scheduling first media indexing");
            let action = ScheduledAction::new(&IndexSourcePayload {
                source_id: source.id,
            })?
            .dedupe_on_subject(DedupePolicy::ReplacePending)
            .delay_secs(self.config.first_index_delay_secs)
            .label(format!("Index media from source \"{}\"", source.name));
            outcomes.push(self.schedule(action).await?);
        }
        Ok(outcomes)
    }

    /// An existing source is about to be saved with new values. Moves the
    /// directory when its resolved path changes; an error here means the
    /// save must not go ahead.
    #[tracing::instrument(skip(self, existing, incoming), fields(source_id = %existing.id))]
    pub async fn source_updating(
        &self,
        existing: &Source,
        incoming: &Source,
    ) -> ReconcileResult<Option<RelocationOutcome>> {
        self.check_source_directory(existing).await?;

        let resolver = self.resolver.clone();
        let (previous, updated) = (existing.clone(), incoming.clone());
        let relocation = blocking(move || {
            DirectoryRelocator::new(resolver).relocate(&previous, &updated)
        })
        .await?
        .map_err(|e| {
            tracing::error!(error = %e, "Source directory relocation failed");
            ReconcileError::from(e)
        })?;

        // The move is already on disk, so the save has to go ahead even when
        // the follow-up work cannot be queued.
        match self.schedule_update_follow_ups(existing, incoming).await {
            Ok(()) => {}
            Err(e) if relocation.is_some() => {
                tracing::error!(error = %e, "Failed to schedule work after moving source directory");
            }
            Err(e) => return Err(e),
        }

        Ok(relocation)
    }

    async fn schedule_update_follow_ups(
        &self,
        existing: &Source,
        incoming: &Source,
    ) -> ReconcileResult<()> {
        if incoming.copy_channel_images && !existing.copy_channel_images {
            self.schedule(images_action(incoming)?).await?;
        }
        if incoming.index_settings_changed(existing) {
            self.reschedule_indexing(incoming).await?;
        }
        Ok(())
    }

    /// Every save re-checks all media of the source.
    #[tracing::instrument(skip(self, source), fields(source_id = %source.id))]
    pub async fn source_saved(&self, source: &Source) -> ReconcileResult<ScheduleOutcome> {
        let action = ScheduledAction::new(&SaveAllMediaForSourcePayload {
            source_id: source.id,
        })?
        .dedupe_on_subject(DedupePolicy::ReplacePending)
        .label(format!("Checking all media for \"{}\"", source.name));
        self.schedule(action).await
    }

    /// The source is about to be deleted: stop its scheduling now and defer
    /// the media cascade until the deletion commits.
    #[tracing::instrument(skip(self, source, after_commit), fields(source_id = %source.id))]
    pub async fn source_deleting(
        &self,
        source: &mut Source,
        after_commit: &mut AfterCommit,
    ) -> ReconcileResult<()> {
        tracing::info!(source = %source.name, "Deactivating source");
        source.deactivate();
        self.sources
            .set_active(source.id, source.is_active, source.index_schedule)
            .await?;
        self.queue
            .cancel_pending(TaskKind::IndexSource, source.id)
            .await
            .map_err(ReconcileError::Queue)?;

        let directory_path = self.resolver.resolve(source, false)?;
        let action = ScheduledAction::new(&DeleteAllMediaForSourcePayload {
            source_id: source.id,
            source_name: source.name.clone(),
            directory_path: directory_path.display().to_string(),
            delete_files_on_disk: source.delete_files_on_disk,
        })?
        .dedupe_on_subject(DedupePolicy::SkipIfPending)
        .label(format!("Deleting all media for source \"{}\"", source.name));
        after_commit.defer(action);
        Ok(())
    }

    /// Recreate the indexing action at the next run on the schedule grid, or
    /// cancel it when indexing is disabled.
    async fn reschedule_indexing(&self, source: &Source) -> ReconcileResult<()> {
        match source.next_index_run(Utc::now()) {
            Some(eta) => {
                let action = ScheduledAction::new(&IndexSourcePayload {
                    source_id: source.id,
                })?
                .dedupe_on_subject(DedupePolicy::ReplacePending)
                .eta(eta)
                .label(format!("Index media from source \"{}\"", source.name));
                self.schedule(action).await?;
            }
            None => {
                let cancelled = self
                    .queue
                    .cancel_pending(TaskKind::IndexSource, source.id)
                    .await
                    .map_err(ReconcileError::Queue)?;
                tracing::info!(cancelled = cancelled, "Indexing disabled for source");
            }
        }
        Ok(())
    }

    /// The local form of the directory check action: create it if missing.
    async fn check_source_directory(&self, source: &Source) -> ReconcileResult<()> {
        let resolver = self.resolver.clone();
        let source = source.clone();
        let path = blocking(move || resolver.ensure_directory(&source)).await??;
        tracing::debug!(path = %path.display(), "Source directory present");
        Ok(())
    }
}

fn images_action(source: &Source) -> ReconcileResult<ScheduledAction> {
    Ok(ScheduledAction::new(&DownloadSourceImagesPayload {
        source_id: source.id,
    })?
    .label(format!("Downloading images for \"{}\"", source.name)))
}
