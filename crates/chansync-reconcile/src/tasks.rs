//! Derivation of background work from a media item's state.
//!
//! [`TaskReconciler::plan_media`] is pure: it takes the stored record, what
//! is already pending and what is on disk, and returns the flag changes to
//! write back plus the actions to enqueue.

use chansync_core::models::{
    DownloadMediaFilePayload, DownloadMediaMetadataPayload, DownloadMediaThumbnailPayload, Media,
    Source,
};
use chansync_core::{DedupePolicy, MediaUpdate, ScheduledAction};

use crate::policy::MediaPolicy;

/// Which media actions already wait in the queue.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PendingWork {
    pub download: bool,
    pub metadata: bool,
    pub thumbnail: bool,
}

/// What the filesystem says about a media item's files.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DiskState {
    pub thumb_exists: bool,
    /// The stored file reference or the expected download path exists.
    pub media_file_exists: bool,
}

#[derive(Debug, Default)]
pub struct MediaPlan {
    /// Direct field update; applying it must not re-enter the save hook.
    pub update: MediaUpdate,
    pub actions: Vec<ScheduledAction>,
}

impl MediaPlan {
    pub fn is_empty(&self) -> bool {
        self.update.is_empty() && self.actions.is_empty()
    }
}

pub struct TaskReconciler<'a> {
    policy: &'a dyn MediaPolicy,
    download_delay_secs: i64,
}

impl<'a> TaskReconciler<'a> {
    pub fn new(policy: &'a dyn MediaPolicy) -> Self {
        Self {
            policy,
            download_delay_secs: 0,
        }
    }

    /// Hold new file downloads back by `secs`.
    pub fn with_download_delay(mut self, secs: i64) -> Self {
        self.download_delay_secs = secs;
        self
    }

    pub fn plan_media(
        &self,
        media: &Media,
        source: &Source,
        pending: &PendingWork,
        disk: &DiskState,
    ) -> Result<MediaPlan, serde_json::Error> {
        let mut plan = MediaPlan::default();
        if media.manual_skip {
            return Ok(plan);
        }

        let mut next = media.clone();
        let mut downloaded = next.downloaded;

        // A pending download means the decision was already made.
        if !next.downloaded && !pending.download {
            if next.has_metadata() {
                next.can_download = self.policy.format_for(&next, source).is_some();
            }
            self.policy.apply_filters(&mut next, source);
        }

        if !(next.skip || next.has_metadata() || pending.metadata) {
            let action = ScheduledAction::new(&DownloadMediaMetadataPayload { media_id: next.id })?
                .dedupe_on_subject(DedupePolicy::SkipIfPending)
                .label(format!(
                    "Downloading metadata for: {}: \"{}\"",
                    next.key,
                    next.name()
                ));
            plan.actions.push(action);
        }

        if !disk.thumb_exists {
            next.thumb = None;
        }
        if !(next.skip || next.thumb.is_some() || pending.thumbnail) {
            if let Some(url) = next.thumbnail_url() {
                let action = ScheduledAction::new(&DownloadMediaThumbnailPayload {
                    media_id: next.id,
                    url,
                })?
                .label(format!("Downloading thumbnail for \"{}\"", next.name()));
                plan.actions.push(action);
            }
        }

        if !(disk.media_file_exists || pending.download) {
            // Downloaded once and the file has since vanished: never retry.
            if next.can_download && next.downloaded {
                next.skip = true;
            }
            downloaded = false;
        }

        if source.download_media
            && next.can_download
            && !(next.skip || downloaded || pending.download)
        {
            let mut action = ScheduledAction::new(&DownloadMediaFilePayload {
                media_id: next.id,
                override_existing: false,
            })?
            .dedupe_on_subject(DedupePolicy::SkipIfPending)
            .label(format!("Downloading media for \"{}\"", next.name()));
            if self.download_delay_secs > 0 {
                action = action.delay_secs(self.download_delay_secs);
            }
            plan.actions.push(action);
        }

        let diff = MediaUpdate::diff(media, &next);
        plan.update = MediaUpdate {
            can_download: diff.can_download,
            skip: diff.skip,
            thumb: diff.thumb,
            ..Default::default()
        };
        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chansync_core::models::{IndexSchedule, SourceKind, TaskKind};
    use chrono::Utc;
    use serde_json::json;
    use std::path::PathBuf;
    use uuid::Uuid;

    struct Policy {
        format: Option<&'static str>,
    }

    impl MediaPolicy for Policy {
        fn format_for(&self, _media: &Media, _source: &Source) -> Option<String> {
            self.format.map(str::to_string)
        }

        fn apply_filters(&self, _media: &mut Media, _source: &Source) -> bool {
            false
        }

        fn expected_file_path(&self, _media: &Media, _source: &Source) -> Option<PathBuf> {
            None
        }
    }

    fn source() -> Source {
        Source {
            id: Uuid::new_v4(),
            kind: SourceKind::Video,
            key: "UC1".to_string(),
            name: "Channel".to_string(),
            directory: "channel".to_string(),
            index_schedule: IndexSchedule::EveryDay,
            target_schedule: Utc::now(),
            copy_channel_images: false,
            is_active: true,
            download_media: true,
            delete_files_on_disk: false,
            created_at: Utc::now(),
        }
    }

    fn kinds(plan: &MediaPlan) -> Vec<TaskKind> {
        plan.actions.iter().map(|a| a.kind).collect()
    }

    #[test]
    fn new_media_without_metadata_fetches_metadata() {
        let src = source();
        let media = Media::new(Some(src.id), "vid1");
        let policy = Policy { format: Some("best") };

        let plan = TaskReconciler::new(&policy)
            .plan_media(&media, &src, &PendingWork::default(), &DiskState::default())
            .unwrap();

        assert_eq!(kinds(&plan), vec![TaskKind::DownloadMediaMetadata]);
        assert!(plan.update.is_empty());
    }

    #[test]
    fn metadata_with_format_enables_download() {
        let src = source();
        let mut media = Media::new(Some(src.id), "vid1");
        media.metadata = Some(json!({ "title": "x", "thumbnail": "https://img/x.jpg" }));
        let policy = Policy { format: Some("best") };

        let plan = TaskReconciler::new(&policy)
            .plan_media(&media, &src, &PendingWork::default(), &DiskState::default())
            .unwrap();

        assert_eq!(plan.update.can_download, Some(true));
        assert_eq!(
            kinds(&plan),
            vec![TaskKind::DownloadMediaThumbnail, TaskKind::DownloadMediaFile]
        );
    }

    #[test]
    fn lost_format_disables_download() {
        let src = source();
        let mut media = Media::new(Some(src.id), "vid1");
        media.metadata = Some(json!({ "title": "x" }));
        media.can_download = true;
        let policy = Policy { format: None };

        let plan = TaskReconciler::new(&policy)
            .plan_media(&media, &src, &PendingWork::default(), &DiskState::default())
            .unwrap();

        assert_eq!(plan.update.can_download, Some(false));
        assert!(plan.actions.is_empty());
    }

    #[test]
    fn vanished_file_forces_skip() {
        let src = source();
        let mut media = Media::new(Some(src.id), "vid1");
        media.metadata = Some(json!({ "title": "x" }));
        media.can_download = true;
        media.downloaded = true;
        media.media_file = Some("/gone/vid1.mp4".to_string());
        let policy = Policy { format: Some("best") };

        let plan = TaskReconciler::new(&policy)
            .plan_media(&media, &src, &PendingWork::default(), &DiskState::default())
            .unwrap();

        assert_eq!(plan.update.skip, Some(true));
        assert!(plan.actions.is_empty());
    }

    #[test]
    fn stale_thumb_reference_is_cleared() {
        let src = source();
        let mut media = Media::new(Some(src.id), "vid1");
        media.metadata = Some(json!({ "title": "x" }));
        media.thumb = Some("/gone/thumb.jpg".to_string());
        let policy = Policy { format: None };

        let plan = TaskReconciler::new(&policy)
            .plan_media(&media, &src, &PendingWork::default(), &DiskState::default())
            .unwrap();

        assert_eq!(plan.update.thumb, Some(None));
    }

    #[test]
    fn pending_work_is_not_duplicated() {
        let src = source();
        let mut media = Media::new(Some(src.id), "vid1");
        media.can_download = true;
        let pending = PendingWork {
            download: true,
            metadata: true,
            thumbnail: true,
        };
        let policy = Policy { format: Some("best") };

        let plan = TaskReconciler::new(&policy)
            .plan_media(&media, &src, &pending, &DiskState::default())
            .unwrap();

        assert!(plan.is_empty());
    }

    #[test]
    fn download_delay_sets_eta() {
        let src = source();
        let mut media = Media::new(Some(src.id), "vid1");
        media.metadata = Some(json!({ "title": "x" }));
        let policy = Policy { format: Some("best") };

        let plan = TaskReconciler::new(&policy)
            .with_download_delay(433)
            .plan_media(&media, &src, &PendingWork::default(), &DiskState::default())
            .unwrap();

        let download = plan
            .actions
            .iter()
            .find(|a| a.kind == TaskKind::DownloadMediaFile)
            .unwrap();
        assert!(download.eta.unwrap() > Utc::now() + chrono::Duration::seconds(400));
    }

    #[test]
    fn manual_skip_plans_nothing() {
        let src = source();
        let mut media = Media::new(Some(src.id), "vid1");
        media.manual_skip = true;
        media.can_download = true;
        media.downloaded = true;
        let policy = Policy { format: Some("best") };

        let plan = TaskReconciler::new(&policy)
            .plan_media(&media, &src, &PendingWork::default(), &DiskState::default())
            .unwrap();

        assert!(plan.is_empty());
    }
}
