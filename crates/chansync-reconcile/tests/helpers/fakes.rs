//! In-memory stores and queue standing in for PostgreSQL.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chansync_core::models::{IndexSchedule, Media, Metadata, Source, TaskKind};
use chansync_core::{
    ActionQueue, ActionRef, DedupePolicy, MediaStore, MediaUpdate, MetadataStore,
    ScheduleOutcome, ScheduledAction, SourceStore, StoreError,
};
use chansync_reconcile::MediaPolicy;
use chrono::Utc;
use uuid::Uuid;

#[derive(Default)]
pub struct FakeSources {
    rows: Mutex<HashMap<Uuid, Source>>,
}

impl FakeSources {
    pub fn insert(&self, source: Source) {
        self.rows.lock().unwrap().insert(source.id, source);
    }

    pub fn snapshot(&self, id: Uuid) -> Option<Source> {
        self.rows.lock().unwrap().get(&id).cloned()
    }
}

#[async_trait]
impl SourceStore for FakeSources {
    async fn get(&self, id: Uuid) -> Result<Source, StoreError> {
        self.snapshot(id)
            .ok_or_else(|| StoreError::NotFound(format!("source {}", id)))
    }

    async fn set_active(
        &self,
        id: Uuid,
        is_active: bool,
        index_schedule: IndexSchedule,
    ) -> Result<(), StoreError> {
        let mut rows = self.rows.lock().unwrap();
        let row = rows
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("source {}", id)))?;
        row.is_active = is_active;
        row.index_schedule = index_schedule;
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeMedia {
    rows: Mutex<HashMap<Uuid, Media>>,
    updates: Mutex<Vec<(Uuid, MediaUpdate)>>,
}

impl FakeMedia {
    pub fn insert(&self, media: Media) {
        self.rows.lock().unwrap().insert(media.id, media);
    }

    /// Drop the row, as the persistence layer does between the delete hooks.
    pub fn remove(&self, id: Uuid) -> Option<Media> {
        self.rows.lock().unwrap().remove(&id)
    }

    pub fn snapshot(&self, id: Uuid) -> Option<Media> {
        self.rows.lock().unwrap().get(&id).cloned()
    }

    pub fn find(&self, source_id: Option<Uuid>, key: &str) -> Option<Media> {
        self.rows
            .lock()
            .unwrap()
            .values()
            .find(|m| m.source_id == source_id && m.key == key)
            .cloned()
    }

    pub fn count(&self) -> usize {
        self.rows.lock().unwrap().len()
    }

    pub fn updates_for(&self, id: Uuid) -> Vec<MediaUpdate> {
        self.updates
            .lock()
            .unwrap()
            .iter()
            .filter(|(target, _)| *target == id)
            .map(|(_, update)| update.clone())
            .collect()
    }
}

#[async_trait]
impl MediaStore for FakeMedia {
    async fn get(&self, id: Uuid) -> Result<Media, StoreError> {
        self.snapshot(id)
            .ok_or_else(|| StoreError::NotFound(format!("media {}", id)))
    }

    async fn update_fields(&self, id: Uuid, update: &MediaUpdate) -> Result<(), StoreError> {
        self.updates.lock().unwrap().push((id, update.clone()));
        // Updating a row that is already gone is a no-op, as in SQL.
        if let Some(row) = self.rows.lock().unwrap().get_mut(&id) {
            update.apply_to(row);
        }
        Ok(())
    }

    async fn get_or_create(
        &self,
        source_id: Option<Uuid>,
        key: &str,
    ) -> Result<(Media, bool), StoreError> {
        if let Some(existing) = self.find(source_id, key) {
            return Ok((existing, false));
        }
        let media = Media::new(source_id, key);
        self.insert(media.clone());
        Ok((media, true))
    }
}

#[derive(Default)]
pub struct FakeMetadata {
    rows: Mutex<Vec<Metadata>>,
    conflict_on_fold: AtomicBool,
    fail_attach: AtomicBool,
}

impl FakeMetadata {
    pub fn insert(&self, row: Metadata) {
        self.rows.lock().unwrap().push(row);
    }

    pub fn all(&self) -> Vec<Metadata> {
        self.rows.lock().unwrap().clone()
    }

    pub fn attached_to(&self, media_id: Uuid) -> Vec<Metadata> {
        self.all()
            .into_iter()
            .filter(|m| m.media_id == Some(media_id))
            .collect()
    }

    /// Make the transactional fold report a uniqueness conflict.
    pub fn conflict_on_fold(&self, enabled: bool) {
        self.conflict_on_fold.store(enabled, Ordering::SeqCst);
    }

    pub fn fail_attach(&self, enabled: bool) {
        self.fail_attach.store(enabled, Ordering::SeqCst);
    }
}

#[async_trait]
impl MetadataStore for FakeMetadata {
    async fn find_unattached(&self, site: &str, key: &str) -> Result<Vec<Metadata>, StoreError> {
        Ok(self
            .all()
            .into_iter()
            .filter(|m| m.is_unattached() && m.site == site && m.key == key)
            .collect())
    }

    async fn detach_from_media(&self, media_id: Uuid) -> Result<u64, StoreError> {
        let mut rows = self.rows.lock().unwrap();
        let mut count = 0;
        for row in rows.iter_mut().filter(|m| m.media_id == Some(media_id)) {
            row.media_id = None;
            count += 1;
        }
        Ok(count)
    }

    async fn attach(&self, metadata_id: Uuid, media_id: Uuid) -> Result<(), StoreError> {
        if self.fail_attach.load(Ordering::SeqCst) {
            return Err(StoreError::Conflict("metadata already attached".to_string()));
        }
        let mut rows = self.rows.lock().unwrap();
        let row = rows
            .iter_mut()
            .find(|m| m.id == metadata_id)
            .ok_or_else(|| StoreError::NotFound(format!("metadata {}", metadata_id)))?;
        row.media_id = Some(media_id);
        Ok(())
    }

    async fn delete(&self, ids: &[Uuid]) -> Result<u64, StoreError> {
        let mut rows = self.rows.lock().unwrap();
        let before = rows.len();
        rows.retain(|m| !ids.contains(&m.id));
        Ok((before - rows.len()) as u64)
    }

    async fn fold_atomic(
        &self,
        media_id: Uuid,
        keep: Uuid,
        discard: &[Uuid],
    ) -> Result<(), StoreError> {
        if self.conflict_on_fold.load(Ordering::SeqCst) {
            return Err(StoreError::Conflict("metadata_media_site_key".to_string()));
        }
        let mut rows = self.rows.lock().unwrap();
        for row in rows.iter_mut().filter(|m| m.media_id == Some(media_id)) {
            row.media_id = None;
        }
        if let Some(row) = rows.iter_mut().find(|m| m.id == keep) {
            row.media_id = Some(media_id);
        }
        rows.retain(|m| !discard.contains(&m.id));
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct QueuedAction {
    pub action: ActionRef,
    pub priority: i32,
    pub payload: serde_json::Value,
    pub cancelled: bool,
}

/// Queue with the same deduplication rules as the task table.
#[derive(Default)]
pub struct FakeQueue {
    entries: Mutex<Vec<QueuedAction>>,
    fail_schedule: AtomicBool,
}

impl FakeQueue {
    /// Make every `schedule` call fail as if the task table were unreachable.
    pub fn fail_schedule(&self, enabled: bool) {
        self.fail_schedule.store(enabled, Ordering::SeqCst);
    }

    pub fn waiting(&self, kind: TaskKind) -> Vec<QueuedAction> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .filter(|e| !e.cancelled && e.action.kind == kind)
            .cloned()
            .collect()
    }

    pub fn waiting_for(&self, kind: TaskKind, subject_id: Uuid) -> Vec<QueuedAction> {
        self.waiting(kind)
            .into_iter()
            .filter(|e| e.action.subject_id == Some(subject_id))
            .collect()
    }

    pub fn cancelled(&self, kind: TaskKind) -> usize {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.cancelled && e.action.kind == kind)
            .count()
    }

    pub fn total_waiting(&self) -> usize {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .filter(|e| !e.cancelled)
            .count()
    }
}

#[async_trait]
impl ActionQueue for FakeQueue {
    async fn pending(
        &self,
        kind: TaskKind,
        subject_id: Uuid,
    ) -> anyhow::Result<Option<ActionRef>> {
        Ok(self
            .waiting_for(kind, subject_id)
            .into_iter()
            .map(|e| e.action)
            .min_by_key(|a| a.scheduled_at))
    }

    async fn schedule(&self, action: ScheduledAction) -> anyhow::Result<ScheduleOutcome> {
        if self.fail_schedule.load(Ordering::SeqCst) {
            anyhow::bail!("task queue unavailable");
        }
        let mut entries = self.entries.lock().unwrap();
        let same_key = |e: &QueuedAction| {
            !e.cancelled
                && e.action.kind == action.kind
                && action.dedupe_key.is_some()
                && e.action.dedupe_key == action.dedupe_key
        };

        let mut replaced = false;
        match action.policy {
            DedupePolicy::Always => {}
            DedupePolicy::SkipIfPending => {
                if let Some(existing) = entries.iter().find(|e| same_key(e)) {
                    return Ok(ScheduleOutcome::DuplicateSuppressed(existing.action.clone()));
                }
            }
            DedupePolicy::ReplacePending => {
                for entry in entries.iter_mut().filter(|e| same_key(e)) {
                    entry.cancelled = true;
                    replaced = true;
                }
            }
        }

        let reference = ActionRef {
            id: Uuid::new_v4(),
            kind: action.kind,
            subject_id: action.subject_id,
            dedupe_key: action.dedupe_key.clone(),
            scheduled_at: action.eta.unwrap_or_else(Utc::now),
        };
        entries.push(QueuedAction {
            action: reference.clone(),
            priority: action.priority.as_i32(),
            payload: action.payload,
            cancelled: false,
        });
        Ok(if replaced {
            ScheduleOutcome::Replaced(reference)
        } else {
            ScheduleOutcome::Enqueued(reference)
        })
    }

    async fn cancel_pending(&self, kind: TaskKind, subject_id: Uuid) -> anyhow::Result<u64> {
        let mut entries = self.entries.lock().unwrap();
        let mut count = 0;
        for entry in entries
            .iter_mut()
            .filter(|e| !e.cancelled && e.action.kind == kind && e.action.subject_id == Some(subject_id))
        {
            entry.cancelled = true;
            count += 1;
        }
        Ok(count)
    }
}

/// Download rules with a fixed answer.
#[derive(Default)]
pub struct FakePolicy {
    pub format: Option<String>,
    pub expected_file: Option<PathBuf>,
}

impl MediaPolicy for FakePolicy {
    fn format_for(&self, _media: &Media, _source: &Source) -> Option<String> {
        self.format.clone()
    }

    fn apply_filters(&self, _media: &mut Media, _source: &Source) -> bool {
        false
    }

    fn expected_file_path(&self, _media: &Media, _source: &Source) -> Option<PathBuf> {
        self.expected_file.clone()
    }
}
