//! Entity store capabilities consumed by the reconciler.
//!
//! `chansync-db` implements these over PostgreSQL; tests use in-memory fakes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{IndexSchedule, Media, Metadata, Source};

#[async_trait]
pub trait SourceStore: Send + Sync {
    async fn get(&self, id: Uuid) -> Result<Source, StoreError>;

    async fn set_active(
        &self,
        id: Uuid,
        is_active: bool,
        index_schedule: IndexSchedule,
    ) -> Result<(), StoreError>;
}

/// Partial update of a media row. `None` leaves the column untouched; nullable
/// columns take `Some(None)` to clear them.
///
/// Applying an update writes the fields directly and never re-enters the
/// lifecycle hooks.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MediaUpdate {
    pub can_download: Option<bool>,
    pub skip: Option<bool>,
    pub manual_skip: Option<bool>,
    pub downloaded: Option<bool>,
    pub thumb: Option<Option<String>>,
    pub media_file: Option<Option<String>>,
    pub metadata: Option<Option<JsonValue>>,
    pub title: Option<Option<String>>,
    pub duration: Option<Option<i32>>,
    pub published: Option<Option<DateTime<Utc>>>,
}

impl MediaUpdate {
    pub fn is_empty(&self) -> bool {
        *self == MediaUpdate::default()
    }

    /// Fields of `after` that differ from `before`.
    pub fn diff(before: &Media, after: &Media) -> Self {
        fn changed<T: PartialEq + Clone>(a: &T, b: &T) -> Option<T> {
            (a != b).then(|| b.clone())
        }
        Self {
            can_download: changed(&before.can_download, &after.can_download),
            skip: changed(&before.skip, &after.skip),
            manual_skip: changed(&before.manual_skip, &after.manual_skip),
            downloaded: changed(&before.downloaded, &after.downloaded),
            thumb: changed(&before.thumb, &after.thumb),
            media_file: changed(&before.media_file, &after.media_file),
            metadata: changed(&before.metadata, &after.metadata),
            title: changed(&before.title, &after.title),
            duration: changed(&before.duration, &after.duration),
            published: changed(&before.published, &after.published),
        }
    }

    /// Apply the update to an in-memory record.
    pub fn apply_to(&self, media: &mut Media) {
        if let Some(v) = self.can_download {
            media.can_download = v;
        }
        if let Some(v) = self.skip {
            media.skip = v;
        }
        if let Some(v) = self.manual_skip {
            media.manual_skip = v;
        }
        if let Some(v) = self.downloaded {
            media.downloaded = v;
        }
        if let Some(v) = &self.thumb {
            media.thumb = v.clone();
        }
        if let Some(v) = &self.media_file {
            media.media_file = v.clone();
        }
        if let Some(v) = &self.metadata {
            media.metadata = v.clone();
        }
        if let Some(v) = &self.title {
            media.title = v.clone();
        }
        if let Some(v) = self.duration {
            media.duration = v;
        }
        if let Some(v) = self.published {
            media.published = v;
        }
    }
}

#[async_trait]
pub trait MediaStore: Send + Sync {
    async fn get(&self, id: Uuid) -> Result<Media, StoreError>;

    async fn update_fields(&self, id: Uuid, update: &MediaUpdate) -> Result<(), StoreError>;

    /// Fetch the row for `(source_id, key)`, inserting a fresh one if absent.
    /// The flag is true when this call created the row.
    async fn get_or_create(
        &self,
        source_id: Option<Uuid>,
        key: &str,
    ) -> Result<(Media, bool), StoreError>;
}

#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Rows for `(site, key)` owned by neither a media item nor a source.
    async fn find_unattached(&self, site: &str, key: &str) -> Result<Vec<Metadata>, StoreError>;

    async fn detach_from_media(&self, media_id: Uuid) -> Result<u64, StoreError>;

    async fn attach(&self, metadata_id: Uuid, media_id: Uuid) -> Result<(), StoreError>;

    async fn delete(&self, ids: &[Uuid]) -> Result<u64, StoreError>;

    /// Detach, attach `keep` and delete `discard` as one transaction.
    /// A uniqueness violation surfaces as [`StoreError::Conflict`] and leaves
    /// nothing changed.
    async fn fold_atomic(
        &self,
        media_id: Uuid,
        keep: Uuid,
        discard: &[Uuid],
    ) -> Result<(), StoreError>;
}
