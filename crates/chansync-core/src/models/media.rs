use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use uuid::Uuid;

#[cfg(feature = "sqlx")]
use sqlx::FromRow;

/// Metadata field naming the site the media was extracted from.
pub const METADATA_SITE_FIELD: &str = "extractor_key";
/// Metadata field holding the remote thumbnail URL.
pub const METADATA_THUMBNAIL_FIELD: &str = "thumbnail";
/// Marker written into placeholder records recreated after a deletion.
pub const METADATA_DELETED_MARKER: &str = "_media_instance_was_deleted";
/// Site assumed when the metadata does not name one.
pub const DEFAULT_SITE: &str = "Youtube";

/// One item belonging to a source, tracked through indexing, metadata
/// fetch, thumbnail fetch and file download.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "sqlx", derive(FromRow))]
pub struct Media {
    pub id: Uuid,
    pub source_id: Option<Uuid>,
    /// Stable external key, unique per source.
    pub key: String,
    pub title: Option<String>,
    pub duration: Option<i32>,
    pub published: Option<DateTime<Utc>>,
    pub metadata: Option<JsonValue>,
    /// Path of the cached thumbnail file.
    pub thumb: Option<String>,
    /// Path of the downloaded media file.
    pub media_file: Option<String>,
    pub downloaded: bool,
    pub can_download: bool,
    pub skip: bool,
    pub manual_skip: bool,
    pub created_at: DateTime<Utc>,
}

impl Media {
    pub fn new(source_id: Option<Uuid>, key: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            source_id,
            key: key.into(),
            title: None,
            duration: None,
            published: None,
            metadata: None,
            thumb: None,
            media_file: None,
            downloaded: false,
            can_download: false,
            skip: false,
            manual_skip: false,
            created_at: Utc::now(),
        }
    }

    /// Title when known, otherwise the external key. Used in logs and task labels.
    pub fn name(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.key)
    }

    pub fn has_metadata(&self) -> bool {
        matches!(&self.metadata, Some(JsonValue::Object(map)) if !map.is_empty())
    }

    pub fn metadata_str(&self, field: &str) -> Option<&str> {
        self.metadata.as_ref()?.get(field)?.as_str()
    }

    /// The site the media came from, falling back to [`DEFAULT_SITE`].
    pub fn site(&self) -> String {
        self.metadata_str(METADATA_SITE_FIELD)
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_SITE)
            .to_string()
    }

    pub fn thumbnail_url(&self) -> Option<String> {
        self.metadata_str(METADATA_THUMBNAIL_FIELD)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    }

    /// Edit the metadata as an object, replacing anything that is not one.
    pub fn update_metadata_object<R>(
        &mut self,
        edit: impl FnOnce(&mut Map<String, JsonValue>) -> R,
    ) -> R {
        let mut map = match self.metadata.take() {
            Some(JsonValue::Object(map)) => map,
            _ => Map::new(),
        };
        let result = edit(&mut map);
        self.metadata = Some(JsonValue::Object(map));
        result
    }

    pub fn was_recreated_after_deletion(&self) -> bool {
        self.metadata
            .as_ref()
            .and_then(|m| m.get(METADATA_DELETED_MARKER))
            .and_then(JsonValue::as_bool)
            .unwrap_or(false)
    }
}
