use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::cmp::Ordering;
use uuid::Uuid;

#[cfg(feature = "sqlx")]
use sqlx::FromRow;

/// A stored metadata document for one `(site, key)`, owned by at most one
/// of a media item or a source.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "sqlx", derive(FromRow))]
pub struct Metadata {
    pub id: Uuid,
    pub media_id: Option<Uuid>,
    pub source_id: Option<Uuid>,
    pub site: String,
    pub key: String,
    pub created: DateTime<Utc>,
    pub value: JsonValue,
}

impl Metadata {
    pub fn is_unattached(&self) -> bool {
        self.media_id.is_none() && self.source_id.is_none()
    }

    /// Retention order: by key, then creation time, then id so ties are stable.
    pub fn retention_order(a: &Metadata, b: &Metadata) -> Ordering {
        a.key
            .cmp(&b.key)
            .then_with(|| a.created.cmp(&b.created))
            .then_with(|| a.id.cmp(&b.id))
    }

    /// The row kept when several candidates compete for one media item.
    pub fn oldest(rows: &[Metadata]) -> Option<&Metadata> {
        rows.iter().min_by(|a, b| Metadata::retention_order(a, b))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    fn row(key: &str, age_secs: i64) -> Metadata {
        Metadata {
            id: Uuid::new_v4(),
            media_id: None,
            source_id: None,
            site: "Youtube".to_string(),
            key: key.to_string(),
            created: Utc::now() - Duration::seconds(age_secs),
            value: json!({}),
        }
    }

    #[test]
    fn oldest_prefers_earliest_creation() {
        let rows = vec![row("k", 10), row("k", 30), row("k", 20)];
        let oldest = Metadata::oldest(&rows).unwrap();
        assert_eq!(oldest.id, rows[1].id);
    }

    #[test]
    fn oldest_of_nothing_is_none() {
        assert!(Metadata::oldest(&[]).is_none());
    }
}
