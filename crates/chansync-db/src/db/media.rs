use async_trait::async_trait;
use chansync_core::models::Media;
use chansync_core::{MediaStore, MediaUpdate, StoreError};
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

const MEDIA_COLUMNS: &str = "id, source_id, key, title, duration, published, metadata, thumb, \
     media_file, downloaded, can_download, skip, manual_skip, created_at";

#[derive(Clone)]
pub struct MediaRepository {
    pool: PgPool,
}

impl MediaRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn find_by_source_key(
        &self,
        source_id: Option<Uuid>,
        key: &str,
    ) -> Result<Option<Media>, StoreError> {
        let sql = format!(
            "SELECT {} FROM media WHERE source_id IS NOT DISTINCT FROM $1 AND key = $2 \
             ORDER BY created_at ASC LIMIT 1",
            MEDIA_COLUMNS
        );
        let media = sqlx::query_as::<Postgres, Media>(&sql)
            .bind(source_id)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(media)
    }
}

#[async_trait]
impl MediaStore for MediaRepository {
    #[tracing::instrument(skip(self), fields(db.table = "media", db.operation = "select", db.record_id = %id))]
    async fn get(&self, id: Uuid) -> Result<Media, StoreError> {
        let sql = format!("SELECT {} FROM media WHERE id = $1", MEDIA_COLUMNS);
        sqlx::query_as::<Postgres, Media>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("media {}", id)))
    }

    #[tracing::instrument(skip(self, update), fields(db.table = "media", db.operation = "update", db.record_id = %id))]
    async fn update_fields(&self, id: Uuid, update: &MediaUpdate) -> Result<(), StoreError> {
        if update.is_empty() {
            return Ok(());
        }

        let mut query = QueryBuilder::<Postgres>::new("UPDATE media SET ");
        {
            let mut set = query.separated(", ");
            if let Some(v) = update.can_download {
                set.push("can_download = ").push_bind_unseparated(v);
            }
            if let Some(v) = update.skip {
                set.push("skip = ").push_bind_unseparated(v);
            }
            if let Some(v) = update.manual_skip {
                set.push("manual_skip = ").push_bind_unseparated(v);
            }
            if let Some(v) = update.downloaded {
                set.push("downloaded = ").push_bind_unseparated(v);
            }
            if let Some(v) = &update.thumb {
                set.push("thumb = ").push_bind_unseparated(v.clone());
            }
            if let Some(v) = &update.media_file {
                set.push("media_file = ").push_bind_unseparated(v.clone());
            }
            if let Some(v) = &update.metadata {
                set.push("metadata = ").push_bind_unseparated(v.clone());
            }
            if let Some(v) = &update.title {
                set.push("title = ").push_bind_unseparated(v.clone());
            }
            if let Some(v) = update.duration {
                set.push("duration = ").push_bind_unseparated(v);
            }
            if let Some(v) = update.published {
                set.push("published = ").push_bind_unseparated(v);
            }
        }
        query.push(" WHERE id = ").push_bind(id);

        let result = query.build().execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("media {}", id)));
        }
        Ok(())
    }

    /// Orphaned rows (no source) are not covered by the unique constraint,
    /// so an existing row is looked up before inserting.
    #[tracing::instrument(skip(self), fields(db.table = "media", db.operation = "upsert"))]
    async fn get_or_create(
        &self,
        source_id: Option<Uuid>,
        key: &str,
    ) -> Result<(Media, bool), StoreError> {
        if let Some(existing) = self.find_by_source_key(source_id, key).await? {
            return Ok((existing, false));
        }

        let insert = format!(
            "INSERT INTO media (source_id, key) VALUES ($1, $2) \
             ON CONFLICT (source_id, key) DO NOTHING RETURNING {}",
            MEDIA_COLUMNS
        );
        let created = sqlx::query_as::<Postgres, Media>(&insert)
            .bind(source_id)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        if let Some(media) = created {
            tracing::debug!(media_id = %media.id, key = %key, "Created media row");
            return Ok((media, true));
        }

        // Lost the race to a concurrent insert.
        let existing = self
            .find_by_source_key(source_id, key)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("media {}", key)))?;
        Ok((existing, false))
    }
}
