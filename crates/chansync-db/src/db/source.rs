use async_trait::async_trait;
use chansync_core::models::{IndexSchedule, Source};
use chansync_core::{SourceStore, StoreError};
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

const SOURCE_COLUMNS: &str = "id, kind, key, name, directory, index_schedule, target_schedule, \
     copy_channel_images, is_active, download_media, delete_files_on_disk, created_at";

#[derive(Clone)]
pub struct SourceRepository {
    pool: PgPool,
}

impl SourceRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SourceStore for SourceRepository {
    #[tracing::instrument(skip(self), fields(db.table = "sources", db.operation = "select", db.record_id = %id))]
    async fn get(&self, id: Uuid) -> Result<Source, StoreError> {
        let sql = format!("SELECT {} FROM sources WHERE id = $1", SOURCE_COLUMNS);
        sqlx::query_as::<Postgres, Source>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("source {}", id)))
    }

    #[tracing::instrument(skip(self), fields(db.table = "sources", db.operation = "update", db.record_id = %id))]
    async fn set_active(
        &self,
        id: Uuid,
        is_active: bool,
        index_schedule: IndexSchedule,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE sources SET is_active = $2, index_schedule = $3 WHERE id = $1",
        )
        .bind(id)
        .bind(is_active)
        .bind(index_schedule.as_secs())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("source {}", id)));
        }
        Ok(())
    }
}
