use async_trait::async_trait;
use chansync_core::models::Metadata;
use chansync_core::{MetadataStore, StoreError};
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

use super::transaction::TransactionGuard;

#[derive(Clone)]
pub struct MetadataRepository {
    pool: PgPool,
}

impl MetadataRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MetadataStore for MetadataRepository {
    #[tracing::instrument(skip(self), fields(db.table = "metadata", db.operation = "select"))]
    async fn find_unattached(&self, site: &str, key: &str) -> Result<Vec<Metadata>, StoreError> {
        let rows = sqlx::query_as::<Postgres, Metadata>(
            r#"
            SELECT id, media_id, source_id, site, key, created, value
            FROM metadata
            WHERE media_id IS NULL AND source_id IS NULL AND site = $1 AND key = $2
            ORDER BY key ASC, created ASC, id ASC
            "#,
        )
        .bind(site)
        .bind(key)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    #[tracing::instrument(skip(self), fields(db.table = "metadata", db.operation = "update"))]
    async fn detach_from_media(&self, media_id: Uuid) -> Result<u64, StoreError> {
        let result = sqlx::query("UPDATE metadata SET media_id = NULL WHERE media_id = $1")
            .bind(media_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    #[tracing::instrument(skip(self), fields(db.table = "metadata", db.operation = "update", db.record_id = %metadata_id))]
    async fn attach(&self, metadata_id: Uuid, media_id: Uuid) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE metadata SET media_id = $2 WHERE id = $1")
            .bind(metadata_id)
            .bind(media_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("metadata {}", metadata_id)));
        }
        Ok(())
    }

    #[tracing::instrument(skip(self, ids), fields(db.table = "metadata", db.operation = "delete", count = ids.len()))]
    async fn delete(&self, ids: &[Uuid]) -> Result<u64, StoreError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let result = sqlx::query("DELETE FROM metadata WHERE id = ANY($1)")
            .bind(ids)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    #[tracing::instrument(skip(self, discard), fields(db.table = "metadata", db.operation = "fold"))]
    async fn fold_atomic(
        &self,
        media_id: Uuid,
        keep: Uuid,
        discard: &[Uuid],
    ) -> Result<(), StoreError> {
        let mut tx = TransactionGuard::begin(&self.pool).await?;

        sqlx::query("UPDATE metadata SET media_id = NULL WHERE media_id = $1")
            .bind(media_id)
            .execute(&mut *tx)
            .await?;

        let attached = sqlx::query("UPDATE metadata SET media_id = $2 WHERE id = $1")
            .bind(keep)
            .bind(media_id)
            .execute(&mut *tx)
            .await?;
        if attached.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(StoreError::NotFound(format!("metadata {}", keep)));
        }

        if !discard.is_empty() {
            sqlx::query("DELETE FROM metadata WHERE id = ANY($1)")
                .bind(discard)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await
    }
}
