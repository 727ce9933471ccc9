//! Repository behaviour against a real PostgreSQL database.
//!
//! Run with `DATABASE_URL` pointing at a scratch database and
//! `cargo test -- --ignored`.

use chansync_core::models::Metadata;
use chansync_core::{Config, MediaStore, MetadataStore};
use chansync_db::{setup_database, MediaRepository, MetadataRepository};
use chrono::{Duration, Utc};
use sqlx::PgPool;
use uuid::Uuid;

async fn pool() -> PgPool {
    let config = Config::from_env().expect("config");
    setup_database(&config).await.expect("database")
}

async fn insert_source(pool: &PgPool) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query("INSERT INTO sources (id, key, name, directory) VALUES ($1, $2, $3, $4)")
        .bind(id)
        .bind(format!("UC{}", id.simple()))
        .bind("Test Channel")
        .bind(format!("channel-{}", id.simple()))
        .execute(pool)
        .await
        .unwrap();
    id
}

async fn insert_metadata(pool: &PgPool, site: &str, key: &str, age_secs: i64) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query("INSERT INTO metadata (id, site, key, created) VALUES ($1, $2, $3, $4)")
        .bind(id)
        .bind(site)
        .bind(key)
        .bind(Utc::now() - Duration::seconds(age_secs))
        .execute(pool)
        .await
        .unwrap();
    id
}

#[tokio::test]
#[ignore] // Requires PostgreSQL (DATABASE_URL)
async fn test_get_or_create_is_idempotent_without_source() {
    let repo = MediaRepository::new(pool().await);
    let key = format!("orphan-{}", Uuid::new_v4());

    let (first, created) = repo.get_or_create(None, &key).await.unwrap();
    assert!(created);
    let (second, created) = repo.get_or_create(None, &key).await.unwrap();
    assert!(!created);
    assert_eq!(first.id, second.id);
}

#[tokio::test]
#[ignore] // Requires PostgreSQL (DATABASE_URL)
async fn test_source_delete_with_orphan_of_same_key() {
    let pool = pool().await;
    let repo = MediaRepository::new(pool.clone());
    let key = format!("shared-{}", Uuid::new_v4());

    let (orphan, _) = repo.get_or_create(None, &key).await.unwrap();
    let source_id = insert_source(&pool).await;
    let (owned, created) = repo.get_or_create(Some(source_id), &key).await.unwrap();
    assert!(created);

    sqlx::query("DELETE FROM sources WHERE id = $1")
        .bind(source_id)
        .execute(&pool)
        .await
        .unwrap();

    let owned = repo.get(owned.id).await.unwrap();
    assert_eq!(owned.source_id, None);
    assert!(repo.get(orphan.id).await.is_ok());
}

#[tokio::test]
#[ignore] // Requires PostgreSQL (DATABASE_URL)
async fn test_fold_atomic_attaches_and_discards() {
    let pool = pool().await;
    let media = MediaRepository::new(pool.clone());
    let metadata = MetadataRepository::new(pool.clone());
    let key = format!("fold-{}", Uuid::new_v4());

    let (placeholder, _) = media.get_or_create(None, &key).await.unwrap();
    let oldest = insert_metadata(&pool, "Youtube", &key, 900).await;
    let newer = insert_metadata(&pool, "Youtube", &key, 60).await;

    let candidates = metadata.find_unattached("Youtube", &key).await.unwrap();
    assert_eq!(Metadata::oldest(&candidates).map(|m| m.id), Some(oldest));

    metadata
        .fold_atomic(placeholder.id, oldest, &[newer])
        .await
        .unwrap();

    assert!(metadata.find_unattached("Youtube", &key).await.unwrap().is_empty());
    let attached: Option<Uuid> = sqlx::query_scalar("SELECT media_id FROM metadata WHERE id = $1")
        .bind(oldest)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(attached, Some(placeholder.id));
    let discarded: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM metadata WHERE id = $1")
        .bind(newer)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(discarded, 0);
}

#[tokio::test]
#[ignore] // Requires PostgreSQL (DATABASE_URL)
async fn test_fold_atomic_replaces_existing_attachment() {
    let pool = pool().await;
    let media = MediaRepository::new(pool.clone());
    let metadata = MetadataRepository::new(pool.clone());
    let key = format!("conflict-{}", Uuid::new_v4());

    let (placeholder, _) = media.get_or_create(None, &key).await.unwrap();
    let first = insert_metadata(&pool, "Youtube", &key, 900).await;
    let second = insert_metadata(&pool, "Youtube", &key, 60).await;
    metadata.attach(first, placeholder.id).await.unwrap();

    // Attaching `second` while keeping `first` attached breaks the
    // one-document-per-(media, site, key) index.
    let err = sqlx::query("UPDATE metadata SET media_id = $2 WHERE id = $1")
        .bind(second)
        .bind(placeholder.id)
        .execute(&pool)
        .await
        .map_err(chansync_core::StoreError::from)
        .unwrap_err();
    assert!(err.is_conflict());

    // The transactional fold detaches first, so it succeeds and keeps `second`.
    metadata
        .fold_atomic(placeholder.id, second, &[])
        .await
        .unwrap();
    assert_eq!(
        metadata.find_unattached("Youtube", &key).await.unwrap()[0].id,
        first
    );
}
