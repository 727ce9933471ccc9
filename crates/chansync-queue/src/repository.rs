use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool, Postgres};
use uuid::Uuid;

use chansync_core::models::{Task, TaskKind, TaskStatus};

/// Channel name for PostgreSQL LISTEN/NOTIFY when a new task is created.
pub const TASK_NOTIFY_CHANNEL: &str = "chansync_new_task";

const TASK_COLUMNS: &str = "id, kind, status, priority, subject_id, dedupe_key, label, payload, \
     scheduled_at, max_retries, timeout_seconds, created_at, updated_at";

/// A task row about to be inserted.
#[derive(Debug, Clone)]
pub struct NewTask {
    pub kind: TaskKind,
    pub subject_id: Option<Uuid>,
    pub dedupe_key: Option<String>,
    pub label: String,
    pub payload: serde_json::Value,
    pub priority: i32,
    pub scheduled_at: DateTime<Utc>,
    pub max_retries: i32,
    pub timeout_seconds: Option<i32>,
}

impl NewTask {
    pub fn status(&self) -> TaskStatus {
        if self.scheduled_at > Utc::now() {
            TaskStatus::Scheduled
        } else {
            TaskStatus::Pending
        }
    }
}

/// Result of a dedupe-aware insert.
#[derive(Debug, Clone)]
pub enum Insertion {
    Inserted(Task),
    /// A waiting task with the same kind and dedupe key already existed.
    Existing(Task),
}

#[derive(Clone)]
pub struct TaskRepository {
    pool: PgPool,
}

impl TaskRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a task, then notify workers once it is committed.
    #[tracing::instrument(skip(self, task), fields(kind = %task.kind))]
    pub async fn create_task(&self, task: &NewTask) -> Result<Task> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin transaction for task creation")?;

        let created = insert(&mut tx, task, false)
            .await?
            .context("Task insert returned no row")?;

        tx.commit()
            .await
            .context("Failed to commit transaction for task creation")?;
        notify(&self.pool, created.id).await;

        tracing::info!(
            task_id = %created.id,
            kind = %task.kind,
            label = %task.label,
            "Task created"
        );
        Ok(created)
    }

    /// Insert unless a waiting task with the same `(kind, dedupe_key)` exists.
    #[tracing::instrument(skip(self, task), fields(kind = %task.kind, dedupe_key = ?task.dedupe_key))]
    pub async fn create_task_if_absent(&self, task: &NewTask) -> Result<Insertion> {
        let Some(key) = task.dedupe_key.as_deref() else {
            return self.create_task(task).await.map(Insertion::Inserted);
        };

        // The existing row can finish between the failed insert and the
        // lookup, so try twice before giving up.
        for _ in 0..2 {
            let mut tx = self
                .pool
                .begin()
                .await
                .context("Failed to begin transaction for task creation")?;

            if let Some(created) = insert(&mut tx, task, true).await? {
                tx.commit()
                    .await
                    .context("Failed to commit transaction for task creation")?;
                notify(&self.pool, created.id).await;
                tracing::info!(task_id = %created.id, kind = %task.kind, "Task created");
                return Ok(Insertion::Inserted(created));
            }
            tx.rollback().await.ok();

            if let Some(existing) = self.find_waiting_by_key(task.kind, key).await? {
                return Ok(Insertion::Existing(existing));
            }
        }

        anyhow::bail!("Waiting task for {} {} kept changing", task.kind, key)
    }

    /// Cancel waiting tasks sharing `(kind, dedupe_key)` and insert `task`,
    /// atomically. Returns the new task and how many were cancelled.
    #[tracing::instrument(skip(self, task), fields(kind = %task.kind, dedupe_key = ?task.dedupe_key))]
    pub async fn replace_waiting(&self, task: &NewTask) -> Result<(Task, u64)> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin transaction for task replacement")?;

        let cancelled = match task.dedupe_key.as_deref() {
            Some(key) => sqlx::query(
                r#"
                UPDATE tasks
                SET status = 'cancelled', updated_at = NOW()
                WHERE kind = $1 AND dedupe_key = $2 AND status IN ('pending', 'scheduled')
                "#,
            )
            .bind(task.kind.to_string())
            .bind(key)
            .execute(&mut *tx)
            .await
            .context("Failed to cancel waiting tasks")?
            .rows_affected(),
            None => 0,
        };

        let created = insert(&mut tx, task, false)
            .await?
            .context("Task insert returned no row")?;

        tx.commit()
            .await
            .context("Failed to commit transaction for task replacement")?;
        notify(&self.pool, created.id).await;

        tracing::info!(
            task_id = %created.id,
            kind = %task.kind,
            cancelled = cancelled,
            "Task replaced"
        );
        Ok((created, cancelled))
    }

    /// Oldest waiting task of `kind` acting on `subject_id`.
    #[tracing::instrument(skip(self))]
    pub async fn find_waiting(&self, kind: TaskKind, subject_id: Uuid) -> Result<Option<Task>> {
        let sql = format!(
            "SELECT {} FROM tasks \
             WHERE kind = $1 AND subject_id = $2 AND status IN ('pending', 'scheduled') \
             ORDER BY scheduled_at ASC LIMIT 1",
            TASK_COLUMNS
        );
        sqlx::query_as::<Postgres, Task>(&sql)
            .bind(kind.to_string())
            .bind(subject_id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch waiting task")
    }

    #[tracing::instrument(skip(self))]
    pub async fn find_waiting_by_key(&self, kind: TaskKind, dedupe_key: &str) -> Result<Option<Task>> {
        let sql = format!(
            "SELECT {} FROM tasks \
             WHERE kind = $1 AND dedupe_key = $2 AND status IN ('pending', 'scheduled') \
             LIMIT 1",
            TASK_COLUMNS
        );
        sqlx::query_as::<Postgres, Task>(&sql)
            .bind(kind.to_string())
            .bind(dedupe_key)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch waiting task")
    }

    /// Cancel every waiting task of `kind` acting on `subject_id`.
    #[tracing::instrument(skip(self))]
    pub async fn cancel_waiting(&self, kind: TaskKind, subject_id: Uuid) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE tasks
            SET status = 'cancelled', updated_at = NOW()
            WHERE kind = $1 AND subject_id = $2 AND status IN ('pending', 'scheduled')
            "#,
        )
        .bind(kind.to_string())
        .bind(subject_id)
        .execute(&self.pool)
        .await
        .context("Failed to cancel waiting tasks")?;

        let count = result.rows_affected();
        if count > 0 {
            tracing::info!(kind = %kind, subject_id = %subject_id, count = count, "Tasks cancelled");
        }
        Ok(count)
    }

    /// Delete finished tasks (completed, failed, cancelled) older than the given number of days.
    /// Returns the number of rows deleted.
    #[tracing::instrument(skip(self))]
    pub async fn delete_old_finished_tasks(&self, older_than_days: i32) -> Result<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM tasks
            WHERE status IN ('completed', 'failed', 'cancelled')
                AND COALESCE(completed_at, updated_at) < NOW() - ($1 * interval '1 day')
            "#,
        )
        .bind(older_than_days)
        .execute(&self.pool)
        .await
        .context("Failed to delete old finished tasks")?;

        let count = result.rows_affected();
        if count > 0 {
            tracing::info!(
                count = count,
                older_than_days = older_than_days,
                "Deleted old finished tasks"
            );
        }
        Ok(count)
    }
}

/// Insert one row. With `skip_duplicate` a conflicting waiting task makes
/// this return `None` instead of failing.
async fn insert(conn: &mut PgConnection, task: &NewTask, skip_duplicate: bool) -> Result<Option<Task>> {
    let on_conflict = if skip_duplicate {
        "ON CONFLICT (kind, dedupe_key) WHERE dedupe_key IS NOT NULL AND status IN ('pending', 'scheduled') DO NOTHING"
    } else {
        ""
    };
    let sql = format!(
        r#"
        INSERT INTO tasks (
            kind, status, priority, subject_id, dedupe_key, label, payload,
            scheduled_at, max_retries, timeout_seconds
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        {}
        RETURNING {}
        "#,
        on_conflict, TASK_COLUMNS
    );

    sqlx::query_as::<Postgres, Task>(&sql)
        .bind(task.kind.to_string())
        .bind(task.status().to_string())
        .bind(task.priority)
        .bind(task.subject_id)
        .bind(task.dedupe_key.as_deref())
        .bind(&task.label)
        .bind(&task.payload)
        .bind(task.scheduled_at)
        .bind(task.max_retries)
        .bind(task.timeout_seconds)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, kind = %task.kind, "Failed to insert task into database");
            anyhow::anyhow!("Failed to insert task into database: {}", e)
        })
}

/// Wake listening workers. Failure is not fatal; workers also poll.
///
/// Runs on the pool after the insert has committed: a failed statement
/// inside the insert transaction would abort it and lose the task.
async fn notify(pool: &PgPool, task_id: Uuid) {
    if let Err(e) = sqlx::query("SELECT pg_notify($1, '')")
        .bind(TASK_NOTIFY_CHANNEL)
        .execute(pool)
        .await
    {
        tracing::warn!(
            error = %e,
            task_id = %task_id,
            "Failed to send pg_notify for new task, workers will discover task via polling"
        );
    }
}
