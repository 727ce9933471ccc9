//! [`ActionQueue`] backed by the `tasks` table.

use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

use chansync_core::models::{Task, TaskKind};
use chansync_core::{ActionQueue, ActionRef, Config, DedupePolicy, ScheduleOutcome, ScheduledAction};

use crate::repository::{Insertion, NewTask, TaskRepository};

#[derive(Debug, Clone)]
pub struct TaskQueueConfig {
    pub max_retries: i32,
    pub default_timeout_seconds: i32,
}

impl Default for TaskQueueConfig {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl TaskQueueConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_retries: config.task_max_retries,
            default_timeout_seconds: i32::try_from(config.max_run_time_secs).unwrap_or(i32::MAX),
        }
    }
}

#[derive(Clone)]
pub struct TaskQueue {
    repository: TaskRepository,
    config: TaskQueueConfig,
}

impl TaskQueue {
    pub fn new(repository: TaskRepository, config: TaskQueueConfig) -> Self {
        Self { repository, config }
    }

    /// Drop finished tasks older than `days`.
    pub async fn delete_old_finished_tasks(&self, days: i32) -> Result<u64> {
        self.repository.delete_old_finished_tasks(days).await
    }

    fn new_task(&self, action: &ScheduledAction) -> NewTask {
        NewTask {
            kind: action.kind,
            subject_id: action.subject_id,
            dedupe_key: action.dedupe_key.clone(),
            label: action.label.clone(),
            payload: action.payload.clone(),
            priority: action.priority.as_i32(),
            scheduled_at: action.run_at(),
            max_retries: self.config.max_retries,
            timeout_seconds: Some(self.config.default_timeout_seconds),
        }
    }
}

fn action_ref(task: &Task) -> ActionRef {
    ActionRef {
        id: task.id,
        kind: task.kind,
        subject_id: task.subject_id,
        dedupe_key: task.dedupe_key.clone(),
        scheduled_at: task.scheduled_at,
    }
}

#[async_trait]
impl ActionQueue for TaskQueue {
    async fn pending(&self, kind: TaskKind, subject_id: Uuid) -> Result<Option<ActionRef>> {
        let task = self.repository.find_waiting(kind, subject_id).await?;
        Ok(task.as_ref().map(action_ref))
    }

    #[tracing::instrument(skip(self, action), fields(kind = %action.kind, label = %action.label))]
    async fn schedule(&self, action: ScheduledAction) -> Result<ScheduleOutcome> {
        let task = self.new_task(&action);

        let outcome = match (action.policy, action.dedupe_key.is_some()) {
            (DedupePolicy::Always, _) | (_, false) => {
                let created = self.repository.create_task(&task).await?;
                ScheduleOutcome::Enqueued(action_ref(&created))
            }
            (DedupePolicy::SkipIfPending, true) => {
                match self.repository.create_task_if_absent(&task).await? {
                    Insertion::Inserted(created) => ScheduleOutcome::Enqueued(action_ref(&created)),
                    Insertion::Existing(existing) => {
                        tracing::debug!(
                            task_id = %existing.id,
                            dedupe_key = ?existing.dedupe_key,
                            "Duplicate action suppressed"
                        );
                        ScheduleOutcome::DuplicateSuppressed(action_ref(&existing))
                    }
                }
            }
            (DedupePolicy::ReplacePending, true) => {
                let (created, cancelled) = self.repository.replace_waiting(&task).await?;
                if cancelled > 0 {
                    ScheduleOutcome::Replaced(action_ref(&created))
                } else {
                    ScheduleOutcome::Enqueued(action_ref(&created))
                }
            }
        };

        Ok(outcome)
    }

    async fn cancel_pending(&self, kind: TaskKind, subject_id: Uuid) -> Result<u64> {
        self.repository.cancel_waiting(kind, subject_id).await
    }
}
