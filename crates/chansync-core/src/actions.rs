//! Background action scheduling capability
//!
//! The reconciler never talks to a task table directly. It builds
//! [`ScheduledAction`]s and hands them to an [`ActionQueue`], which owns
//! deduplication against already-pending work.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::models::{Priority, TaskKind, TaskPayload};

/// What to do when a pending action with the same `(kind, dedupe_key)` exists.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DedupePolicy {
    /// Always enqueue, even if equivalent work is pending.
    #[default]
    Always,
    /// Enqueue only when nothing with the same key is pending.
    SkipIfPending,
    /// Cancel any pending action with the same key, then enqueue.
    ReplacePending,
}

/// A request to run one background action.
#[derive(Debug, Clone)]
pub struct ScheduledAction {
    pub kind: TaskKind,
    pub payload: JsonValue,
    pub subject_id: Option<Uuid>,
    pub dedupe_key: Option<String>,
    pub policy: DedupePolicy,
    pub eta: Option<DateTime<Utc>>,
    pub priority: Priority,
    pub label: String,
}

impl ScheduledAction {
    pub fn new<P: TaskPayload>(payload: &P) -> Result<Self, serde_json::Error> {
        let kind = P::task_kind();
        Ok(Self {
            kind,
            payload: serde_json::to_value(payload)?,
            subject_id: payload.subject(),
            dedupe_key: None,
            policy: DedupePolicy::Always,
            eta: None,
            priority: Priority::default(),
            label: kind.to_string(),
        })
    }

    /// Deduplicate on `key` with the given policy.
    pub fn dedupe(mut self, key: impl Into<String>, policy: DedupePolicy) -> Self {
        self.dedupe_key = Some(key.into());
        self.policy = policy;
        self
    }

    /// Deduplicate on the subject id.
    pub fn dedupe_on_subject(self, policy: DedupePolicy) -> Self {
        match self.subject_id {
            Some(id) => self.dedupe(id.to_string(), policy),
            None => self,
        }
    }

    pub fn delay_secs(mut self, secs: i64) -> Self {
        self.eta = Some(Utc::now() + Duration::seconds(secs));
        self
    }

    pub fn eta(mut self, at: DateTime<Utc>) -> Self {
        self.eta = Some(at);
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn run_at(&self) -> DateTime<Utc> {
        self.eta.unwrap_or_else(Utc::now)
    }
}

/// Handle to an action sitting in the queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionRef {
    pub id: Uuid,
    pub kind: TaskKind,
    pub subject_id: Option<Uuid>,
    pub dedupe_key: Option<String>,
    pub scheduled_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleOutcome {
    Enqueued(ActionRef),
    /// A pending duplicate was cancelled and this action took its place.
    Replaced(ActionRef),
    /// Equivalent work was already pending; nothing was enqueued.
    DuplicateSuppressed(ActionRef),
}

impl ScheduleOutcome {
    pub fn action(&self) -> &ActionRef {
        match self {
            ScheduleOutcome::Enqueued(action)
            | ScheduleOutcome::Replaced(action)
            | ScheduleOutcome::DuplicateSuppressed(action) => action,
        }
    }

    pub fn is_suppressed(&self) -> bool {
        matches!(self, ScheduleOutcome::DuplicateSuppressed(_))
    }
}

/// Queue of background actions.
///
/// Implementations must make `schedule` with [`DedupePolicy::SkipIfPending`]
/// a no-op when a pending action with the same kind and dedupe key exists,
/// including when two callers race.
#[async_trait]
pub trait ActionQueue: Send + Sync {
    /// Oldest pending action of `kind` acting on `subject_id`.
    async fn pending(&self, kind: TaskKind, subject_id: Uuid)
        -> anyhow::Result<Option<ActionRef>>;

    async fn schedule(&self, action: ScheduledAction) -> anyhow::Result<ScheduleOutcome>;

    /// Cancel every pending action of `kind` acting on `subject_id`.
    async fn cancel_pending(&self, kind: TaskKind, subject_id: Uuid) -> anyhow::Result<u64>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DownloadMediaFilePayload, IndexSourcePayload};

    #[test]
    fn builder_derives_kind_and_subject() {
        let id = Uuid::new_v4();
        let action = ScheduledAction::new(&IndexSourcePayload { source_id: id })
            .unwrap()
            .dedupe_on_subject(DedupePolicy::ReplacePending);

        assert_eq!(action.kind, TaskKind::IndexSource);
        assert_eq!(action.subject_id, Some(id));
        assert_eq!(action.dedupe_key, Some(id.to_string()));
        assert_eq!(action.policy, DedupePolicy::ReplacePending);
        assert_eq!(action.label, "index_source");
    }

    #[test]
    fn delay_moves_eta_forward() {
        let action = ScheduledAction::new(&DownloadMediaFilePayload {
            media_id: Uuid::new_v4(),
            override_existing: false,
        })
        .unwrap()
        .delay_secs(600);

        let eta = action.eta.unwrap();
        assert!(eta > Utc::now() + Duration::seconds(590));
        assert_eq!(action.policy, DedupePolicy::Always);
    }

    #[test]
    fn suppressed_outcome_points_at_existing_action() {
        let existing = ActionRef {
            id: Uuid::new_v4(),
            kind: TaskKind::IndexSource,
            subject_id: None,
            dedupe_key: Some("k".to_string()),
            scheduled_at: Utc::now(),
        };
        let outcome = ScheduleOutcome::DuplicateSuppressed(existing.clone());
        assert!(outcome.is_suppressed());
        assert_eq!(outcome.action(), &existing);
        assert!(!ScheduleOutcome::Replaced(existing).is_suppressed());
    }
}
