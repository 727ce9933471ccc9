//! Lifecycle events dispatched by the persistence layer.

use async_trait::async_trait;
use chansync_core::{ActionQueue, ScheduleOutcome, ScheduledAction};

use crate::error::{ReconcileError, ReconcileResult};

/// A create, update or delete transition of one entity.
///
/// `Updating` and `Deleting` fire inside the mutation's transaction, before
/// the row changes. The others fire after the row has been written.
#[derive(Debug)]
pub enum LifecycleEvent<'a, E> {
    /// First save of a new entity.
    Created(&'a E),
    /// An existing entity is about to be saved with new values.
    Updating { existing: &'a E, incoming: &'a E },
    /// An existing entity was saved.
    Saved(&'a E),
    /// The entity is about to be deleted. Handlers may mutate it.
    Deleting(&'a mut E),
    /// The entity row is gone. This is the last snapshot.
    Deleted(&'a E),
}

impl<E> LifecycleEvent<'_, E> {
    pub fn name(&self) -> &'static str {
        match self {
            LifecycleEvent::Created(_) => "created",
            LifecycleEvent::Updating { .. } => "updating",
            LifecycleEvent::Saved(_) => "saved",
            LifecycleEvent::Deleting(_) => "deleting",
            LifecycleEvent::Deleted(_) => "deleted",
        }
    }
}

/// Actions that may only be scheduled once the surrounding transaction has
/// committed. The dispatcher flushes on commit and discards on rollback.
#[derive(Debug, Default)]
pub struct AfterCommit {
    actions: Vec<ScheduledAction>,
}

impl AfterCommit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn defer(&mut self, action: ScheduledAction) {
        tracing::debug!(kind = %action.kind, label = %action.label, "Deferred until commit");
        self.actions.push(action);
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn actions(&self) -> &[ScheduledAction] {
        &self.actions
    }

    /// Schedule everything deferred, in order.
    pub async fn flush(self, queue: &dyn ActionQueue) -> ReconcileResult<Vec<ScheduleOutcome>> {
        let mut outcomes = Vec::with_capacity(self.actions.len());
        for action in self.actions {
            let outcome = queue.schedule(action).await.map_err(ReconcileError::Queue)?;
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }

    /// Drop deferred actions after a rollback.
    pub fn discard(self) -> usize {
        let count = self.actions.len();
        if count > 0 {
            tracing::info!(count = count, "Discarded deferred actions after rollback");
        }
        count
    }
}

/// Receives lifecycle events for entities of type `E`.
#[async_trait]
pub trait LifecycleHandler<E: Send + Sync>: Send + Sync {
    async fn handle(
        &self,
        event: LifecycleEvent<'_, E>,
        after_commit: &mut AfterCommit,
    ) -> ReconcileResult<()>;
}
