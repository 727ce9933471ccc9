use std::sync::Arc;

use async_trait::async_trait;
use chansync_core::models::{Media, Source};
use chansync_core::{ActionQueue, Config, MediaStore, MetadataStore, ScheduleOutcome, ScheduledAction, SourceStore};
use chansync_storage::PathResolver;

use crate::error::{ReconcileError, ReconcileResult};
use crate::event::{AfterCommit, LifecycleEvent, LifecycleHandler};
use crate::policy::MediaPolicy;

/// Everything the reconciler talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub sources: Arc<dyn SourceStore>,
    pub media: Arc<dyn MediaStore>,
    pub metadata: Arc<dyn MetadataStore>,
    pub queue: Arc<dyn ActionQueue>,
    pub policy: Arc<dyn MediaPolicy>,
}

/// Runs the source and media lifecycle hooks.
///
/// Holds no state between invocations; every hook reads what it needs from
/// the stores.
#[derive(Clone)]
pub struct Reconciler {
    pub(crate) sources: Arc<dyn SourceStore>,
    pub(crate) media: Arc<dyn MediaStore>,
    pub(crate) metadata: Arc<dyn MetadataStore>,
    pub(crate) queue: Arc<dyn ActionQueue>,
    pub(crate) policy: Arc<dyn MediaPolicy>,
    pub(crate) resolver: PathResolver,
    pub(crate) config: Config,
}

impl Reconciler {
    pub fn new(collaborators: Collaborators, config: Config) -> Self {
        Self {
            sources: collaborators.sources,
            media: collaborators.media,
            metadata: collaborators.metadata,
            queue: collaborators.queue,
            policy: collaborators.policy,
            resolver: PathResolver::from_config(&config),
            config,
        }
    }

    pub fn resolver(&self) -> &PathResolver {
        &self.resolver
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub(crate) async fn schedule(&self, action: ScheduledAction) -> ReconcileResult<ScheduleOutcome> {
        let label = action.label.clone();
        let outcome = self
            .queue
            .schedule(action)
            .await
            .map_err(ReconcileError::Queue)?;
        let task_id = outcome.action().id;
        if outcome.is_suppressed() {
            tracing::debug!(task_id = %task_id, label = %label, "Action already pending");
        } else {
            tracing::info!(task_id = %task_id, label = %label, "Scheduled action");
        }
        Ok(outcome)
    }
}

/// Run blocking filesystem work off the async runtime.
pub(crate) async fn blocking<T, F>(work: F) -> ReconcileResult<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| ReconcileError::Blocking(e.to_string()))
}

#[async_trait]
impl LifecycleHandler<Source> for Reconciler {
    async fn handle(
        &self,
        event: LifecycleEvent<'_, Source>,
        after_commit: &mut AfterCommit,
    ) -> ReconcileResult<()> {
        match event {
            LifecycleEvent::Created(source) => {
                self.source_created(source).await?;
                self.source_saved(source).await?;
            }
            LifecycleEvent::Updating { existing, incoming } => {
                self.source_updating(existing, incoming).await?;
            }
            LifecycleEvent::Saved(source) => {
                self.source_saved(source).await?;
            }
            LifecycleEvent::Deleting(source) => {
                self.source_deleting(source, after_commit).await?;
            }
            LifecycleEvent::Deleted(_) => {}
        }
        Ok(())
    }
}

#[async_trait]
impl LifecycleHandler<Media> for Reconciler {
    async fn handle(
        &self,
        event: LifecycleEvent<'_, Media>,
        _after_commit: &mut AfterCommit,
    ) -> ReconcileResult<()> {
        match event {
            LifecycleEvent::Created(media) | LifecycleEvent::Saved(media) => {
                self.media_saved(media).await?;
            }
            LifecycleEvent::Deleting(media) => {
                self.media_deleting(media).await?;
            }
            LifecycleEvent::Deleted(media) => {
                self.media_deleted(media).await?;
            }
            LifecycleEvent::Updating { .. } => {}
        }
        Ok(())
    }
}
