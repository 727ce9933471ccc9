//! Folding of orphaned metadata documents into a recreated placeholder.
//!
//! A transactional merge is tried first. If it hits a uniqueness conflict a
//! best-effort merge runs instead. Either way a final cleanup deletes the
//! remaining unattached candidates, and running that cleanup again is a no-op.

use chansync_core::models::Metadata;
use chansync_core::MetadataStore;
use uuid::Uuid;

use crate::error::{ReconcileError, ReconcileResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FoldOutcome {
    /// No unattached document matched.
    Nothing,
    /// The oldest document was attached inside one transaction.
    Merged { kept: Uuid, deleted: u64 },
    /// The transaction conflicted and the best-effort path ran.
    FellBack { kept: Option<Uuid>, deleted: u64 },
}

pub struct MetadataFolder<'a> {
    store: &'a dyn MetadataStore,
}

impl<'a> MetadataFolder<'a> {
    pub fn new(store: &'a dyn MetadataStore) -> Self {
        Self { store }
    }

    /// Attach the oldest unattached `(site, key)` document to `media_id` and
    /// delete the others.
    #[tracing::instrument(skip(self), fields(media_id = %media_id))]
    pub async fn fold(&self, media_id: Uuid, site: &str, key: &str) -> ReconcileResult<FoldOutcome> {
        let candidates = self.store.find_unattached(site, key).await?;
        if candidates.is_empty() {
            return Ok(FoldOutcome::Nothing);
        }

        match self.try_merge_transactional(media_id, &candidates).await {
            Ok(kept) => {
                let deleted = (candidates.len() as u64).saturating_sub(1);
                // Rows that appeared after the transaction read its candidates.
                let stragglers = self.cleanup(site, key, Some(kept)).await;
                tracing::info!(kept = %kept, deleted = deleted + stragglers, "Reused old metadata");
                Ok(FoldOutcome::Merged {
                    kept,
                    deleted: deleted + stragglers,
                })
            }
            Err(ReconcileError::MetadataMergeConflict(reason)) => {
                tracing::warn!(reason = %reason, "Transactional metadata fold conflicted, merging without a transaction");
                let kept = self.merge_best_effort(media_id, site, key).await;
                let deleted = self.cleanup(site, key, kept).await;
                Ok(FoldOutcome::FellBack { kept, deleted })
            }
            Err(other) => {
                self.cleanup(site, key, None).await;
                Err(other)
            }
        }
    }

    /// Detach, attach the oldest candidate and delete the rest, atomically.
    pub async fn try_merge_transactional(
        &self,
        media_id: Uuid,
        candidates: &[Metadata],
    ) -> ReconcileResult<Uuid> {
        let Some(keep) = Metadata::oldest(candidates) else {
            return Err(ReconcileError::Store(chansync_core::StoreError::NotFound(
                "no metadata to fold".to_string(),
            )));
        };
        let discard: Vec<Uuid> = candidates
            .iter()
            .map(|m| m.id)
            .filter(|id| *id != keep.id)
            .collect();

        match self.store.fold_atomic(media_id, keep.id, &discard).await {
            Ok(()) => Ok(keep.id),
            Err(e) if e.is_conflict() => Err(ReconcileError::MetadataMergeConflict(e.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    /// Same steps as the transactional merge, one statement at a time, with
    /// failures logged. Returns the attached document, if attaching worked.
    pub async fn merge_best_effort(&self, media_id: Uuid, site: &str, key: &str) -> Option<Uuid> {
        if let Err(e) = self.store.detach_from_media(media_id).await {
            tracing::error!(error = %e, media_id = %media_id, "Failed to detach metadata");
        }

        let candidates = match self.store.find_unattached(site, key).await {
            Ok(candidates) => candidates,
            Err(e) => {
                tracing::error!(error = %e, "Failed to reload metadata candidates");
                return None;
            }
        };
        let keep = Metadata::oldest(&candidates)?.id;

        match self.store.attach(keep, media_id).await {
            Ok(()) => Some(keep),
            Err(e) => {
                tracing::error!(error = %e, metadata_id = %keep, "Could not attach selected metadata");
                None
            }
        }
    }

    /// Delete every unattached `(site, key)` document except `keep`. A
    /// document that could not be attached is not worth keeping.
    pub async fn cleanup(&self, site: &str, key: &str, keep: Option<Uuid>) -> u64 {
        let leftovers = match self.store.find_unattached(site, key).await {
            Ok(rows) => rows,
            Err(e) => {
                tracing::error!(error = %e, "Failed to list metadata for cleanup");
                return 0;
            }
        };
        let ids: Vec<Uuid> = leftovers
            .iter()
            .map(|m| m.id)
            .filter(|id| Some(*id) != keep)
            .collect();
        if ids.is_empty() {
            return 0;
        }

        match self.store.delete(&ids).await {
            Ok(count) => {
                tracing::debug!(count = count, key = %key, "Deleted unused metadata");
                count
            }
            Err(e) => {
                tracing::error!(error = %e, key = %key, "Failed to delete unused metadata");
                0
            }
        }
    }
}
