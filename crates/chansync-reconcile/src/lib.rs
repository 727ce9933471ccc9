//! Chansync Reconcile Library
//!
//! Lifecycle hooks that keep the filesystem, the metadata store and the
//! action queue consistent with source and media records:
//!
//! - Source hooks create and move directories and schedule indexing.
//! - Media hooks derive download work and clean up after deletions.
//! - [`MetadataFolder`] reattaches orphaned metadata to recreated media.
//!
//! The persistence layer dispatches [`LifecycleEvent`]s to a
//! [`LifecycleHandler`], which here is the [`Reconciler`].

pub mod error;
pub mod event;
pub mod folder;
pub mod media;
pub mod policy;
pub mod reconciler;
pub mod source;
pub mod tasks;

// Re-export commonly used types
pub use error::{ReconcileError, ReconcileResult};
pub use event::{AfterCommit, LifecycleEvent, LifecycleHandler};
pub use folder::{FoldOutcome, MetadataFolder};
pub use media::{DeletionReport, MediaReport};
pub use policy::MediaPolicy;
pub use reconciler::{Collaborators, Reconciler};
pub use tasks::{DiskState, MediaPlan, PendingWork, TaskReconciler};
