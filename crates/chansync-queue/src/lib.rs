//! Chansync task queue
//!
//! [`TaskRepository`] persists background actions in the `tasks` table and
//! enforces one waiting task per `(kind, dedupe_key)`. [`TaskQueue`] exposes
//! it as the [`ActionQueue`](chansync_core::ActionQueue) capability.
//! Running the tasks is left to external workers listening on
//! [`TASK_NOTIFY_CHANNEL`].

pub mod queue;
pub mod repository;

pub use queue::{TaskQueue, TaskQueueConfig};
pub use repository::{Insertion, NewTask, TaskRepository, TASK_NOTIFY_CHANNEL};
