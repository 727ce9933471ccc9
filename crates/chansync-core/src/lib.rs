//! Chansync Core Library
//!
//! Domain models, configuration, error types and the capability traits
//! (task queue and entity stores) shared by every chansync component.

pub mod actions;
pub mod config;
pub mod error;
pub mod models;
pub mod store;

// Re-export commonly used types
pub use actions::{ActionQueue, ActionRef, DedupePolicy, ScheduleOutcome, ScheduledAction};
pub use config::Config;
pub use error::StoreError;
pub use store::{MediaStore, MediaUpdate, MetadataStore, SourceStore};
