//! Chansync Database Layer
//!
//! PostgreSQL repositories implementing the entity store traits of
//! `chansync-core`, plus pool setup and transaction utilities.

pub mod db;
pub mod setup;

// Re-exports: repositories
pub use db::{MediaRepository, MetadataRepository, SourceRepository};

// Re-exports: transaction utilities
pub use db::transaction::TransactionGuard;

pub use setup::setup_database;
