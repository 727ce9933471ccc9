//! Database repositories for data access layer
//!
//! One repository per entity, each a cheap `Clone` around the pool.

pub mod media;
pub mod metadata;
pub mod source;
pub mod transaction;

pub use media::MediaRepository;
pub use metadata::MetadataRepository;
pub use source::SourceRepository;
