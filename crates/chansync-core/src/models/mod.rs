//! Data models for sources, media, metadata documents and background tasks.

mod media;
mod metadata;
mod source;
mod task;

pub use media::*;
pub use metadata::*;
pub use source::*;
pub use task::*;
