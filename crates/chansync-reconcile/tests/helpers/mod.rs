#![allow(dead_code, unused_imports)]

pub mod fakes;
pub mod fixtures;

pub use fakes::{FakeMedia, FakeMetadata, FakePolicy, FakeQueue, FakeSources, QueuedAction};
pub use fixtures::{media_for, metadata_row, source_in, TestEnv};
