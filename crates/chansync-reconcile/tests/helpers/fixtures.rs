//! Test environment wiring a reconciler to in-memory fakes and a temporary
//! download root.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chansync_core::models::{IndexSchedule, Media, Metadata, Source, SourceKind};
use chansync_core::Config;
use chansync_reconcile::{Collaborators, Reconciler};
use chrono::{Duration, Utc};
use serde_json::json;
use tempfile::TempDir;
use uuid::Uuid;

use super::fakes::{FakeMedia, FakeMetadata, FakePolicy, FakeQueue, FakeSources};

pub struct TestEnv {
    pub reconciler: Reconciler,
    pub sources: Arc<FakeSources>,
    pub media: Arc<FakeMedia>,
    pub metadata: Arc<FakeMetadata>,
    pub queue: Arc<FakeQueue>,
    pub root: TempDir,
}

impl TestEnv {
    pub fn new() -> Self {
        Self::with_policy(FakePolicy {
            format: Some("bestvideo+bestaudio".to_string()),
            expected_file: None,
        })
    }

    pub fn with_policy(policy: FakePolicy) -> Self {
        let root = TempDir::new().unwrap();
        let sources = Arc::new(FakeSources::default());
        let media = Arc::new(FakeMedia::default());
        let metadata = Arc::new(FakeMetadata::default());
        let queue = Arc::new(FakeQueue::default());

        let config = Config {
            download_root: root.path().to_path_buf(),
            ..Config::default()
        };
        let reconciler = Reconciler::new(
            Collaborators {
                sources: sources.clone(),
                media: media.clone(),
                metadata: metadata.clone(),
                queue: queue.clone(),
                policy: Arc::new(policy),
            },
            config,
        );

        Self {
            reconciler,
            sources,
            media,
            metadata,
            queue,
            root,
        }
    }

    pub fn root(&self) -> &Path {
        self.root.path()
    }

    /// Absolute directory of `source` under the default `video/` prefix.
    pub fn source_dir(&self, source: &Source) -> PathBuf {
        self.reconciler.resolver().resolve(source, false).unwrap()
    }

    /// Store `source` and create its directory.
    pub fn add_source(&self, source: &Source) -> PathBuf {
        let dir = self.source_dir(source);
        std::fs::create_dir_all(&dir).unwrap();
        self.sources.insert(source.clone());
        dir
    }

    /// Write an empty file and return its path.
    pub fn touch(&self, path: &Path) -> PathBuf {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, b"").unwrap();
        path.to_path_buf()
    }
}

pub fn source_in(directory: &str) -> Source {
    Source {
        id: Uuid::new_v4(),
        kind: SourceKind::Video,
        key: "UCtest".to_string(),
        name: "Test Channel".to_string(),
        directory: directory.to_string(),
        index_schedule: IndexSchedule::EveryDay,
        target_schedule: Utc::now() - Duration::hours(1),
        copy_channel_images: false,
        is_active: true,
        download_media: true,
        delete_files_on_disk: false,
        created_at: Utc::now(),
    }
}

pub fn media_for(source: &Source, key: &str) -> Media {
    let mut media = Media::new(Some(source.id), key);
    media.title = Some(format!("Video {}", key));
    media
}

/// An unattached metadata document created `age_secs` ago.
pub fn metadata_row(site: &str, key: &str, age_secs: i64) -> Metadata {
    Metadata {
        id: Uuid::new_v4(),
        media_id: None,
        source_id: None,
        site: site.to_string(),
        key: key.to_string(),
        created: Utc::now() - Duration::seconds(age_secs),
        value: json!({ "id": key }),
    }
}
