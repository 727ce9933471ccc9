use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use uuid::Uuid;

/// Background actions the reconciler can enqueue. The workers that run them
/// live outside this workspace.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    CheckSourceDirectory,
    DownloadSourceImages,
    IndexSource,
    SaveAllMediaForSource,
    DeleteAllMediaForSource,
    DownloadMediaMetadata,
    DownloadMediaThumbnail,
    DownloadMediaFile,
}

impl Display for TaskKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            TaskKind::CheckSourceDirectory => write!(f, "check_source_directory"),
            TaskKind::DownloadSourceImages => write!(f, "download_source_images"),
            TaskKind::IndexSource => write!(f, "index_source"),
            TaskKind::SaveAllMediaForSource => write!(f, "save_all_media_for_source"),
            TaskKind::DeleteAllMediaForSource => write!(f, "delete_all_media_for_source"),
            TaskKind::DownloadMediaMetadata => write!(f, "download_media_metadata"),
            TaskKind::DownloadMediaThumbnail => write!(f, "download_media_thumbnail"),
            TaskKind::DownloadMediaFile => write!(f, "download_media_file"),
        }
    }
}

impl FromStr for TaskKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "check_source_directory" => Ok(TaskKind::CheckSourceDirectory),
            "download_source_images" => Ok(TaskKind::DownloadSourceImages),
            "index_source" => Ok(TaskKind::IndexSource),
            "save_all_media_for_source" => Ok(TaskKind::SaveAllMediaForSource),
            "delete_all_media_for_source" => Ok(TaskKind::DeleteAllMediaForSource),
            "download_media_metadata" => Ok(TaskKind::DownloadMediaMetadata),
            "download_media_thumbnail" => Ok(TaskKind::DownloadMediaThumbnail),
            "download_media_file" => Ok(TaskKind::DownloadMediaFile),
            _ => Err(anyhow::anyhow!("Invalid task kind: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Scheduled,
    Cancelled,
}

impl TaskStatus {
    /// Pending and scheduled tasks are the ones dedupe keys are checked against.
    pub fn is_waiting(&self) -> bool {
        matches!(self, TaskStatus::Pending | TaskStatus::Scheduled)
    }
}

impl Display for TaskStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::Running => write!(f, "running"),
            TaskStatus::Completed => write!(f, "completed"),
            TaskStatus::Failed => write!(f, "failed"),
            TaskStatus::Scheduled => write!(f, "scheduled"),
            TaskStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl FromStr for TaskStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TaskStatus::Pending),
            "running" => Ok(TaskStatus::Running),
            "completed" => Ok(TaskStatus::Completed),
            "failed" => Ok(TaskStatus::Failed),
            "scheduled" => Ok(TaskStatus::Scheduled),
            "cancelled" => Ok(TaskStatus::Cancelled),
            _ => Err(anyhow::anyhow!("Invalid task status: {}", s)),
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low = 3,
    #[default]
    Normal = 5,
    High = 7,
    Critical = 10,
}

impl Priority {
    pub fn as_i32(&self) -> i32 {
        *self as i32
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub kind: TaskKind,
    pub status: TaskStatus,
    pub priority: i32,
    /// Entity the task acts on, used for pending-work lookups.
    pub subject_id: Option<Uuid>,
    pub dedupe_key: Option<String>,
    pub label: String,
    pub payload: serde_json::Value,
    pub scheduled_at: DateTime<Utc>,
    pub max_retries: i32,
    pub timeout_seconds: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(feature = "sqlx")]
impl sqlx::FromRow<'_, sqlx::postgres::PgRow> for Task {
    fn from_row(row: &sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        use sqlx::Row;
        Ok(Task {
            id: row.try_get("id")?,
            kind: row.try_get::<String, _>("kind")?.parse().map_err(|e| {
                sqlx::Error::Decode(format!("Failed to parse kind: {}", e).into())
            })?,
            status: row.try_get::<String, _>("status")?.parse().map_err(|e| {
                sqlx::Error::Decode(format!("Failed to parse status: {}", e).into())
            })?,
            priority: row.try_get("priority")?,
            subject_id: row.try_get("subject_id")?,
            dedupe_key: row.try_get("dedupe_key")?,
            label: row.try_get("label")?,
            payload: row.try_get("payload")?,
            scheduled_at: row.try_get("scheduled_at")?,
            max_retries: row.try_get("max_retries")?,
            timeout_seconds: row.try_get("timeout_seconds")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl Task {
    /// Extract the payload as a typed struct, returning an error on failure.
    pub fn try_payload_as<P: TaskPayload>(&self) -> Result<P, serde_json::Error> {
        serde_json::from_value(self.payload.clone())
    }
}

/// Trait for type-safe task payloads
pub trait TaskPayload: Serialize + for<'de> Deserialize<'de> {
    fn task_kind() -> TaskKind;

    /// Entity the task acts on.
    fn subject(&self) -> Option<Uuid>;
}

macro_rules! source_payload {
    ($name:ident, $kind:expr) => {
        #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
        pub struct $name {
            pub source_id: Uuid,
        }

        impl TaskPayload for $name {
            fn task_kind() -> TaskKind {
                $kind
            }

            fn subject(&self) -> Option<Uuid> {
                Some(self.source_id)
            }
        }
    };
}

source_payload!(CheckSourceDirectoryPayload, TaskKind::CheckSourceDirectory);
source_payload!(DownloadSourceImagesPayload, TaskKind::DownloadSourceImages);
source_payload!(IndexSourcePayload, TaskKind::IndexSource);
source_payload!(SaveAllMediaForSourcePayload, TaskKind::SaveAllMediaForSource);

/// Carries everything the cascade needs after the source row is gone.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeleteAllMediaForSourcePayload {
    pub source_id: Uuid,
    pub source_name: String,
    pub directory_path: String,
    pub delete_files_on_disk: bool,
}

impl TaskPayload for DeleteAllMediaForSourcePayload {
    fn task_kind() -> TaskKind {
        TaskKind::DeleteAllMediaForSource
    }

    fn subject(&self) -> Option<Uuid> {
        Some(self.source_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DownloadMediaMetadataPayload {
    pub media_id: Uuid,
}

impl TaskPayload for DownloadMediaMetadataPayload {
    fn task_kind() -> TaskKind {
        TaskKind::DownloadMediaMetadata
    }

    fn subject(&self) -> Option<Uuid> {
        Some(self.media_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DownloadMediaThumbnailPayload {
    pub media_id: Uuid,
    pub url: String,
}

impl TaskPayload for DownloadMediaThumbnailPayload {
    fn task_kind() -> TaskKind {
        TaskKind::DownloadMediaThumbnail
    }

    fn subject(&self) -> Option<Uuid> {
        Some(self.media_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DownloadMediaFilePayload {
    pub media_id: Uuid,
    /// Set for manual redownloads, which bypass the usual download gating.
    #[serde(default)]
    pub override_existing: bool,
}

impl TaskPayload for DownloadMediaFilePayload {
    fn task_kind() -> TaskKind {
        TaskKind::DownloadMediaFile
    }

    fn subject(&self) -> Option<Uuid> {
        Some(self.media_id)
    }
}
