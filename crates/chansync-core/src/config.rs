//! Configuration module
//!
//! Settings for the download root layout, the database pool and the task
//! queue. Everything is read from the environment (a `.env` file is loaded
//! first when present).

use std::env;
use std::path::PathBuf;

// Common constants
const MAX_CONNECTIONS: u32 = 10;
const CONNECTION_TIMEOUT_SECS: u64 = 30;
const DOWNLOAD_ROOT: &str = "./downloads";
const DOWNLOAD_VIDEO_DIR: &str = "video";
const DOWNLOAD_AUDIO_DIR: &str = "audio";
const FIRST_INDEX_DELAY_SECS: i64 = 600;
const MAX_RUN_TIME_SECS: i64 = 12 * 60 * 60;
const MIN_RUN_TIME_SECS: i64 = 600;
const TASK_MAX_RETRIES: i32 = 15;
const COMPLETED_TASKS_DAYS_TO_KEEP: i32 = 7;

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub db_timeout_seconds: u64,
    /// Every source directory lives below this root.
    pub download_root: PathBuf,
    /// When true, source directories are placed under `video/` or `audio/`.
    pub source_directory_prefix: bool,
    pub download_video_dir: String,
    pub download_audio_dir: String,
    pub first_index_delay_secs: i64,
    pub max_run_time_secs: i64,
    pub task_max_retries: i32,
    pub completed_tasks_days_to_keep: i32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: None,
            db_max_connections: MAX_CONNECTIONS,
            db_timeout_seconds: CONNECTION_TIMEOUT_SECS,
            download_root: PathBuf::from(DOWNLOAD_ROOT),
            source_directory_prefix: true,
            download_video_dir: DOWNLOAD_VIDEO_DIR.to_string(),
            download_audio_dir: DOWNLOAD_AUDIO_DIR.to_string(),
            first_index_delay_secs: FIRST_INDEX_DELAY_SECS,
            max_run_time_secs: MAX_RUN_TIME_SECS,
            task_max_retries: TASK_MAX_RETRIES,
            completed_tasks_days_to_keep: COMPLETED_TASKS_DAYS_TO_KEEP,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        let source_directory_prefix = env::var("SOURCE_DOWNLOAD_DIRECTORY_PREFIX")
            .unwrap_or_else(|_| "true".to_string())
            .to_lowercase()
            .parse()
            .map_err(|_| {
                anyhow::anyhow!("SOURCE_DOWNLOAD_DIRECTORY_PREFIX must be true or false")
            })?;

        // Tasks need a chance to finish, anything shorter is raised to the floor.
        let max_run_time_secs = env::var("MAX_RUN_TIME_SECS")
            .ok()
            .and_then(|s| s.parse::<i64>().ok())
            .unwrap_or(MAX_RUN_TIME_SECS)
            .max(MIN_RUN_TIME_SECS);

        let config = Config {
            database_url: env::var("DATABASE_URL").ok(),
            db_max_connections: env::var("DB_MAX_CONNECTIONS")
                .unwrap_or_else(|_| MAX_CONNECTIONS.to_string())
                .parse()
                .unwrap_or(MAX_CONNECTIONS),
            db_timeout_seconds: env::var("DB_TIMEOUT_SECONDS")
                .unwrap_or_else(|_| CONNECTION_TIMEOUT_SECS.to_string())
                .parse()
                .unwrap_or(CONNECTION_TIMEOUT_SECS),
            download_root: env::var("DOWNLOAD_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DOWNLOAD_ROOT)),
            source_directory_prefix,
            download_video_dir: env::var("DOWNLOAD_VIDEO_DIR")
                .unwrap_or_else(|_| DOWNLOAD_VIDEO_DIR.to_string()),
            download_audio_dir: env::var("DOWNLOAD_AUDIO_DIR")
                .unwrap_or_else(|_| DOWNLOAD_AUDIO_DIR.to_string()),
            first_index_delay_secs: env::var("FIRST_INDEX_DELAY_SECS")
                .unwrap_or_else(|_| FIRST_INDEX_DELAY_SECS.to_string())
                .parse()
                .unwrap_or(FIRST_INDEX_DELAY_SECS),
            max_run_time_secs,
            task_max_retries: env::var("TASK_MAX_RETRIES")
                .unwrap_or_else(|_| TASK_MAX_RETRIES.to_string())
                .parse()
                .unwrap_or(TASK_MAX_RETRIES),
            completed_tasks_days_to_keep: env::var("COMPLETED_TASKS_DAYS_TO_KEEP")
                .unwrap_or_else(|_| COMPLETED_TASKS_DAYS_TO_KEEP.to_string())
                .parse()
                .unwrap_or(COMPLETED_TASKS_DAYS_TO_KEEP),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.download_root.as_os_str().is_empty() {
            return Err(anyhow::anyhow!("DOWNLOAD_ROOT must not be empty"));
        }

        if let Some(url) = &self.database_url {
            if !url.starts_with("postgres://") && !url.starts_with("postgresql://") {
                return Err(anyhow::anyhow!(
                    "DATABASE_URL must be a valid PostgreSQL connection string"
                ));
            }
        }

        if self.source_directory_prefix {
            for (name, dir) in [
                ("DOWNLOAD_VIDEO_DIR", &self.download_video_dir),
                ("DOWNLOAD_AUDIO_DIR", &self.download_audio_dir),
            ] {
                if dir.is_empty() || dir.contains('/') || dir.contains("..") {
                    return Err(anyhow::anyhow!(
                        "{} must be a single directory name, got {:?}",
                        name,
                        dir
                    ));
                }
            }
        }

        if self.first_index_delay_secs < 0 {
            return Err(anyhow::anyhow!("FIRST_INDEX_DELAY_SECS must not be negative"));
        }

        Ok(())
    }

    /// Required by binaries that talk to the database.
    pub fn database_url(&self) -> Result<&str, anyhow::Error> {
        self.database_url
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("DATABASE_URL must be set"))
    }

    /// Delay applied before a media download is attempted, derived from the
    /// maximum task run time.
    pub fn download_media_delay_secs(&self) -> i64 {
        1 + (self.max_run_time_secs as f64 / 100.0).round() as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn prefix_dirs_must_be_single_names() {
        let config = Config {
            download_audio_dir: "music/audio".to_string(),
            ..Config::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            download_video_dir: "..".to_string(),
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn prefix_dirs_ignored_without_prefix() {
        let config = Config {
            source_directory_prefix: false,
            download_video_dir: String::new(),
            ..Config::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_non_postgres_url() {
        let config = Config {
            database_url: Some("mysql://localhost/db".to_string()),
            ..Config::default()
        };
        assert!(config.validate().is_err());
        assert!(Config::default().database_url().is_err());
    }

    #[test]
    fn download_delay_follows_run_time() {
        let config = Config {
            max_run_time_secs: 3600,
            ..Config::default()
        };
        assert_eq!(config.download_media_delay_secs(), 37);
        assert_eq!(Config::default().download_media_delay_secs(), 433);
    }
}
