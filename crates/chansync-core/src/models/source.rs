use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use uuid::Uuid;

/// Whether a source downloads video or audio-only media.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Video,
    Audio,
}

impl Display for SourceKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            SourceKind::Video => write!(f, "video"),
            SourceKind::Audio => write!(f, "audio"),
        }
    }
}

impl FromStr for SourceKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "video" => Ok(SourceKind::Video),
            "audio" => Ok(SourceKind::Audio),
            _ => Err(anyhow::anyhow!("Invalid source kind: {}", s)),
        }
    }
}

/// How often a source is re-indexed, stored as a number of seconds.
#[derive(Debug, Default, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(into = "i64", try_from = "i64")]
pub enum IndexSchedule {
    Never = 0,
    EveryHour = 3600,
    Every2Hours = 7200,
    Every3Hours = 10800,
    Every4Hours = 14400,
    Every6Hours = 21600,
    Every12Hours = 43200,
    #[default]
    EveryDay = 86400,
    Every2Days = 172800,
    Every3Days = 259200,
    EveryWeek = 604800,
    Every2Weeks = 1209600,
    Every4Weeks = 2419200,
}

impl IndexSchedule {
    pub fn as_secs(&self) -> i64 {
        *self as i64
    }

    pub fn interval(&self) -> Option<Duration> {
        match self {
            IndexSchedule::Never => None,
            other => Some(Duration::seconds(other.as_secs())),
        }
    }
}

impl From<IndexSchedule> for i64 {
    fn from(schedule: IndexSchedule) -> Self {
        schedule.as_secs()
    }
}

impl TryFrom<i64> for IndexSchedule {
    type Error = anyhow::Error;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => IndexSchedule::Never,
            3600 => IndexSchedule::EveryHour,
            7200 => IndexSchedule::Every2Hours,
            10800 => IndexSchedule::Every3Hours,
            14400 => IndexSchedule::Every4Hours,
            21600 => IndexSchedule::Every6Hours,
            43200 => IndexSchedule::Every12Hours,
            86400 => IndexSchedule::EveryDay,
            172800 => IndexSchedule::Every2Days,
            259200 => IndexSchedule::Every3Days,
            604800 => IndexSchedule::EveryWeek,
            1209600 => IndexSchedule::Every2Weeks,
            2419200 => IndexSchedule::Every4Weeks,
            _ => return Err(anyhow::anyhow!("Invalid index schedule: {}", value)),
        })
    }
}

/// A remote channel or playlist tracked for indexing and downloading,
/// mapped to one directory below the download root.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Source {
    pub id: Uuid,
    pub kind: SourceKind,
    /// Remote identifier of the channel or playlist.
    pub key: String,
    pub name: String,
    /// Directory relative to the download root (and the kind prefix, when enabled).
    pub directory: String,
    pub index_schedule: IndexSchedule,
    /// Anchor for the indexing cadence.
    pub target_schedule: DateTime<Utc>,
    pub copy_channel_images: bool,
    pub is_active: bool,
    pub download_media: bool,
    pub delete_files_on_disk: bool,
    pub created_at: DateTime<Utc>,
}

#[cfg(feature = "sqlx")]
impl sqlx::FromRow<'_, sqlx::postgres::PgRow> for Source {
    fn from_row(row: &sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        use sqlx::Row;
        Ok(Source {
            id: row.try_get("id")?,
            kind: row.try_get::<String, _>("kind")?.parse().map_err(|e| {
                sqlx::Error::Decode(format!("Failed to parse kind: {}", e).into())
            })?,
            key: row.try_get("key")?,
            name: row.try_get("name")?,
            directory: row.try_get("directory")?,
            index_schedule: IndexSchedule::try_from(row.try_get::<i64, _>("index_schedule")?)
                .map_err(|e| {
                    sqlx::Error::Decode(format!("Failed to parse index_schedule: {}", e).into())
                })?,
            target_schedule: row.try_get("target_schedule")?,
            copy_channel_images: row.try_get("copy_channel_images")?,
            is_active: row.try_get("is_active")?,
            download_media: row.try_get("download_media")?,
            delete_files_on_disk: row.try_get("delete_files_on_disk")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl Source {
    /// Next instant on the `target_schedule + k * interval` grid that is not
    /// before `now`. `None` when indexing is disabled.
    pub fn next_index_run(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let interval = self.index_schedule.interval()?;
        if self.target_schedule >= now {
            return Some(self.target_schedule);
        }
        let behind = (now - self.target_schedule).num_milliseconds();
        let step = interval.num_milliseconds();
        let steps = (behind + step - 1) / step;
        Some(self.target_schedule + Duration::milliseconds(steps * step))
    }

    /// True when a change from `previous` requires the indexing task to be recreated.
    pub fn index_settings_changed(&self, previous: &Source) -> bool {
        self.name != previous.name || self.index_schedule != previous.index_schedule
    }

    /// Stops all future scheduling for this source.
    pub fn deactivate(&mut self) {
        self.is_active = false;
        self.index_schedule = IndexSchedule::Never;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn source(schedule: IndexSchedule, target: DateTime<Utc>) -> Source {
        Source {
            id: Uuid::new_v4(),
            kind: SourceKind::Video,
            key: "UC123".to_string(),
            name: "Channel".to_string(),
            directory: "channel".to_string(),
            index_schedule: schedule,
            target_schedule: target,
            copy_channel_images: false,
            is_active: true,
            download_media: true,
            delete_files_on_disk: false,
            created_at: target,
        }
    }

    #[test]
    fn next_index_run_aligns_to_grid() {
        let target = Utc.with_ymd_and_hms(2024, 1, 1, 3, 0, 0).unwrap();
        let src = source(IndexSchedule::EveryDay, target);

        let now = Utc.with_ymd_and_hms(2024, 1, 5, 12, 0, 0).unwrap();
        assert_eq!(
            src.next_index_run(now),
            Some(Utc.with_ymd_and_hms(2024, 1, 6, 3, 0, 0).unwrap())
        );

        let exact = Utc.with_ymd_and_hms(2024, 1, 5, 3, 0, 0).unwrap();
        assert_eq!(src.next_index_run(exact), Some(exact));
    }

    #[test]
    fn next_index_run_never_lands_before_now() {
        let target = Utc.with_ymd_and_hms(2024, 1, 1, 3, 0, 0).unwrap();
        let src = source(IndexSchedule::EveryDay, target);

        let now = Utc.with_ymd_and_hms(2024, 1, 5, 3, 0, 0).unwrap() + Duration::milliseconds(400);
        let next = src.next_index_run(now).unwrap();
        assert!(next >= now);
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 1, 6, 3, 0, 0).unwrap());
    }

    #[test]
    fn next_index_run_future_target() {
        let target = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
        let src = source(IndexSchedule::EveryHour, target);
        assert_eq!(src.next_index_run(Utc::now()), Some(target));
    }

    #[test]
    fn never_schedule_has_no_run() {
        let src = source(IndexSchedule::Never, Utc::now());
        assert_eq!(src.next_index_run(Utc::now()), None);
    }

    #[test]
    fn deactivate_stops_indexing() {
        let mut src = source(IndexSchedule::EveryWeek, Utc::now());
        src.deactivate();
        assert!(!src.is_active);
        assert_eq!(src.index_schedule, IndexSchedule::Never);
    }

    #[test]
    fn schedule_parses_from_seconds() {
        assert_eq!(IndexSchedule::try_from(3600).unwrap(), IndexSchedule::EveryHour);
        assert!(IndexSchedule::try_from(42).is_err());
        assert_eq!("audio".parse::<SourceKind>().unwrap(), SourceKind::Audio);
    }
}
