use chrono::Duration;
use chrono::Utc;

use chrono::DateTime;
use serde::Deserialize;
use serde::Serialize;

use std::sync::Arc;

use crate::engine::interval::{ActivityInterval, RecordKey, SourceKind};

/// A hand-entered time entry. An absent `end` means the timer is still
/// running.
#[derive(PartialEq, Eq, PartialOrd, Ord, Debug, Serialize, Deserialize, Clone)]
pub struct ManualEntryEntity {
    pub id: u64,
    pub task: Arc<str>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<u64>,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub start: DateTime<Utc>,
    #[serde(default, with = "chrono::serde::ts_seconds_option")]
    pub end: Option<DateTime<Utc>>,
}

/// An automatically captured stretch of window usage. Stored as a start
/// plus duration to match how the capture side collapses samples, the end
/// is always derived.
#[derive(PartialEq, Eq, PartialOrd, Ord, Debug, Serialize, Deserialize, Clone)]
pub struct AppUsageEntity {
    pub id: u64,
    pub window_name: Arc<str>,
    pub process_name: Arc<str>,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub start: DateTime<Utc>,
    #[serde(with = "duration_ser")]
    pub duration: Duration,
}

impl AppUsageEntity {
    pub fn end(&self) -> DateTime<Utc> {
        self.start + self.duration
    }
}

/// A pomodoro focus session. `completed` records whether the session ran
/// its course, independently of whether an end timestamp was written, which
/// is exactly the inconsistency the cleanup pass looks for.
#[derive(PartialEq, Eq, PartialOrd, Ord, Debug, Serialize, Deserialize, Clone)]
pub struct PomodoroSessionEntity {
    pub id: u64,
    pub task: Arc<str>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<u64>,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub started_at: DateTime<Utc>,
    #[serde(default, with = "chrono::serde::ts_seconds_option")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed: bool,
}

/// A known project, the referent side of the foreign references manual
/// entries and sessions may carry.
#[derive(PartialEq, Eq, PartialOrd, Ord, Debug, Serialize, Deserialize, Clone)]
pub struct ProjectEntity {
    pub id: u64,
    pub name: Arc<str>,
}

mod duration_ser {
    use chrono::Duration;
    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_i64(duration.num_seconds())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = i64::deserialize(deserializer)?;
        let duration = Duration::seconds(s);
        Ok(duration)
    }
}

impl From<&ManualEntryEntity> for ActivityInterval {
    fn from(entry: &ManualEntryEntity) -> Self {
        ActivityInterval {
            key: RecordKey::new(SourceKind::Manual, entry.id),
            start: entry.start,
            end: entry.end,
            label: entry.task.clone(),
            project: entry.project,
            completed: entry.end.is_some(),
        }
    }
}

impl From<&AppUsageEntity> for ActivityInterval {
    fn from(usage: &AppUsageEntity) -> Self {
        ActivityInterval {
            key: RecordKey::new(SourceKind::Automatic, usage.id),
            start: usage.start,
            end: Some(usage.end()),
            label: usage.window_name.clone(),
            project: None,
            completed: true,
        }
    }
}

impl From<&PomodoroSessionEntity> for ActivityInterval {
    fn from(session: &PomodoroSessionEntity) -> Self {
        ActivityInterval {
            key: RecordKey::new(SourceKind::Pomodoro, session.id),
            start: session.started_at,
            end: session.finished_at,
            label: session.task.clone(),
            project: session.project,
            completed: session.completed,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};

    use crate::engine::interval::{ActivityInterval, RecordKey, SourceKind};

    use super::{AppUsageEntity, ManualEntryEntity, PomodoroSessionEntity};

    const TEST_START_DATE: NaiveDateTime =
        NaiveDateTime::new(NaiveDate::from_ymd_opt(2025, 3, 15).unwrap(), NaiveTime::MIN);

    #[test]
    fn usage_normalizes_with_a_derived_end() {
        let start = Utc.from_utc_datetime(&TEST_START_DATE);
        let usage = AppUsageEntity {
            id: 3,
            window_name: "main.rs - vim".into(),
            process_name: "/usr/bin/vim".into(),
            start,
            duration: Duration::minutes(40),
        };

        let interval = ActivityInterval::from(&usage);
        assert_eq!(interval.key, RecordKey::new(SourceKind::Automatic, 3));
        assert_eq!(interval.end, Some(start + Duration::minutes(40)));
        assert!(interval.completed);
        assert_eq!(&*interval.label, "main.rs - vim");
    }

    #[test]
    fn open_manual_entry_normalizes_as_running() {
        let entry = ManualEntryEntity {
            id: 1,
            task: "code review".into(),
            project: Some(4),
            start: Utc.from_utc_datetime(&TEST_START_DATE),
            end: None,
        };

        let interval = ActivityInterval::from(&entry);
        assert_eq!(interval.end, None);
        assert!(!interval.completed);
        assert_eq!(interval.project, Some(4));
    }

    #[test]
    fn interrupted_session_keeps_its_completed_flag() {
        let session = PomodoroSessionEntity {
            id: 7,
            task: "writing".into(),
            project: None,
            started_at: Utc.from_utc_datetime(&TEST_START_DATE),
            finished_at: None,
            completed: true,
        };

        let interval = ActivityInterval::from(&session);
        // Finished according to the source, but no end was written. The
        // cleanup pass picks this up as a missing end.
        assert!(interval.completed);
        assert_eq!(interval.end, None);
    }

    #[test]
    fn entities_survive_the_line_format() {
        let entry = ManualEntryEntity {
            id: 12,
            task: "standup".into(),
            project: None,
            start: Utc.from_utc_datetime(&TEST_START_DATE),
            end: Some(Utc.from_utc_datetime(&TEST_START_DATE) + Duration::minutes(15)),
        };
        let line = serde_json::to_string(&entry).unwrap();
        assert_eq!(serde_json::from_str::<ManualEntryEntity>(&line).unwrap(), entry);
    }
}
