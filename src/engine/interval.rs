use std::{fmt::Display, str::FromStr, sync::Arc};

use anyhow::anyhow;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Source table an activity record came from. The set is closed: every
/// record the application knows about lives in one of these three tables.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Manual,
    Automatic,
    Pomodoro,
}

impl Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceKind::Manual => write!(f, "manual"),
            SourceKind::Automatic => write!(f, "automatic"),
            SourceKind::Pomodoro => write!(f, "pomodoro"),
        }
    }
}

impl FromStr for SourceKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual" => Ok(SourceKind::Manual),
            "automatic" => Ok(SourceKind::Automatic),
            "pomodoro" => Ok(SourceKind::Pomodoro),
            other => Err(anyhow!("Unknown record source {other}")),
        }
    }
}

/// Identity of a stored record. Ids are only unique within one source
/// table, so the source tag is part of the key.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct RecordKey {
    pub source: SourceKind,
    pub id: u64,
}

impl RecordKey {
    pub fn new(source: SourceKind, id: u64) -> Self {
        Self { source, id }
    }
}

impl Display for RecordKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.source, self.id)
    }
}

impl FromStr for RecordKey {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (source, id) = s
            .split_once(':')
            .ok_or_else(|| anyhow!("Expected source:id, got {s}"))?;
        Ok(RecordKey {
            source: source.parse()?,
            id: id.parse()?,
        })
    }
}

/// The shape every stored record is normalized into before detection runs.
/// Carries only what reconciliation needs; source specific fields stay in
/// the store entities and are looked up again by id when a plan is applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityInterval {
    pub key: RecordKey,
    pub start: DateTime<Utc>,
    /// Absent while the record is still running.
    pub end: Option<DateTime<Utc>>,
    /// Task, window, or session name. Compared for similarity when looking
    /// for duplicates, never used as identity.
    pub label: Arc<str>,
    /// Reference into the project catalog. Only the cleanup pass looks at
    /// it, and only to check that the referent exists.
    pub project: Option<u64>,
    /// Whether the source claims this record is finished. A finished record
    /// without an end time is structurally broken.
    pub completed: bool,
}

impl ActivityInterval {
    pub fn duration(&self) -> Option<Duration> {
        self.end.map(|end| end - self.start)
    }

    /// Only closed intervals with positive length take part in gap and
    /// conflict detection. Degenerate and inverted ones are left for the
    /// cleanup pass, open ones are still running.
    pub fn is_measurable(&self) -> bool {
        self.end.map(|end| end > self.start).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};

    use super::{ActivityInterval, RecordKey, SourceKind};

    const TEST_START_DATE: NaiveDateTime =
        NaiveDateTime::new(NaiveDate::from_ymd_opt(2025, 3, 15).unwrap(), NaiveTime::MIN);

    fn interval(end_offset: Option<i64>) -> ActivityInterval {
        let start = Utc.from_utc_datetime(&TEST_START_DATE);
        ActivityInterval {
            key: RecordKey::new(SourceKind::Manual, 1),
            start,
            end: end_offset.map(|v| start + Duration::seconds(v)),
            label: "test".into(),
            project: None,
            completed: end_offset.is_some(),
        }
    }

    #[test]
    fn duration_derives_from_bounds() {
        assert_eq!(interval(Some(90)).duration(), Some(Duration::seconds(90)));
        assert_eq!(interval(None).duration(), None);
    }

    #[test]
    fn measurable_excludes_open_degenerate_and_inverted() {
        assert!(interval(Some(1)).is_measurable());
        assert!(!interval(Some(0)).is_measurable());
        assert!(!interval(Some(-5)).is_measurable());
        assert!(!interval(None).is_measurable());
    }

    #[test]
    fn record_key_parses_and_displays() {
        let key: RecordKey = "pomodoro:42".parse().unwrap();
        assert_eq!(key, RecordKey::new(SourceKind::Pomodoro, 42));
        assert_eq!(key.to_string(), "pomodoro:42");

        assert!("pomodoro".parse::<RecordKey>().is_err());
        assert!("desk:1".parse::<RecordKey>().is_err());
    }
}
