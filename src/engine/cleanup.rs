use std::{collections::HashSet, fmt::Display};

use chrono::{DateTime, Duration, Utc};

use super::interval::{ActivityInterval, RecordKey};

/// Length assumed when closing a completed session that lost its end time.
const ASSUMED_SESSION_LENGTH: Duration = Duration::minutes(25);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefectKind {
    /// Start and end are equal, the record covers nothing.
    ZeroDuration,
    /// End precedes start.
    NegativeDuration,
    /// The source marked the record finished but it has no end time.
    MissingEnd,
    /// The record references a project that does not exist.
    OrphanedProject,
}

impl Display for DefectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DefectKind::ZeroDuration => write!(f, "zero duration"),
            DefectKind::NegativeDuration => write!(f, "negative duration"),
            DefectKind::MissingEnd => write!(f, "missing end"),
            DefectKind::OrphanedProject => write!(f, "orphaned project"),
        }
    }
}

/// What the cleanup pass suggests doing about a defect. A repair never
/// invents coverage beyond the assumed session length, anything else is a
/// delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuggestedFix {
    Delete,
    CloseAt(DateTime<Utc>),
    ClearProject,
}

/// A structurally broken record and the suggested way out. Structural
/// defects are deliberately not conflicts: a zero-length record sitting
/// inside someone else's hour is broken, not concurrent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Defect {
    pub key: RecordKey,
    pub kind: DefectKind,
    pub fix: SuggestedFix,
}

/// Flags structurally invalid records. Runs over the same snapshot as gap
/// and conflict detection but is independent of both. A record can carry
/// more than one defect, each is reported separately.
pub fn validate(intervals: &[ActivityInterval], projects: &HashSet<u64>) -> Vec<Defect> {
    let mut defects = vec![];
    for interval in intervals {
        match interval.end {
            Some(end) if end < interval.start => defects.push(Defect {
                key: interval.key,
                kind: DefectKind::NegativeDuration,
                fix: SuggestedFix::Delete,
            }),
            Some(end) if end == interval.start => defects.push(Defect {
                key: interval.key,
                kind: DefectKind::ZeroDuration,
                fix: SuggestedFix::Delete,
            }),
            Some(_) => {}
            None if interval.completed => defects.push(Defect {
                key: interval.key,
                kind: DefectKind::MissingEnd,
                fix: SuggestedFix::CloseAt(interval.start + ASSUMED_SESSION_LENGTH),
            }),
            // Still running, nothing wrong with an open end.
            None => {}
        }

        if let Some(project) = interval.project {
            if !projects.contains(&project) {
                defects.push(Defect {
                    key: interval.key,
                    kind: DefectKind::OrphanedProject,
                    fix: SuggestedFix::ClearProject,
                });
            }
        }
    }
    defects
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};

    use crate::engine::interval::{ActivityInterval, RecordKey, SourceKind};

    use super::{validate, Defect, DefectKind, SuggestedFix, ASSUMED_SESSION_LENGTH};

    const TEST_DATE: NaiveDate = NaiveDate::from_ymd_opt(2025, 3, 15).unwrap();

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.from_utc_datetime(&NaiveDateTime::new(
            TEST_DATE,
            NaiveTime::from_hms_opt(hour, minute, 0).unwrap(),
        ))
    }

    fn interval(
        id: u64,
        start: DateTime<Utc>,
        end: Option<DateTime<Utc>>,
        completed: bool,
    ) -> ActivityInterval {
        ActivityInterval {
            key: RecordKey::new(SourceKind::Pomodoro, id),
            start,
            end,
            label: "focus".into(),
            project: None,
            completed,
        }
    }

    #[test]
    fn degenerate_and_inverted_records_get_flagged_for_deletion() {
        let defects = validate(
            &[
                interval(1, at(9, 0), Some(at(9, 0)), true),
                interval(2, at(10, 0), Some(at(9, 30)), true),
                interval(3, at(11, 0), Some(at(12, 0)), true),
            ],
            &HashSet::new(),
        );

        assert_eq!(
            defects,
            vec![
                Defect {
                    key: RecordKey::new(SourceKind::Pomodoro, 1),
                    kind: DefectKind::ZeroDuration,
                    fix: SuggestedFix::Delete,
                },
                Defect {
                    key: RecordKey::new(SourceKind::Pomodoro, 2),
                    kind: DefectKind::NegativeDuration,
                    fix: SuggestedFix::Delete,
                },
            ]
        );
    }

    #[test]
    fn completed_record_without_end_suggests_a_close_repair() {
        let defects = validate(&[interval(1, at(9, 0), None, true)], &HashSet::new());

        assert_eq!(defects.len(), 1);
        assert_eq!(defects[0].kind, DefectKind::MissingEnd);
        assert_eq!(
            defects[0].fix,
            SuggestedFix::CloseAt(at(9, 0) + ASSUMED_SESSION_LENGTH)
        );
    }

    #[test]
    fn running_record_is_not_a_defect() {
        let defects = validate(&[interval(1, at(9, 0), None, false)], &HashSet::new());
        assert_eq!(defects, vec![]);
    }

    #[test]
    fn project_references_are_checked_against_the_catalog() {
        let projects = HashSet::from([10, 20]);

        let mut valid = interval(1, at(9, 0), Some(at(10, 0)), true);
        valid.project = Some(10);
        let mut orphaned = interval(2, at(9, 0), Some(at(10, 0)), true);
        orphaned.project = Some(99);

        let defects = validate(&[valid, orphaned], &projects);
        assert_eq!(
            defects,
            vec![Defect {
                key: RecordKey::new(SourceKind::Pomodoro, 2),
                kind: DefectKind::OrphanedProject,
                fix: SuggestedFix::ClearProject,
            }]
        );
    }

    #[test]
    fn one_record_can_carry_several_defects() {
        let mut broken = interval(1, at(9, 0), Some(at(8, 0)), true);
        broken.project = Some(5);

        let defects = validate(&[broken], &HashSet::new());
        assert_eq!(defects.len(), 2);
        assert_eq!(defects[0].kind, DefectKind::NegativeDuration);
        assert_eq!(defects[1].kind, DefectKind::OrphanedProject);
    }

    #[test]
    fn healthy_records_pass_clean() {
        let defects = validate(
            &[interval(1, at(9, 0), Some(at(9, 0) + Duration::minutes(50)), true)],
            &HashSet::new(),
        );
        assert_eq!(defects, vec![]);
    }
}
