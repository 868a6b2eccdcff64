use std::cmp::Reverse;

use chrono::Duration;

use super::{
    conflicts::ConflictGroup,
    error::EngineError,
    interval::{ActivityInterval, RecordKey},
};

/// Deterministic rule for choosing which record of a conflict group
/// survives. The survivor keeps its own bounds, it is never widened to the
/// union of the group: a verified record beats a synthesized superset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeStrategy {
    /// The member with the longest duration.
    Longest,
    /// The member that started first.
    Earliest,
    /// The member that ended last.
    Latest,
    /// The caller picked the survivor themselves.
    Keep(RecordKey),
}

/// Outcome of resolving one conflict group: which record stays and which
/// get deleted. Purely declarative, the store applies it as one atomic
/// operation or not at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergePlan {
    pub survivor: RecordKey,
    pub discard: Vec<RecordKey>,
}

/// Resolves a conflict group into a merge plan.
///
/// Ties are broken the same way every run: longest prefers the earlier
/// start, earliest and latest prefer the smaller key, so resolution is
/// deterministic for any input.
pub fn resolve(
    group: &ConflictGroup,
    intervals: &[ActivityInterval],
    strategy: MergeStrategy,
) -> Result<MergePlan, EngineError> {
    if group.members.is_empty() {
        return Err(EngineError::EmptyGroup);
    }

    let members = group
        .members
        .iter()
        .map(|key| {
            intervals
                .iter()
                .find(|interval| interval.key == *key)
                .ok_or(EngineError::UnknownMember { key: *key })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let survivor = match strategy {
        MergeStrategy::Longest => members
            .iter()
            .max_by_key(|v| {
                (
                    v.duration().unwrap_or_else(Duration::zero),
                    Reverse(v.start),
                    Reverse(v.key),
                )
            })
            .map(|v| v.key),
        MergeStrategy::Earliest => members
            .iter()
            .min_by_key(|v| (v.start, v.key))
            .map(|v| v.key),
        MergeStrategy::Latest => members
            .iter()
            .max_by_key(|v| (v.end, Reverse(v.key)))
            .map(|v| v.key),
        MergeStrategy::Keep(key) => {
            if !group.members.contains(&key) {
                return Err(EngineError::SurvivorOutsideGroup { key });
            }
            Some(key)
        }
    };
    // Groups are never empty past the guard above.
    let survivor = survivor.ok_or(EngineError::EmptyGroup)?;

    let discard = group
        .members
        .iter()
        .copied()
        .filter(|key| *key != survivor)
        .collect();

    Ok(MergePlan { survivor, discard })
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};

    use crate::engine::{
        config::DetectorConfig,
        conflicts::{detect_conflicts, ConflictGroup, ConflictKind, Severity},
        error::EngineError,
        interval::{ActivityInterval, RecordKey, SourceKind},
    };

    use super::{resolve, MergeStrategy};

    const TEST_DATE: NaiveDate = NaiveDate::from_ymd_opt(2025, 3, 15).unwrap();

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.from_utc_datetime(&NaiveDateTime::new(
            TEST_DATE,
            NaiveTime::from_hms_opt(hour, minute, 0).unwrap(),
        ))
    }

    fn interval(
        source: SourceKind,
        id: u64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> ActivityInterval {
        ActivityInterval {
            key: RecordKey::new(source, id),
            start,
            end: Some(end),
            label: "focus".into(),
            project: None,
            completed: true,
        }
    }

    /// A group over every given interval, the way the detector would tag a
    /// fully connected component.
    fn group_of(intervals: &[ActivityInterval]) -> ConflictGroup {
        ConflictGroup {
            kind: ConflictKind::Overlap,
            severity: Severity::High,
            members: intervals.iter().map(|v| v.key).collect(),
        }
    }

    #[test]
    fn longest_keeps_the_record_with_most_coverage() {
        let intervals = [
            interval(SourceKind::Manual, 1, at(9, 0), at(10, 0)),
            interval(SourceKind::Automatic, 2, at(9, 0), at(11, 30)),
            interval(SourceKind::Pomodoro, 3, at(9, 30), at(10, 0)),
        ];
        let plan = resolve(&group_of(&intervals), &intervals, MergeStrategy::Longest).unwrap();

        assert_eq!(plan.survivor, RecordKey::new(SourceKind::Automatic, 2));
        assert_eq!(
            plan.discard,
            vec![
                RecordKey::new(SourceKind::Manual, 1),
                RecordKey::new(SourceKind::Pomodoro, 3),
            ]
        );
    }

    #[test]
    fn longest_survivor_comes_from_detected_duplicates() {
        // Scenario from the detector side: two same-source copies where one
        // runs longer. Resolution picks the longer one.
        let intervals = [
            interval(SourceKind::Pomodoro, 1, at(9, 0), at(10, 0)),
            interval(SourceKind::Pomodoro, 2, at(9, 0), at(10, 5)),
        ];
        let groups = detect_conflicts(&intervals, &DetectorConfig::default());
        assert_eq!(groups[0].kind, ConflictKind::Duplicate);

        let plan = resolve(&groups[0], &intervals, MergeStrategy::Longest).unwrap();
        assert_eq!(plan.survivor, RecordKey::new(SourceKind::Pomodoro, 2));
        assert_eq!(plan.discard, vec![RecordKey::new(SourceKind::Pomodoro, 1)]);
    }

    #[test]
    fn earliest_and_latest_pick_by_bounds() {
        let intervals = [
            interval(SourceKind::Manual, 1, at(9, 15), at(10, 0)),
            interval(SourceKind::Manual, 2, at(9, 0), at(9, 45)),
            interval(SourceKind::Manual, 3, at(9, 30), at(10, 30)),
        ];
        let group = group_of(&intervals);

        let earliest = resolve(&group, &intervals, MergeStrategy::Earliest).unwrap();
        assert_eq!(earliest.survivor, RecordKey::new(SourceKind::Manual, 2));

        let latest = resolve(&group, &intervals, MergeStrategy::Latest).unwrap();
        assert_eq!(latest.survivor, RecordKey::new(SourceKind::Manual, 3));
    }

    #[test]
    fn ties_resolve_the_same_way_every_time() {
        // Same duration twice: longest falls back to the earlier start.
        let intervals = [
            interval(SourceKind::Manual, 1, at(9, 30), at(10, 30)),
            interval(SourceKind::Manual, 2, at(9, 0), at(10, 0)),
        ];
        let plan = resolve(&group_of(&intervals), &intervals, MergeStrategy::Longest).unwrap();
        assert_eq!(plan.survivor, RecordKey::new(SourceKind::Manual, 2));

        // Fully identical bounds: the smaller key wins everywhere.
        let intervals = [
            interval(SourceKind::Manual, 7, at(9, 0), at(10, 0)),
            interval(SourceKind::Manual, 4, at(9, 0), at(10, 0)),
        ];
        let group = group_of(&intervals);
        for strategy in [
            MergeStrategy::Longest,
            MergeStrategy::Earliest,
            MergeStrategy::Latest,
        ] {
            let plan = resolve(&group, &intervals, strategy).unwrap();
            assert_eq!(plan.survivor, RecordKey::new(SourceKind::Manual, 4));
        }
    }

    #[test]
    fn manual_selection_validates_membership() {
        let intervals = [
            interval(SourceKind::Manual, 1, at(9, 0), at(10, 0)),
            interval(SourceKind::Automatic, 2, at(9, 0), at(10, 0)),
        ];
        let group = group_of(&intervals);

        let keep = RecordKey::new(SourceKind::Automatic, 2);
        let plan = resolve(&group, &intervals, MergeStrategy::Keep(keep)).unwrap();
        assert_eq!(plan.survivor, keep);
        assert_eq!(plan.discard, vec![RecordKey::new(SourceKind::Manual, 1)]);

        let outsider = RecordKey::new(SourceKind::Pomodoro, 9);
        assert_eq!(
            resolve(&group, &intervals, MergeStrategy::Keep(outsider)),
            Err(EngineError::SurvivorOutsideGroup { key: outsider })
        );
    }

    #[test]
    fn survivor_coverage_never_shrinks_below_any_input() {
        let intervals = [
            interval(SourceKind::Manual, 1, at(9, 0), at(10, 0)),
            interval(SourceKind::Automatic, 2, at(9, 30), at(11, 0)),
            interval(SourceKind::Pomodoro, 3, at(10, 0), at(10, 25)),
        ];
        let group = group_of(&intervals);

        let longest = intervals
            .iter()
            .filter_map(|v| v.duration())
            .max()
            .unwrap();
        let plan = resolve(&group, &intervals, MergeStrategy::Longest).unwrap();
        let survivor = intervals.iter().find(|v| v.key == plan.survivor).unwrap();
        assert!(survivor.duration().unwrap() >= longest);
    }

    #[test]
    fn empty_group_and_unknown_member_are_rejected() {
        let intervals = [interval(SourceKind::Manual, 1, at(9, 0), at(10, 0))];
        let empty = ConflictGroup {
            kind: ConflictKind::Overlap,
            severity: Severity::Low,
            members: vec![],
        };
        assert_eq!(
            resolve(&empty, &intervals, MergeStrategy::Longest),
            Err(EngineError::EmptyGroup)
        );

        let phantom = RecordKey::new(SourceKind::Manual, 99);
        let stale = ConflictGroup {
            kind: ConflictKind::Overlap,
            severity: Severity::Low,
            members: vec![intervals[0].key, phantom],
        };
        assert_eq!(
            resolve(&stale, &intervals, MergeStrategy::Longest),
            Err(EngineError::UnknownMember { key: phantom })
        );
    }
}
