use chrono::{DateTime, Local, Utc};

use crate::{
    engine::{
        cleanup::{Defect, SuggestedFix},
        conflicts::ConflictGroup,
        gaps::TimeGap,
        interval::ActivityInterval,
        merge::MergePlan,
    },
    store::record_store::Malformed,
    utils::time::format_duration,
};

const TIME_FORMAT: &str = "%x %H:%M:%S";

fn local(time: DateTime<Utc>) -> String {
    time.with_timezone(&Local).format(TIME_FORMAT).to_string()
}

fn end_or_running(end: Option<DateTime<Utc>>) -> String {
    end.map(local).unwrap_or_else(|| "running".to_owned())
}

pub fn print_gaps(gaps: &[TimeGap]) {
    if gaps.is_empty() {
        println!("No untracked time found");
        return;
    }
    for (number, gap) in gaps.iter().enumerate() {
        println!(
            "{}\t{}\t{}\t{}",
            number + 1,
            local(gap.start),
            local(gap.end),
            format_duration(gap.duration())
        );
    }
}

pub fn print_conflicts(groups: &[ConflictGroup], intervals: &[ActivityInterval]) {
    if groups.is_empty() {
        println!("No conflicting records found");
        return;
    }
    for (number, group) in groups.iter().enumerate() {
        println!("group {}\t{}\t{}", number + 1, group.kind, group.severity);
        for key in &group.members {
            // Members reference the snapshot by key, the lookup cannot miss
            // within one detection pass.
            let Some(interval) = intervals.iter().find(|v| v.key == *key) else {
                continue;
            };
            println!(
                "\t{}\t{}\t{}\t{}",
                key,
                local(interval.start),
                end_or_running(interval.end),
                interval.label
            );
        }
        println!();
    }
}

pub fn print_merge_plan(plan: &MergePlan, intervals: &[ActivityInterval]) {
    let describe = |key| {
        intervals
            .iter()
            .find(|v| v.key == key)
            .map(|v| {
                format!(
                    "{}\t{}\t{}",
                    local(v.start),
                    end_or_running(v.end),
                    v.label
                )
            })
            .unwrap_or_default()
    };

    println!("keep\t{}\t{}", plan.survivor, describe(plan.survivor));
    for key in &plan.discard {
        println!("delete\t{}\t{}", key, describe(*key));
    }
}

pub fn print_defects(defects: &[Defect]) {
    if defects.is_empty() {
        println!("No broken records found");
        return;
    }
    for defect in defects {
        let fix = match defect.fix {
            SuggestedFix::Delete => "delete".to_owned(),
            SuggestedFix::CloseAt(end) => format!("close at {}", local(end)),
            SuggestedFix::ClearProject => "clear project".to_owned(),
        };
        println!("{}\t{}\t{}", defect.key, defect.kind, fix);
    }
}

pub fn print_malformed(malformed: &[Malformed]) {
    for entry in malformed {
        eprintln!(
            "warning: {} record at line {} would not decode: {}",
            entry.table, entry.line, entry.message
        );
    }
}
