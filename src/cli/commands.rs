use std::sync::Arc;

use anyhow::{bail, Result};
use chrono::Duration;
use tracing::info;

use crate::{
    engine::{
        cleanup::validate,
        config::DetectorConfig,
        conflicts::detect_conflicts,
        gaps::{detect_gaps, Window},
        merge::{resolve, MergeStrategy},
    },
    store::record_store::{FetchRange, NewManualEntry, RecordStore, StorePlan},
    utils::time::format_duration,
};

use super::report;

fn fetch_range(window: Window) -> FetchRange {
    FetchRange {
        start: window.start(),
        end: window.end(),
    }
}

/// Command to report every stretch of the window not covered by any closed
/// record.
pub async fn process_gaps(
    store: &impl RecordStore,
    window: Window,
    min_gap: Duration,
) -> Result<()> {
    let snapshot = store.snapshot(fetch_range(window)).await?;
    report::print_malformed(&snapshot.malformed);

    let gaps = detect_gaps(&snapshot.intervals, window, min_gap);
    report::print_gaps(&gaps);
    Ok(())
}

/// Command to report groups of overlapping or duplicated records.
pub async fn process_conflicts(
    store: &impl RecordStore,
    window: Window,
    config: &DetectorConfig,
) -> Result<()> {
    let snapshot = store.snapshot(fetch_range(window)).await?;
    report::print_malformed(&snapshot.malformed);

    let groups = detect_conflicts(&snapshot.intervals, config);
    report::print_conflicts(&groups, &snapshot.intervals);
    Ok(())
}

/// Re-detects conflicts, resolves the selected group and hands the plan to
/// the store. Detection is deterministic, so the group numbers printed by
/// `conflicts` stay valid as long as the records underneath do not change,
/// and if they did change the store refuses the stale plan anyway.
pub async fn process_merge(
    store: &impl RecordStore,
    window: Window,
    config: &DetectorConfig,
    group_number: usize,
    strategy: MergeStrategy,
    dry_run: bool,
) -> Result<()> {
    let snapshot = store.snapshot(fetch_range(window)).await?;
    report::print_malformed(&snapshot.malformed);

    let groups = detect_conflicts(&snapshot.intervals, config);
    let Some(group) = group_number.checked_sub(1).and_then(|i| groups.get(i)) else {
        bail!(
            "No conflict group {group_number}, the current report has {} groups",
            groups.len()
        );
    };

    let plan = resolve(group, &snapshot.intervals, strategy)?;
    report::print_merge_plan(&plan, &snapshot.intervals);
    if dry_run {
        return Ok(());
    }

    store.apply(&StorePlan::Merge(plan.clone())).await?;
    info!("Merged group {group_number} into {}", plan.survivor);
    println!("Merged group {group_number}, kept {}", plan.survivor);
    Ok(())
}

/// Command to report structurally broken records and optionally apply the
/// suggested fixes.
pub async fn process_cleanup(
    store: &impl RecordStore,
    window: Window,
    apply: bool,
) -> Result<()> {
    let snapshot = store.snapshot(fetch_range(window)).await?;
    report::print_malformed(&snapshot.malformed);

    let defects = validate(&snapshot.intervals, &snapshot.projects);
    report::print_defects(&defects);
    if apply && !defects.is_empty() {
        let count = defects.len();
        store.apply(&StorePlan::Cleanup(defects)).await?;
        println!("Applied {count} fixes");
    }
    Ok(())
}

/// Command to record a manual entry.
pub async fn process_log(store: &impl RecordStore, entry: NewManualEntry) -> Result<()> {
    if let Some(end) = entry.end {
        // Same guard the gap detector applies to its window: an entry must
        // span forward in time.
        Window::new(entry.start, end)?;
    }
    let created = store.append_manual(entry).await?;
    println!("Recorded manual:{} {}", created.id, created.task);
    Ok(())
}

/// Command to turn a detected gap into a manual entry covering it.
pub async fn process_fill(
    store: &impl RecordStore,
    window: Window,
    gap_number: usize,
    task: Arc<str>,
    project: Option<u64>,
    min_gap: Duration,
) -> Result<()> {
    let snapshot = store.snapshot(fetch_range(window)).await?;
    let gaps = detect_gaps(&snapshot.intervals, window, min_gap);
    let Some(gap) = gap_number.checked_sub(1).and_then(|i| gaps.get(i)) else {
        bail!(
            "No gap {gap_number}, the current report has {} gaps",
            gaps.len()
        );
    };

    let created = store
        .append_manual(NewManualEntry {
            task,
            project,
            start: gap.start,
            end: Some(gap.end),
        })
        .await?;
    println!(
        "Recorded manual:{} covering {} of untracked time",
        created.id,
        format_duration(gap.duration())
    );
    Ok(())
}
