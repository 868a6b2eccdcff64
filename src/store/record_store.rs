use std::{
    collections::{HashMap, HashSet},
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fs4::tokio::AsyncFileExt;
use serde::{de::DeserializeOwned, Serialize};
use tokio::{
    fs::File,
    io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader},
};
use tracing::{debug, warn};

use crate::engine::{
    cleanup::{Defect, SuggestedFix},
    error::EngineError,
    interval::{ActivityInterval, RecordKey, SourceKind},
    merge::MergePlan,
};

use super::entities::{
    AppUsageEntity, ManualEntryEntity, PomodoroSessionEntity, ProjectEntity,
};

/// Date bounds for a snapshot fetch. A record is loaded when its interval
/// intersects `[start, end)`; records without an end count from their start
/// onwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// A stored line that would not decode. Reported next to the loaded data so
/// broken records are visible instead of quietly missing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Malformed {
    pub table: &'static str,
    pub line: usize,
    pub message: String,
}

/// Point-in-time view the detection passes run over. Storage may move on
/// after this is taken, which is why plan application re-validates ids.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    /// Every record intersecting the fetched range, sorted by start.
    pub intervals: Vec<ActivityInterval>,
    pub malformed: Vec<Malformed>,
    /// Ids of known projects, the referent set for orphan checks.
    pub projects: HashSet<u64>,
}

/// Data for a new manual entry. The store assigns the id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewManualEntry {
    pub task: Arc<str>,
    pub project: Option<u64>,
    pub start: DateTime<Utc>,
    pub end: Option<DateTime<Utc>>,
}

/// A mutation produced by the reconciliation passes. Declarative on
/// purpose: the engine never touches storage, it hands one of these over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorePlan {
    /// Keep the survivor, delete everything in the discard set.
    Merge(MergePlan),
    /// Apply the suggested fix of each defect.
    Cleanup(Vec<Defect>),
}

/// Interface for abstracting storage of activity records.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RecordStore: Sync + Send {
    /// Loads every record whose interval intersects the range, along with
    /// decode diagnostics and the project catalog.
    async fn snapshot(&self, range: FetchRange) -> Result<Snapshot>;

    /// Appends a manual entry, allocating the next free id.
    async fn append_manual(&self, entry: NewManualEntry) -> Result<ManualEntryEntity>;

    /// Applies a plan as one all-or-nothing mutation. Every id the plan
    /// references must still exist; if any has vanished since the snapshot
    /// was taken nothing is changed and the call fails with
    /// [EngineError::StaleRecord].
    async fn apply(&self, plan: &StorePlan) -> Result<()>;
}

/// The main realization of [RecordStore]. One JSON-lines file per source
/// table plus a project catalog, all inside one directory.
pub struct FileRecordStore {
    data_dir: PathBuf,
}

impl FileRecordStore {
    pub fn new(data_dir: PathBuf) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(&data_dir)?;

        Ok(Self { data_dir })
    }

    /// Directory the table files live in.
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn source_path(&self, source: SourceKind) -> PathBuf {
        let name = match source {
            SourceKind::Manual => "manual.jsonl",
            SourceKind::Automatic => "automatic.jsonl",
            SourceKind::Pomodoro => "pomodoro.jsonl",
        };
        self.data_dir.join(name)
    }

    fn projects_path(&self) -> PathBuf {
        self.data_dir.join("projects.jsonl")
    }
}

#[async_trait]
impl RecordStore for FileRecordStore {
    async fn snapshot(&self, range: FetchRange) -> Result<Snapshot> {
        let manual_path = self.source_path(SourceKind::Manual);
        let automatic_path = self.source_path(SourceKind::Automatic);
        let pomodoro_path = self.source_path(SourceKind::Pomodoro);
        let projects_path = self.projects_path();
        let (manual, automatic, pomodoro, projects) = tokio::try_join!(
            read_lines(&manual_path),
            read_lines(&automatic_path),
            read_lines(&pomodoro_path),
            read_lines(&projects_path),
        )?;

        let mut malformed = vec![];
        let manual = decode_table::<ManualEntryEntity>("manual", &manual, &mut malformed);
        let automatic = decode_table::<AppUsageEntity>("automatic", &automatic, &mut malformed);
        let pomodoro =
            decode_table::<PomodoroSessionEntity>("pomodoro", &pomodoro, &mut malformed);
        let projects = decode_table::<ProjectEntity>("projects", &projects, &mut malformed);

        let mut intervals = vec![];
        intervals.extend(manual.iter().map(ActivityInterval::from));
        intervals.extend(automatic.iter().map(ActivityInterval::from));
        intervals.extend(pomodoro.iter().map(ActivityInterval::from));
        intervals.retain(|interval| intersects(interval, &range));
        intervals.sort_by_key(|interval| (interval.start, interval.end, interval.key));

        debug!(
            "Loaded {} intervals between {} and {}",
            intervals.len(),
            range.start,
            range.end
        );

        Ok(Snapshot {
            intervals,
            malformed,
            projects: projects.iter().map(|project| project.id).collect(),
        })
    }

    async fn append_manual(&self, entry: NewManualEntry) -> Result<ManualEntryEntity> {
        let path = self.source_path(SourceKind::Manual);
        let mut file = File::options()
            .read(true)
            .append(true)
            .create(true)
            .open(&path)
            .await?;

        file.lock_exclusive()?;
        let result = append_manual_with_file(&mut file, entry).await;
        file.unlock_async().await?;
        result
    }

    async fn apply(&self, plan: &StorePlan) -> Result<()> {
        let edits = SourceEdits::from_plan(plan);

        // Rewrite every affected table in memory first, so a vanished id
        // aborts before a single byte lands on disk. Replacements then go
        // out file by file. Discards landing without the others is fine,
        // the survivor is never touched, so no rewrite order can lose it.
        let mut pending = vec![];
        for (source, edit) in &edits.map {
            let path = self.source_path(*source);
            let lines = read_lines(&path).await?;
            let content = rewrite_table(*source, &lines, edit)?;
            pending.push((path, content));
        }

        for (path, content) in pending {
            replace_file(&path, &content).await?;
        }
        Ok(())
    }
}

/// Reads all lines of a table file under a shared lock. A missing file is
/// an empty table.
async fn read_lines(path: &Path) -> Result<Vec<String>> {
    let file = match File::open(path).await {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(vec![]),
        Err(e) => return Err(e.into()),
    };
    file.lock_shared()?;

    let mut lines = BufReader::new(file).lines();
    let mut collected = vec![];
    while let Some(line) = lines.next_line().await? {
        collected.push(line);
    }

    lines.into_inner().into_inner().unlock_async().await?;
    Ok(collected)
}

/// Decodes one table, collecting undecodable lines as diagnostics instead
/// of dropping them.
fn decode_table<T: DeserializeOwned>(
    table: &'static str,
    lines: &[String],
    malformed: &mut Vec<Malformed>,
) -> Vec<T> {
    let mut rows = vec![];
    for (index, line) in lines.iter().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<T>(line) {
            Ok(row) => rows.push(row),
            Err(e) => {
                // Usually the tail of a write cut off by a shutdown.
                warn!("Undecodable {table} record at line {}: {e}", index + 1);
                malformed.push(Malformed {
                    table,
                    line: index + 1,
                    message: e.to_string(),
                });
            }
        }
    }
    rows
}

fn intersects(interval: &ActivityInterval, range: &FetchRange) -> bool {
    if interval.start >= range.end {
        return false;
    }
    match interval.end {
        Some(end) => end > range.start || interval.start >= range.start,
        None => true,
    }
}

async fn append_manual_with_file(
    file: &mut File,
    entry: NewManualEntry,
) -> Result<ManualEntryEntity> {
    let mut content = String::new();
    file.read_to_string(&mut content).await?;

    let lines = content.lines().map(str::to_owned).collect::<Vec<_>>();
    let mut ignored = vec![];
    let existing = decode_table::<ManualEntryEntity>("manual", &lines, &mut ignored);
    let next_id = existing.iter().map(|row| row.id).max().unwrap_or(0) + 1;

    let entity = ManualEntryEntity {
        id: next_id,
        task: entry.task,
        project: entry.project,
        start: entry.start,
        end: entry.end,
    };

    let mut buffer = serde_json::to_vec(&entity)?;
    buffer.push(b'\n');
    file.write_all(&buffer).await?;
    file.flush().await?;
    Ok(entity)
}

/// Pending changes to one source table, keyed by record id.
#[derive(Debug, Default)]
struct SourceEdit {
    delete: HashSet<u64>,
    close_at: HashMap<u64, DateTime<Utc>>,
    clear_project: HashSet<u64>,
    /// Ids that are not being changed but must still exist, like a merge
    /// survivor.
    require: HashSet<u64>,
}

impl SourceEdit {
    fn referenced(&self) -> impl Iterator<Item = u64> + '_ {
        self.delete
            .iter()
            .chain(self.close_at.keys())
            .chain(self.clear_project.iter())
            .chain(self.require.iter())
            .copied()
    }
}

#[derive(Debug, Default)]
struct SourceEdits {
    map: HashMap<SourceKind, SourceEdit>,
}

impl SourceEdits {
    fn from_plan(plan: &StorePlan) -> Self {
        let mut edits = SourceEdits::default();
        match plan {
            StorePlan::Merge(plan) => {
                edits.entry(plan.survivor).require.insert(plan.survivor.id);
                for key in &plan.discard {
                    edits.entry(*key).delete.insert(key.id);
                }
            }
            StorePlan::Cleanup(defects) => {
                for defect in defects {
                    let edit = edits.entry(defect.key);
                    match defect.fix {
                        SuggestedFix::Delete => {
                            edit.delete.insert(defect.key.id);
                        }
                        SuggestedFix::CloseAt(end) => {
                            edit.close_at.insert(defect.key.id, end);
                        }
                        SuggestedFix::ClearProject => {
                            edit.clear_project.insert(defect.key.id);
                        }
                    }
                }
            }
        }
        edits
    }

    fn entry(&mut self, key: RecordKey) -> &mut SourceEdit {
        self.map.entry(key.source).or_default()
    }
}

fn rewrite_table(source: SourceKind, lines: &[String], edit: &SourceEdit) -> Result<String> {
    match source {
        SourceKind::Manual => rewrite_rows::<ManualEntryEntity, _, _>(
            source,
            lines,
            edit,
            |row| row.id,
            |row, edit| {
                if let Some(end) = edit.close_at.get(&row.id) {
                    row.end = Some(*end);
                }
                if edit.clear_project.contains(&row.id) {
                    row.project = None;
                }
            },
        ),
        SourceKind::Automatic => rewrite_rows::<AppUsageEntity, _, _>(
            source,
            lines,
            edit,
            |row| row.id,
            // Usage records carry nothing repairable, they only get deleted.
            |_row, _edit| {},
        ),
        SourceKind::Pomodoro => rewrite_rows::<PomodoroSessionEntity, _, _>(
            source,
            lines,
            edit,
            |row| row.id,
            |row, edit| {
                if let Some(end) = edit.close_at.get(&row.id) {
                    row.finished_at = Some(*end);
                }
                if edit.clear_project.contains(&row.id) {
                    row.project = None;
                }
            },
        ),
    }
}

/// Rebuilds one table with the edit applied. Fails with a stale-record
/// error if any id the edit references is gone, in which case the caller
/// must not write anything.
fn rewrite_rows<T, I, R>(
    source: SourceKind,
    lines: &[String],
    edit: &SourceEdit,
    id_of: I,
    repair: R,
) -> Result<String>
where
    T: DeserializeOwned + Serialize,
    I: Fn(&T) -> u64,
    R: Fn(&mut T, &SourceEdit),
{
    let mut seen = HashSet::new();
    let mut output = String::new();
    for line in lines {
        if line.trim().is_empty() {
            continue;
        }
        let Ok(mut row) = serde_json::from_str::<T>(line) else {
            // Undecodable lines are carried over untouched. Dropping data
            // is the one thing a rewrite must never do on the side.
            output.push_str(line);
            output.push('\n');
            continue;
        };
        let id = id_of(&row);
        seen.insert(id);
        if edit.delete.contains(&id) {
            continue;
        }
        repair(&mut row, edit);
        output.push_str(&serde_json::to_string(&row)?);
        output.push('\n');
    }

    for id in edit.referenced() {
        if !seen.contains(&id) {
            return Err(EngineError::StaleRecord {
                key: RecordKey::new(source, id),
            }
            .into());
        }
    }
    Ok(output)
}

/// Replaces a table file in one rename so a crash mid-write cannot leave a
/// half-rewritten table behind.
async fn replace_file(path: &Path, content: &str) -> Result<()> {
    let staging = path.with_extension("jsonl.new");
    let mut file = File::create(&staging).await?;
    file.write_all(content.as_bytes()).await?;
    file.sync_all().await?;
    drop(file);
    tokio::fs::rename(&staging, path).await?;
    Ok(())
}
