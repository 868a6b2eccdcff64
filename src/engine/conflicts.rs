use std::{collections::HashMap, fmt::Display};

use chrono::{DateTime, Duration, Utc};

use super::{
    config::DetectorConfig,
    interval::{ActivityInterval, RecordKey},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConflictKind {
    /// Genuinely concurrent activity, usually from different sources.
    Overlap,
    /// The same activity logged twice.
    Duplicate,
}

impl Display for ConflictKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConflictKind::Overlap => write!(f, "overlap"),
            ConflictKind::Duplicate => write!(f, "duplicate"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Low => write!(f, "low"),
            Severity::Medium => write!(f, "medium"),
            Severity::High => write!(f, "high"),
        }
    }
}

/// A connected component of pairwise overlapping intervals. If a overlaps b
/// and b overlaps c, all three end up in one group so the user resolves one
/// conflict instead of two. The group only references records by key, it
/// owns no interval data itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictGroup {
    pub kind: ConflictKind,
    pub severity: Severity,
    /// Sorted by (start, end, key) of the underlying intervals.
    pub members: Vec<RecordKey>,
}

/// Finds every group of overlapping or duplicated records.
///
/// Runs a start-ordered sweep keeping the set of intervals still active at
/// the current start, classifies each active pair, and folds the pairs into
/// connected components. Output order follows the earliest member of each
/// group, so repeated runs over an unchanged snapshot give identical
/// results.
pub fn detect_conflicts(
    intervals: &[ActivityInterval],
    config: &DetectorConfig,
) -> Vec<ConflictGroup> {
    let mut order = (0..intervals.len())
        .filter(|&i| intervals[i].is_measurable())
        .collect::<Vec<_>>();
    order.sort_by_key(|&i| (intervals[i].start, intervals[i].end, intervals[i].key));

    let mut components = DisjointSet::new(intervals.len());
    let mut pairs: Vec<(usize, ConflictKind, Severity)> = vec![];
    // Active intervals with their ends, pruned as the sweep moves right.
    let mut active: Vec<(usize, DateTime<Utc>)> = vec![];

    for &index in &order {
        let current = &intervals[index];
        active.retain(|&(_, end)| end > current.start);
        for &(other, _) in &active {
            let Some((kind, severity)) = classify_pair(&intervals[other], current, config)
            else {
                continue;
            };
            components.union(other, index);
            pairs.push((index, kind, severity));
        }
        if let Some(end) = current.end {
            active.push((index, end));
        }
    }

    collect_groups(intervals, &order, &mut components, &pairs)
}

/// Classifies one pair of closed intervals, or returns None when they do
/// not overlap. First match wins: a near-total same-source overlap with a
/// similar label is a duplicate, any other positive overlap is concurrent
/// activity.
fn classify_pair(
    a: &ActivityInterval,
    b: &ActivityInterval,
    config: &DetectorConfig,
) -> Option<(ConflictKind, Severity)> {
    let (a_end, b_end) = (a.end?, b.end?);
    let overlap = a_end.min(b_end) - a.start.max(b.start);
    if overlap <= Duration::zero() {
        return None;
    }
    let shorter = (a_end - a.start).min(b_end - b.start);
    let ratio = overlap.num_milliseconds() as f64 / shorter.num_milliseconds() as f64;

    let kind = if a.key.source == b.key.source
        && ratio >= config.duplicate_ratio
        && labels_similar(&a.label, &b.label, config)
    {
        ConflictKind::Duplicate
    } else {
        ConflictKind::Overlap
    };
    let severity = if ratio >= config.high_ratio {
        Severity::High
    } else if ratio >= config.medium_ratio {
        Severity::Medium
    } else {
        Severity::Low
    };
    Some((kind, severity))
}

/// Case-insensitive equality, optionally accepting one label containing the
/// other. Deliberately a baseline comparator, not language understanding.
fn labels_similar(a: &str, b: &str, config: &DetectorConfig) -> bool {
    let a = a.trim().to_lowercase();
    let b = b.trim().to_lowercase();
    if a.is_empty() || b.is_empty() {
        return a == b;
    }
    a == b || (config.label_containment && (a.contains(&b) || b.contains(&a)))
}

/// Folds classified pairs into per-component groups. A component is tagged
/// duplicate only when every pair inside it classified as duplicate, and
/// carries the worst pair severity.
fn collect_groups(
    intervals: &[ActivityInterval],
    order: &[usize],
    components: &mut DisjointSet,
    pairs: &[(usize, ConflictKind, Severity)],
) -> Vec<ConflictGroup> {
    struct Accumulated {
        kind: ConflictKind,
        severity: Severity,
        members: Vec<RecordKey>,
    }

    let mut accumulated: HashMap<usize, Accumulated> = HashMap::new();
    for &(index, kind, severity) in pairs {
        let root = components.find(index);
        let entry = accumulated.entry(root).or_insert(Accumulated {
            kind: ConflictKind::Duplicate,
            severity: Severity::Low,
            members: vec![],
        });
        if kind == ConflictKind::Overlap {
            entry.kind = ConflictKind::Overlap;
        }
        entry.severity = entry.severity.max(severity);
    }

    // Walking the sweep order keeps members and groups sorted by start.
    let mut roots_seen = vec![];
    for &index in order {
        let root = components.find(index);
        if let Some(entry) = accumulated.get_mut(&root) {
            if entry.members.is_empty() {
                roots_seen.push(root);
            }
            entry.members.push(intervals[index].key);
        }
    }

    roots_seen
        .into_iter()
        .filter_map(|root| accumulated.remove(&root))
        .map(|entry| ConflictGroup {
            kind: entry.kind,
            severity: entry.severity,
            members: entry.members,
        })
        .collect()
}

/// Index-based union-find over interval positions, so grouping never has to
/// chase object graphs.
struct DisjointSet {
    parent: Vec<usize>,
}

impl DisjointSet {
    fn new(len: usize) -> Self {
        Self {
            parent: (0..len).collect(),
        }
    }

    fn find(&mut self, v: usize) -> usize {
        if self.parent[v] != v {
            let root = self.find(self.parent[v]);
            self.parent[v] = root;
        }
        self.parent[v]
    }

    fn union(&mut self, a: usize, b: usize) {
        let a = self.find(a);
        let b = self.find(b);
        if a != b {
            // The smaller index stays the root to keep results stable.
            self.parent[a.max(b)] = a.min(b);
        }
    }
}
