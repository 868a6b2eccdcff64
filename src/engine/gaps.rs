use chrono::{DateTime, Duration, Utc};

use super::{error::EngineError, interval::ActivityInterval};

/// Query window for gap detection. Half-open, covering `[start, end)`.
/// Construction enforces a non-empty window, so the sweep itself cannot
/// fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl Window {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, EngineError> {
        if start >= end {
            return Err(EngineError::InvalidWindow { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }
}

/// A maximal stretch of the window not covered by any closed interval.
/// Recomputed on every pass and never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeGap {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeGap {
    pub fn duration(&self) -> Duration {
        self.end - self.start
    }
}

/// Computes the uncovered parts of `window`, in ascending order.
///
/// Intervals are clipped to the window, merged into busy runs, and the
/// complement is emitted. All bounds are treated half-open, so an interval
/// ending exactly where the next one starts leaves no gap between them.
/// Open, degenerate, and inverted intervals never count as coverage.
pub fn detect_gaps(
    intervals: &[ActivityInterval],
    window: Window,
    min_gap: Duration,
) -> Vec<TimeGap> {
    let mut clipped = intervals
        .iter()
        .filter_map(|interval| {
            let end = interval.end?;
            if end <= interval.start {
                return None;
            }
            let start = interval.start.max(window.start);
            let end = end.min(window.end);
            (start < end).then_some((start, end))
        })
        .collect::<Vec<_>>();
    clipped.sort();

    let mut gaps = vec![];
    let mut covered_until = window.start;
    for (start, end) in clipped {
        if start - covered_until >= min_gap && start > covered_until {
            gaps.push(TimeGap {
                start: covered_until,
                end: start,
            });
        }
        covered_until = covered_until.max(end);
    }
    if window.end - covered_until >= min_gap && window.end > covered_until {
        gaps.push(TimeGap {
            start: covered_until,
            end: window.end,
        });
    }
    gaps
}
