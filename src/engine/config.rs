use chrono::Duration;

/// Tunable thresholds for gap and conflict detection. The ratio cutoffs
/// are heuristics, so they live here instead of being buried as constants.
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    /// Gaps shorter than this are not reported.
    pub min_gap: Duration,
    /// Same-source pairs at or above this overlap ratio with similar
    /// labels count as duplicates rather than concurrent activity.
    pub duplicate_ratio: f64,
    /// Overlap ratio at or above which a conflict is high severity.
    pub high_ratio: f64,
    /// Overlap ratio at or above which a conflict is medium severity.
    pub medium_ratio: f64,
    /// Accept one label containing the other in addition to
    /// case-insensitive equality when comparing labels.
    pub label_containment: bool,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            min_gap: Duration::minutes(15),
            duplicate_ratio: 0.95,
            high_ratio: 0.75,
            medium_ratio: 0.25,
            label_containment: true,
        }
    }
}
