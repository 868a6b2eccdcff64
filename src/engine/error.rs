use chrono::{DateTime, Utc};
use thiserror::Error;

use super::interval::RecordKey;

/// Errors the reconciliation passes can produce. Storage level failures are
/// not represented here, the store propagates those through [anyhow::Error]
/// unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("Window start {start} must be before end {end}")]
    InvalidWindow {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    #[error("Conflict group has no members")]
    EmptyGroup,
    #[error("Record {key} is not a member of the conflict group")]
    SurvivorOutsideGroup { key: RecordKey },
    #[error("Record {key} is missing from the loaded snapshot")]
    UnknownMember { key: RecordKey },
    #[error("Record {key} no longer exists in storage, re-run detection")]
    StaleRecord { key: RecordKey },
}
