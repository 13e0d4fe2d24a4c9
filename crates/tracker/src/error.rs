use thiserror::Error;

use sourcetrack_core::{CoreError, RecordId};

/// Errors produced by [`TrackerStore`](crate::TrackerStore) and
/// [`ReportStore`](crate::ReportStore) backends.
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("tracker store unavailable: {0}")]
    Unavailable(String),

    #[error("record {0} already exists")]
    DuplicateRecord(RecordId),

    #[error("record {0} not found")]
    RecordNotFound(RecordId),

    /// Another writer is advancing the record right now.
    #[error("record {0} is locked by another writer")]
    Locked(RecordId),

    #[error("record {id} changed concurrently (expected version {expected}, found {actual})")]
    VersionConflict {
        id: RecordId,
        expected: u64,
        actual: u64,
    },

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TrackerError {
    /// Another writer got to the record first.
    pub fn is_contention(&self) -> bool {
        matches!(self, TrackerError::Locked(_) | TrackerError::VersionConflict { .. })
    }

    /// Whether a later invocation can reasonably expect a different outcome.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TrackerError::Unavailable(_)
                | TrackerError::Locked(_)
                | TrackerError::VersionConflict { .. }
                | TrackerError::Io(_)
        )
    }
}
