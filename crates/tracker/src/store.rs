//! Storage traits shared by every handler.

use async_trait::async_trait;

use sourcetrack_core::{Predicate, RecordId, TagComplianceRow, TrackerRecord, Transition};

use crate::error::TrackerError;

/// Durable home of one [`TrackerRecord`] per discovered source.
///
/// Implementations must make `insert` atomic with respect to concurrent
/// inserts of the same id, and `advance` atomic with respect to concurrent
/// advances of the same record.
#[async_trait]
pub trait TrackerStore: Send + Sync {
    /// Insert only if no record with the same id exists.
    ///
    /// Fails with [`TrackerError::DuplicateRecord`] otherwise, leaving the
    /// stored record untouched.
    async fn insert(&self, record: &TrackerRecord) -> Result<(), TrackerError>;

    async fn get(&self, id: RecordId) -> Result<Option<TrackerRecord>, TrackerError>;

    /// Every record whose stored row satisfies `predicate`.
    async fn scan(&self, predicate: &Predicate) -> Result<Vec<TrackerRecord>, TrackerError>;

    /// Apply `transition` if the stored version still equals `expected_version`.
    ///
    /// Returns the updated record. Fails with
    /// [`TrackerError::VersionConflict`] if another writer got there first,
    /// [`TrackerError::RecordNotFound`] for an unknown id, and
    /// [`TrackerError::Core`] for an illegal transition.
    async fn advance(
        &self,
        id: RecordId,
        expected_version: u64,
        transition: Transition,
    ) -> Result<TrackerRecord, TrackerError>;
}

/// Append-only sink for compliance report rows.
#[async_trait]
pub trait ReportStore: Send + Sync {
    async fn append(&self, row: &TagComplianceRow) -> Result<(), TrackerError>;

    /// All rows, oldest capture first.
    async fn list(&self) -> Result<Vec<TagComplianceRow>, TrackerError>;
}
