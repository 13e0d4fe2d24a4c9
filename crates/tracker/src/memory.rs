//! In-process store backends for tests and single-process runs.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use sourcetrack_core::{Predicate, RecordId, TagComplianceRow, TrackerRecord, Transition};

use crate::error::TrackerError;
use crate::store::{ReportStore, TrackerStore};

#[derive(Default)]
pub struct MemoryTrackerStore {
    records: RwLock<BTreeMap<RecordId, TrackerRecord>>,
}

impl MemoryTrackerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl TrackerStore for MemoryTrackerStore {
    async fn insert(&self, record: &TrackerRecord) -> Result<(), TrackerError> {
        let mut records = self.records.write().await;
        if records.contains_key(&record.id()) {
            return Err(TrackerError::DuplicateRecord(record.id()));
        }
        records.insert(record.id(), record.clone());
        Ok(())
    }

    async fn get(&self, id: RecordId) -> Result<Option<TrackerRecord>, TrackerError> {
        Ok(self.records.read().await.get(&id).cloned())
    }

    async fn scan(&self, predicate: &Predicate) -> Result<Vec<TrackerRecord>, TrackerError> {
        let records = self.records.read().await;
        Ok(records
            .values()
            .filter(|r| predicate.matches_record(r))
            .cloned()
            .collect())
    }

    async fn advance(
        &self,
        id: RecordId,
        expected_version: u64,
        transition: Transition,
    ) -> Result<TrackerRecord, TrackerError> {
        let mut records = self.records.write().await;
        let current = records.get(&id).ok_or(TrackerError::RecordNotFound(id))?;
        if current.version() != expected_version {
            return Err(TrackerError::VersionConflict {
                id,
                expected: expected_version,
                actual: current.version(),
            });
        }
        let next = current.advanced(transition, Utc::now())?;
        records.insert(id, next.clone());
        Ok(next)
    }
}

#[derive(Default)]
pub struct MemoryReportStore {
    rows: RwLock<Vec<TagComplianceRow>>,
}

impl MemoryReportStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReportStore for MemoryReportStore {
    async fn append(&self, row: &TagComplianceRow) -> Result<(), TrackerError> {
        self.rows.write().await.push(row.clone());
        Ok(())
    }

    async fn list(&self) -> Result<Vec<TagComplianceRow>, TrackerError> {
        let mut rows = self.rows.read().await.clone();
        rows.sort_by_key(|r| r.captured_at);
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sourcetrack_core::{CatalogRef, SourceAttributes, SourceType};

    fn record(bucket: &str) -> TrackerRecord {
        let mut attrs = SourceAttributes::new();
        attrs.insert("bucketName".into(), bucket.into());
        TrackerRecord::discovered(SourceType::ObjectStore, bucket, attrs)
    }

    #[tokio::test]
    async fn test_insert_is_idempotent() {
        let store = MemoryTrackerStore::new();
        store.insert(&record("b1")).await.unwrap();
        let err = store.insert(&record("b1")).await.unwrap_err();
        assert!(matches!(err, TrackerError::DuplicateRecord(_)));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_advance_checks_version() {
        let store = MemoryTrackerStore::new();
        let rec = record("b1");
        store.insert(&rec).await.unwrap();

        let catalogue = Transition::Catalogue(CatalogRef::new("db", "db_b1"));
        let updated = store.advance(rec.id(), 1, catalogue.clone()).await.unwrap();
        assert_eq!(updated.version(), 2);

        // A second writer that scanned the same version loses.
        let err = store.advance(rec.id(), 1, catalogue).await.unwrap_err();
        assert!(matches!(
            err,
            TrackerError::VersionConflict {
                expected: 1,
                actual: 2,
                ..
            }
        ));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_advance_unknown_record() {
        let store = MemoryTrackerStore::new();
        let err = store
            .advance(
                record("ghost").id(),
                1,
                Transition::Catalogue(CatalogRef::new("db", "t")),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, TrackerError::RecordNotFound(_)));
    }

    #[tokio::test]
    async fn test_scan_filters() {
        let store = MemoryTrackerStore::new();
        store.insert(&record("b1")).await.unwrap();
        store.insert(&record("b2")).await.unwrap();
        let b2 = record("b2").id();
        store
            .advance(b2, 1, Transition::Catalogue(CatalogRef::new("db", "db_b2")))
            .await
            .unwrap();

        let pending = store
            .scan(&Predicate::awaiting_catalog(SourceType::ObjectStore))
            .await
            .unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id(), record("b1").id());

        let catalogued = store
            .scan(&Predicate::catalogued(SourceType::ObjectStore))
            .await
            .unwrap();
        assert_eq!(catalogued.len(), 1);
        assert_eq!(catalogued[0].id(), b2);
    }
}
