mod lock;
mod reports;

pub use reports::FsReportStore;

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use tracing::{debug, warn};
use uuid::Uuid;

use sourcetrack_core::{Predicate, RecordId, TrackerRecord, Transition};

use crate::error::TrackerError;
use crate::store::TrackerStore;

use lock::RecordLock;

/// Filesystem-backed tracker store.
///
/// One JSON document per record:
/// ```text
/// tracker/
///   records/
///     {id}.json      <- stored row (flat booleans + source_attributes)
///     {id}.lock      <- advisory lock taken by a writer advancing {id}
/// ```
/// Inserts publish a fully written temp file with `hard_link`, which fails
/// atomically when the target exists. Advances hold the per-record lock and
/// replace the document with `rename`; a writer that finds the lock taken
/// gets [`TrackerError::Locked`].
pub struct FsTrackerStore {
    base_dir: PathBuf,
}

impl FsTrackerStore {
    /// Create a store rooted at `base_dir`, ensuring the directory structure exists.
    pub fn new(base_dir: impl Into<PathBuf>) -> Result<Self, TrackerError> {
        let base_dir = base_dir.into();
        std::fs::create_dir_all(base_dir.join("records"))?;
        Ok(Self { base_dir })
    }

    /// Base path for this store.
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn records_dir(&self) -> PathBuf {
        self.base_dir.join("records")
    }

    fn record_path(&self, id: RecordId) -> PathBuf {
        self.records_dir().join(format!("{id}.json"))
    }

    fn load(&self, id: RecordId) -> Result<Option<TrackerRecord>, TrackerError> {
        match std::fs::read_to_string(self.record_path(id)) {
            Ok(json) => Ok(Some(serde_json::from_str(&json)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// Write `value` to a unique temp file next to `dir`'s final entries.
pub(super) fn write_temp<T: Serialize>(dir: &Path, value: &T) -> Result<PathBuf, TrackerError> {
    let tmp = dir.join(format!(".tmp-{}", Uuid::new_v4()));
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(&tmp, json)?;
    Ok(tmp)
}

/// Atomically create `target` from `tmp`; `Ok(false)` if `target` already exists.
pub(super) fn publish_new(tmp: &Path, target: &Path) -> Result<bool, TrackerError> {
    let linked = std::fs::hard_link(tmp, target);
    std::fs::remove_file(tmp).ok();
    match linked {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl TrackerStore for FsTrackerStore {
    async fn insert(&self, record: &TrackerRecord) -> Result<(), TrackerError> {
        let tmp = write_temp(&self.records_dir(), record)?;
        if !publish_new(&tmp, &self.record_path(record.id()))? {
            return Err(TrackerError::DuplicateRecord(record.id()));
        }
        debug!(record_id = %record.id(), "Record written");
        Ok(())
    }

    async fn get(&self, id: RecordId) -> Result<Option<TrackerRecord>, TrackerError> {
        self.load(id)
    }

    async fn scan(&self, predicate: &Predicate) -> Result<Vec<TrackerRecord>, TrackerError> {
        let mut matched = Vec::new();
        for entry in std::fs::read_dir(self.records_dir())? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let json = match std::fs::read_to_string(&path) {
                Ok(json) => json,
                // Records are never deleted; tolerate a vanished file anyway.
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            match serde_json::from_str::<TrackerRecord>(&json) {
                Ok(record) if predicate.matches_record(&record) => matched.push(record),
                Ok(_) => {}
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable record"),
            }
        }
        matched.sort_by_key(|r| r.created_at());
        Ok(matched)
    }

    async fn advance(
        &self,
        id: RecordId,
        expected_version: u64,
        transition: Transition,
    ) -> Result<TrackerRecord, TrackerError> {
        let _lock = RecordLock::acquire(&self.records_dir(), id)?;

        let current = self.load(id)?.ok_or(TrackerError::RecordNotFound(id))?;
        if current.version() != expected_version {
            return Err(TrackerError::VersionConflict {
                id,
                expected: expected_version,
                actual: current.version(),
            });
        }

        let next = current.advanced(transition, Utc::now())?;
        let tmp = write_temp(&self.records_dir(), &next)?;
        std::fs::rename(&tmp, self.record_path(id))?;
        debug!(record_id = %id, version = next.version(), "Record advanced");
        Ok(next)
    }
}
