use std::fs::{File, OpenOptions};
use std::path::Path;

use fs2::FileExt;
use tracing::debug;

use sourcetrack_core::RecordId;

use crate::error::TrackerError;

/// Exclusive per-record write lock, released on drop.
///
/// An OS advisory lock on `{id}.lock`. The file outlives every writer and is
/// never removed; a writer that dies releases the lock with its handle, so a
/// leftover file never blocks anyone.
pub(super) struct RecordLock {
    file: File,
}

impl RecordLock {
    pub(super) fn acquire(dir: &Path, id: RecordId) -> Result<Self, TrackerError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(dir.join(format!("{id}.lock")))?;

        // fs2's method, not the inherent `File::try_lock_exclusive` of newer std.
        match FileExt::try_lock_exclusive(&file) {
            Ok(()) => Ok(Self { file }),
            Err(e) if e.raw_os_error() == fs2::lock_contended_error().raw_os_error() => {
                debug!(record_id = %id, "Record lock held by another writer");
                Err(TrackerError::Locked(id))
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for RecordLock {
    fn drop(&mut self) {
        // Closing the handle releases the lock anyway.
        FileExt::unlock(&self.file).ok();
    }
}
