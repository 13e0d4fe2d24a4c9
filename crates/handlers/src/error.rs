use sourcetrack_core::{ConfigError, CoreError};
use sourcetrack_queue::QueueError;
use sourcetrack_tracker::TrackerError;

use crate::external::ExternalError;

#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// The notification or message does not have the expected shape.
    #[error("malformed event: {0}")]
    MalformedEvent(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Tracker(#[from] TrackerError),

    #[error(transparent)]
    Queue(QueueError),

    #[error(transparent)]
    External(#[from] ExternalError),

    #[error("timed out after {0}s")]
    Timeout(u64),
}

impl From<QueueError> for HandlerError {
    fn from(e: QueueError) -> Self {
        match e {
            QueueError::Malformed(reason) => HandlerError::MalformedEvent(reason),
            other => HandlerError::Queue(other),
        }
    }
}

impl From<CoreError> for HandlerError {
    fn from(e: CoreError) -> Self {
        HandlerError::Tracker(TrackerError::Core(e))
    }
}

impl HandlerError {
    /// Lost a race: another writer advanced the record first or is advancing it now.
    pub fn is_conflict(&self) -> bool {
        matches!(self, HandlerError::Tracker(e) if e.is_contention())
    }
}
