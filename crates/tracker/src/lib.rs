pub mod error;
pub mod fs;
pub mod memory;
pub mod store;

pub use error::TrackerError;
pub use fs::{FsReportStore, FsTrackerStore};
pub use memory::{MemoryReportStore, MemoryTrackerStore};
pub use store::{ReportStore, TrackerStore};
