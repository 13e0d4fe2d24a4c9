pub mod compliance;
pub mod config;
pub mod error;
pub mod logging;
pub mod predicate;
pub mod record;
pub mod stage;

pub use compliance::{Tag, TagComplianceRow, REQUIRED_TAG_KEYS};
pub use error::{ConfigError, CoreError};
pub use predicate::Predicate;
pub use record::{RecordId, SourceAttributes, SourceType, StoredRecord, TrackerRecord};
pub use stage::{CatalogRef, Stage, StageKind, Transition};
