//! Ingestion: provider creation notifications into queue messages or records.

use std::sync::Arc;

use serde_json::Value;
use tracing::{info, warn};

use sourcetrack_core::{CatalogRef, RecordId, SourceType, Tag, TrackerRecord};
use sourcetrack_queue::{DiscoveryMessage, QueuePublisher};
use sourcetrack_tracker::{TrackerError, TrackerStore};

use crate::error::HandlerError;
use crate::events::{BucketCreated, CatalogTableCreated, ClusterCreated, TableCreated};
use crate::external::TagSource;

/// Bucket tag that opts a bucket into tracking.
pub const SCAN_OPT_IN_TAG: (&str, &str) = ("gdpr-scan", "true");
/// Bucket tag that also routes it to custom-entity provisioning.
pub const CUSTOM_ENTITY_TAG: (&str, &str) = ("glue-custom-entity", "true");

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Published to the tracking queue.
    Queued { custom_entity: bool },
    /// Published to the custom-entity queue only.
    CustomEntityOnly,
    Inserted(RecordId),
    /// Already tracked; nothing changed.
    Duplicate(RecordId),
    /// Filtered out by policy.
    Dropped(String),
}

fn has_tag(tags: &[Tag], (key, value): (&str, &str)) -> bool {
    tags.iter().any(|t| t.key == key && t.value == value)
}

/// Insert `record`, treating an existing record for the same source as success.
pub async fn insert_idempotent(
    store: &dyn TrackerStore,
    record: &TrackerRecord,
) -> Result<IngestOutcome, TrackerError> {
    match store.insert(record).await {
        Ok(()) => {
            info!(
                record_id = %record.id(),
                source_type = %record.source_type(),
                stage = %record.stage().kind(),
                "Record inserted"
            );
            Ok(IngestOutcome::Inserted(record.id()))
        }
        Err(TrackerError::DuplicateRecord(id)) => {
            info!(record_id = %id, "Record already tracked, skipping");
            Ok(IngestOutcome::Duplicate(id))
        }
        Err(e) => Err(e),
    }
}

/// Bucket created → tracking queue, if the bucket opted in.
pub struct BucketIngestor {
    tags: Arc<dyn TagSource>,
    tracking: Arc<dyn QueuePublisher>,
    custom_entity: Arc<dyn QueuePublisher>,
}

impl BucketIngestor {
    pub fn new(
        tags: Arc<dyn TagSource>,
        tracking: Arc<dyn QueuePublisher>,
        custom_entity: Arc<dyn QueuePublisher>,
    ) -> Self {
        Self {
            tags,
            tracking,
            custom_entity,
        }
    }

    pub async fn handle(&self, event: &Value) -> Result<IngestOutcome, HandlerError> {
        let bucket = BucketCreated::from_event(event)?;
        let name = bucket.bucket_name.clone();

        let Some(tags) = self.tags.tags(SourceType::ObjectStore, &name).await? else {
            warn!(bucket = %name, "Bucket has no tags, dropping");
            return Ok(IngestOutcome::Dropped(format!("{name} has no tags")));
        };

        let body = DiscoveryMessage::new(SourceType::ObjectStore, bucket.attributes).to_body()?;

        let custom_entity = has_tag(&tags, CUSTOM_ENTITY_TAG);
        if custom_entity {
            let id = self.custom_entity.publish(&body).await?;
            info!(bucket = %name, message_id = %id, "Routed to custom-entity queue");
        }

        if !has_tag(&tags, SCAN_OPT_IN_TAG) {
            warn!(bucket = %name, "Bucket lacks the opt-in tag");
            return Ok(if custom_entity {
                IngestOutcome::CustomEntityOnly
            } else {
                IngestOutcome::Dropped(format!("{name} lacks the opt-in tag"))
            });
        }

        let id = self.tracking.publish(&body).await?;
        info!(bucket = %name, message_id = %id, "Routed to tracking queue");
        Ok(IngestOutcome::Queued { custom_entity })
    }
}

/// Key-value table created → tracking queue, unless excepted.
pub struct TableIngestor {
    exception_tables: Vec<String>,
    tracking: Arc<dyn QueuePublisher>,
}

impl TableIngestor {
    pub fn new(exception_tables: Vec<String>, tracking: Arc<dyn QueuePublisher>) -> Self {
        Self {
            exception_tables,
            tracking,
        }
    }

    pub async fn handle(&self, event: &Value) -> Result<IngestOutcome, HandlerError> {
        let table = TableCreated::from_event(event)?;

        if self.exception_tables.iter().any(|t| *t == table.table_name) {
            warn!(table = %table.table_name, "Table is in the exception list, dropping");
            return Ok(IngestOutcome::Dropped(format!(
                "{} is in the exception list",
                table.table_name
            )));
        }

        let body = DiscoveryMessage::new(SourceType::KeyValueTable, table.attributes).to_body()?;
        let id = self.tracking.publish(&body).await?;
        info!(table = %table.table_name, message_id = %id, "Routed to tracking queue");
        Ok(IngestOutcome::Queued {
            custom_entity: false,
        })
    }
}

/// Database cluster created → cluster onboarding queue.
///
/// The cluster itself is not tracked; the catalog tables its crawlers create
/// are, through [`CatalogTableIngestor`].
pub struct ClusterIngestor {
    onboarding: Arc<dyn QueuePublisher>,
}

impl ClusterIngestor {
    pub fn new(onboarding: Arc<dyn QueuePublisher>) -> Self {
        Self { onboarding }
    }

    pub async fn handle(&self, event: &Value) -> Result<IngestOutcome, HandlerError> {
        let cluster = ClusterCreated::from_event(event)?;
        let body = DiscoveryMessage::new(SourceType::Relational, cluster.attributes).to_body()?;
        let id = self.onboarding.publish(&body).await?;
        info!(
            cluster = %cluster.cluster_identifier,
            engine = %cluster.engine,
            message_id = %id,
            "Routed to cluster onboarding queue"
        );
        Ok(IngestOutcome::Queued {
            custom_entity: false,
        })
    }
}

/// Catalog table created → record inserted already catalogued.
///
/// Relational sources register themselves in the catalog while being
/// provisioned, so the tracker starts them past the catalog stage.
pub struct CatalogTableIngestor {
    database_name: String,
    store: Arc<dyn TrackerStore>,
}

impl CatalogTableIngestor {
    pub fn new(database_name: impl Into<String>, store: Arc<dyn TrackerStore>) -> Self {
        Self {
            database_name: database_name.into(),
            store,
        }
    }

    pub async fn handle(&self, event: &Value) -> Result<IngestOutcome, HandlerError> {
        let created = CatalogTableCreated::from_event(event)?;

        if created.database_name != self.database_name {
            warn!(
                database = %created.database_name,
                tracked = %self.database_name,
                "Table created in an untracked database, ignoring"
            );
            return Ok(IngestOutcome::Dropped(format!(
                "database {} is not tracked",
                created.database_name
            )));
        }

        let catalog = CatalogRef::new(&created.database_name, &created.table_name);
        let record = TrackerRecord::catalogued(
            SourceType::Relational,
            &catalog.to_string(),
            created.parameters,
            catalog,
        );
        Ok(insert_idempotent(self.store.as_ref(), &record).await?)
    }
}
