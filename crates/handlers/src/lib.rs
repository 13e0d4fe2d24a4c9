mod aws;
pub mod cluster;
pub mod definitions;
pub mod dynamo_tags;
pub mod error;
pub mod events;
pub mod external;
pub mod ingest;
pub mod intake;
pub mod local_catalog;
mod poison;
pub mod rds_tags;
pub mod report;
pub mod s3_tags;
pub mod stage;
pub mod static_schemas;
pub mod static_tags;

pub use cluster::{ClusterOnboarding, ClusterReport};
pub use dynamo_tags::DynamoTagSource;
pub use error::HandlerError;
pub use external::{CatalogRegistrar, ExternalError, JobProvisioner, SchemaDiscovery, TagSource};
pub use ingest::{
    BucketIngestor, CatalogTableIngestor, ClusterIngestor, IngestOutcome, TableIngestor,
};
pub use intake::{Intake, IntakeReport};
pub use local_catalog::LocalCatalog;
pub use rds_tags::RdsTagSource;
pub use report::{ReportSummary, TagComplianceReporter};
pub use s3_tags::S3TagSource;
pub use stage::{CatalogStage, JobStage, StageReport};
pub use static_schemas::StaticSchemas;
pub use static_tags::StaticTags;
