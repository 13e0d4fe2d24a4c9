use std::collections::HashSet;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tempfile::TempDir;

use sourcetrack_core::config::{CatalogConfig, JobConfig, StageConfig};
use sourcetrack_core::{CatalogRef, RecordId, SourceType, Tag, TrackerRecord, Transition};
use sourcetrack_handlers::definitions::{
    ConnectionDefinition, CrawlerDefinition, JobDefinition, JobSettings, TableDefinition, TriggerDefinition,
    WorkflowDefinition,
};
use sourcetrack_handlers::{CatalogRegistrar, ExternalError, JobProvisioner, LocalCatalog, TagSource};
use sourcetrack_tracker::{FsTrackerStore, TrackerStore};

/// Tracker store and local catalog under one temp dir.
pub struct Env {
    _dir: TempDir,
    pub store: Arc<FsTrackerStore>,
    pub catalog: Arc<LocalCatalog>,
}

impl Env {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FsTrackerStore::new(dir.path().join("tracker")).unwrap());
        let catalog = Arc::new(LocalCatalog::new(dir.path().join("catalog")).unwrap());
        Self {
            _dir: dir,
            store,
            catalog,
        }
    }

    pub async fn insert_bucket(&self, name: &str) -> TrackerRecord {
        let record = TrackerRecord::discovered(SourceType::ObjectStore, name, bucket_attrs(name));
        self.store.insert(&record).await.unwrap();
        record
    }

    pub async fn record(&self, id: RecordId) -> TrackerRecord {
        self.store.get(id).await.unwrap().unwrap()
    }
}

pub fn bucket_attrs(name: &str) -> serde_json::Map<String, Value> {
    json!({ "bucketName": name, "Host": format!("{name}.s3.amazonaws.com") })
        .as_object()
        .cloned()
        .unwrap()
}

pub fn bucket_event(name: &str) -> Value {
    json!({
        "source": "aws.s3",
        "detail": {
            "eventName": "CreateBucket",
            "requestParameters": bucket_attrs(name)
        }
    })
}

pub fn catalog_config() -> CatalogConfig {
    CatalogConfig {
        catalog_dir: "unused".into(),
        database_name: "db".into(),
        role_arn: "arn:aws:iam::123456789012:role/crawler".into(),
    }
}

pub fn job_settings() -> JobSettings {
    let job = JobConfig {
        script_bucket: "scripts".into(),
        assets_bucket: "assets".into(),
        output_table: "pii-findings".into(),
    };
    JobSettings::new(&job, "arn:aws:iam::123456789012:role/scan", "us-east-1")
}

pub fn stage_config(secs: u64) -> StageConfig {
    StageConfig {
        record_timeout_secs: secs,
    }
}

pub fn compliance_tags() -> Vec<(&'static str, &'static str)> {
    vec![
        ("gdpr-scan", "true"),
        ("APP_ID", "app-42"),
        ("APP_NAME", "billing"),
        ("Data Subjects", "customers"),
    ]
}

fn record_of(table: &TableDefinition) -> RecordId {
    let id = table.idempotency_token.split(':').next().unwrap_or_default();
    RecordId::from_str(id).unwrap()
}

/// Registrar that refuses tables for some buckets and stalls on others.
pub struct FlakyRegistrar {
    pub inner: Arc<LocalCatalog>,
    pub reject: HashSet<String>,
    pub stall: HashSet<String>,
}

impl FlakyRegistrar {
    pub fn new(inner: Arc<LocalCatalog>) -> Self {
        Self {
            inner,
            reject: HashSet::new(),
            stall: HashSet::new(),
        }
    }
}

#[async_trait]
impl CatalogRegistrar for FlakyRegistrar {
    async fn register_table(&self, table: &TableDefinition) -> Result<String, ExternalError> {
        let name = &table.catalog.table_name;
        if self.reject.contains(name) {
            return Err(ExternalError::Rejected(format!("{name} refused")));
        }
        if self.stall.contains(name) {
            tokio::time::sleep(Duration::from_secs(5)).await;
        }
        self.inner.register_table(table).await
    }

    async fn create_crawler(&self, crawler: &CrawlerDefinition) -> Result<String, ExternalError> {
        self.inner.create_crawler(crawler).await
    }

    async fn create_connection(
        &self,
        connection: &ConnectionDefinition,
    ) -> Result<String, ExternalError> {
        self.inner.create_connection(connection).await
    }
}

/// Registrar that lets a competing run advance the record mid-call.
pub struct RacingRegistrar {
    pub inner: Arc<LocalCatalog>,
    pub store: Arc<FsTrackerStore>,
}

#[async_trait]
impl CatalogRegistrar for RacingRegistrar {
    async fn register_table(&self, table: &TableDefinition) -> Result<String, ExternalError> {
        let id = record_of(table);
        let current = self.store.get(id).await.unwrap().unwrap();
        self.store
            .advance(
                id,
                current.version(),
                Transition::Catalogue(CatalogRef::new("db", &table.catalog.table_name)),
            )
            .await
            .unwrap();
        self.inner.register_table(table).await
    }

    async fn create_crawler(&self, crawler: &CrawlerDefinition) -> Result<String, ExternalError> {
        self.inner.create_crawler(crawler).await
    }

    async fn create_connection(
        &self,
        connection: &ConnectionDefinition,
    ) -> Result<String, ExternalError> {
        self.inner.create_connection(connection).await
    }
}

/// Provisioner that fails every trigger.
pub struct NoTriggers(pub Arc<LocalCatalog>);

#[async_trait]
impl JobProvisioner for NoTriggers {
    async fn create_job(&self, job: &JobDefinition) -> Result<String, ExternalError> {
        self.0.create_job(job).await
    }

    async fn create_workflow(&self, workflow: &WorkflowDefinition) -> Result<String, ExternalError> {
        self.0.create_workflow(workflow).await
    }

    async fn create_trigger(&self, _trigger: &TriggerDefinition) -> Result<String, ExternalError> {
        Err(ExternalError::Transient("throttled".into()))
    }
}

/// Tag source that is down for some resources.
pub struct PartialTags {
    pub inner: sourcetrack_handlers::StaticTags,
    pub down: HashSet<String>,
}

#[async_trait]
impl TagSource for PartialTags {
    async fn tags(
        &self,
        source_type: SourceType,
        resource_key: &str,
    ) -> Result<Option<Vec<Tag>>, ExternalError> {
        if self.down.contains(resource_key) {
            return Err(ExternalError::Transient(format!("{resource_key} unreachable")));
        }
        self.inner.tags(source_type, resource_key).await
    }
}
