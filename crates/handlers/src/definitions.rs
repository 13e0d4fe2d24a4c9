//! Naming rules and resource definitions for the catalog and job stages.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use sourcetrack_core::config::JobConfig;
use sourcetrack_core::record::attr_str;
use sourcetrack_core::{
    CatalogRef, CoreError, RecordId, SourceAttributes, SourceType, StageKind, TrackerRecord,
};

use crate::events::ClusterCreated;

pub const CRAWLER_SCHEDULE: &str = "cron(0 2 * * ? *)";
pub const JOB_TRIGGER_SCHEDULE: &str = "cron(0 6 ? * MON-FRI *)";

pub const SCHEMA_UPDATE_BEHAVIOR: &str = "UPDATE_IN_DATABASE";
pub const SCHEMA_DELETE_BEHAVIOR: &str = "LOG";

pub const JOB_SCRIPT_FILE: &str = "s3-source-script.py";

/// Database a cluster connection points at when it was created without one.
pub const FALLBACK_JDBC_DATABASE: &str = "information_schema";

const JOB_DEFAULT_ARGUMENTS: [(&str, &str); 7] = [
    ("--enable-metrics", "true"),
    ("--enable-spark-ui", "true"),
    ("--enable-job-insights", "false"),
    ("--enable-glue-datacatalog", "true"),
    ("--enable-continuous-cloudwatch-log", "true"),
    ("--job-bookmark-option", "job-bookmark-disable"),
    ("--job-language", "python"),
];

/// Catalog table name for a source: `{db}_{identity}` with `-` and `.` folded to `_`.
pub fn catalog_table_name(database_name: &str, identity: &str) -> String {
    let folded: String = identity
        .chars()
        .map(|c| if c == '-' || c == '.' { '_' } else { c })
        .collect();
    format!("{database_name}_{folded}")
}

/// Short human name of the source, as used in catalog table names.
///
/// Key-value table names are only unique per region, so they are qualified
/// with the region from the table ARN when it is known.
pub fn catalog_identity(source_type: SourceType, attrs: &SourceAttributes) -> Option<String> {
    match source_type {
        SourceType::ObjectStore => attr_str(attrs, &["bucketName"]).map(str::to_string),
        SourceType::KeyValueTable => {
            let name = attr_str(attrs, &["tableDescription", "tableName"])?;
            let region = attr_str(attrs, &["tableDescription", "tableArn"]).and_then(arn_region);
            Some(match region {
                Some(region) => format!("{region}_{name}"),
                None => name.to_string(),
            })
        }
        SourceType::Relational => attr_str(attrs, &["connectionName"]).map(str::to_string),
        _ => None,
    }
}

/// Region field of an ARN (`arn:partition:service:region:account:resource`).
fn arn_region(arn: &str) -> Option<&str> {
    arn.split(':').nth(3).filter(|r| !r.is_empty())
}

/// Where the crawler finds the data.
pub fn storage_location(source_type: SourceType, attrs: &SourceAttributes) -> Option<String> {
    match source_type {
        SourceType::ObjectStore => attr_str(attrs, &["bucketName"]).map(|b| format!("s3://{b}/")),
        SourceType::KeyValueTable => attr_str(attrs, &["tableDescription", "tableArn"])
            .or_else(|| attr_str(attrs, &["tableDescription", "tableName"]))
            .map(str::to_string),
        SourceType::Relational => attr_str(attrs, &["connectionName"]).map(str::to_string),
        _ => None,
    }
}

fn missing(record: &TrackerRecord, what: &str) -> CoreError {
    CoreError::InvalidRecord(format!("record {} has no {what}", record.id()))
}

// ── Catalog stage ─────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableDefinition {
    pub catalog: CatalogRef,
    pub source_type: SourceType,
    pub location: String,
    pub idempotency_token: String,
}

impl TableDefinition {
    pub fn for_record(record: &TrackerRecord, database_name: &str) -> Result<Self, CoreError> {
        let attrs = record.source_attributes();
        let identity = catalog_identity(record.source_type(), attrs)
            .ok_or_else(|| missing(record, "catalog identity"))?;
        let location = storage_location(record.source_type(), attrs)
            .ok_or_else(|| missing(record, "storage location"))?;

        Ok(Self {
            catalog: CatalogRef::new(database_name, catalog_table_name(database_name, &identity)),
            source_type: record.source_type(),
            location,
            idempotency_token: record.idempotency_token(StageKind::Catalogued),
        })
    }
}

/// What a crawler reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CrawlerTarget {
    /// Keep one registered catalog table current.
    CatalogTable { table_name: String },
    /// Crawl every table matching `path` (`{database}/{schema}/%`) over a connection.
    Jdbc { connection_name: String, path: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrawlerDefinition {
    pub name: String,
    pub role_arn: String,
    pub database_name: String,
    pub target: CrawlerTarget,
    pub schedule: String,
    pub update_behavior: String,
    pub delete_behavior: String,
    pub idempotency_token: String,
}

impl CrawlerDefinition {
    fn scheduled(
        name: String,
        role_arn: &str,
        database_name: &str,
        target: CrawlerTarget,
        idempotency_token: String,
    ) -> Self {
        Self {
            name,
            role_arn: role_arn.to_string(),
            database_name: database_name.to_string(),
            target,
            schedule: CRAWLER_SCHEDULE.to_string(),
            update_behavior: SCHEMA_UPDATE_BEHAVIOR.to_string(),
            delete_behavior: SCHEMA_DELETE_BEHAVIOR.to_string(),
            idempotency_token,
        }
    }

    pub fn for_table(table: &TableDefinition, role_arn: &str) -> Self {
        Self::scheduled(
            format!("{}_crawler", table.catalog.table_name),
            role_arn,
            &table.catalog.database_name,
            CrawlerTarget::CatalogTable {
                table_name: table.catalog.table_name.clone(),
            },
            table.idempotency_token.clone(),
        )
    }

    /// One crawler per database schema, named `glue-crawler-{cluster}-{schema}`.
    pub fn for_schema(
        connection: &ConnectionDefinition,
        schema: &str,
        role_arn: &str,
        database_name: &str,
    ) -> Self {
        Self::scheduled(
            format!("glue-crawler-{}-{schema}", connection.cluster_identifier),
            role_arn,
            database_name,
            CrawlerTarget::Jdbc {
                connection_name: connection.name.clone(),
                path: format!("{}/{schema}/%", connection.database),
            },
            format!("{}:{schema}", connection.idempotency_token),
        )
    }
}

// ── Cluster onboarding ────────────────────────────────────────

/// JDBC connection from the catalog to a database cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionDefinition {
    pub name: String,
    pub cluster_identifier: String,
    pub jdbc_url: String,
    pub database: String,
    pub enforce_ssl: bool,
    pub subnet_group: String,
    pub idempotency_token: String,
}

impl ConnectionDefinition {
    pub fn for_cluster(cluster: &ClusterCreated, enforce_ssl: bool) -> Self {
        let protocol = if cluster.engine.contains("postgres") {
            "postgresql"
        } else {
            "mysql"
        };
        let database = cluster
            .database_name
            .clone()
            .unwrap_or_else(|| FALLBACK_JDBC_DATABASE.to_string());
        let id = RecordId::derive(SourceType::Relational, &cluster.cluster_arn);

        Self {
            name: format!("glue-connection-{}", cluster.cluster_identifier),
            cluster_identifier: cluster.cluster_identifier.clone(),
            jdbc_url: format!(
                "jdbc:{protocol}://{}:{}/{database}",
                cluster.endpoint, cluster.port
            ),
            database,
            enforce_ssl,
            subnet_group: cluster.subnet_group.clone(),
            idempotency_token: format!("{id}:{}", StageKind::Catalogued),
        }
    }
}

/// Cluster id from a JDBC URL whose host is the cluster endpoint
/// (`jdbc:postgresql://{cluster}.cluster-xyz.{region}.rds.amazonaws.com:5432/db`).
pub fn cluster_identifier_from_jdbc_url(url: &str) -> Option<&str> {
    let (_, rest) = url.split_once("://")?;
    let host = rest.split(['/', ':']).next()?;
    host.split('.').next().filter(|id| !id.is_empty())
}

// ── Job stage ─────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobCommand {
    pub name: String,
    pub script_location: String,
    pub python_version: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobDefinition {
    pub name: String,
    pub role_arn: String,
    pub command: JobCommand,
    pub default_arguments: BTreeMap<String, String>,
    pub worker_type: String,
    pub number_of_workers: u32,
    pub glue_version: String,
    pub timeout_minutes: u32,
    pub max_retries: u32,
    pub execution_class: String,
    pub max_concurrent_runs: u32,
    pub idempotency_token: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub name: String,
    pub idempotency_token: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerDefinition {
    pub name: String,
    pub workflow_name: String,
    pub job_name: String,
    pub schedule: String,
    pub start_on_creation: bool,
    pub idempotency_token: String,
}

/// Settings shared by every scan job.
#[derive(Debug, Clone)]
pub struct JobSettings {
    pub role_arn: String,
    pub script_bucket: String,
    pub assets_bucket: String,
    pub output_table: String,
    /// Used when the source does not say where it lives.
    pub default_region: String,
}

impl JobSettings {
    pub fn new(job: &JobConfig, role_arn: impl Into<String>, default_region: impl Into<String>) -> Self {
        Self {
            role_arn: role_arn.into(),
            script_bucket: job.script_bucket.clone(),
            assets_bucket: job.assets_bucket.clone(),
            output_table: job.output_table.clone(),
            default_region: default_region.into(),
        }
    }
}

/// Everything the job stage creates for one record, in creation order.
#[derive(Debug, Clone, PartialEq)]
pub struct JobPlan {
    pub job: JobDefinition,
    pub workflow: WorkflowDefinition,
    pub trigger: TriggerDefinition,
}

impl JobPlan {
    pub fn for_record(record: &TrackerRecord, settings: &JobSettings) -> Result<Self, CoreError> {
        let catalog = record
            .stage()
            .catalog()
            .ok_or_else(|| missing(record, "catalog entry"))?;
        let attrs = record.source_attributes();
        let bucket = attr_str(attrs, &["bucketName"]).ok_or_else(|| missing(record, "bucketName"))?;
        let host = attr_str(attrs, &["Host"]).ok_or_else(|| missing(record, "Host"))?;
        let region = attr_str(attrs, &["CreateBucketConfiguration", "LocationConstraint"])
            .unwrap_or(settings.default_region.as_str());

        let table = &catalog.table_name;
        let job_name = format!("s3-pii-detect-{region}-{table}");
        let workflow_name = format!("s3-wf-{region}-{table}");
        let token = record.idempotency_token(StageKind::JobProvisioned);

        let mut arguments: BTreeMap<String, String> = JOB_DEFAULT_ARGUMENTS
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let assets = &settings.assets_bucket;
        for (key, value) in [
            ("--spark-event-logs-path", format!("s3://{assets}/sparkHistoryLogs/")),
            ("--TempDir", format!("s3://{assets}/temporary/")),
            ("--s3Bucket", bucket.to_string()),
            ("--dataCatalogTable", table.clone()),
            ("--dataCatalogDatabase", catalog.database_name.clone()),
            ("--outputTable", settings.output_table.clone()),
            ("--s3Host", host.to_string()),
            ("--region", region.to_string()),
        ] {
            arguments.insert(key.to_string(), value);
        }

        let job = JobDefinition {
            name: job_name.clone(),
            role_arn: settings.role_arn.clone(),
            command: JobCommand {
                name: "glueetl".to_string(),
                script_location: format!("s3://{}/{JOB_SCRIPT_FILE}", settings.script_bucket),
                python_version: "3".to_string(),
            },
            default_arguments: arguments,
            worker_type: "G.1X".to_string(),
            number_of_workers: 10,
            glue_version: "4.0".to_string(),
            timeout_minutes: 2880,
            max_retries: 0,
            execution_class: "STANDARD".to_string(),
            max_concurrent_runs: 1,
            idempotency_token: token.clone(),
        };

        Ok(Self {
            workflow: WorkflowDefinition {
                name: workflow_name.clone(),
                idempotency_token: token.clone(),
            },
            trigger: TriggerDefinition {
                name: format!("s3-glue-trigger-{region}-{table}"),
                workflow_name,
                job_name,
                schedule: JOB_TRIGGER_SCHEDULE.to_string(),
                start_on_creation: true,
                idempotency_token: token,
            },
            job,
        })
    }
}
