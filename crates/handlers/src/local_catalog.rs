use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::definitions::{
    ConnectionDefinition, CrawlerDefinition, JobDefinition, TableDefinition, TriggerDefinition,
    WorkflowDefinition,
};
use crate::external::{CatalogRegistrar, ExternalError, JobProvisioner};

/// A resource as persisted, with the token of the call that created it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredResource<T> {
    pub idempotency_token: String,
    pub created_at: DateTime<Utc>,
    pub definition: T,
}

/// Filesystem-backed catalog and job registry.
///
/// ```text
/// catalog/
///   tables/{database}/{table}.json
///   crawlers/{name}.json
///   connections/{name}.json
///   jobs/{name}.json
///   workflows/{name}.json
///   triggers/{name}.json
/// ```
/// Creation is insert-if-absent. Repeating a create with the token that made
/// the resource succeeds; any other token is rejected as a duplicate.
pub struct LocalCatalog {
    base_dir: PathBuf,
}

impl From<std::io::Error> for ExternalError {
    fn from(e: std::io::Error) -> Self {
        ExternalError::Transient(format!("catalog I/O: {e}"))
    }
}

impl From<serde_json::Error> for ExternalError {
    fn from(e: serde_json::Error) -> Self {
        ExternalError::Transient(format!("catalog JSON: {e}"))
    }
}

impl LocalCatalog {
    /// Create a catalog rooted at `base_dir`, ensuring the directory structure exists.
    pub fn new(base_dir: impl Into<PathBuf>) -> Result<Self, ExternalError> {
        let base_dir = base_dir.into();
        for dir in ["tables", "crawlers", "connections", "jobs", "workflows", "triggers"] {
            std::fs::create_dir_all(base_dir.join(dir))?;
        }
        Ok(Self { base_dir })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn table_path(&self, database_name: &str, table_name: &str) -> PathBuf {
        self.base_dir
            .join("tables")
            .join(database_name)
            .join(format!("{table_name}.json"))
    }

    fn named_path(&self, kind: &str, name: &str) -> PathBuf {
        self.base_dir.join(kind).join(format!("{name}.json"))
    }

    fn create<T>(&self, kind: &str, path: &Path, token: &str, definition: &T) -> Result<(), ExternalError>
    where
        T: Serialize + DeserializeOwned,
    {
        let dir = path
            .parent()
            .ok_or_else(|| ExternalError::Rejected(format!("invalid {kind} path")))?;
        std::fs::create_dir_all(dir)?;

        let stored = StoredResource {
            idempotency_token: token.to_string(),
            created_at: Utc::now(),
            definition,
        };
        let tmp = dir.join(format!(".tmp-{}", Uuid::new_v4()));
        std::fs::write(&tmp, serde_json::to_string_pretty(&stored)?)?;
        let linked = std::fs::hard_link(&tmp, path);
        std::fs::remove_file(&tmp).ok();

        match linked {
            Ok(()) => {
                info!(kind, path = %path.display(), "Created");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                let existing: StoredResource<T> = serde_json::from_str(&std::fs::read_to_string(path)?)?;
                if existing.idempotency_token == token {
                    debug!(kind, path = %path.display(), "Already created by this call");
                    Ok(())
                } else {
                    Err(ExternalError::Rejected(format!(
                        "{kind} {} already exists",
                        path.display()
                    )))
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    fn load<T: DeserializeOwned>(&self, path: &Path) -> Result<Option<StoredResource<T>>, ExternalError> {
        match std::fs::read_to_string(path) {
            Ok(json) => Ok(Some(serde_json::from_str(&json)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn table(
        &self,
        database_name: &str,
        table_name: &str,
    ) -> Result<Option<StoredResource<TableDefinition>>, ExternalError> {
        self.load(&self.table_path(database_name, table_name))
    }

    pub fn crawler(&self, name: &str) -> Result<Option<StoredResource<CrawlerDefinition>>, ExternalError> {
        self.load(&self.named_path("crawlers", name))
    }

    pub fn connection(
        &self,
        name: &str,
    ) -> Result<Option<StoredResource<ConnectionDefinition>>, ExternalError> {
        self.load(&self.named_path("connections", name))
    }

    pub fn job(&self, name: &str) -> Result<Option<StoredResource<JobDefinition>>, ExternalError> {
        self.load(&self.named_path("jobs", name))
    }

    pub fn workflow(&self, name: &str) -> Result<Option<StoredResource<WorkflowDefinition>>, ExternalError> {
        self.load(&self.named_path("workflows", name))
    }

    pub fn trigger(&self, name: &str) -> Result<Option<StoredResource<TriggerDefinition>>, ExternalError> {
        self.load(&self.named_path("triggers", name))
    }

    /// Number of resources of one kind (`"crawlers"`, `"jobs"`, ...).
    pub fn count(&self, kind: &str) -> Result<usize, ExternalError> {
        let mut count = 0;
        for entry in std::fs::read_dir(self.base_dir.join(kind))? {
            let path = entry?.path();
            if path.is_dir() {
                count += std::fs::read_dir(&path)?
                    .filter_map(Result::ok)
                    .filter(|e| e.path().extension().is_some_and(|x| x == "json"))
                    .count();
            } else if path.extension().is_some_and(|x| x == "json") {
                count += 1;
            }
        }
        Ok(count)
    }
}

#[async_trait]
impl CatalogRegistrar for LocalCatalog {
    async fn register_table(&self, table: &TableDefinition) -> Result<String, ExternalError> {
        let path = self.table_path(&table.catalog.database_name, &table.catalog.table_name);
        self.create("table", &path, &table.idempotency_token, table)?;
        Ok(table.catalog.table_name.clone())
    }

    async fn create_crawler(&self, crawler: &CrawlerDefinition) -> Result<String, ExternalError> {
        let path = self.named_path("crawlers", &crawler.name);
        self.create("crawler", &path, &crawler.idempotency_token, crawler)?;
        Ok(crawler.name.clone())
    }

    async fn create_connection(
        &self,
        connection: &ConnectionDefinition,
    ) -> Result<String, ExternalError> {
        let path = self.named_path("connections", &connection.name);
        self.create("connection", &path, &connection.idempotency_token, connection)?;
        Ok(connection.name.clone())
    }
}

#[async_trait]
impl JobProvisioner for LocalCatalog {
    async fn create_job(&self, job: &JobDefinition) -> Result<String, ExternalError> {
        let path = self.named_path("jobs", &job.name);
        self.create("job", &path, &job.idempotency_token, job)?;
        Ok(job.name.clone())
    }

    async fn create_workflow(&self, workflow: &WorkflowDefinition) -> Result<String, ExternalError> {
        let path = self.named_path("workflows", &workflow.name);
        self.create("workflow", &path, &workflow.idempotency_token, workflow)?;
        Ok(workflow.name.clone())
    }

    async fn create_trigger(&self, trigger: &TriggerDefinition) -> Result<String, ExternalError> {
        let path = self.named_path("triggers", &trigger.name);
        self.create("trigger", &path, &trigger.idempotency_token, trigger)?;
        Ok(trigger.name.clone())
    }
}
