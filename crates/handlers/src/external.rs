//! Collaborators the stage handlers drive but do not own.
//!
//! Every call carries an idempotency token (`"{record_id}:{stage}"`).
//! Backends that can honour it must treat a repeat call with the same token
//! as success; a clash with a different token is a rejection.

use async_trait::async_trait;

use sourcetrack_core::{SourceType, Tag};

use crate::definitions::{
    ConnectionDefinition, CrawlerDefinition, JobDefinition, TableDefinition, TriggerDefinition,
    WorkflowDefinition,
};

#[derive(Debug, thiserror::Error)]
pub enum ExternalError {
    /// The provider refused the request; retrying unchanged will not help.
    #[error("rejected by provider: {0}")]
    Rejected(String),

    #[error("transient provider error: {0}")]
    Transient(String),
}

/// Catalog registration: tables, cluster connections and the crawlers that keep them current.
#[async_trait]
pub trait CatalogRegistrar: Send + Sync {
    /// Create the catalog table; returns its name.
    async fn register_table(&self, table: &TableDefinition) -> Result<String, ExternalError>;

    /// Create a scheduled crawler; returns its name.
    async fn create_crawler(&self, crawler: &CrawlerDefinition) -> Result<String, ExternalError>;

    /// Create a JDBC connection to a database cluster; returns its name.
    async fn create_connection(&self, connection: &ConnectionDefinition)
        -> Result<String, ExternalError>;
}

/// Scan-job provisioning.
#[async_trait]
pub trait JobProvisioner: Send + Sync {
    async fn create_job(&self, job: &JobDefinition) -> Result<String, ExternalError>;

    async fn create_workflow(&self, workflow: &WorkflowDefinition) -> Result<String, ExternalError>;

    async fn create_trigger(&self, trigger: &TriggerDefinition) -> Result<String, ExternalError>;
}

/// Live provider-native tags of a resource.
#[async_trait]
pub trait TagSource: Send + Sync {
    /// `Ok(None)` when the resource carries no tags at all.
    async fn tags(
        &self,
        source_type: SourceType,
        resource_key: &str,
    ) -> Result<Option<Vec<Tag>>, ExternalError>;
}

/// Schemas of a database cluster, reached through its catalog connection.
#[async_trait]
pub trait SchemaDiscovery: Send + Sync {
    /// Every schema holding at least one table, system schemas included.
    async fn schemas(&self, connection: &ConnectionDefinition) -> Result<Vec<String>, ExternalError>;
}
