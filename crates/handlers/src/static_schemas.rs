//! Schema lists supplied up front instead of queried from the cluster.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::definitions::ConnectionDefinition;
use crate::external::{ExternalError, SchemaDiscovery};

/// Per-cluster schema lists, with a fallback list for clusters not named.
#[derive(Debug, Clone, Default)]
pub struct StaticSchemas {
    fallback: Vec<String>,
    clusters: HashMap<String, Vec<String>>,
}

impl StaticSchemas {
    pub fn new(fallback: Vec<String>) -> Self {
        Self {
            fallback,
            clusters: HashMap::new(),
        }
    }

    pub fn with(mut self, cluster_identifier: impl Into<String>, schemas: &[&str]) -> Self {
        self.clusters.insert(
            cluster_identifier.into(),
            schemas.iter().map(|s| s.to_string()).collect(),
        );
        self
    }
}

#[async_trait]
impl SchemaDiscovery for StaticSchemas {
    async fn schemas(&self, connection: &ConnectionDefinition) -> Result<Vec<String>, ExternalError> {
        Ok(self
            .clusters
            .get(&connection.cluster_identifier)
            .unwrap_or(&self.fallback)
            .clone())
    }
}
