//! Cluster tags for relational sources.
//!
//! Relational records are keyed by catalog connection name, so the lookup
//! goes connection → JDBC URL → cluster id → cluster ARN → tags.

use async_trait::async_trait;
use aws_sdk_glue::types::ConnectionPropertyKey;
// Shared by every SDK crate; covers the glue errors too.
use aws_sdk_rds::error::ProvideErrorMetadata;
use tracing::{debug, info, warn};

use sourcetrack_core::config::AwsConfig;
use sourcetrack_core::{SourceType, Tag};

use crate::aws::{classify, endpoint_override, load_shared};
use crate::definitions::cluster_identifier_from_jdbc_url;
use crate::external::{ExternalError, TagSource};

/// Keyless entries are dropped; a missing value reads as empty.
fn cluster_tags(list: &[aws_sdk_rds::types::Tag]) -> Vec<Tag> {
    list.iter()
        .filter_map(|t| Some(Tag::new(t.key()?, t.value().unwrap_or_default())))
        .collect()
}

pub struct RdsTagSource {
    glue: aws_sdk_glue::Client,
    rds: aws_sdk_rds::Client,
}

impl RdsTagSource {
    pub async fn new(aws: &AwsConfig) -> Self {
        let shared = load_shared(aws, "sourcetrack-rds-static").await;
        let mut glue = aws_sdk_glue::config::Builder::from(&shared);
        let mut rds = aws_sdk_rds::config::Builder::from(&shared);
        if let Some(endpoint) = endpoint_override(aws) {
            glue = glue.endpoint_url(endpoint);
            rds = rds.endpoint_url(endpoint);
        }

        info!(region = %aws.region, "RDS tag source initialized");
        Self {
            glue: aws_sdk_glue::Client::from_conf(glue.build()),
            rds: aws_sdk_rds::Client::from_conf(rds.build()),
        }
    }

    async fn jdbc_url(&self, connection_name: &str) -> Result<Option<String>, ExternalError> {
        let resp = match self.glue.get_connection().name(connection_name).send().await {
            Ok(resp) => resp,
            Err(e) => {
                let code = e.code();
                if code == Some("EntityNotFoundException") {
                    warn!(connection = connection_name, "Catalog connection not found");
                    return Ok(None);
                }
                return Err(classify(connection_name, code, &e));
            }
        };
        Ok(resp
            .connection()
            .and_then(|c| c.connection_properties())
            .and_then(|props| props.get(&ConnectionPropertyKey::JdbcConnectionUrl))
            .cloned())
    }

    async fn cluster_arn(&self, cluster_identifier: &str) -> Result<Option<String>, ExternalError> {
        let resp = match self
            .rds
            .describe_db_clusters()
            .db_cluster_identifier(cluster_identifier)
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                let code = e.code();
                if code == Some("DBClusterNotFoundFault") {
                    warn!(cluster = cluster_identifier, "Cluster not found");
                    return Ok(None);
                }
                return Err(classify(cluster_identifier, code, &e));
            }
        };
        Ok(resp
            .db_clusters()
            .first()
            .and_then(|c| c.db_cluster_arn())
            .map(str::to_string))
    }
}

#[async_trait]
impl TagSource for RdsTagSource {
    async fn tags(
        &self,
        source_type: SourceType,
        resource_key: &str,
    ) -> Result<Option<Vec<Tag>>, ExternalError> {
        if source_type != SourceType::Relational {
            return Err(ExternalError::Rejected(format!(
                "RDS tag source cannot resolve {source_type} resources"
            )));
        }

        let Some(url) = self.jdbc_url(resource_key).await? else {
            return Ok(None);
        };
        let Some(cluster_identifier) = cluster_identifier_from_jdbc_url(&url) else {
            return Err(ExternalError::Rejected(format!(
                "{resource_key}: cannot read a cluster from {url}"
            )));
        };
        let Some(arn) = self.cluster_arn(cluster_identifier).await? else {
            return Ok(None);
        };

        debug!(connection = resource_key, cluster_arn = %arn, "Fetching cluster tags");
        let resp = self
            .rds
            .list_tags_for_resource()
            .resource_name(&arn)
            .send()
            .await
            .map_err(|e| classify(&arn, e.code(), &e))?;

        let tags = cluster_tags(resp.tag_list());
        if tags.is_empty() {
            warn!(cluster_arn = %arn, "Cluster does not have any tags");
            return Ok(None);
        }
        Ok(Some(tags))
    }
}
