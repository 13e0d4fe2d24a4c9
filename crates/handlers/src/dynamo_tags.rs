//! Table tags from DynamoDB, looked up by table ARN.

use async_trait::async_trait;
use aws_sdk_dynamodb::error::ProvideErrorMetadata;
use aws_sdk_dynamodb::Client;
use tracing::{debug, info, warn};

use sourcetrack_core::config::AwsConfig;
use sourcetrack_core::{SourceType, Tag};

use crate::aws::{classify, endpoint_override, load_shared};
use crate::external::{ExternalError, TagSource};

pub struct DynamoTagSource {
    client: Client,
}

impl DynamoTagSource {
    pub async fn new(aws: &AwsConfig) -> Self {
        let shared = load_shared(aws, "sourcetrack-dynamodb-static").await;
        let mut config = aws_sdk_dynamodb::config::Builder::from(&shared);
        if let Some(endpoint) = endpoint_override(aws) {
            config = config.endpoint_url(endpoint);
        }

        info!(region = %aws.region, "DynamoDB tag source initialized");
        Self {
            client: Client::from_conf(config.build()),
        }
    }
}

#[async_trait]
impl TagSource for DynamoTagSource {
    async fn tags(
        &self,
        source_type: SourceType,
        resource_key: &str,
    ) -> Result<Option<Vec<Tag>>, ExternalError> {
        if source_type != SourceType::KeyValueTable {
            return Err(ExternalError::Rejected(format!(
                "DynamoDB tag source cannot resolve {source_type} resources"
            )));
        }

        debug!(table_arn = resource_key, "Fetching table tags");
        let mut tags = Vec::new();
        let mut next_token: Option<String> = None;
        loop {
            let resp = self
                .client
                .list_tags_of_resource()
                .resource_arn(resource_key)
                .set_next_token(next_token.take())
                .send()
                .await
                .map_err(|e| {
                    let code = e.as_service_error().and_then(|se| se.code());
                    classify(resource_key, code, &e)
                })?;

            tags.extend(resp.tags().iter().map(|t| Tag::new(t.key(), t.value())));
            match resp.next_token() {
                Some(token) if !token.is_empty() => next_token = Some(token.to_string()),
                _ => break,
            }
        }

        if tags.is_empty() {
            warn!(table_arn = resource_key, "Table does not have any tags");
            return Ok(None);
        }
        Ok(Some(tags))
    }
}
