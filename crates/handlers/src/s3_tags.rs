//! Bucket tags from S3.

use async_trait::async_trait;
use aws_sdk_s3::error::ProvideErrorMetadata;
use aws_sdk_s3::Client;
use tracing::{debug, info, warn};

use sourcetrack_core::config::AwsConfig;
use sourcetrack_core::{SourceType, Tag};

use crate::aws::{classify, endpoint_override, load_shared};
use crate::external::{ExternalError, TagSource};

pub struct S3TagSource {
    client: Client,
}

impl S3TagSource {
    pub async fn new(aws: &AwsConfig) -> Self {
        let shared = load_shared(aws, "sourcetrack-s3-static").await;
        let mut s3_config = aws_sdk_s3::config::Builder::from(&shared);
        if let Some(endpoint) = endpoint_override(aws) {
            s3_config = s3_config.endpoint_url(endpoint).force_path_style(true);
        }

        info!(region = %aws.region, "S3 tag source initialized");
        Self {
            client: Client::from_conf(s3_config.build()),
        }
    }
}

#[async_trait]
impl TagSource for S3TagSource {
    async fn tags(
        &self,
        source_type: SourceType,
        resource_key: &str,
    ) -> Result<Option<Vec<Tag>>, ExternalError> {
        if source_type != SourceType::ObjectStore {
            return Err(ExternalError::Rejected(format!(
                "S3 tag source cannot resolve {source_type} resources"
            )));
        }

        debug!(bucket = resource_key, "Fetching bucket tags");
        let resp = match self
            .client
            .get_bucket_tagging()
            .bucket(resource_key)
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                let code = e.as_service_error().and_then(|se| se.code());
                if code == Some("NoSuchTagSet") {
                    warn!(bucket = resource_key, "Bucket does not have any tags");
                    return Ok(None);
                }
                return Err(classify(resource_key, code, &e));
            }
        };

        let tags: Vec<Tag> = resp
            .tag_set()
            .iter()
            .map(|t| Tag::new(t.key(), t.value()))
            .collect();
        Ok((!tags.is_empty()).then_some(tags))
    }
}
