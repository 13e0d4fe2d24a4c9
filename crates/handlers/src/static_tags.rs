//! Tags read from a JSON file instead of the live provider.
//!
//! ```json
//! { "b1": { "APP_ID": "a-1", "gdpr-scan": "true" } }
//! ```
//! Keys are resource keys (bucket name, table ARN, connection name).

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use async_trait::async_trait;

use sourcetrack_core::{SourceType, Tag};

use crate::external::{ExternalError, TagSource};

#[derive(Debug, Clone, Default)]
pub struct StaticTags {
    resources: HashMap<String, Vec<Tag>>,
}

impl StaticTags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ExternalError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| ExternalError::Rejected(format!("{}: {e}", path.display())))?;
        let raw: HashMap<String, BTreeMap<String, String>> = serde_json::from_str(&json)
            .map_err(|e| ExternalError::Rejected(format!("{}: {e}", path.display())))?;
        Ok(Self {
            resources: raw
                .into_iter()
                .map(|(resource, tags)| {
                    let tags = tags.into_iter().map(|(k, v)| Tag::new(k, v)).collect();
                    (resource, tags)
                })
                .collect(),
        })
    }

    pub fn with(mut self, resource_key: impl Into<String>, tags: &[(&str, &str)]) -> Self {
        self.resources.insert(
            resource_key.into(),
            tags.iter().map(|(k, v)| Tag::new(*k, *v)).collect(),
        );
        self
    }
}

#[async_trait]
impl TagSource for StaticTags {
    async fn tags(
        &self,
        _source_type: SourceType,
        resource_key: &str,
    ) -> Result<Option<Vec<Tag>>, ExternalError> {
        Ok(self
            .resources
            .get(resource_key)
            .filter(|tags| !tags.is_empty())
            .cloned())
    }
}
