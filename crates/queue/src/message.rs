//! Discovery payload carried on the handoff queue.
//!
//! Wire shape: `{ "source_type": "s3", "source_attributes": { ... } }`.
//! The older `data_source_type` / `data_source_attrs` names are accepted.

use serde::{Deserialize, Serialize};

use sourcetrack_core::{SourceAttributes, SourceType};

use crate::consumer::QueueMessage;
use crate::error::QueueError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryMessage {
    #[serde(alias = "data_source_type")]
    pub source_type: SourceType,
    #[serde(alias = "data_source_attrs")]
    pub source_attributes: SourceAttributes,
}

impl DiscoveryMessage {
    pub fn new(source_type: SourceType, source_attributes: SourceAttributes) -> Self {
        Self {
            source_type,
            source_attributes,
        }
    }

    pub fn to_body(&self) -> Result<String, QueueError> {
        serde_json::to_string(self).map_err(|e| QueueError::Malformed(e.to_string()))
    }

    pub fn from_body(body: &str) -> Result<Self, QueueError> {
        if body.trim().is_empty() {
            return Err(QueueError::Malformed("empty message body".into()));
        }
        serde_json::from_str(body).map_err(|e| QueueError::Malformed(format!("bad discovery payload: {e}")))
    }

    /// Identity of the physical source, if the attributes carry one.
    pub fn identity(&self) -> Option<&str> {
        self.source_type.identity_key(&self.source_attributes)
    }
}

/// Parse a received message body into a [`DiscoveryMessage`].
pub fn parse_message(msg: &QueueMessage) -> Result<DiscoveryMessage, QueueError> {
    DiscoveryMessage::from_body(&msg.body)
        .map_err(|e| QueueError::Malformed(format!("message {}: {e}", msg.id)))
}
