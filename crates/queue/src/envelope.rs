//! Invocation envelopes: what a queue-triggered handler is handed.
//!
//! A queue-driven invocation carries
//! `{"Records": [{"messageId", "receiptHandle", "body", "attributes"}]}`.
//! A direct or test invocation carries the discovery payload itself plus
//! `"test_event": "true"`, and has nothing to delete afterwards.

use serde_json::Value;
use tracing::{debug, warn};

use crate::consumer::QueueMessage;
use crate::error::QueueError;
use crate::message::DiscoveryMessage;

/// What the consumer needs to delete a message once it is processed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub message_id: String,
    pub receipt_handle: String,
    pub receive_count: u32,
    /// Raw body, kept for quarantine.
    pub body: String,
}

/// One unit of intake work.
#[derive(Debug)]
pub struct Invocation {
    /// `None` for direct invocations: nothing to acknowledge.
    pub delivery: Option<Delivery>,
    pub message: Result<DiscoveryMessage, QueueError>,
}

impl Invocation {
    /// Split a handler event into invocations, one per queue record.
    ///
    /// Fails only when the envelope itself is broken (empty `Records`, or a
    /// record without its delivery handle); a bad body is reported per
    /// invocation so the message can still be acknowledged or quarantined.
    pub fn from_event(event: &Value) -> Result<Vec<Invocation>, QueueError> {
        let Some(records) = event.get("Records") else {
            return Self::direct(event).map(|inv| vec![inv]);
        };

        let records = records
            .as_array()
            .ok_or_else(|| QueueError::Malformed("'Records' is not a list".into()))?;
        if records.is_empty() {
            return Err(QueueError::Malformed("'Records' is empty".into()));
        }

        records.iter().map(Self::from_record).collect()
    }

    fn direct(event: &Value) -> Result<Invocation, QueueError> {
        let is_test = event
            .get("test_event")
            .and_then(Value::as_str)
            .is_some_and(|v| v.eq_ignore_ascii_case("true"));
        if !is_test {
            return Err(QueueError::Malformed(
                "missing 'Records' and not a test event".into(),
            ));
        }

        warn!("No delivery handle found, treating as a direct invocation");
        debug!(event = %event, "Direct invocation body");
        let message = serde_json::from_value::<DiscoveryMessage>(event.clone())
            .map_err(|e| QueueError::Malformed(format!("bad discovery payload: {e}")));
        Ok(Invocation {
            delivery: None,
            message,
        })
    }

    fn from_record(record: &Value) -> Result<Invocation, QueueError> {
        let field = |name: &str| {
            record
                .get(name)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        let receipt_handle =
            field("receiptHandle").ok_or_else(|| QueueError::Malformed("no receiptHandle present".into()))?;
        let message_id =
            field("messageId").ok_or_else(|| QueueError::Malformed("no messageId present".into()))?;
        let receive_count = record
            .get("attributes")
            .and_then(|a| a.get("ApproximateReceiveCount"))
            .and_then(Value::as_str)
            .and_then(|c| c.parse().ok())
            .unwrap_or(1);
        let body = field("body").unwrap_or_default();

        let message = DiscoveryMessage::from_body(&body);
        Ok(Invocation {
            delivery: Some(Delivery {
                message_id,
                receipt_handle,
                receive_count,
                body,
            }),
            message,
        })
    }

    /// Wrap a message obtained by polling.
    pub fn from_queue_message(msg: &QueueMessage) -> Invocation {
        Invocation {
            delivery: Some(Delivery::from(msg)),
            message: crate::message::parse_message(msg),
        }
    }
}

impl From<&QueueMessage> for Delivery {
    fn from(msg: &QueueMessage) -> Self {
        Self {
            message_id: msg.id.clone(),
            receipt_handle: msg.receipt_handle.clone(),
            receive_count: msg.attempt_count,
            body: msg.body.clone(),
        }
    }
}
