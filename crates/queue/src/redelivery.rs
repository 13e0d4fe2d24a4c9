//! What to do with a message whose body can never be processed.
//!
//! A malformed message is left on the queue until it has been received
//! `max_receive_count` times, then moved to a quarantine queue (or dropped
//! when none is configured) so it stops cycling forever.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::envelope::Delivery;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoisonAction {
    /// Leave the message to be redelivered.
    Retry,
    /// Move it out of the queue.
    Quarantine,
}

#[derive(Debug, Clone, Copy)]
pub struct RedeliveryPolicy {
    pub max_receive_count: u32,
}

impl Default for RedeliveryPolicy {
    fn default() -> Self {
        Self {
            max_receive_count: 5,
        }
    }
}

impl RedeliveryPolicy {
    pub fn new(max_receive_count: u32) -> Self {
        Self {
            max_receive_count: max_receive_count.max(1),
        }
    }

    pub fn on_malformed(&self, delivery: &Delivery) -> PoisonAction {
        if delivery.receive_count >= self.max_receive_count {
            PoisonAction::Quarantine
        } else {
            PoisonAction::Retry
        }
    }
}

/// Body published to the quarantine queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuarantinedMessage {
    pub original_message_id: String,
    pub body: String,
    pub receive_count: u32,
    pub reason: String,
    pub quarantined_at: DateTime<Utc>,
}

impl QuarantinedMessage {
    pub fn new(delivery: &Delivery, reason: impl Into<String>) -> Self {
        Self {
            original_message_id: delivery.message_id.clone(),
            body: delivery.body.clone(),
            receive_count: delivery.receive_count,
            reason: reason.into(),
            quarantined_at: Utc::now(),
        }
    }
}
