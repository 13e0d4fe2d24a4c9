//! Bounded redelivery, then quarantine, for messages that cannot be processed.

use std::sync::Arc;

use tracing::{error, warn};

use sourcetrack_queue::{
    Delivery, PoisonAction, QuarantinedMessage, QueueConsumer, QueueError, QueuePublisher,
    RedeliveryPolicy,
};

use crate::error::HandlerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PoisonOutcome {
    /// Left unacknowledged for another attempt.
    Deferred,
    /// Parked on the quarantine queue (or dropped) and acknowledged.
    Quarantined,
}

pub(crate) struct PoisonHandler {
    consumer: Arc<dyn QueueConsumer>,
    pub(crate) quarantine: Option<Arc<dyn QueuePublisher>>,
    pub(crate) policy: RedeliveryPolicy,
}

impl PoisonHandler {
    pub(crate) fn new(consumer: Arc<dyn QueueConsumer>) -> Self {
        Self {
            consumer,
            quarantine: None,
            policy: RedeliveryPolicy::default(),
        }
    }

    pub(crate) async fn handle(
        &self,
        delivery: &Delivery,
        reason: &str,
    ) -> Result<PoisonOutcome, HandlerError> {
        match self.policy.on_malformed(delivery) {
            PoisonAction::Retry => {
                warn!(
                    message_id = %delivery.message_id,
                    receive_count = delivery.receive_count,
                    max_receive_count = self.policy.max_receive_count,
                    %reason,
                    "Malformed message left for redelivery"
                );
                Ok(PoisonOutcome::Deferred)
            }
            PoisonAction::Quarantine => {
                match &self.quarantine {
                    Some(quarantine) => {
                        let body = serde_json::to_string(&QuarantinedMessage::new(delivery, reason))
                            .map_err(|e| QueueError::Publish(e.to_string()))?;
                        quarantine.publish(&body).await?;
                        warn!(message_id = %delivery.message_id, %reason, "Message quarantined");
                    }
                    None => error!(
                        message_id = %delivery.message_id,
                        body = %delivery.body,
                        %reason,
                        "Dropping malformed message, no quarantine queue configured"
                    ),
                }
                self.consumer.ack(&delivery.receipt_handle).await?;
                Ok(PoisonOutcome::Quarantined)
            }
        }
    }
}
