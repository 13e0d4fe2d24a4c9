//! Handoff-queue intake: discovery messages into tracker records.
//!
//! A message is acknowledged only once its record is durably stored (or was
//! already there), so a crash between insert and ack costs one harmless
//! redelivery.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, info};

use sourcetrack_core::TrackerRecord;
use sourcetrack_queue::{Delivery, Invocation, QueueConsumer, QueuePublisher, RedeliveryPolicy};
use sourcetrack_tracker::TrackerStore;

use crate::error::HandlerError;
use crate::ingest::{insert_idempotent, IngestOutcome};
use crate::poison::{PoisonHandler, PoisonOutcome};

#[derive(Debug, Clone, Default, Serialize)]
pub struct IntakeReport {
    pub inserted: usize,
    pub duplicates: usize,
    /// Malformed or unstorable messages left on the queue for another attempt.
    pub deferred: usize,
    pub quarantined: usize,
    /// `"{message_id}: {error}"` for messages left unacknowledged by a failure.
    pub failed: Vec<String>,
}

impl IntakeReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

pub struct Intake {
    store: Arc<dyn TrackerStore>,
    consumer: Arc<dyn QueueConsumer>,
    poison: PoisonHandler,
}

impl Intake {
    pub fn new(store: Arc<dyn TrackerStore>, consumer: Arc<dyn QueueConsumer>) -> Self {
        Self {
            store,
            poison: PoisonHandler::new(consumer.clone()),
            consumer,
        }
    }

    pub fn with_quarantine(mut self, quarantine: Arc<dyn QueuePublisher>) -> Self {
        self.poison.quarantine = Some(quarantine);
        self
    }

    pub fn with_policy(mut self, policy: RedeliveryPolicy) -> Self {
        self.poison.policy = policy;
        self
    }

    /// Handle one pushed invocation (a batch of queue records or a direct payload).
    pub async fn handle_event(&self, event: &Value) -> Result<IntakeReport, HandlerError> {
        let invocations = Invocation::from_event(event)?;
        let mut report = IntakeReport::default();
        for invocation in invocations {
            self.run(invocation, &mut report).await?;
        }
        Ok(report)
    }

    /// Poll until the queue comes back empty.
    pub async fn drain(&self, batch_size: u32) -> Result<IntakeReport, HandlerError> {
        let mut report = IntakeReport::default();
        loop {
            let batch = self.consumer.poll_batch(batch_size).await?;
            if batch.is_empty() {
                break;
            }
            debug!(count = batch.len(), "Processing batch");
            for msg in &batch {
                self.run(Invocation::from_queue_message(msg), &mut report).await?;
            }
        }
        info!(
            inserted = report.inserted,
            duplicates = report.duplicates,
            deferred = report.deferred,
            quarantined = report.quarantined,
            failed = report.failed.len(),
            "Queue drained"
        );
        Ok(report)
    }

    /// Queue-borne failures are recorded and leave the message for redelivery;
    /// a failing direct invocation has no message to fall back on and aborts.
    async fn run(&self, invocation: Invocation, report: &mut IntakeReport) -> Result<(), HandlerError> {
        let message_id = invocation.delivery.as_ref().map(|d| d.message_id.clone());
        match (self.process(invocation, report).await, message_id) {
            (Ok(()), _) => Ok(()),
            (Err(e), Some(id)) => {
                error!(message_id = %id, error = %e, "Message processing failed");
                report.failed.push(format!("{id}: {e}"));
                Ok(())
            }
            (Err(e), None) => Err(e),
        }
    }

    async fn process(&self, invocation: Invocation, report: &mut IntakeReport) -> Result<(), HandlerError> {
        let Invocation { delivery, message } = invocation;

        let message = match (message, &delivery) {
            (Ok(message), _) => message,
            (Err(e), Some(d)) => return self.handle_poison(d, &e.to_string(), report).await,
            (Err(e), None) => return Err(e.into()),
        };

        let Some(identity) = message.identity() else {
            let reason = format!("{} payload carries no source identity", message.source_type);
            return match &delivery {
                Some(d) => self.handle_poison(d, &reason, report).await,
                None => Err(HandlerError::MalformedEvent(reason)),
            };
        };

        let record = TrackerRecord::discovered(
            message.source_type,
            identity,
            message.source_attributes.clone(),
        );
        match insert_idempotent(self.store.as_ref(), &record).await {
            Ok(IngestOutcome::Duplicate(_)) => report.duplicates += 1,
            Ok(_) => report.inserted += 1,
            // Redelivering cannot fix a record the store refuses outright.
            Err(e) if !e.is_retryable() => {
                return match &delivery {
                    Some(d) => self.handle_poison(d, &e.to_string(), report).await,
                    None => Err(e.into()),
                };
            }
            Err(e) => return Err(e.into()),
        }

        if let Some(d) = &delivery {
            self.consumer.ack(&d.receipt_handle).await?;
            debug!(message_id = %d.message_id, "Message deleted");
        }
        Ok(())
    }

    async fn handle_poison(
        &self,
        delivery: &Delivery,
        reason: &str,
        report: &mut IntakeReport,
    ) -> Result<(), HandlerError> {
        match self.poison.handle(delivery, reason).await? {
            PoisonOutcome::Deferred => report.deferred += 1,
            PoisonOutcome::Quarantined => report.quarantined += 1,
        }
        Ok(())
    }
}
