//! Cluster onboarding: one catalog connection per database cluster, one
//! crawler per user schema.
//!
//! The tables those crawlers register arrive later as catalog notifications
//! and are tracked by [`CatalogTableIngestor`](crate::CatalogTableIngestor).
//! Every create carries a token derived from the cluster ARN, so a redelivered
//! message re-runs harmlessly.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use sourcetrack_core::config::{CatalogConfig, ClusterConfig, StageConfig};
use sourcetrack_core::SourceType;
use sourcetrack_queue::{Delivery, Invocation, QueueConsumer, QueuePublisher, RedeliveryPolicy};

use crate::definitions::{ConnectionDefinition, CrawlerDefinition};
use crate::error::HandlerError;
use crate::events::ClusterCreated;
use crate::external::{CatalogRegistrar, ExternalError, SchemaDiscovery};
use crate::poison::{PoisonHandler, PoisonOutcome};

#[derive(Debug, Clone, Default, Serialize)]
pub struct ClusterReport {
    pub connections: Vec<String>,
    pub crawlers: Vec<String>,
    pub deferred: usize,
    pub quarantined: usize,
    /// `"{message_id}: {error}"` for messages left unacknowledged by a failure.
    pub failed: Vec<String>,
}

impl ClusterReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

pub struct ClusterOnboarding {
    registrar: Arc<dyn CatalogRegistrar>,
    discovery: Arc<dyn SchemaDiscovery>,
    consumer: Arc<dyn QueueConsumer>,
    poison: PoisonHandler,
    database_name: String,
    role_arn: String,
    cluster: ClusterConfig,
    record_timeout: Duration,
}

impl ClusterOnboarding {
    pub fn new(
        registrar: Arc<dyn CatalogRegistrar>,
        discovery: Arc<dyn SchemaDiscovery>,
        consumer: Arc<dyn QueueConsumer>,
        catalog: &CatalogConfig,
        cluster: ClusterConfig,
        stage: &StageConfig,
    ) -> Self {
        Self {
            registrar,
            discovery,
            poison: PoisonHandler::new(consumer.clone()),
            consumer,
            database_name: catalog.database_name.clone(),
            role_arn: catalog.role_arn.clone(),
            cluster,
            record_timeout: stage.record_timeout(),
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
    pub async fn handle_event(&self, event: &Value) -> Result<ClusterReport, HandlerError> {
        let mut report = ClusterReport::default();
        for invocation in Invocation::from_event(event)? {
            self.run(invocation, &mut report).await?;
        }
        Ok(report)
    }

    /// Poll until the queue comes back empty.
    pub async fn drain(&self, batch_size: u32) -> Result<ClusterReport, HandlerError> {
        let mut report = ClusterReport::default();
        loop {
            let batch = self.consumer.poll_batch(batch_size).await?;
            if batch.is_empty() {
                break;
            }
            for msg in &batch {
                self.run(Invocation::from_queue_message(msg), &mut report).await?;
            }
        }
        info!(
            connections = report.connections.len(),
            crawlers = report.crawlers.len(),
            deferred = report.deferred,
            quarantined = report.quarantined,
            failed = report.failed.len(),
            "Cluster queue drained"
        );
        Ok(report)
    }

    async fn run(&self, invocation: Invocation, report: &mut ClusterReport) -> Result<(), HandlerError> {
        let message_id = invocation.delivery.as_ref().map(|d| d.message_id.clone());
        match (self.process(invocation, report).await, message_id) {
            (Ok(()), _) => Ok(()),
            (Err(e), Some(id)) => {
                error!(message_id = %id, error = %e, "Cluster onboarding failed");
                report.failed.push(format!("{id}: {e}"));
                Ok(())
            }
            (Err(e), None) => Err(e),
        }
    }

    async fn process(&self, invocation: Invocation, report: &mut ClusterReport) -> Result<(), HandlerError> {
        let Invocation { delivery, message } = invocation;

        let parsed = message.map_err(HandlerError::from).and_then(|message| {
            if message.source_type != SourceType::Relational {
                return Err(HandlerError::MalformedEvent(format!(
                    "{} payload on the cluster queue",
                    message.source_type
                )));
            }
            ClusterCreated::from_attributes(message.source_attributes)
        });
        let cluster = match (parsed, &delivery) {
            (Ok(cluster), _) => cluster,
            (Err(e), Some(d)) => return self.handle_poison(d, &e.to_string(), report).await,
            (Err(e), None) => return Err(e),
        };

        let onboarded = match timeout(self.record_timeout, self.onboard(&cluster)).await {
            Ok(result) => result,
            Err(_) => Err(HandlerError::Timeout(self.record_timeout.as_secs())),
        };
        let (connection, crawlers) = match (onboarded, &delivery) {
            (Ok(created), _) => created,
            // A name clash will clash again on every redelivery.
            (Err(HandlerError::External(ExternalError::Rejected(reason))), Some(d)) => {
                return self.handle_poison(d, &reason, report).await;
            }
            (Err(e), _) => return Err(e),
        };

        info!(
            cluster = %cluster.cluster_identifier,
            %connection,
            crawlers = crawlers.len(),
            "Cluster onboarded"
        );
        report.connections.push(connection);
        report.crawlers.extend(crawlers);

        if let Some(d) = &delivery {
            self.consumer.ack(&d.receipt_handle).await?;
            debug!(message_id = %d.message_id, "Message deleted");
        }
        Ok(())
    }

    async fn onboard(&self, cluster: &ClusterCreated) -> Result<(String, Vec<String>), HandlerError> {
        let connection = ConnectionDefinition::for_cluster(cluster, self.cluster.enforce_ssl);
        let connection_name = self.registrar.create_connection(&connection).await?;

        let schemas = self.discovery.schemas(&connection).await?;
        let mut crawlers = Vec::new();
        for schema in &schemas {
            if self.cluster.excluded_schemas.contains(schema) {
                debug!(cluster = %cluster.cluster_identifier, %schema, "Schema excluded");
                continue;
            }
            let crawler =
                CrawlerDefinition::for_schema(&connection, schema, &self.role_arn, &self.database_name);
            crawlers.push(self.registrar.create_crawler(&crawler).await?);
        }
        if crawlers.is_empty() {
            warn!(cluster = %cluster.cluster_identifier, "No schemas left to crawl");
        }
        Ok((connection_name, crawlers))
    }

    async fn handle_poison(
        &self,
        delivery: &Delivery,
        reason: &str,
        report: &mut ClusterReport,
    ) -> Result<(), HandlerError> {
        match self.poison.handle(delivery, reason).await? {
            PoisonOutcome::Deferred => report.deferred += 1,
            PoisonOutcome::Quarantined => report.quarantined += 1,
        }
        Ok(())
    }
}
