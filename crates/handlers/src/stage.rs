//! Stage advancement: scan for records short of a stage, provision, advance.
//!
//! Runs are best-effort batches. Each record is processed under its own
//! deadline; a failure leaves that record where it was for the next
//! scheduled run and never stops the rest of the batch. The advance is
//! conditional on the version read by the scan, so when two runs race on a
//! record the loser sees a conflict instead of writing twice.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::time::{error::Elapsed, timeout};
use tracing::{error, info, warn};

use sourcetrack_core::config::{CatalogConfig, StageConfig};
use sourcetrack_core::{CatalogRef, Predicate, RecordId, SourceType, StageKind, TrackerRecord, Transition};
use sourcetrack_tracker::TrackerStore;

use crate::definitions::{CrawlerDefinition, JobPlan, JobSettings, TableDefinition};
use crate::error::HandlerError;
use crate::external::{CatalogRegistrar, JobProvisioner};

#[derive(Debug, Clone, Serialize)]
pub struct StageReport {
    pub stage: StageKind,
    pub source_type: SourceType,
    pub matched: usize,
    pub advanced: Vec<RecordId>,
    /// Records another run advanced first.
    pub conflicts: Vec<RecordId>,
    pub failed: Vec<(RecordId, String)>,
}

impl StageReport {
    fn new(stage: StageKind, source_type: SourceType, matched: usize) -> Self {
        Self {
            stage,
            source_type,
            matched,
            advanced: Vec::new(),
            conflicts: Vec::new(),
            failed: Vec::new(),
        }
    }

    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }

    fn record(
        &mut self,
        id: RecordId,
        outcome: Result<Result<TrackerRecord, HandlerError>, Elapsed>,
        limit: Duration,
    ) {
        match outcome {
            Ok(Ok(updated)) => {
                info!(
                    record_id = %id,
                    stage = %updated.stage().kind(),
                    version = updated.version(),
                    "Record advanced"
                );
                self.advanced.push(id);
            }
            Ok(Err(e)) if e.is_conflict() => {
                warn!(record_id = %id, error = %e, "Record advanced by another run");
                self.conflicts.push(id);
            }
            Ok(Err(e)) => {
                error!(record_id = %id, error = %e, "Record failed, left for the next run");
                self.failed.push((id, e.to_string()));
            }
            Err(_) => {
                let e = HandlerError::Timeout(limit.as_secs());
                error!(record_id = %id, error = %e, "Record failed, left for the next run");
                self.failed.push((id, e.to_string()));
            }
        }
    }

    fn log_summary(&self) {
        info!(
            stage = %self.stage,
            source_type = %self.source_type,
            matched = self.matched,
            advanced = self.advanced.len(),
            conflicts = self.conflicts.len(),
            failed = self.failed.len(),
            "Stage run finished"
        );
    }
}

/// Registers catalog tables and crawlers.
pub struct CatalogStage {
    store: Arc<dyn TrackerStore>,
    registrar: Arc<dyn CatalogRegistrar>,
    database_name: String,
    role_arn: String,
    record_timeout: Duration,
}

impl CatalogStage {
    pub fn new(
        store: Arc<dyn TrackerStore>,
        registrar: Arc<dyn CatalogRegistrar>,
        catalog: &CatalogConfig,
        stage: &StageConfig,
    ) -> Self {
        Self {
            store,
            registrar,
            database_name: catalog.database_name.clone(),
            role_arn: catalog.role_arn.clone(),
            record_timeout: stage.record_timeout(),
        }
    }

    pub async fn run(&self, source_type: SourceType) -> Result<StageReport, HandlerError> {
        let predicate = Predicate::awaiting_catalog(source_type);
        let records = self.store.scan(&predicate).await?;
        info!(%predicate, matched = records.len(), "Catalog stage scan");

        let mut report = StageReport::new(StageKind::Catalogued, source_type, records.len());
        for record in &records {
            let outcome = timeout(self.record_timeout, self.catalogue(record)).await;
            report.record(record.id(), outcome, self.record_timeout);
        }
        report.log_summary();
        Ok(report)
    }

    async fn catalogue(&self, record: &TrackerRecord) -> Result<TrackerRecord, HandlerError> {
        let table = TableDefinition::for_record(record, &self.database_name)?;
        let table_name = self.registrar.register_table(&table).await?;
        self.registrar
            .create_crawler(&CrawlerDefinition::for_table(&table, &self.role_arn))
            .await?;

        let catalog = CatalogRef::new(&self.database_name, table_name);
        Ok(self
            .store
            .advance(record.id(), record.version(), Transition::Catalogue(catalog))
            .await?)
    }
}

/// Provisions scan jobs with their workflow and schedule.
pub struct JobStage {
    store: Arc<dyn TrackerStore>,
    provisioner: Arc<dyn JobProvisioner>,
    settings: JobSettings,
    record_timeout: Duration,
}

impl JobStage {
    pub fn new(
        store: Arc<dyn TrackerStore>,
        provisioner: Arc<dyn JobProvisioner>,
        settings: JobSettings,
        stage: &StageConfig,
    ) -> Self {
        Self {
            store,
            provisioner,
            settings,
            record_timeout: stage.record_timeout(),
        }
    }

    pub async fn run(&self, source_type: SourceType) -> Result<StageReport, HandlerError> {
        if !source_type.requires_scan_job() {
            info!(%source_type, "Source type is scanned externally, nothing to provision");
            return Ok(StageReport::new(StageKind::JobProvisioned, source_type, 0));
        }

        // Never matches a record whose catalog stage has not completed.
        let predicate = Predicate::awaiting_job(source_type);
        let records = self.store.scan(&predicate).await?;
        info!(%predicate, matched = records.len(), "Job stage scan");

        let mut report = StageReport::new(StageKind::JobProvisioned, source_type, records.len());
        for record in &records {
            let outcome = timeout(self.record_timeout, self.provision(record)).await;
            report.record(record.id(), outcome, self.record_timeout);
        }
        report.log_summary();
        Ok(report)
    }

    async fn provision(&self, record: &TrackerRecord) -> Result<TrackerRecord, HandlerError> {
        let plan = JobPlan::for_record(record, &self.settings)?;
        let job_name = self.provisioner.create_job(&plan.job).await?;
        self.provisioner.create_workflow(&plan.workflow).await?;
        self.provisioner.create_trigger(&plan.trigger).await?;

        Ok(self
            .store
            .advance(record.id(), record.version(), Transition::ProvisionJob { job_name })
            .await?)
    }
}
