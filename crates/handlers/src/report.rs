//! Tag-compliance reporting over catalogued records.
//!
//! Read-only with respect to the tracker: rows go to the report store and
//! nothing is written back.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{error, info, warn};

use sourcetrack_core::{Predicate, RecordId, SourceType, TagComplianceRow, TrackerRecord};
use sourcetrack_tracker::{ReportStore, TrackerStore};

use crate::error::HandlerError;
use crate::external::TagSource;

#[derive(Debug, Clone, Default, Serialize)]
pub struct ReportSummary {
    pub written: usize,
    /// Records with no resource key or no required tags.
    pub skipped: usize,
    pub failed: Vec<(RecordId, String)>,
}

pub struct TagComplianceReporter {
    store: Arc<dyn TrackerStore>,
    tags: Arc<dyn TagSource>,
    reports: Arc<dyn ReportStore>,
}

enum RowOutcome {
    Written,
    Skipped,
}

impl TagComplianceReporter {
    pub fn new(
        store: Arc<dyn TrackerStore>,
        tags: Arc<dyn TagSource>,
        reports: Arc<dyn ReportStore>,
    ) -> Self {
        Self {
            store,
            tags,
            reports,
        }
    }

    pub async fn run(&self, source_type: SourceType) -> Result<ReportSummary, HandlerError> {
        let records = self.store.scan(&Predicate::catalogued(source_type)).await?;
        info!(%source_type, matched = records.len(), "Tag report scan");

        let mut summary = ReportSummary::default();
        for record in &records {
            match self.report(record).await {
                Ok(RowOutcome::Written) => summary.written += 1,
                Ok(RowOutcome::Skipped) => summary.skipped += 1,
                Err(e) => {
                    error!(record_id = %record.id(), error = %e, "Tag report failed for record");
                    summary.failed.push((record.id(), e.to_string()));
                }
            }
        }

        info!(
            written = summary.written,
            skipped = summary.skipped,
            failed = summary.failed.len(),
            "Tag report finished"
        );
        Ok(summary)
    }

    async fn report(&self, record: &TrackerRecord) -> Result<RowOutcome, HandlerError> {
        let Some(catalog) = record.stage().catalog() else {
            return Ok(RowOutcome::Skipped);
        };
        let Some(resource_key) = record.source_type().tag_resource_key(record.source_attributes())
        else {
            warn!(record_id = %record.id(), "Record has no resource key to look up tags");
            return Ok(RowOutcome::Skipped);
        };

        let tags = self
            .tags
            .tags(record.source_type(), resource_key)
            .await?
            .unwrap_or_default();

        let Some(row) = TagComplianceRow::capture(&catalog.table_name, &tags, Utc::now()) else {
            warn!(
                record_id = %record.id(),
                resource = resource_key,
                "None of the required compliance tags are present"
            );
            return Ok(RowOutcome::Skipped);
        };

        self.reports.append(&row).await?;
        info!(
            table = %row.catalog_table_name,
            tags = row.tags.len(),
            captured_at = %row.captured_at_display(),
            "Compliance row written"
        );
        Ok(RowOutcome::Written)
    }
}
