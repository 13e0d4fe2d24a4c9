use std::path::{Path, PathBuf};

use async_trait::async_trait;

use sourcetrack_core::TagComplianceRow;

use crate::error::TrackerError;
use crate::store::ReportStore;

use super::{publish_new, write_temp};

/// Filesystem-backed compliance report: `reports/{row-id}.json`.
pub struct FsReportStore {
    base_dir: PathBuf,
}

impl FsReportStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Result<Self, TrackerError> {
        let base_dir = base_dir.into();
        std::fs::create_dir_all(base_dir.join("reports"))?;
        Ok(Self { base_dir })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn reports_dir(&self) -> PathBuf {
        self.base_dir.join("reports")
    }
}

#[async_trait]
impl ReportStore for FsReportStore {
    async fn append(&self, row: &TagComplianceRow) -> Result<(), TrackerError> {
        let dir = self.reports_dir();
        let tmp = write_temp(&dir, row)?;
        if !publish_new(&tmp, &dir.join(format!("{}.json", row.id)))? {
            return Err(TrackerError::Unavailable(format!(
                "report row {} already exists",
                row.id
            )));
        }
        Ok(())
    }

    async fn list(&self) -> Result<Vec<TagComplianceRow>, TrackerError> {
        let mut rows = Vec::new();
        for entry in std::fs::read_dir(self.reports_dir())? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let json = std::fs::read_to_string(&path)?;
            rows.push(serde_json::from_str::<TagComplianceRow>(&json)?);
        }
        rows.sort_by_key(|r| r.captured_at);
        Ok(rows)
    }
}
