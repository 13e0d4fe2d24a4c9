//! Onboarding stages and the transitions allowed between them.
//!
//! A record only ever moves forward: `Discovered` → `Catalogued` →
//! `JobProvisioned`. Every mutation goes through [`Stage::apply`], which
//! consults [`ALLOWED_TRANSITIONS`], so a flag can never be reverted and the
//! job stage can never be reached without a catalog entry.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Where a source was registered in the metadata catalog.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CatalogRef {
    pub database_name: String,
    pub table_name: String,
}

impl CatalogRef {
    pub fn new(database_name: impl Into<String>, table_name: impl Into<String>) -> Self {
        Self {
            database_name: database_name.into(),
            table_name: table_name.into(),
        }
    }
}

impl fmt::Display for CatalogRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.database_name, self.table_name)
    }
}

/// Current onboarding stage of a tracked source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stage {
    Discovered,
    Catalogued {
        catalog: CatalogRef,
    },
    JobProvisioned {
        catalog: CatalogRef,
        job_name: String,
    },
}

/// Payload-free discriminant of [`Stage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    Discovered,
    Catalogued,
    JobProvisioned,
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageKind::Discovered => write!(f, "discovered"),
            StageKind::Catalogued => write!(f, "catalogued"),
            StageKind::JobProvisioned => write!(f, "job_provisioned"),
        }
    }
}

/// The complete set of legal `(from, to)` stage moves.
pub const ALLOWED_TRANSITIONS: &[(StageKind, StageKind)] = &[
    (StageKind::Discovered, StageKind::Catalogued),
    (StageKind::Catalogued, StageKind::JobProvisioned),
];

impl StageKind {
    pub fn can_advance_to(self, next: StageKind) -> bool {
        ALLOWED_TRANSITIONS.contains(&(self, next))
    }
}

/// A requested stage move, carrying the data the target stage needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Catalogue(CatalogRef),
    ProvisionJob { job_name: String },
}

impl Transition {
    pub fn target(&self) -> StageKind {
        match self {
            Transition::Catalogue(_) => StageKind::Catalogued,
            Transition::ProvisionJob { .. } => StageKind::JobProvisioned,
        }
    }
}

impl Stage {
    pub fn kind(&self) -> StageKind {
        match self {
            Stage::Discovered => StageKind::Discovered,
            Stage::Catalogued { .. } => StageKind::Catalogued,
            Stage::JobProvisioned { .. } => StageKind::JobProvisioned,
        }
    }

    pub fn catalog(&self) -> Option<&CatalogRef> {
        match self {
            Stage::Discovered => None,
            Stage::Catalogued { catalog } | Stage::JobProvisioned { catalog, .. } => Some(catalog),
        }
    }

    pub fn job_name(&self) -> Option<&str> {
        match self {
            Stage::JobProvisioned { job_name, .. } => Some(job_name),
            _ => None,
        }
    }

    pub fn catalog_entry_created(&self) -> bool {
        self.catalog().is_some()
    }

    pub fn job_created(&self) -> bool {
        matches!(self, Stage::JobProvisioned { .. })
    }

    /// Compute the stage that results from `transition`.
    ///
    /// Fails with [`CoreError::IllegalTransition`] for anything outside
    /// [`ALLOWED_TRANSITIONS`], including re-applying the current stage.
    pub fn apply(&self, transition: Transition) -> Result<Stage, CoreError> {
        let from = self.kind();
        let to = transition.target();
        if !from.can_advance_to(to) {
            return Err(CoreError::IllegalTransition { from, to });
        }

        match (self, transition) {
            (Stage::Discovered, Transition::Catalogue(catalog)) => Ok(Stage::Catalogued { catalog }),
            (Stage::Catalogued { catalog }, Transition::ProvisionJob { job_name }) => {
                Ok(Stage::JobProvisioned {
                    catalog: catalog.clone(),
                    job_name,
                })
            }
            _ => Err(CoreError::IllegalTransition { from, to }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> CatalogRef {
        CatalogRef::new("db", "db_b1")
    }

    #[test]
    fn test_forward_transitions() {
        let catalogued = Stage::Discovered
            .apply(Transition::Catalogue(catalog()))
            .unwrap();
        assert!(catalogued.catalog_entry_created());
        assert!(!catalogued.job_created());

        let provisioned = catalogued
            .apply(Transition::ProvisionJob {
                job_name: "job-1".into(),
            })
            .unwrap();
        assert!(provisioned.catalog_entry_created());
        assert!(provisioned.job_created());
        assert_eq!(provisioned.catalog(), Some(&catalog()));
        assert_eq!(provisioned.job_name(), Some("job-1"));
    }

    #[test]
    fn test_job_requires_catalog() {
        let err = Stage::Discovered
            .apply(Transition::ProvisionJob {
                job_name: "job-1".into(),
            })
            .unwrap_err();
        assert!(matches!(
            err,
            CoreError::IllegalTransition {
                from: StageKind::Discovered,
                to: StageKind::JobProvisioned
            }
        ));
    }

    #[test]
    fn test_no_repeat_or_backwards_moves() {
        let catalogued = Stage::Catalogued { catalog: catalog() };
        assert!(catalogued.apply(Transition::Catalogue(catalog())).is_err());

        let provisioned = Stage::JobProvisioned {
            catalog: catalog(),
            job_name: "job-1".into(),
        };
        assert!(provisioned.apply(Transition::Catalogue(catalog())).is_err());
        assert!(provisioned
            .apply(Transition::ProvisionJob {
                job_name: "job-2".into()
            })
            .is_err());
    }

    #[test]
    fn test_transition_table() {
        assert!(StageKind::Discovered.can_advance_to(StageKind::Catalogued));
        assert!(StageKind::Catalogued.can_advance_to(StageKind::JobProvisioned));
        assert!(!StageKind::Catalogued.can_advance_to(StageKind::Discovered));
        assert!(!StageKind::JobProvisioned.can_advance_to(StageKind::Catalogued));
        assert!(!StageKind::Discovered.can_advance_to(StageKind::JobProvisioned));
    }

    #[test]
    fn test_stage_kind_display() {
        assert_eq!(StageKind::JobProvisioned.to_string(), "job_provisioned");
        assert_eq!(catalog().to_string(), "db.db_b1");
    }
}
