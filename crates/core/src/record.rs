//! Tracker records: one per discovered data source.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::CoreError;
use crate::stage::{CatalogRef, Stage, StageKind, Transition};

/// Provider-native description of a source. Written once, never mutated.
pub type SourceAttributes = Map<String, Value>;

/// Namespace for deterministic record ids.
const RECORD_ID_NAMESPACE: Uuid = Uuid::from_u128(0x5f0e_7a41_3c2b_4d8e_9a61_0b7c_e2d4_f813);

/// Kind of data source being onboarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
pub enum SourceType {
    #[serde(rename = "s3", alias = "object-store")]
    ObjectStore,
    #[serde(rename = "dynamodb", alias = "key-value-table")]
    KeyValueTable,
    #[serde(rename = "rds", alias = "relational")]
    Relational,
}

impl SourceType {
    pub const ALL: [SourceType; 3] = [
        SourceType::ObjectStore,
        SourceType::KeyValueTable,
        SourceType::Relational,
    ];

    /// Wire value used in queue messages and stored rows.
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::ObjectStore => "s3",
            SourceType::KeyValueTable => "dynamodb",
            SourceType::Relational => "rds",
        }
    }

    /// Whether this source type gets an explicit scan job after cataloguing.
    pub fn requires_scan_job(&self) -> bool {
        matches!(self, SourceType::ObjectStore)
    }

    /// Stable identity of the physical source, used to derive its record id.
    pub fn identity_key<'a>(&self, attrs: &'a SourceAttributes) -> Option<&'a str> {
        match self {
            SourceType::ObjectStore => attr_str(attrs, &["bucketName"]),
            SourceType::KeyValueTable => attr_str(attrs, &["tableDescription", "tableArn"])
                .or_else(|| attr_str(attrs, &["tableDescription", "tableName"])),
            SourceType::Relational => attr_str(attrs, &["connectionName"]),
        }
    }

    /// Key used to look up the live resource's tags.
    pub fn tag_resource_key<'a>(&self, attrs: &'a SourceAttributes) -> Option<&'a str> {
        match self {
            SourceType::ObjectStore => attr_str(attrs, &["bucketName"]),
            SourceType::KeyValueTable => attr_str(attrs, &["tableDescription", "tableArn"]),
            SourceType::Relational => attr_str(attrs, &["connectionName"]),
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "s3" | "object-store" => Ok(SourceType::ObjectStore),
            "dynamodb" | "key-value-table" => Ok(SourceType::KeyValueTable),
            "rds" | "relational" => Ok(SourceType::Relational),
            other => Err(CoreError::InvalidRecord(format!("unknown source type '{other}'"))),
        }
    }
}

/// Walk a nested attribute path down to a string leaf.
pub fn attr_str<'a>(attrs: &'a SourceAttributes, path: &[&str]) -> Option<&'a str> {
    let (first, rest) = path.split_first()?;
    let mut current = attrs.get(*first)?;
    for key in rest {
        current = current.get(*key)?;
    }
    current.as_str().filter(|s| !s.is_empty())
}

/// Opaque record identifier.
///
/// Derived deterministically from the source type and identity so that a
/// redelivered discovery event maps onto the record it already created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(Uuid);

impl RecordId {
    pub fn derive(source_type: SourceType, identity: &str) -> Self {
        let name = format!("{}:{}", source_type.as_str(), identity);
        Self(Uuid::new_v5(&RECORD_ID_NAMESPACE, name.as_bytes()))
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for RecordId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| CoreError::InvalidRecord(format!("bad record id '{s}': {e}")))
    }
}

/// One discovered data source and how far its onboarding has progressed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "StoredRecord", into = "StoredRecord")]
pub struct TrackerRecord {
    id: RecordId,
    source_type: SourceType,
    stage: Stage,
    source_attributes: SourceAttributes,
    version: u64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TrackerRecord {
    /// A freshly discovered source with neither stage completed.
    pub fn discovered(
        source_type: SourceType,
        identity: &str,
        source_attributes: SourceAttributes,
    ) -> Self {
        Self::with_stage(source_type, identity, source_attributes, Stage::Discovered)
    }

    /// A source that registered itself in the catalog while being provisioned.
    pub fn catalogued(
        source_type: SourceType,
        identity: &str,
        source_attributes: SourceAttributes,
        catalog: CatalogRef,
    ) -> Self {
        Self::with_stage(
            source_type,
            identity,
            source_attributes,
            Stage::Catalogued { catalog },
        )
    }

    fn with_stage(
        source_type: SourceType,
        identity: &str,
        source_attributes: SourceAttributes,
        stage: Stage,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: RecordId::derive(source_type, identity),
            source_type,
            stage,
            source_attributes,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    /// The record after `transition`, with its version bumped.
    pub fn advanced(&self, transition: Transition, now: DateTime<Utc>) -> Result<Self, CoreError> {
        let stage = self.stage.apply(transition)?;
        Ok(Self {
            stage,
            version: self.version + 1,
            updated_at: now,
            ..self.clone()
        })
    }

    /// Deterministic token for the external call that moves this record to `target`.
    pub fn idempotency_token(&self, target: StageKind) -> String {
        format!("{}:{}", self.id, target)
    }

    pub fn id(&self) -> RecordId {
        self.id
    }

    pub fn source_type(&self) -> SourceType {
        self.source_type
    }

    pub fn stage(&self) -> &Stage {
        &self.stage
    }

    pub fn source_attributes(&self) -> &SourceAttributes {
        &self.source_attributes
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn catalog_entry_created(&self) -> bool {
        self.stage.catalog_entry_created()
    }

    pub fn job_created(&self) -> bool {
        self.stage.job_created()
    }

    /// Flat row form used by predicate scans.
    pub fn to_row(&self) -> Value {
        serde_json::to_value(StoredRecord::from(self.clone())).unwrap_or(Value::Null)
    }
}

fn initial_version() -> u64 {
    1
}

/// Persisted shape of a [`TrackerRecord`]: flat boolean and string fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredRecord {
    pub id: RecordId,
    pub source_type: SourceType,
    pub catalog_entry_created: bool,
    pub job_created: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalog_table_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalog_database_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_name: Option<String>,
    #[serde(default)]
    pub source_attributes: SourceAttributes,
    #[serde(default = "initial_version")]
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<TrackerRecord> for StoredRecord {
    fn from(record: TrackerRecord) -> Self {
        let catalog = record.stage.catalog().cloned();
        let job_name = record.stage.job_name().map(str::to_string);
        Self {
            id: record.id,
            source_type: record.source_type,
            catalog_entry_created: record.stage.catalog_entry_created(),
            job_created: record.stage.job_created(),
            catalog_table_name: catalog.as_ref().map(|c| c.table_name.clone()),
            catalog_database_name: catalog.map(|c| c.database_name),
            job_name,
            source_attributes: record.source_attributes,
            version: record.version,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

impl TryFrom<StoredRecord> for TrackerRecord {
    type Error = CoreError;

    fn try_from(row: StoredRecord) -> Result<Self, Self::Error> {
        let catalog = match (row.catalog_database_name, row.catalog_table_name) {
            (Some(database_name), Some(table_name)) => Some(CatalogRef {
                database_name,
                table_name,
            }),
            _ => None,
        };

        let stage = match (row.catalog_entry_created, row.job_created) {
            (false, false) => Stage::Discovered,
            (false, true) => {
                return Err(CoreError::InvalidRecord(format!(
                    "record {} has a job but no catalog entry",
                    row.id
                )))
            }
            (true, job_created) => {
                let catalog = catalog.ok_or_else(|| {
                    CoreError::InvalidRecord(format!(
                        "record {} is catalogued without catalog names",
                        row.id
                    ))
                })?;
                if job_created {
                    let job_name = row.job_name.ok_or_else(|| {
                        CoreError::InvalidRecord(format!("record {} has no job name", row.id))
                    })?;
                    Stage::JobProvisioned { catalog, job_name }
                } else {
                    Stage::Catalogued { catalog }
                }
            }
        };

        Ok(Self {
            id: row.id,
            source_type: row.source_type,
            stage,
            source_attributes: row.source_attributes,
            version: row.version,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}
