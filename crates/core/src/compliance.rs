//! Tag-compliance report rows.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Tag keys that make up a compliance row. Matched case-sensitively.
pub const REQUIRED_TAG_KEYS: [&str; 6] = [
    "APP_ID",
    "Purpose of Processing",
    "Data Subjects",
    "APP_NAME",
    "Business Function",
    "Processing Activity",
];

/// A provider-native resource tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub key: String,
    pub value: String,
}

impl Tag {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Keep only the required compliance keys.
pub fn select_compliance_tags(tags: &[Tag]) -> BTreeMap<String, String> {
    tags.iter()
        .filter(|t| REQUIRED_TAG_KEYS.contains(&t.key.as_str()))
        .map(|t| (t.key.clone(), t.value.clone()))
        .collect()
}

/// One captured snapshot of a source's compliance tags.
///
/// References its tracker record by catalog table name only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagComplianceRow {
    pub id: Uuid,
    pub catalog_table_name: String,
    pub tags: BTreeMap<String, String>,
    pub captured_at: DateTime<Utc>,
}

impl TagComplianceRow {
    /// Build a row from a resource's live tags.
    ///
    /// Returns `None` when none of the required keys are present.
    pub fn capture(
        catalog_table_name: impl Into<String>,
        tags: &[Tag],
        captured_at: DateTime<Utc>,
    ) -> Option<Self> {
        let selected = select_compliance_tags(tags);
        if selected.is_empty() {
            return None;
        }
        Some(Self {
            id: Uuid::new_v4(),
            catalog_table_name: catalog_table_name.into(),
            tags: selected,
            captured_at,
        })
    }

    pub fn captured_at_display(&self) -> String {
        self.captured_at.format("%Y-%m-%d %H:%M:%S").to_string()
    }
}
