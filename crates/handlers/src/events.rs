//! Provider "resource created" notifications.
//!
//! Envelope shape: `{ "source": "aws.s3", "detail": { "eventName": ..., ... } }`.

use serde_json::Value;
use tracing::error;

use sourcetrack_core::SourceAttributes;

use crate::error::HandlerError;

fn malformed(reason: impl Into<String>) -> HandlerError {
    let reason = reason.into();
    error!(%reason, "Malformed event");
    HandlerError::MalformedEvent(reason)
}

/// A present, non-empty field.
fn field<'a>(value: &'a Value, key: &str) -> Result<&'a Value, HandlerError> {
    match value.get(key) {
        None | Some(Value::Null) => Err(malformed(format!("missing '{key}' field"))),
        Some(Value::String(s)) if s.is_empty() => Err(malformed(format!("empty '{key}' field"))),
        Some(Value::Object(m)) if m.is_empty() => Err(malformed(format!("empty '{key}' field"))),
        Some(v) => Ok(v),
    }
}

fn str_field<'a>(value: &'a Value, key: &str) -> Result<&'a str, HandlerError> {
    field(value, key)?
        .as_str()
        .ok_or_else(|| malformed(format!("'{key}' is not a string")))
}

fn object_field(value: &Value, key: &str) -> Result<SourceAttributes, HandlerError> {
    field(value, key)?
        .as_object()
        .cloned()
        .ok_or_else(|| malformed(format!("'{key}' is not an object")))
}

fn expect_value(value: &Value, key: &str, expected: &str) -> Result<(), HandlerError> {
    let found = str_field(value, key)?;
    if found != expected {
        return Err(malformed(format!(
            "unexpected '{key}': expected '{expected}', found '{found}'"
        )));
    }
    Ok(())
}

/// Validate source and event name, returning the `detail` block.
fn detail<'a>(event: &'a Value, source: &str, event_name: &str) -> Result<&'a Value, HandlerError> {
    expect_value(event, "source", source)?;
    let detail = field(event, "detail")?;
    expect_value(detail, "eventName", event_name)?;
    Ok(detail)
}

/// An object-store bucket was created.
#[derive(Debug, Clone, PartialEq)]
pub struct BucketCreated {
    pub bucket_name: String,
    /// The request parameters, kept verbatim as the source attributes.
    pub attributes: SourceAttributes,
}

impl BucketCreated {
    pub fn from_event(event: &Value) -> Result<Self, HandlerError> {
        let detail = detail(event, "aws.s3", "CreateBucket")?;
        let attributes = object_field(detail, "requestParameters")?;
        let bucket_name = str_field(&detail["requestParameters"], "bucketName")?.to_string();
        Ok(Self {
            bucket_name,
            attributes,
        })
    }
}

/// A key-value table was created.
#[derive(Debug, Clone, PartialEq)]
pub struct TableCreated {
    pub table_name: String,
    /// The response elements (including `tableDescription`).
    pub attributes: SourceAttributes,
}

impl TableCreated {
    pub fn from_event(event: &Value) -> Result<Self, HandlerError> {
        let detail = detail(event, "aws.dynamodb", "CreateTable")?;
        let attributes = object_field(detail, "responseElements")?;
        let description = field(&detail["responseElements"], "tableDescription")?;
        let table_name = str_field(description, "tableName")?.to_string();
        Ok(Self {
            table_name,
            attributes,
        })
    }
}

/// A table was registered in the metadata catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogTableCreated {
    pub database_name: String,
    pub table_name: String,
    /// `tableInput.parameters`, empty when the table declares none.
    pub parameters: SourceAttributes,
}

impl CatalogTableCreated {
    pub fn from_event(event: &Value) -> Result<Self, HandlerError> {
        let detail = detail(event, "aws.glue", "CreateTable")?;
        let params = field(detail, "requestParameters")?;
        let database_name = str_field(params, "databaseName")?.to_string();
        let table_input = field(params, "tableInput")?;
        let table_name = str_field(table_input, "name")?.to_string();
        let parameters = table_input
            .get("parameters")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        Ok(Self {
            database_name,
            table_name,
            parameters,
        })
    }
}

/// A relational database cluster was created.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterCreated {
    pub cluster_identifier: String,
    pub cluster_arn: String,
    pub endpoint: String,
    pub engine: String,
    pub port: u16,
    pub subnet_group: String,
    /// Initial database, when the cluster was created with one.
    pub database_name: Option<String>,
    /// The response elements, kept verbatim as the source attributes.
    pub attributes: SourceAttributes,
}

impl ClusterCreated {
    pub fn from_event(event: &Value) -> Result<Self, HandlerError> {
        let detail = detail(event, "aws.rds", "CreateDBCluster")?;
        Self::from_attributes(object_field(detail, "responseElements")?)
    }

    /// Parse the response elements as carried on the handoff queue.
    pub fn from_attributes(attributes: SourceAttributes) -> Result<Self, HandlerError> {
        let elements = Value::Object(attributes.clone());
        let port = match field(&elements, "port")? {
            Value::Number(n) => n.as_u64().and_then(|p| u16::try_from(p).ok()),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
        .ok_or_else(|| malformed("'port' is not a valid port number"))?;

        Ok(Self {
            cluster_identifier: str_field(&elements, "dBClusterIdentifier")?.to_string(),
            cluster_arn: str_field(&elements, "dBClusterArn")?.to_string(),
            endpoint: str_field(&elements, "endpoint")?.to_string(),
            engine: str_field(&elements, "engine")?.to_string(),
            port,
            subnet_group: str_field(&elements, "dBSubnetGroup")?.to_string(),
            database_name: elements
                .get("databaseName")
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
            attributes,
        })
    }
}
