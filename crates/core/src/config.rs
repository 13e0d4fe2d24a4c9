use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
pub fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

/// A value the handler cannot start without.
pub fn require(profile: &str, key: &str) -> Result<String, ConfigError> {
    profiled_env_opt(profile, key).ok_or_else(|| ConfigError::Missing(key.to_string()))
}

fn profiled_env_parse<T>(profile: &str, key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match profiled_env_opt(profile, key) {
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
            key: key.to_string(),
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}

fn profiled_env_list(profile: &str, key: &str) -> Vec<String> {
    profiled_env_opt(profile, key)
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

// ── AWS ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AwsConfig {
    pub region: String,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub session_token: Option<String>,
    pub endpoint_url: Option<String>,
}

impl AwsConfig {
    pub fn from_env_profiled(p: &str) -> Self {
        Self {
            region: profiled_env_or(p, "AWS_REGION", "us-east-1"),
            access_key_id: profiled_env_opt(p, "AWS_ACCESS_KEY_ID"),
            secret_access_key: profiled_env_opt(p, "AWS_SECRET_ACCESS_KEY"),
            session_token: profiled_env_opt(p, "AWS_SESSION_TOKEN"),
            endpoint_url: profiled_env_opt(p, "AWS_ENDPOINT_URL"),
        }
    }
}

// ── Tracker / report stores ───────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerConfig {
    pub tracker_dir: PathBuf,
}

impl TrackerConfig {
    pub fn from_env_profiled(p: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            tracker_dir: PathBuf::from(require(p, "TRACKER_DIR")?),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    pub report_dir: PathBuf,
}

impl ReportConfig {
    pub fn from_env_profiled(p: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            report_dir: PathBuf::from(require(p, "REPORT_DIR")?),
        })
    }
}

// ── Handoff queues ────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    pub tracking_queue_url: String,
    pub custom_entity_queue_url: Option<String>,
    /// Carries created relational clusters to connection provisioning.
    pub cluster_queue_url: Option<String>,
    pub quarantine_queue_url: Option<String>,
    /// Receive count at which an unparseable message is quarantined.
    pub max_receive_count: u32,
    pub visibility_timeout_secs: u32,
    pub wait_time_secs: u32,
}

impl QueueConfig {
    pub fn from_env_profiled(p: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            tracking_queue_url: require(p, "TRACKING_QUEUE_URL")?,
            custom_entity_queue_url: profiled_env_opt(p, "CUSTOM_ENTITY_QUEUE_URL"),
            cluster_queue_url: profiled_env_opt(p, "CLUSTER_QUEUE_URL"),
            quarantine_queue_url: profiled_env_opt(p, "QUARANTINE_QUEUE_URL"),
            max_receive_count: profiled_env_parse(p, "MAX_RECEIVE_COUNT", 5)?,
            visibility_timeout_secs: profiled_env_parse(p, "QUEUE_VISIBILITY_TIMEOUT_SECS", 30)?,
            wait_time_secs: profiled_env_parse(p, "QUEUE_WAIT_TIME_SECS", 20)?,
        })
    }

    /// The bucket-ingestion path cannot run without the custom-entity queue.
    pub fn require_custom_entity_queue(&self) -> Result<&str, ConfigError> {
        self.custom_entity_queue_url
            .as_deref()
            .ok_or_else(|| ConfigError::Missing("CUSTOM_ENTITY_QUEUE_URL".into()))
    }

    pub fn require_cluster_queue(&self) -> Result<&str, ConfigError> {
        self.cluster_queue_url
            .as_deref()
            .ok_or_else(|| ConfigError::Missing("CLUSTER_QUEUE_URL".into()))
    }
}

// ── Ingestion ─────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Key-value tables that are never onboarded.
    pub exception_tables: Vec<String>,
}

impl IngestConfig {
    pub fn from_env_profiled(p: &str) -> Self {
        Self {
            exception_tables: profiled_env_list(p, "EXCEPTION_TABLE_NAMES"),
        }
    }
}

// ── Catalog stage ─────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    pub catalog_dir: PathBuf,
    pub database_name: String,
    pub role_arn: String,
}

impl CatalogConfig {
    pub fn from_env_profiled(p: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            catalog_dir: PathBuf::from(require(p, "CATALOG_DIR")?),
            database_name: require(p, "CATALOG_DB_NAME")?,
            role_arn: require(p, "CATALOG_ROLE_ARN")?,
        })
    }
}

// ── Relational clusters ───────────────────────────────────────

/// Schemas no crawler is ever created for.
pub const DEFAULT_EXCLUDED_SCHEMAS: [&str; 2] = ["pg_catalog", "information_schema"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Built-in exclusions plus `CRAWLER_SCHEMAS_EXCEPTION`.
    pub excluded_schemas: Vec<String>,
    pub enforce_ssl: bool,
}

impl ClusterConfig {
    pub fn from_env_profiled(p: &str) -> Result<Self, ConfigError> {
        let mut excluded_schemas: Vec<String> =
            DEFAULT_EXCLUDED_SCHEMAS.iter().map(|s| s.to_string()).collect();
        for schema in profiled_env_list(p, "CRAWLER_SCHEMAS_EXCEPTION") {
            if !excluded_schemas.contains(&schema) {
                excluded_schemas.push(schema);
            }
        }
        Ok(Self {
            excluded_schemas,
            enforce_ssl: profiled_env_parse(p, "CONNECTION_SSL", false)?,
        })
    }
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            excluded_schemas: DEFAULT_EXCLUDED_SCHEMAS.iter().map(|s| s.to_string()).collect(),
            enforce_ssl: false,
        }
    }
}

// ── Job stage ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    pub script_bucket: String,
    pub assets_bucket: String,
    pub output_table: String,
}

impl JobConfig {
    pub fn from_env_profiled(p: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            script_bucket: require(p, "JOB_SCRIPT_BUCKET")?,
            assets_bucket: require(p, "JOB_ASSETS_BUCKET")?,
            output_table: require(p, "PII_OUTPUT_TABLE_NAME")?,
        })
    }
}

// ── Stage runs ────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageConfig {
    pub record_timeout_secs: u64,
}

impl StageConfig {
    pub fn from_env_profiled(p: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            record_timeout_secs: profiled_env_parse(p, "RECORD_TIMEOUT_SECS", 60)?,
        })
    }

    pub fn record_timeout(&self) -> Duration {
        Duration::from_secs(self.record_timeout_secs)
    }
}

impl Default for StageConfig {
    fn default() -> Self {
        Self {
            record_timeout_secs: 60,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Env-based tests must run serially to avoid interfering with each other.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn clear(keys: &[&str]) {
        for k in keys {
            env::remove_var(k);
        }
    }

    #[test]
    fn test_missing_required_value() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear(&["CATALOG_DIR", "CATALOG_DB_NAME", "CATALOG_ROLE_ARN"]);
        env::set_var("CATALOG_DIR", "/tmp/catalog");

        let err = CatalogConfig::from_env_profiled("").unwrap_err();
        assert!(matches!(err, ConfigError::Missing(ref k) if k == "CATALOG_DB_NAME"));

        clear(&["CATALOG_DIR"]);
    }

    #[test]
    fn test_profile_prefix_wins() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear(&["TRACKING_QUEUE_URL", "STAGING_TRACKING_QUEUE_URL", "MAX_RECEIVE_COUNT"]);
        env::set_var("TRACKING_QUEUE_URL", "https://sqs/base");
        env::set_var("STAGING_TRACKING_QUEUE_URL", "https://sqs/staging");

        let cfg = QueueConfig::from_env_profiled("STAGING").unwrap();
        assert_eq!(cfg.tracking_queue_url, "https://sqs/staging");
        assert_eq!(cfg.max_receive_count, 5);
        assert!(cfg.require_custom_entity_queue().is_err());

        let base = QueueConfig::from_env_profiled("").unwrap();
        assert_eq!(base.tracking_queue_url, "https://sqs/base");

        clear(&["TRACKING_QUEUE_URL", "STAGING_TRACKING_QUEUE_URL"]);
    }

    #[test]
    fn test_invalid_number() {
        let _lock = ENV_LOCK.lock().unwrap();
        env::set_var("RECORD_TIMEOUT_SECS", "soon");
        let err = StageConfig::from_env_profiled("").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
        clear(&["RECORD_TIMEOUT_SECS"]);
    }

    #[test]
    fn test_exception_list() {
        let _lock = ENV_LOCK.lock().unwrap();
        env::set_var("EXCEPTION_TABLE_NAMES", "audit, sessions,,");
        let cfg = IngestConfig::from_env_profiled("");
        assert_eq!(cfg.exception_tables, vec!["audit", "sessions"]);
        clear(&["EXCEPTION_TABLE_NAMES"]);
    }

    #[test]
    fn test_cluster_exclusions_extend_defaults() {
        let _lock = ENV_LOCK.lock().unwrap();
        env::set_var("CRAWLER_SCHEMAS_EXCEPTION", "audit,pg_catalog");
        env::set_var("CONNECTION_SSL", "true");
        let cfg = ClusterConfig::from_env_profiled("").unwrap();
        assert_eq!(cfg.excluded_schemas, vec!["pg_catalog", "information_schema", "audit"]);
        assert!(cfg.enforce_ssl);
        clear(&["CRAWLER_SCHEMAS_EXCEPTION", "CONNECTION_SSL"]);
    }
}
