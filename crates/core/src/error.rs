use thiserror::Error;

use crate::stage::StageKind;

/// Configuration could not be assembled from the environment.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing required configuration: {0}")]
    Missing(String),

    #[error("invalid value for {key}: {reason}")]
    Invalid { key: String, reason: String },
}

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("illegal stage transition: {from} -> {to}")]
    IllegalTransition { from: StageKind, to: StageKind },

    #[error("invalid tracker record: {0}")]
    InvalidRecord(String),

    #[error("invalid predicate: {0}")]
    InvalidPredicate(String),
}
