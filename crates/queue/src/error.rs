//! Queue error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("connection error: {0}")]
    Connection(String),

    /// The message or invocation envelope does not have the expected shape.
    #[error("malformed message: {0}")]
    Malformed(String),

    #[error("acknowledge error: {0}")]
    Ack(String),

    #[error("publish error: {0}")]
    Publish(String),

    #[error("provider error: {0}")]
    Provider(String),
}
