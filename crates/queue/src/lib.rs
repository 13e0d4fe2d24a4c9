pub mod consumer;
pub mod envelope;
pub mod error;
pub mod memory;
pub mod message;
pub mod redelivery;
pub mod sqs;

pub use consumer::{QueueConsumer, QueueHealth, QueueMessage, QueuePublisher};
pub use envelope::{Delivery, Invocation};
pub use error::QueueError;
pub use memory::MemoryQueue;
pub use message::{parse_message, DiscoveryMessage};
pub use redelivery::{PoisonAction, QuarantinedMessage, RedeliveryPolicy};
pub use sqs::SqsQueue;
