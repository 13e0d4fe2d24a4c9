//! AWS SQS handoff queue.

use async_trait::async_trait;
use aws_credential_types::Credentials;
use aws_sdk_sqs::config::BehaviorVersion;
use aws_sdk_sqs::types::{Message, MessageSystemAttributeName, QueueAttributeName};
use aws_sdk_sqs::Client;
use chrono::{TimeZone, Utc};
use tracing::{debug, info, warn};

use sourcetrack_core::config::AwsConfig;

use crate::consumer::{QueueConsumer, QueueHealth, QueueMessage, QueuePublisher};
use crate::error::QueueError;

/// SQS-backed queue bound to a single queue URL.
pub struct SqsQueue {
    client: Client,
    queue_url: String,
    quarantine_url: Option<String>,
    visibility_timeout_secs: i32,
    wait_time_secs: i32,
}

fn build_client(aws: &AwsConfig) -> Client {
    let region = aws_sdk_sqs::config::Region::new(aws.region.clone());

    // Build the SQS config directly rather than through aws_config::defaults():
    // AWS_ENDPOINT_URL may point at another service in local setups.
    let mut sqs_config = aws_sdk_sqs::Config::builder()
        .region(region)
        .behavior_version(BehaviorVersion::latest());

    if let (Some(key_id), Some(secret)) = (&aws.access_key_id, &aws.secret_access_key) {
        let creds = Credentials::new(
            key_id,
            secret,
            aws.session_token.clone(),
            None,
            "sourcetrack-queue-static",
        );
        sqs_config = sqs_config.credentials_provider(creds);
    }

    if let Some(ref endpoint) = aws.endpoint_url {
        if !endpoint.is_empty() {
            let url = if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
                endpoint.clone()
            } else {
                format!("https://{endpoint}")
            };
            sqs_config = sqs_config.endpoint_url(&url);
        }
    }

    Client::from_conf(sqs_config.build())
}

/// Convert one received message; `None` (logged) when it cannot be acked.
fn to_queue_message(msg: &Message) -> Option<QueueMessage> {
    let (Some(id), Some(receipt_handle)) = (msg.message_id(), msg.receipt_handle()) else {
        warn!(
            message_id = ?msg.message_id(),
            has_receipt_handle = msg.receipt_handle().is_some(),
            "Skipping SQS message without id or receipt handle"
        );
        return None;
    };

    // SentTimestamp is epoch millis.
    let timestamp = msg
        .attributes()
        .and_then(|attrs| attrs.get(&MessageSystemAttributeName::SentTimestamp))
        .and_then(|ts| ts.parse::<i64>().ok())
        .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
        .unwrap_or_else(Utc::now);

    let attempt_count = msg
        .attributes()
        .and_then(|attrs| attrs.get(&MessageSystemAttributeName::ApproximateReceiveCount))
        .and_then(|c| c.parse::<u32>().ok())
        .unwrap_or(1);

    Some(QueueMessage {
        id: id.to_string(),
        body: msg.body().unwrap_or("").to_string(),
        receipt_handle: receipt_handle.to_string(),
        timestamp,
        attempt_count,
    })
}

impl SqsQueue {
    pub async fn new(aws: &AwsConfig, queue_url: &str) -> Result<Self, QueueError> {
        if queue_url.is_empty() {
            return Err(QueueError::Connection("queue URL is empty".into()));
        }

        let client = build_client(aws);

        info!(
            queue_url = %queue_url,
            region = %aws.region,
            "SQS queue initialized"
        );

        Ok(Self {
            client,
            queue_url: queue_url.to_string(),
            quarantine_url: None,
            visibility_timeout_secs: 30,
            wait_time_secs: 20,
        })
    }

    /// Report the depth of this quarantine queue from `quarantine_depth`.
    pub fn with_quarantine(mut self, url: impl Into<String>) -> Self {
        self.quarantine_url = Some(url.into());
        self
    }

    pub fn with_visibility_timeout(mut self, secs: u32) -> Self {
        self.visibility_timeout_secs = secs as i32;
        self
    }

    pub fn with_wait_time(mut self, secs: u32) -> Self {
        // SQS caps long polling at 20 seconds.
        self.wait_time_secs = secs.min(20) as i32;
        self
    }

    pub fn queue_url(&self) -> &str {
        &self.queue_url
    }

    async fn approximate_depth(&self, url: &str) -> Result<Option<u64>, QueueError> {
        let resp = self
            .client
            .get_queue_attributes()
            .queue_url(url)
            .attribute_names(QueueAttributeName::ApproximateNumberOfMessages)
            .send()
            .await
            .map_err(|e| QueueError::Connection(format!("SQS attribute fetch failed: {e:?}")))?;

        Ok(resp
            .attributes()
            .and_then(|attrs| attrs.get(&QueueAttributeName::ApproximateNumberOfMessages))
            .and_then(|v| v.parse::<u64>().ok()))
    }
}

#[async_trait]
impl QueueConsumer for SqsQueue {
    async fn poll_batch(&self, max_messages: u32) -> Result<Vec<QueueMessage>, QueueError> {
        // SQS caps at 10 messages per request.
        let capped = max_messages.clamp(1, 10) as i32;

        debug!(max_messages = capped, "Polling SQS");

        let resp = self
            .client
            .receive_message()
            .queue_url(&self.queue_url)
            .max_number_of_messages(capped)
            .wait_time_seconds(self.wait_time_secs)
            .visibility_timeout(self.visibility_timeout_secs)
            .message_system_attribute_names(MessageSystemAttributeName::All)
            .send()
            .await
            .map_err(|e| QueueError::Connection(format!("SQS receive failed: {e:?}")))?;

        let sqs_messages = resp.messages.unwrap_or_default();
        debug!(count = sqs_messages.len(), "Received SQS messages");

        Ok(sqs_messages.iter().filter_map(to_queue_message).collect())
    }

    async fn ack(&self, receipt_handle: &str) -> Result<(), QueueError> {
        debug!(receipt_handle, "Deleting SQS message");

        self.client
            .delete_message()
            .queue_url(&self.queue_url)
            .receipt_handle(receipt_handle)
            .send()
            .await
            .map_err(|e| QueueError::Ack(format!("SQS delete failed: {e:?}")))?;

        Ok(())
    }

    async fn health_check(&self) -> Result<QueueHealth, QueueError> {
        let count = self.approximate_depth(&self.queue_url).await?;
        Ok(QueueHealth {
            connected: true,
            approximate_message_count: count,
            provider: "sqs".to_string(),
        })
    }

    async fn quarantine_depth(&self) -> Result<Option<u64>, QueueError> {
        match &self.quarantine_url {
            Some(url) => self.approximate_depth(url).await,
            None => Ok(None),
        }
    }
}

#[async_trait]
impl QueuePublisher for SqsQueue {
    async fn publish(&self, body: &str) -> Result<String, QueueError> {
        info!(queue_url = %self.queue_url, "Sending message");

        let resp = self
            .client
            .send_message()
            .queue_url(&self.queue_url)
            .message_body(body)
            .send()
            .await
            .map_err(|e| QueueError::Publish(format!("SQS send failed: {e:?}")))?;

        resp.message_id()
            .map(str::to_string)
            .ok_or_else(|| QueueError::Publish("SQS returned no message id".into()))
    }
}
