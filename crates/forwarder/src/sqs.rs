//! SQS-backed change-log source.

use async_trait::async_trait;
use aws_sdk_sqs::types::MessageSystemAttributeName;
use aws_sdk_sqs::Client;
use chrono::{TimeZone, Utc};
use tracing::{debug, info};

use vigil_core::config::{AwsConfig, QueueConfig};
use vigil_core::{Result, VigilError};

use crate::aws::sdk_config;
use crate::source::{ChangeLogSource, QueueMessage};

/// Long-polls one SQS queue carrying JSON change-log batches.
pub struct SqsChangeSource {
    client: Client,
    queue_url: String,
    visibility_timeout_secs: i32,
}

impl SqsChangeSource {
    pub async fn new(aws: &AwsConfig, queue: &QueueConfig) -> Result<Self> {
        let queue_url = queue
            .queue_url
            .clone()
            .ok_or_else(|| VigilError::Config("CHANGELOG_QUEUE_URL is not set".into()))?;

        let client = Client::new(&sdk_config(aws).await);

        info!(queue_url = %queue_url, region = %aws.region, "SQS change-log source initialized");

        Ok(Self {
            client,
            queue_url,
            visibility_timeout_secs: queue.visibility_timeout_secs as i32,
        })
    }
}

#[async_trait]
impl ChangeLogSource for SqsChangeSource {
    async fn poll_batch(&self, max_messages: u32) -> Result<Vec<QueueMessage>> {
        // SQS caps at 10 messages per request.
        let capped = max_messages.clamp(1, 10) as i32;

        let resp = self
            .client
            .receive_message()
            .queue_url(&self.queue_url)
            .max_number_of_messages(capped)
            .wait_time_seconds(20)
            .visibility_timeout(self.visibility_timeout_secs)
            .message_system_attribute_names(MessageSystemAttributeName::All)
            .send()
            .await
            .map_err(|e| VigilError::Queue(format!("SQS receive failed: {e:?}")))?;

        let sqs_messages = resp.messages.unwrap_or_default();
        debug!(count = sqs_messages.len(), "Received SQS messages");

        let mut messages = Vec::with_capacity(sqs_messages.len());
        for msg in sqs_messages {
            let receipt_handle = msg
                .receipt_handle()
                .ok_or_else(|| VigilError::Validation("SQS message without receipt handle".into()))?
                .to_string();

            let attribute = |name: MessageSystemAttributeName| {
                msg.attributes().and_then(|attrs| attrs.get(&name)).cloned()
            };

            let sent_at = attribute(MessageSystemAttributeName::SentTimestamp)
                .and_then(|ts| ts.parse::<i64>().ok())
                .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
                .unwrap_or_else(Utc::now);

            let attempt_count = attribute(MessageSystemAttributeName::ApproximateReceiveCount)
                .and_then(|c| c.parse::<u32>().ok())
                .unwrap_or(1);

            messages.push(QueueMessage {
                id: msg.message_id().unwrap_or("unknown").to_string(),
                body: msg.body().unwrap_or("").to_string(),
                receipt_handle,
                sent_at,
                attempt_count,
            });
        }

        Ok(messages)
    }

    async fn ack(&self, receipt_handle: &str) -> Result<()> {
        self.client
            .delete_message()
            .queue_url(&self.queue_url)
            .receipt_handle(receipt_handle)
            .send()
            .await
            .map_err(|e| VigilError::Queue(format!("SQS delete failed: {e:?}")))?;
        Ok(())
    }

    async fn nack(&self, receipt_handle: &str) -> Result<()> {
        debug!(receipt_handle, "Nacking SQS message (visibility=0)");

        self.client
            .change_message_visibility()
            .queue_url(&self.queue_url)
            .receipt_handle(receipt_handle)
            .visibility_timeout(0)
            .send()
            .await
            .map_err(|e| VigilError::Queue(format!("SQS visibility change failed: {e:?}")))?;
        Ok(())
    }
}
