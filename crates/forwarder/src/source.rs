//! Durable change-log batches awaiting forwarding.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::warn;

use vigil_core::{ChangeLogRecord, Result, VigilError};

/// A raw message received from the change-log queue.
#[derive(Debug, Clone)]
pub struct QueueMessage {
    pub id: String,
    /// JSON body carrying one batch of change-log records.
    pub body: String,
    /// Handle for ack/nack.
    pub receipt_handle: String,
    pub sent_at: DateTime<Utc>,
    /// Number of times this message has been received, starting at 1.
    pub attempt_count: u32,
}

/// At-least-once source of change-log batches.
#[async_trait]
pub trait ChangeLogSource: Send + Sync {
    /// Poll up to `max_messages`. May block for the provider's long-poll window.
    async fn poll_batch(&self, max_messages: u32) -> Result<Vec<QueueMessage>>;

    /// Remove a fully forwarded message.
    async fn ack(&self, receipt_handle: &str) -> Result<()>;

    /// Make a message visible again for redelivery.
    async fn nack(&self, receipt_handle: &str) -> Result<()>;
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Body {
    Batch(Vec<ChangeLogRecord>),
    Wrapped { records: Vec<ChangeLogRecord> },
    Single(Box<ChangeLogRecord>),
}

/// Parse a message body: a JSON array of records, an object with a `records`
/// array, or a single record.
pub fn parse_message(msg: &QueueMessage) -> Result<Vec<ChangeLogRecord>> {
    let body: Body = serde_json::from_str(&msg.body).map_err(|e| {
        VigilError::Validation(format!("invalid change-log batch in message {}: {e}", msg.id))
    })?;
    Ok(match body {
        Body::Batch(records) | Body::Wrapped { records } => records,
        Body::Single(record) => vec![*record],
    })
}

/// Parse many messages, keeping the good ones and collecting failures.
pub fn parse_batch(
    messages: Vec<QueueMessage>,
) -> (Vec<(QueueMessage, Vec<ChangeLogRecord>)>, Vec<(QueueMessage, VigilError)>) {
    let mut parsed = Vec::with_capacity(messages.len());
    let mut errors = Vec::new();

    for msg in messages {
        match parse_message(&msg) {
            Ok(records) => parsed.push((msg, records)),
            Err(e) => {
                warn!(message_id = %msg.id, error = %e, "Failed to parse change-log message");
                errors.push((msg, e));
            }
        }
    }

    (parsed, errors)
}
