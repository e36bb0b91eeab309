//! Kinesis Firehose analytics sink.

use async_trait::async_trait;
use aws_sdk_firehose::primitives::Blob;
use aws_sdk_firehose::types::Record;
use aws_sdk_firehose::Client;
use tracing::{debug, info};

use vigil_core::config::AwsConfig;
use vigil_core::{Result, VigilError};

use crate::aws::sdk_config;
use crate::sender::{AnalyticsSink, RecordFailure, SinkLimits};

/// Ships change documents to one Firehose delivery stream via `PutRecordBatch`.
pub struct FirehoseSink {
    client: Client,
    stream_name: String,
}

impl FirehoseSink {
    pub async fn new(aws: &AwsConfig, stream_name: impl Into<String>) -> Self {
        let client = Client::new(&sdk_config(aws).await);
        let stream_name = stream_name.into();

        info!(stream = %stream_name, region = %aws.region, "Firehose sink initialized");
        Self { client, stream_name }
    }
}

/// Per-record error codes Firehose documents as transient.
fn is_retryable(error_code: &str) -> bool {
    matches!(error_code, "ServiceUnavailableException" | "InternalFailure")
}

#[async_trait]
impl AnalyticsSink for FirehoseSink {
    fn limits(&self) -> SinkLimits {
        SinkLimits::FIREHOSE
    }

    async fn put_batch(&self, records: &[Vec<u8>]) -> Result<Vec<RecordFailure>> {
        let entries = records
            .iter()
            .map(|r| Record::builder().data(Blob::new(r.clone())).build())
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| VigilError::Config(format!("invalid Firehose record: {e}")))?;

        debug!(records = entries.len(), stream = %self.stream_name, "PutRecordBatch");

        let resp = self
            .client
            .put_record_batch()
            .delivery_stream_name(&self.stream_name)
            .set_records(Some(entries))
            .send()
            .await
            .map_err(|e| VigilError::Delivery {
                undelivered: records.len(),
                reason: format!("Firehose PutRecordBatch failed: {e:?}"),
                failures: Vec::new(),
            })?;

        let failures = resp
            .request_responses()
            .iter()
            .enumerate()
            .filter_map(|(index, entry)| {
                entry.error_code().map(|code| RecordFailure {
                    index,
                    retryable: is_retryable(code),
                    reason: format!("{code}: {}", entry.error_message().unwrap_or("")),
                })
            })
            .collect();
        Ok(failures)
    }
}
