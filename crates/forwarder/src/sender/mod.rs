//! Size-aware batched delivery to the analytics sink.
//!
//! Records are packed greedily into sub-batches that respect the sink's
//! record-count and byte limits. Sub-batches that fail as a whole, and
//! individual records the sink rejects as retryable, are retried with
//! exponential backoff until the retry count or the elapsed-time budget runs
//! out. Oversized records and non-retryable rejections are reported back and
//! never fail the call.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use vigil_core::config::ForwarderConfig;
use vigil_core::{DeliveryFailure, Result, VigilError};


/// Hard limits of a sink's batch API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SinkLimits {
    pub max_records_per_batch: usize,
    pub max_batch_bytes: usize,
    pub max_record_bytes: usize,
}

impl SinkLimits {
    /// Kinesis Firehose `PutRecordBatch`.
    pub const FIREHOSE: SinkLimits = SinkLimits {
        max_records_per_batch: 500,
        max_batch_bytes: 4 * 1024 * 1024,
        max_record_bytes: 1000 * 1024,
    };
}

/// Per-record rejection reported by a sink for one sub-batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordFailure {
    /// Position within the sub-batch handed to `put_batch`.
    pub index: usize,
    pub retryable: bool,
    pub reason: String,
}

/// Destination for serialized change documents.
#[async_trait]
pub trait AnalyticsSink: Send + Sync {
    fn limits(&self) -> SinkLimits;

    /// Deliver one sub-batch. `Err` means nothing was accepted and the whole
    /// sub-batch may be retried; `Ok` lists the records that were rejected.
    async fn put_batch(&self, records: &[Vec<u8>]) -> Result<Vec<RecordFailure>>;
}

/// A record that will not be delivered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Undeliverable {
    /// Position within the slice passed to [`BatchSender::send`].
    pub index: usize,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendReport {
    pub delivered: usize,
    pub undeliverable: Vec<Undeliverable>,
}

pub struct BatchSender {
    sink: Arc<dyn AnalyticsSink>,
    max_retries: u32,
    retry_budget: Duration,
    base_backoff: Duration,
}

impl BatchSender {
    pub fn new(sink: Arc<dyn AnalyticsSink>, max_retries: u32, retry_budget: Duration) -> Self {
        Self {
            sink,
            max_retries,
            retry_budget,
            base_backoff: Duration::from_millis(100),
        }
    }

    pub fn from_config(sink: Arc<dyn AnalyticsSink>, config: &ForwarderConfig) -> Self {
        Self::new(sink, config.max_retries, config.retry_budget())
    }

    /// Backoff before the first retry; doubles for each subsequent one.
    pub fn with_base_backoff(mut self, base_backoff: Duration) -> Self {
        self.base_backoff = base_backoff;
        self
    }

    /// Deliver `records`, returning what was accepted and what never will be.
    ///
    /// Fails with [`VigilError::Delivery`] only when retryable failures are
    /// still pending after the retries or the time budget are used up. The
    /// error then lists those records along with any already undeliverable.
    pub async fn send(&self, records: &[Vec<u8>]) -> Result<SendReport> {
        let started = Instant::now();
        let limits = self.sink.limits();
        let mut report = SendReport::default();

        let mut pending = Vec::with_capacity(records.len());
        for (index, record) in records.iter().enumerate() {
            if record.len() > limits.max_record_bytes {
                warn!(index, bytes = record.len(), "record exceeds sink size limit");
                report.undeliverable.push(Undeliverable {
                    index,
                    reason: format!(
                        "record is {} bytes, limit is {}",
                        record.len(),
                        limits.max_record_bytes
                    ),
                });
            } else {
                pending.push(index);
            }
        }

        let mut attempt: u32 = 0;
        while !pending.is_empty() {
            let mut retry = Vec::new();
            let mut last_error = String::new();

            for chunk in chunk_indices(&pending, records, &limits) {
                let batch: Vec<Vec<u8>> = chunk.iter().map(|&i| records[i].clone()).collect();
                match self.sink.put_batch(&batch).await {
                    Ok(failures) => {
                        let mut rejected = HashSet::new();
                        for failure in failures {
                            let Some(&index) = chunk.get(failure.index) else {
                                warn!(index = failure.index, "sink reported failure outside batch");
                                continue;
                            };
                            if !rejected.insert(index) {
                                debug!(index, "duplicate failure for record");
                                continue;
                            }
                            if failure.retryable {
                                last_error = failure.reason;
                                retry.push(index);
                            } else {
                                report.undeliverable.push(Undeliverable {
                                    index,
                                    reason: failure.reason,
                                });
                            }
                        }
                        report.delivered += chunk.len() - rejected.len();
                    }
                    Err(e) => {
                        warn!(error = %e, records = chunk.len(), attempt, "sink batch failed");
                        last_error = e.to_string();
                        retry.extend(chunk);
                    }
                }
            }

            if retry.is_empty() {
                break;
            }

            attempt += 1;
            let elapsed = started.elapsed();
            if attempt > self.max_retries || elapsed >= self.retry_budget {
                warn!(
                    undelivered = retry.len(),
                    attempts = attempt,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "giving up on retryable records"
                );
                return Err(give_up(report.undeliverable, retry, last_error));
            }

            let backoff = self
                .base_backoff
                .saturating_mul(1 << (attempt - 1).min(16))
                .min(self.retry_budget - elapsed);
            debug!(records = retry.len(), attempt, backoff_ms = backoff.as_millis() as u64, "retrying");
            tokio::time::sleep(backoff).await;

            retry.sort_unstable();
            pending = retry;
        }

        report.undeliverable.sort_by_key(|u| u.index);
        info!(
            delivered = report.delivered,
            undeliverable = report.undeliverable.len(),
            "batch send complete"
        );
        Ok(report)
    }
}

/// Everything that missed the sink: records still retryable plus those
/// already rejected for good, ordered by index.
fn give_up(undeliverable: Vec<Undeliverable>, pending: Vec<usize>, reason: String) -> VigilError {
    let undelivered = pending.len();
    let mut failures: Vec<DeliveryFailure> = undeliverable
        .into_iter()
        .map(|u| DeliveryFailure {
            index: u.index,
            event_id: None,
            reason: u.reason,
            retryable: false,
        })
        .chain(pending.into_iter().map(|index| DeliveryFailure {
            index,
            event_id: None,
            reason: reason.clone(),
            retryable: true,
        }))
        .collect();
    failures.sort_by_key(|f| f.index);
    VigilError::Delivery {
        undelivered,
        reason,
        failures,
    }
}

/// Greedy packing of record indices into sub-batches within `limits`.
fn chunk_indices(pending: &[usize], records: &[Vec<u8>], limits: &SinkLimits) -> Vec<Vec<usize>> {
    let mut chunks = Vec::new();
    let mut current: Vec<usize> = Vec::new();
    let mut current_bytes = 0;

    for &index in pending {
        let size = records[index].len();
        let full = current.len() >= limits.max_records_per_batch
            || current_bytes + size > limits.max_batch_bytes;
        if full && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
            current_bytes = 0;
        }
        current.push(index);
        current_bytes += size;
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}
