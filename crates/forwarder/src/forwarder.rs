//! Change-log batch → enriched JSON lines → analytics sink.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use vigil_core::{ChangeLogRecord, Result, VigilError};

use crate::classify::{classify, ChangeRecord, Classification};
use crate::labels::LabelCache;
use crate::sender::BatchSender;

/// A change that was built but will never reach the sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UndeliverableRecord {
    pub event_id: String,
    pub reason: String,
}

/// What happened to one forwarded batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ForwardReport {
    /// Enriched records handed to the sender.
    pub emitted: usize,
    /// Modifications with nothing to report.
    pub suppressed: usize,
    /// Malformed records and records whose integration label could not be resolved.
    pub dropped: usize,
    pub delivered: usize,
    pub undeliverable: Vec<UndeliverableRecord>,
}

pub struct Forwarder {
    labels: Arc<LabelCache>,
    sender: BatchSender,
}

impl Forwarder {
    pub fn new(labels: Arc<LabelCache>, sender: BatchSender) -> Self {
        Self { labels, sender }
    }

    /// Forward one ordered batch of change-log records.
    ///
    /// Holds no state between calls, so re-running a batch after a failure
    /// ships the same documents again.
    pub async fn forward(&self, records: &[ChangeLogRecord]) -> Result<ForwardReport> {
        let mut report = ForwardReport::default();
        let mut outgoing: Vec<ChangeRecord> = Vec::new();

        for record in records {
            match classify(record) {
                Classification::Emit(change) => {
                    match self.labels.label(change.integration_id()).await {
                        Ok(label) => outgoing.push(change.with_label(label)),
                        Err(e) => {
                            warn!(
                                event_id = %record.event_id,
                                integration_id = %change.integration_id(),
                                error = %e,
                                "dropping change record"
                            );
                            report.dropped += 1;
                        }
                    }
                }
                Classification::Unchanged => {
                    debug!(event_id = %record.event_id, source = %record.source, "no tracked change");
                    report.suppressed += 1;
                }
                Classification::Malformed(reason) => {
                    warn!(event_id = %record.event_id, source = %record.source, %reason, "malformed change-log record");
                    report.dropped += 1;
                }
            }
        }

        report.emitted = outgoing.len();
        if outgoing.is_empty() {
            debug!(records = records.len(), "nothing to forward");
            return Ok(report);
        }

        let lines = outgoing
            .iter()
            .map(|change| {
                let mut line = serde_json::to_vec(change)?;
                line.push(b'\n');
                Ok(line)
            })
            .collect::<Result<Vec<_>>>()?;

        let sent = match self.sender.send(&lines).await {
            Ok(sent) => sent,
            Err(VigilError::Delivery {
                undelivered,
                reason,
                mut failures,
            }) => {
                for failure in &mut failures {
                    let event_id = outgoing[failure.index].event_id();
                    warn!(event_id, retryable = failure.retryable, reason = %failure.reason, "change record not delivered");
                    failure.event_id = Some(event_id.to_string());
                }
                return Err(VigilError::Delivery {
                    undelivered,
                    reason,
                    failures,
                });
            }
            Err(e) => return Err(e),
        };
        report.delivered = sent.delivered;
        report.undeliverable = sent
            .undeliverable
            .into_iter()
            .map(|u| {
                let event_id = outgoing[u.index].event_id().to_string();
                warn!(%event_id, reason = %u.reason, "change record undeliverable");
                UndeliverableRecord {
                    event_id,
                    reason: u.reason,
                }
            })
            .collect();

        info!(
            records = records.len(),
            emitted = report.emitted,
            suppressed = report.suppressed,
            dropped = report.dropped,
            delivered = report.delivered,
            undeliverable = report.undeliverable.len(),
            "forwarded change-log batch"
        );
        Ok(report)
    }
}
