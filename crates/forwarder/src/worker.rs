//! One poll → forward → ack round over a change-log source.

use serde::Serialize;
use tracing::{error, warn};

use vigil_core::Result;

use crate::forwarder::Forwarder;
use crate::source::{parse_batch, ChangeLogSource};

/// Tally of one polling round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PollSummary {
    pub messages: usize,
    pub acked: usize,
    pub nacked: usize,
    pub delivered: usize,
    /// Records that will never reach the sink, across acked messages.
    pub undeliverable: usize,
}

/// Poll one batch of messages and forward each one independently.
///
/// A message is acked only once its whole batch was forwarded. Unparseable
/// bodies and forwarding failures are nacked for redelivery, leaving the
/// queue's redrive policy to park poison messages.
pub async fn process_once(
    source: &dyn ChangeLogSource,
    forwarder: &Forwarder,
    max_messages: u32,
) -> Result<PollSummary> {
    let messages = source.poll_batch(max_messages).await?;
    let mut summary = PollSummary {
        messages: messages.len(),
        ..PollSummary::default()
    };

    let (parsed, failed) = parse_batch(messages);

    for (msg, e) in failed {
        error!(message_id = %msg.id, attempt = msg.attempt_count, error = %e, "unparseable change-log message");
        settle(source, &msg.receipt_handle, false, &mut summary).await;
    }

    for (msg, records) in parsed {
        match forwarder.forward(&records).await {
            Ok(report) => {
                summary.delivered += report.delivered;
                summary.undeliverable += report.undeliverable.len();
                settle(source, &msg.receipt_handle, true, &mut summary).await;
            }
            Err(e) => {
                warn!(message_id = %msg.id, attempt = msg.attempt_count, error = %e, "forwarding failed, returning message");
                settle(source, &msg.receipt_handle, false, &mut summary).await;
            }
        }
    }

    Ok(summary)
}

async fn settle(source: &dyn ChangeLogSource, receipt_handle: &str, ok: bool, summary: &mut PollSummary) {
    let result = if ok {
        source.ack(receipt_handle).await
    } else {
        source.nack(receipt_handle).await
    };
    match result {
        Ok(()) if ok => summary.acked += 1,
        Ok(()) => summary.nacked += 1,
        Err(e) => warn!(receipt_handle, ack = ok, error = %e, "failed to settle message"),
    }
}
