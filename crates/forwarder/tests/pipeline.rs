//! End-to-end: compliance writes → change log → forwarder → sink.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::{json, Value};

use vigil_compliance::{ComplianceAggregator, DeleteScope, MemoryComplianceStore};
use vigil_core::{
    document_from_value, ChangeLogRecord, ChangeSource, ComplianceEntry, ComplianceStatus,
    ManualClock, Operation, Result, Severity, SystemClock, VigilError,
};
use vigil_forwarder::{
    process_once, AnalyticsSink, BatchSender, ChangeLogSource, Forwarder, Integration,
    IntegrationDirectory, LabelCache, QueueMessage, RecordFailure, SinkLimits,
};

// ── fakes ───────────────────────────────────────────────────────────

struct StaticDirectory {
    integrations: Vec<Integration>,
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl IntegrationDirectory for StaticDirectory {
    async fn list_integrations(&self, _integration_type: Option<&str>) -> Result<Vec<Integration>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.integrations.clone())
    }
}

#[derive(Default)]
struct CapturingSink {
    lines: Mutex<Vec<Vec<u8>>>,
    fail_batches: bool,
}

#[async_trait]
impl AnalyticsSink for CapturingSink {
    fn limits(&self) -> SinkLimits {
        SinkLimits::FIREHOSE
    }

    async fn put_batch(&self, records: &[Vec<u8>]) -> Result<Vec<RecordFailure>> {
        if self.fail_batches {
            return Err(VigilError::Delivery {
                undelivered: records.len(),
                reason: "ServiceUnavailable".into(),
                failures: Vec::new(),
            });
        }
        self.lines.lock().unwrap().extend_from_slice(records);
        Ok(Vec::new())
    }
}

impl CapturingSink {
    fn documents(&self) -> Vec<Value> {
        self.lines
            .lock()
            .unwrap()
            .iter()
            .map(|line| {
                assert_eq!(line.last(), Some(&b'\n'));
                serde_json::from_slice(line).unwrap()
            })
            .collect()
    }
}

struct Pipeline {
    sink: Arc<CapturingSink>,
    directory_calls: Arc<AtomicUsize>,
    forwarder: Forwarder,
}

fn pipeline(sink: CapturingSink) -> Pipeline {
    let directory_calls = Arc::new(AtomicUsize::new(0));
    let directory = Arc::new(StaticDirectory {
        integrations: vec![
            Integration { id: "acct-1".into(), label: "Production".into() },
            Integration { id: "acct-2".into(), label: "Staging".into() },
        ],
        calls: directory_calls.clone(),
    });
    let labels = Arc::new(LabelCache::new(
        directory,
        Arc::new(SystemClock),
        chrono::Duration::minutes(5),
    ));
    let sink = Arc::new(sink);
    let sender = BatchSender::new(sink.clone(), 2, Duration::from_secs(5))
        .with_base_backoff(Duration::from_millis(10));
    Pipeline {
        sink,
        directory_calls,
        forwarder: Forwarder::new(labels, sender),
    }
}

fn at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap()
}

fn entry(entity: &str, integration: &str, status: ComplianceStatus) -> ComplianceEntry {
    ComplianceEntry {
        detection_id: "AWS.S3.PublicRead".into(),
        entity_id: entity.into(),
        integration_id: integration.into(),
        entity_type: "AWS.S3.Bucket".into(),
        status,
        severity: Severity::High,
        suppressed: false,
        error_message: None,
        last_updated: at(),
        expires_at: at() + chrono::Duration::days(7),
    }
}

fn entity_record(operation: Operation, integration: &str, old: Option<Value>, new: Option<Value>) -> ChangeLogRecord {
    let image = |attrs: Value| {
        document_from_value(json!({
            "entityId": "i-0abc",
            "integrationId": integration,
            "entityType": "AWS.EC2.Instance",
            "attributes": attrs,
        }))
    };
    ChangeLogRecord::new(
        ChangeSource::Entity,
        operation,
        old.and_then(image),
        new.and_then(image),
    )
}

// ── tests ───────────────────────────────────────────────────────────

#[tokio::test]
async fn compliance_lifecycle_reaches_the_sink_enriched() {
    let store = Arc::new(MemoryComplianceStore::new());
    let clock = Arc::new(ManualClock::new(at()));
    let aggregator = ComplianceAggregator::new(store.clone(), clock.clone());

    aggregator
        .set_status(vec![
            entry("bucket-a", "acct-1", ComplianceStatus::Fail),
            entry("bucket-b", "acct-2", ComplianceStatus::Pass),
        ])
        .unwrap();
    // Same status, newer timestamp: nothing to report.
    let mut rescanned = entry("bucket-a", "acct-1", ComplianceStatus::Fail);
    rescanned.last_updated = at() + chrono::Duration::hours(1);
    aggregator.set_status(vec![rescanned]).unwrap();
    aggregator
        .set_status(vec![entry("bucket-b", "acct-2", ComplianceStatus::Fail)])
        .unwrap();
    aggregator
        .delete_status(&DeleteScope::Entity("bucket-a".into()))
        .unwrap();

    let changes = store.drain_changes();
    assert_eq!(changes.len(), 5);

    let p = pipeline(CapturingSink::default());
    let report = p.forwarder.forward(&changes).await.unwrap();

    assert_eq!(report.emitted, 4);
    assert_eq!(report.suppressed, 1);
    assert_eq!(report.dropped, 0);
    assert_eq!(report.delivered, 4);
    assert!(report.undeliverable.is_empty());
    assert_eq!(p.directory_calls.load(Ordering::SeqCst), 1);

    let docs = p.sink.documents();
    let summary: Vec<(&str, &str, &str)> = docs
        .iter()
        .map(|d| {
            (
                d["changeType"].as_str().unwrap(),
                d["entityId"].as_str().unwrap(),
                d["integrationLabel"].as_str().unwrap(),
            )
        })
        .collect();
    assert_eq!(
        summary,
        vec![
            ("created", "bucket-a", "Production"),
            ("created", "bucket-b", "Staging"),
            ("modified", "bucket-b", "Staging"),
            ("deleted", "bucket-a", "Production"),
        ]
    );
    assert!(docs.iter().all(|d| d["recordType"] == "complianceChange"));
    assert_eq!(docs[2]["snapshot"]["status"], "FAIL");
}

#[tokio::test]
async fn replaying_a_batch_ships_the_same_documents() {
    let unchanged = entity_record(
        Operation::Modify,
        "acct-1",
        Some(json!({"state": "running"})),
        Some(json!({"state": "running"})),
    );
    let changed = entity_record(
        Operation::Modify,
        "acct-1",
        Some(json!({"state": "running"})),
        Some(json!({"state": "stopped"})),
    );
    let batch = vec![unchanged, changed];

    let p = pipeline(CapturingSink::default());
    let first = p.forwarder.forward(&batch).await.unwrap();
    let second = p.forwarder.forward(&batch).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(first.suppressed, 1);
    assert_eq!(first.delivered, 1);

    let docs = p.sink.documents();
    assert_eq!(docs.len(), 2);
    assert_eq!(docs[0], docs[1]);
    assert_eq!(docs[0]["changes"]["state"], json!({"from": "running", "to": "stopped"}));
}

#[tokio::test]
async fn unknown_integration_drops_only_that_record() {
    let batch = vec![
        entity_record(Operation::Insert, "acct-ghost", None, Some(json!({"state": "running"}))),
        entity_record(Operation::Insert, "acct-1", None, Some(json!({"state": "running"}))),
    ];

    let p = pipeline(CapturingSink::default());
    let report = p.forwarder.forward(&batch).await.unwrap();

    assert_eq!(report.dropped, 1);
    assert_eq!(report.delivered, 1);
    let docs = p.sink.documents();
    assert_eq!(docs[0]["integrationId"], "acct-1");
    assert!(docs.iter().all(|d| !d["integrationLabel"].as_str().unwrap().is_empty()));
}

#[tokio::test]
async fn oversized_document_is_reported_not_fatal() {
    let huge = "x".repeat(1_100 * 1024);
    let big = entity_record(Operation::Insert, "acct-1", None, Some(json!({"blob": huge})));
    let small = entity_record(Operation::Insert, "acct-2", None, Some(json!({"state": "running"})));
    let big_id = big.event_id.clone();

    let p = pipeline(CapturingSink::default());
    let report = p.forwarder.forward(&[big, small]).await.unwrap();

    assert_eq!(report.emitted, 2);
    assert_eq!(report.delivered, 1);
    assert_eq!(report.undeliverable.len(), 1);
    assert_eq!(report.undeliverable[0].event_id, big_id);
    assert_eq!(p.sink.documents()[0]["integrationLabel"], "Staging");
}

#[tokio::test(start_paused = true)]
async fn persistent_sink_failure_fails_the_batch() {
    let batch = vec![entity_record(Operation::Insert, "acct-1", None, Some(json!({"state": "running"})))];
    let event_id = batch[0].event_id.clone();

    let p = pipeline(CapturingSink {
        fail_batches: true,
        ..CapturingSink::default()
    });
    let err = p.forwarder.forward(&batch).await.unwrap_err();

    match err {
        VigilError::Delivery { undelivered, failures, .. } => {
            assert_eq!(undelivered, 1);
            assert_eq!(failures.len(), 1);
            assert_eq!(failures[0].event_id.as_deref(), Some(event_id.as_str()));
            assert!(failures[0].retryable);
        }
        other => panic!("expected delivery error, got {other}"),
    }
}

// ── worker round ────────────────────────────────────────────────────

#[derive(Default)]
struct FakeQueue {
    messages: Mutex<VecDeque<QueueMessage>>,
    acked: Mutex<Vec<String>>,
    nacked: Mutex<Vec<String>>,
}

impl FakeQueue {
    fn push(&self, id: &str, body: String) {
        self.messages.lock().unwrap().push_back(QueueMessage {
            id: id.into(),
            body,
            receipt_handle: format!("rh-{id}"),
            sent_at: at(),
            attempt_count: 1,
        });
    }
}

#[async_trait]
impl ChangeLogSource for FakeQueue {
    async fn poll_batch(&self, max_messages: u32) -> Result<Vec<QueueMessage>> {
        let mut queue = self.messages.lock().unwrap();
        let n = (max_messages as usize).min(queue.len());
        Ok(queue.drain(..n).collect())
    }

    async fn ack(&self, receipt_handle: &str) -> Result<()> {
        self.acked.lock().unwrap().push(receipt_handle.to_string());
        Ok(())
    }

    async fn nack(&self, receipt_handle: &str) -> Result<()> {
        self.nacked.lock().unwrap().push(receipt_handle.to_string());
        Ok(())
    }
}

#[tokio::test]
async fn worker_round_acks_forwarded_and_nacks_unparseable() {
    let queue = FakeQueue::default();
    let record = entity_record(Operation::Insert, "acct-1", None, Some(json!({"state": "running"})));
    queue.push("good", serde_json::to_string(&vec![record]).unwrap());
    queue.push("bad", "{not json".to_string());
    let huge = "x".repeat(1_100 * 1024);
    let oversized = entity_record(Operation::Insert, "acct-2", None, Some(json!({"blob": huge})));
    queue.push("big", serde_json::to_string(&vec![oversized]).unwrap());

    let p = pipeline(CapturingSink::default());
    let summary = process_once(&queue, &p.forwarder, 10).await.unwrap();

    assert_eq!(summary.messages, 3);
    assert_eq!(summary.acked, 2);
    assert_eq!(summary.nacked, 1);
    assert_eq!(summary.delivered, 1);
    assert_eq!(summary.undeliverable, 1);
    assert_eq!(
        *queue.acked.lock().unwrap(),
        vec!["rh-good".to_string(), "rh-big".to_string()]
    );
    assert_eq!(*queue.nacked.lock().unwrap(), vec!["rh-bad".to_string()]);
}
