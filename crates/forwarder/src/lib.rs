//! Change-capture forwarding: change-log records from the compliance and
//! entity stores become integration-labelled change documents shipped in
//! size-aware batches to the analytics sink.

pub mod aws;
pub mod classify;
pub mod directory;
pub mod firehose;
pub mod forwarder;
pub mod labels;
pub mod sender;
pub mod source;
pub mod sqs;
pub mod worker;

pub use classify::{classify, ChangeRecord, ChangeType, Classification};
pub use directory::HttpIntegrationDirectory;
pub use firehose::FirehoseSink;
pub use forwarder::{ForwardReport, Forwarder, UndeliverableRecord};
pub use labels::{Integration, IntegrationDirectory, LabelCache};
pub use sender::{AnalyticsSink, BatchSender, RecordFailure, SendReport, SinkLimits};
pub use source::{ChangeLogSource, QueueMessage};
pub use sqs::SqsChangeSource;
pub use worker::{process_once, PollSummary};
