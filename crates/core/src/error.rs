use serde::Serialize;
use thiserror::Error;

/// A record the analytics sink never accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryFailure {
    /// Position within the batch handed to the sender.
    pub index: usize,
    /// Set once the record has been mapped back to its change.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
    pub reason: String,
    /// Still retryable when retries ran out (as opposed to rejected for good).
    pub retryable: bool,
}

/// Coarse status semantics for surfacing an error to an API client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    BadRequest,
    NotFound,
    Internal,
}

impl StatusClass {
    pub fn http_code(&self) -> u16 {
        match self {
            StatusClass::BadRequest => 400,
            StatusClass::NotFound => 404,
            StatusClass::Internal => 500,
        }
    }
}

#[derive(Error, Debug)]
pub enum VigilError {
    /// Bad input shape. The message is surfaced verbatim to callers.
    #[error("{0}")]
    Validation(String),

    /// Unknown ID (distinct from an empty listing).
    #[error("{0}")]
    NotFound(String),

    /// Evaluation engine transport or invocation failure.
    #[error("evaluation engine failed: {0}")]
    Engine(String),

    /// The engine answered with a result shape we do not understand.
    #[error("evaluation engine contract violation: {0}")]
    EngineContract(String),

    /// Integration label could not be resolved.
    #[error("enrichment failed: {0}")]
    Enrichment(String),

    /// The analytics sink still rejected records after all retries.
    /// `failures` lists every record that did not make it, retryable or not.
    #[error("delivery failed for {undelivered} record(s): {reason}")]
    Delivery {
        undelivered: usize,
        reason: String,
        failures: Vec<DeliveryFailure>,
    },

    /// Change-log queue transport failure.
    #[error("queue error: {0}")]
    Queue(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl VigilError {
    pub fn status(&self) -> StatusClass {
        match self {
            VigilError::Validation(_) => StatusClass::BadRequest,
            VigilError::NotFound(_) => StatusClass::NotFound,
            _ => StatusClass::Internal,
        }
    }
}

pub type Result<T> = std::result::Result<T, VigilError>;
