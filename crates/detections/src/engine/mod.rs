//! Evaluation engine contract.
//!
//! The engine is an external sandbox that runs detection code against
//! entities. One call carries a set of detections and a set of entities and
//! returns one [`EvaluationResult`] per entity, keyed by the entity ID.

mod entity_id;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use vigil_core::{Detection, DetectionType, Result};

pub use entity_id::{decode_test_entity_id, encode_test_entity_id, TEST_ENTITY_PREFIX};

/// Detection as shipped to the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineDetection {
    pub id: String,
    pub detection_type: DetectionType,
    pub body: String,
    pub applies_to: Vec<String>,
}

impl From<&Detection> for EngineDetection {
    fn from(d: &Detection) -> Self {
        Self {
            id: d.id.clone(),
            detection_type: d.detection_type,
            body: d.body.clone(),
            applies_to: d.applies_to.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineEntity {
    pub id: String,
    pub entity_type: String,
    pub data: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRequest {
    pub detections: Vec<EngineDetection>,
    pub entities: Vec<EngineEntity>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineFailure {
    /// Detection that raised.
    pub id: String,
    pub message: String,
}

/// Engine output for one entity.
///
/// Policies report through `passed`/`failed`, rules through
/// `matched`/`not_matched`. Each list holds detection IDs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationResult {
    pub id: String,
    #[serde(default)]
    pub errored: Vec<EngineFailure>,
    #[serde(default)]
    pub passed: Vec<String>,
    #[serde(default)]
    pub failed: Vec<String>,
    #[serde(default)]
    pub matched: Vec<String>,
    #[serde(default)]
    pub not_matched: Vec<String>,
}

impl EvaluationResult {
    /// The outcome lists consulted for `detection_type`, positive list first.
    pub fn outcome_sets(&self, detection_type: DetectionType) -> (&[String], &[String]) {
        match detection_type {
            DetectionType::Policy => (&self.passed, &self.failed),
            DetectionType::Rule => (&self.matched, &self.not_matched),
        }
    }
}

#[async_trait]
pub trait EvaluationEngine: Send + Sync {
    /// Evaluate every detection against every entity in one round trip.
    ///
    /// Transport or invocation failures are [`vigil_core::VigilError::Engine`].
    async fn evaluate(&self, request: EvaluationRequest) -> Result<Vec<EvaluationResult>>;
}
