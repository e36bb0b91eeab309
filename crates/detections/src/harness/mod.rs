//! Unit-test harness for detections.
//!
//! Every test becomes one synthetic entity whose ID encodes the test's
//! position. All entities go to the engine in a single call together with the
//! detection, and each result is mapped back to its test by decoding that
//! position.
//!
//! Policies and rules read different outcome lists: a policy passes a test
//! when the engine reports it in `passed` exactly when the test expects
//! `true`; a rule passes when the engine reports it in `matched` (the rule
//! fired) exactly when the test expects `true`.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error};

use vigil_core::{Detection, Result, UnitTest, VigilError};

use crate::engine::{
    decode_test_entity_id, encode_test_entity_id, EngineDetection, EngineEntity,
    EvaluationEngine, EvaluationRequest, EvaluationResult,
};


/// Entity type used when a detection declares no applicability set.
const DEFAULT_TEST_ENTITY_TYPE: &str = "test";

/// One classified unit test.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestOutcome {
    pub index: usize,
    pub name: String,
    pub expected_result: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TestResults {
    pub passed: Vec<TestOutcome>,
    pub failed: Vec<TestOutcome>,
    pub errored: Vec<TestOutcome>,
}

impl TestResults {
    pub fn all_passed(&self) -> bool {
        self.failed.is_empty() && self.errored.is_empty()
    }

    pub fn total(&self) -> usize {
        self.passed.len() + self.failed.len() + self.errored.len()
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Classification {
    Passed,
    Failed,
    Errored(String),
}

pub struct TestHarness {
    engine: Arc<dyn EvaluationEngine>,
}

impl TestHarness {
    pub fn new(engine: Arc<dyn EvaluationEngine>) -> Self {
        Self { engine }
    }

    /// Run `tests` against `detection` and sort every test into passed,
    /// failed or errored. Each list is ordered by test position.
    pub async fn run_tests(&self, detection: &Detection, tests: &[UnitTest]) -> Result<TestResults> {
        if tests.is_empty() {
            return Ok(TestResults::default());
        }

        let request = build_request(detection, tests)?;
        let results = self.engine.evaluate(request).await?;

        let classified = match reconcile(detection, tests, results) {
            Ok(c) => c,
            Err(e) => {
                error!(
                    detection_id = %detection.id,
                    error = %e,
                    "evaluation engine returned an unexpected result shape; engine version mismatch?"
                );
                return Err(e);
            }
        };

        let mut report = TestResults::default();
        for (index, classification) in classified.into_iter().enumerate() {
            let test = &tests[index];
            let mut outcome = TestOutcome {
                index,
                name: test.name.clone(),
                expected_result: test.expected_result,
                error: None,
            };
            match classification {
                Classification::Passed => report.passed.push(outcome),
                Classification::Failed => report.failed.push(outcome),
                Classification::Errored(message) => {
                    outcome.error = Some(message);
                    report.errored.push(outcome);
                }
            }
        }

        debug!(
            detection_id = %detection.id,
            passed = report.passed.len(),
            failed = report.failed.len(),
            errored = report.errored.len(),
            "unit tests evaluated"
        );
        Ok(report)
    }
}

fn build_request(detection: &Detection, tests: &[UnitTest]) -> Result<EvaluationRequest> {
    let entity_type = detection
        .applies_to
        .first()
        .map(String::as_str)
        .unwrap_or(DEFAULT_TEST_ENTITY_TYPE);

    let entities = tests
        .iter()
        .enumerate()
        .map(|(index, test)| {
            let data: Value = serde_json::from_str(&test.resource).map_err(|e| {
                VigilError::Validation(format!(
                    "test '{}' does not contain valid JSON: {}",
                    test.name, e
                ))
            })?;
            Ok(EngineEntity {
                id: encode_test_entity_id(index),
                entity_type: entity_type.to_string(),
                data,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(EvaluationRequest {
        detections: vec![EngineDetection::from(detection)],
        entities,
    })
}

/// Map engine results back onto test positions.
///
/// Returns one classification per test, in test order. Results are accepted
/// in any order, but every test must receive exactly one.
fn reconcile(
    detection: &Detection,
    tests: &[UnitTest],
    results: Vec<EvaluationResult>,
) -> Result<Vec<Classification>> {
    let mut slots: Vec<Option<Classification>> = vec![None; tests.len()];

    for result in results {
        let index = decode_test_entity_id(&result.id)?;
        let test = tests.get(index).ok_or_else(|| {
            VigilError::EngineContract(format!(
                "result '{}' refers to test {} but only {} were submitted",
                result.id,
                index,
                tests.len()
            ))
        })?;
        if slots[index].is_some() {
            return Err(VigilError::EngineContract(format!(
                "duplicate result for '{}'",
                result.id
            )));
        }
        slots[index] = Some(classify(detection, test, &result)?);
    }

    slots
        .into_iter()
        .enumerate()
        .map(|(index, slot)| {
            slot.ok_or_else(|| {
                VigilError::EngineContract(format!(
                    "no result returned for '{}'",
                    encode_test_entity_id(index)
                ))
            })
        })
        .collect()
}

fn classify(
    detection: &Detection,
    test: &UnitTest,
    result: &EvaluationResult,
) -> Result<Classification> {
    if let Some(failure) = result.errored.first() {
        return Ok(Classification::Errored(failure.message.clone()));
    }

    let (positive, negative) = result.outcome_sets(detection.detection_type);
    let in_positive = positive.iter().any(|id| id == &detection.id);
    let in_negative = negative.iter().any(|id| id == &detection.id);

    let engine_outcome = match (in_positive, in_negative) {
        (true, false) => true,
        (false, true) => false,
        (false, false) => {
            return Err(VigilError::EngineContract(format!(
                "result '{}' carries no outcome for {} '{}'",
                result.id, detection.detection_type, detection.id
            )))
        }
        (true, true) => {
            return Err(VigilError::EngineContract(format!(
                "result '{}' reports both outcomes for {} '{}'",
                result.id, detection.detection_type, detection.id
            )))
        }
    };

    if engine_outcome == test.expected_result {
        Ok(Classification::Passed)
    } else {
        Ok(Classification::Failed)
    }
}
