//! Enablement gate for detection writes.

use tracing::{info, warn};

use vigil_core::{Detection, Result, VigilError};

use crate::harness::{TestHarness, TestResults};
use crate::store::DetectionStore;

/// Run the detection's own tests when it is enabled and refuse unless every
/// test passes. Disabled detections are not tested.
pub async fn gate_enabled_write(harness: &TestHarness, detection: &Detection) -> Result<TestResults> {
    if !detection.enabled {
        return Ok(TestResults::default());
    }

    let results = harness.run_tests(detection, &detection.tests).await?;
    if results.all_passed() {
        return Ok(results);
    }

    let failing: Vec<&str> = results
        .failed
        .iter()
        .chain(results.errored.iter())
        .map(|o| o.name.as_str())
        .collect();
    warn!(detection_id = %detection.id, failing = ?failing, "refusing to enable detection with failing tests");
    Err(VigilError::Validation(format!(
        "cannot enable '{}': {} of {} unit test(s) did not pass: {}",
        detection.id,
        failing.len(),
        results.total(),
        failing.join(", ")
    )))
}

/// Gate, then persist.
pub async fn save_detection(
    store: &dyn DetectionStore,
    harness: &TestHarness,
    detection: Detection,
) -> Result<TestResults> {
    let results = gate_enabled_write(harness, &detection).await?;
    let id = detection.id.clone();
    store.put(detection).await?;
    info!(detection_id = %id, tests = results.total(), "saved detection");
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use async_trait::async_trait;
    use vigil_core::{DetectionType, Severity, UnitTest};

    use crate::engine::{EvaluationEngine, EvaluationRequest, EvaluationResult};
    use crate::store::MemoryDetectionStore;

    /// Policy engine that reports every detection as passing.
    struct AlwaysPasses;

    #[async_trait]
    impl EvaluationEngine for AlwaysPasses {
        async fn evaluate(&self, request: EvaluationRequest) -> Result<Vec<EvaluationResult>> {
            let id = request.detections[0].id.clone();
            Ok(request
                .entities
                .iter()
                .map(|e| EvaluationResult {
                    id: e.id.clone(),
                    passed: vec![id.clone()],
                    ..Default::default()
                })
                .collect())
        }
    }

    fn policy(enabled: bool, expectations: &[bool]) -> Detection {
        Detection {
            id: "P1".to_string(),
            detection_type: DetectionType::Policy,
            body: "def policy(r): return True".to_string(),
            applies_to: vec![],
            severity: Severity::Low,
            enabled,
            tests: expectations
                .iter()
                .enumerate()
                .map(|(i, expected)| UnitTest {
                    name: format!("case-{i}"),
                    expected_result: *expected,
                    resource: "{}".to_string(),
                })
                .collect(),
        }
    }

    #[tokio::test]
    async fn enabled_detection_with_passing_tests_is_saved() {
        let store = MemoryDetectionStore::new();
        let harness = TestHarness::new(Arc::new(AlwaysPasses));
        let results = save_detection(&store, &harness, policy(true, &[true, true]))
            .await
            .unwrap();
        assert_eq!(results.passed.len(), 2);
        assert!(store.get("P1").await.is_ok());
    }

    #[tokio::test]
    async fn enabled_detection_with_failing_test_is_rejected() {
        let store = MemoryDetectionStore::new();
        let harness = TestHarness::new(Arc::new(AlwaysPasses));
        let err = save_detection(&store, &harness, policy(true, &[true, false]))
            .await
            .unwrap_err();
        assert!(matches!(err, VigilError::Validation(_)));
        assert!(err.to_string().contains("case-1"));
        assert!(matches!(store.get("P1").await, Err(VigilError::NotFound(_))));
    }

    #[tokio::test]
    async fn disabled_detection_skips_tests() {
        let store = MemoryDetectionStore::new();
        let harness = TestHarness::new(Arc::new(AlwaysPasses));
        let results = save_detection(&store, &harness, policy(false, &[false]))
            .await
            .unwrap();
        assert_eq!(results.total(), 0);
        assert!(store.get("P1").await.is_ok());
    }
}
