//! Detection-side services.
//!
//! This crate provides:
//! - `DetectionStore` contract plus an in-memory implementation
//! - Time-boxed cache of enabled detections
//! - Evaluation engine wire types and the positional test-entity ID codec
//! - Unit-test harness reconciling engine results against expectations
//! - Enablement gate: an enabled detection is only saved when all tests pass

pub mod cache;
pub mod engine;
pub mod gate;
pub mod harness;
pub mod store;

pub use cache::DetectionCache;
pub use engine::{EvaluationEngine, EvaluationRequest, EvaluationResult};
pub use gate::{gate_enabled_write, save_detection};
pub use harness::{TestHarness, TestOutcome, TestResults};
pub use store::{DetectionStore, MemoryDetectionStore};
