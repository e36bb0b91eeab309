//! Detection store contract.
//!
//! Persistence and versioning of detection source lives elsewhere; this crate
//! only reads detections transiently and writes through [`DetectionStore::put`]
//! after the enablement gate has run.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;

use vigil_core::{Detection, Result, VigilError};

#[async_trait]
pub trait DetectionStore: Send + Sync {
    /// Fetch one detection; unknown IDs are [`VigilError::NotFound`].
    async fn get(&self, id: &str) -> Result<Detection>;

    /// Projected listing of every enabled detection.
    async fn list_enabled(&self) -> Result<Vec<Detection>>;

    /// Persist a detection. Callers go through [`crate::gate::save_detection`].
    async fn put(&self, detection: Detection) -> Result<()>;
}

/// In-memory detection store keyed by detection ID.
#[derive(Default)]
pub struct MemoryDetectionStore {
    detections: RwLock<HashMap<String, Detection>>,
    list_calls: AtomicUsize,
}

impl MemoryDetectionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_detections(detections: impl IntoIterator<Item = Detection>) -> Self {
        let store = Self::new();
        {
            let mut guard = store.detections.write().expect("detections lock poisoned");
            for d in detections {
                guard.insert(d.id.clone(), d);
            }
        }
        store
    }

    /// Number of `list_enabled` calls served so far.
    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DetectionStore for MemoryDetectionStore {
    async fn get(&self, id: &str) -> Result<Detection> {
        self.detections
            .read()
            .expect("detections lock poisoned")
            .get(id)
            .cloned()
            .ok_or_else(|| VigilError::NotFound(format!("detection '{}' does not exist", id)))
    }

    async fn list_enabled(&self) -> Result<Vec<Detection>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let guard = self.detections.read().expect("detections lock poisoned");
        let mut enabled: Vec<Detection> = guard
            .values()
            .filter(|d| d.enabled)
            .map(|d| Detection {
                // Projection: tests are not needed by bulk evaluation.
                tests: Vec::new(),
                ..d.clone()
            })
            .collect();
        enabled.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(enabled)
    }

    async fn put(&self, detection: Detection) -> Result<()> {
        self.detections
            .write()
            .expect("detections lock poisoned")
            .insert(detection.id.clone(), detection);
        Ok(())
    }
}
