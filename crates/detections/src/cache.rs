//! Time-boxed snapshot of enabled detections backing bulk evaluation.
//!
//! The snapshot is an `Arc` swapped as a whole under a short write lock, so a
//! reader either sees the previous map or the new one. The lock is never held
//! across the store call: two workers refreshing at once both hit the store and
//! the last swap wins.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};

use vigil_core::config::CacheConfig;
use vigil_core::{Clock, Detection, Result};

use crate::store::DetectionStore;

struct Snapshot {
    refreshed_at: DateTime<Utc>,
    detections: Arc<HashMap<String, Detection>>,
}

pub struct DetectionCache {
    store: Arc<dyn DetectionStore>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    snapshot: RwLock<Option<Arc<Snapshot>>>,
}

impl DetectionCache {
    pub fn new(store: Arc<dyn DetectionStore>, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self {
            store,
            clock,
            ttl,
            snapshot: RwLock::new(None),
        }
    }

    pub fn from_config(
        store: Arc<dyn DetectionStore>,
        clock: Arc<dyn Clock>,
        config: &CacheConfig,
    ) -> Self {
        Self::new(store, clock, config.detection_ttl())
    }

    /// Enabled detections keyed by ID.
    ///
    /// Served from memory while the snapshot is at most `ttl` old. Otherwise the
    /// store is queried synchronously; if that fails the error is returned and
    /// the expired snapshot is not served.
    pub async fn enabled_detections(&self) -> Result<Arc<HashMap<String, Detection>>> {
        let now = self.clock.now();
        if let Some(current) = self.current() {
            if now - current.refreshed_at <= self.ttl {
                return Ok(Arc::clone(&current.detections));
            }
        }

        let listed = self.store.list_enabled().await.map_err(|e| {
            warn!(error = %e, "failed to refresh enabled detections");
            e
        })?;

        let detections: HashMap<String, Detection> =
            listed.into_iter().map(|d| (d.id.clone(), d)).collect();
        debug!(count = detections.len(), "refreshed enabled detection cache");

        let snapshot = Arc::new(Snapshot {
            refreshed_at: now,
            detections: Arc::new(detections),
        });
        let served = Arc::clone(&snapshot.detections);
        *self.snapshot.write().expect("detection cache lock poisoned") = Some(snapshot);
        Ok(served)
    }

    /// Drop the snapshot so the next read goes to the store.
    pub fn invalidate(&self) {
        *self.snapshot.write().expect("detection cache lock poisoned") = None;
    }

    fn current(&self) -> Option<Arc<Snapshot>> {
        self.snapshot
            .read()
            .expect("detection cache lock poisoned")
            .as_ref()
            .map(Arc::clone)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;
    use vigil_core::{DetectionType, ManualClock, Severity, VigilError};

    use crate::store::MemoryDetectionStore;

    fn detection(id: &str, enabled: bool) -> Detection {
        Detection {
            id: id.to_string(),
            detection_type: DetectionType::Policy,
            body: "def policy(r): return True".to_string(),
            applies_to: vec!["AWS.S3.Bucket".to_string()],
            severity: Severity::Medium,
            enabled,
            tests: Vec::new(),
        }
    }

    #[tokio::test]
    async fn serves_snapshot_within_ttl() {
        let store = Arc::new(MemoryDetectionStore::with_detections([
            detection("P1", true),
            detection("P2", false),
        ]));
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let cache = DetectionCache::new(store.clone(), clock.clone(), Duration::seconds(30));

        let first = cache.enabled_detections().await.unwrap();
        assert_eq!(first.len(), 1);
        assert!(first.contains_key("P1"));

        clock.advance(Duration::seconds(30));
        cache.enabled_detections().await.unwrap();
        assert_eq!(store.list_calls(), 1);

        clock.advance(Duration::seconds(1));
        cache.enabled_detections().await.unwrap();
        assert_eq!(store.list_calls(), 2);
    }

    #[tokio::test]
    async fn refresh_picks_up_new_detections() {
        let store = Arc::new(MemoryDetectionStore::with_detections([detection("P1", true)]));
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let cache = DetectionCache::new(store.clone(), clock.clone(), Duration::seconds(30));

        assert_eq!(cache.enabled_detections().await.unwrap().len(), 1);
        store.put(detection("P2", true)).await.unwrap();
        assert_eq!(cache.enabled_detections().await.unwrap().len(), 1);

        cache.invalidate();
        assert_eq!(cache.enabled_detections().await.unwrap().len(), 2);
    }

    struct FlakyStore {
        inner: MemoryDetectionStore,
        failing: AtomicBool,
    }

    #[async_trait]
    impl DetectionStore for FlakyStore {
        async fn get(&self, id: &str) -> Result<Detection> {
            self.inner.get(id).await
        }
        async fn list_enabled(&self) -> Result<Vec<Detection>> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(VigilError::Engine("store unavailable".to_string()));
            }
            self.inner.list_enabled().await
        }
        async fn put(&self, detection: Detection) -> Result<()> {
            self.inner.put(detection).await
        }
    }

    #[tokio::test]
    async fn expired_snapshot_is_not_served_on_refresh_failure() {
        let store = Arc::new(FlakyStore {
            inner: MemoryDetectionStore::with_detections([detection("P1", true)]),
            failing: AtomicBool::new(false),
        });
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let cache = DetectionCache::new(store.clone(), clock.clone(), Duration::seconds(30));

        cache.enabled_detections().await.unwrap();
        store.failing.store(true, Ordering::SeqCst);

        // Still fresh: no store call, no error.
        assert!(cache.enabled_detections().await.is_ok());

        clock.advance(Duration::seconds(31));
        assert!(cache.enabled_detections().await.is_err());
    }
}
