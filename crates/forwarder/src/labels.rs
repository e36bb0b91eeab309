//! Integration ID → human label lookup, refreshed wholesale from the
//! integration directory.
//!
//! The snapshot is replaced as a whole, so an integration removed from the
//! directory disappears from the cache at the next refresh. A miss after a
//! refresh is a hard error: records are never shipped with a blank label.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use vigil_core::config::CacheConfig;
use vigil_core::{Clock, Result, VigilError};

/// A connected cloud account or log source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Integration {
    #[serde(alias = "integrationId")]
    pub id: String,
    #[serde(alias = "integrationLabel")]
    pub label: String,
}

/// Source of truth for integration labels.
#[async_trait]
pub trait IntegrationDirectory: Send + Sync {
    /// Integrations of one type (e.g. `aws-s3`), or of every type for `None`.
    async fn list_integrations(&self, integration_type: Option<&str>) -> Result<Vec<Integration>>;
}

struct Snapshot {
    refreshed_at: DateTime<Utc>,
    labels: HashMap<String, String>,
}

pub struct LabelCache {
    directory: Arc<dyn IntegrationDirectory>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    snapshot: RwLock<Option<Arc<Snapshot>>>,
}

impl LabelCache {
    pub fn new(directory: Arc<dyn IntegrationDirectory>, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self {
            directory,
            clock,
            ttl,
            snapshot: RwLock::new(None),
        }
    }

    pub fn from_config(
        directory: Arc<dyn IntegrationDirectory>,
        clock: Arc<dyn Clock>,
        config: &CacheConfig,
    ) -> Self {
        Self::new(directory, clock, config.label_ttl())
    }

    /// Label for `integration_id`.
    ///
    /// A fresh snapshot answers directly. On a miss or an expired snapshot the
    /// directory is listed once and the lookup retried against the new map.
    pub async fn label(&self, integration_id: &str) -> Result<String> {
        let now = self.clock.now();
        if let Some(current) = self.current() {
            if now - current.refreshed_at < self.ttl {
                if let Some(label) = current.labels.get(integration_id) {
                    return Ok(label.clone());
                }
            }
        }

        let refreshed = self.refresh(now).await?;
        refreshed.labels.get(integration_id).cloned().ok_or_else(|| {
            warn!(integration_id, "integration not found in directory");
            VigilError::Enrichment(format!("no label for integration {integration_id}"))
        })
    }

    /// Number of integrations in the current snapshot, if any.
    pub fn integration_count(&self) -> Option<usize> {
        self.current().map(|s| s.labels.len())
    }

    async fn refresh(&self, now: DateTime<Utc>) -> Result<Arc<Snapshot>> {
        let integrations = self.directory.list_integrations(None).await.map_err(|e| {
            warn!(error = %e, "failed to list integrations");
            VigilError::Enrichment(format!("integration directory unavailable: {e}"))
        })?;

        let labels: HashMap<String, String> = integrations
            .into_iter()
            .map(|i| (i.id, i.label))
            .collect();
        debug!(count = labels.len(), "refreshed integration label cache");

        let snapshot = Arc::new(Snapshot {
            refreshed_at: now,
            labels,
        });
        *self.snapshot.write().expect("label cache lock poisoned") = Some(Arc::clone(&snapshot));
        Ok(snapshot)
    }

    fn current(&self) -> Option<Arc<Snapshot>> {
        self.snapshot
            .read()
            .expect("label cache lock poisoned")
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use vigil_core::ManualClock;

    struct FakeDirectory {
        integrations: RwLock<Vec<Integration>>,
        calls: Arc<AtomicUsize>,
        requested_types: RwLock<Vec<Option<String>>>,
    }

    impl FakeDirectory {
        fn new(pairs: &[(&str, &str)]) -> Self {
            let directory = Self {
                integrations: RwLock::new(Vec::new()),
                calls: Arc::new(AtomicUsize::new(0)),
                requested_types: RwLock::new(Vec::new()),
            };
            directory.replace(pairs);
            directory
        }

        fn replace(&self, pairs: &[(&str, &str)]) {
            *self.integrations.write().unwrap() = pairs
                .iter()
                .map(|(id, label)| Integration {
                    id: id.to_string(),
                    label: label.to_string(),
                })
                .collect();
        }
    }

    #[async_trait]
    impl IntegrationDirectory for FakeDirectory {
        async fn list_integrations(&self, integration_type: Option<&str>) -> Result<Vec<Integration>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.requested_types
                .write()
                .unwrap()
                .push(integration_type.map(str::to_string));
            Ok(self.integrations.read().unwrap().clone())
        }
    }

    struct DownDirectory;

    #[async_trait]
    impl IntegrationDirectory for DownDirectory {
        async fn list_integrations(&self, _integration_type: Option<&str>) -> Result<Vec<Integration>> {
            Err(VigilError::Config("connection refused".into()))
        }
    }

    fn setup(pairs: &[(&str, &str)]) -> (Arc<FakeDirectory>, Arc<ManualClock>, LabelCache) {
        let directory = Arc::new(FakeDirectory::new(pairs));
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let cache = LabelCache::new(directory.clone(), clock.clone(), Duration::minutes(5));
        (directory, clock, cache)
    }

    #[tokio::test]
    async fn serves_from_memory_until_expiry() {
        let (directory, clock, cache) = setup(&[("acct-1", "Production")]);

        assert_eq!(cache.label("acct-1").await.unwrap(), "Production");
        assert_eq!(cache.label("acct-1").await.unwrap(), "Production");
        assert_eq!(directory.calls.load(Ordering::SeqCst), 1);

        directory.replace(&[("acct-1", "Prod (renamed)")]);
        clock.advance(Duration::minutes(4));
        assert_eq!(cache.label("acct-1").await.unwrap(), "Production");

        clock.advance(Duration::minutes(1));
        assert_eq!(cache.label("acct-1").await.unwrap(), "Prod (renamed)");
        assert_eq!(directory.calls.load(Ordering::SeqCst), 2);
        // Labels are resolved across every integration type.
        assert_eq!(*directory.requested_types.read().unwrap(), vec![None::<String>, None]);
    }

    #[tokio::test]
    async fn miss_refreshes_once_then_finds_new_integration() {
        let (directory, _clock, cache) = setup(&[("acct-1", "Production")]);
        cache.label("acct-1").await.unwrap();

        directory.replace(&[("acct-1", "Production"), ("acct-2", "Staging")]);
        assert_eq!(cache.label("acct-2").await.unwrap(), "Staging");
        assert_eq!(directory.calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.integration_count(), Some(2));
    }

    #[tokio::test]
    async fn unknown_integration_is_a_hard_error() {
        let (directory, _clock, cache) = setup(&[("acct-1", "Production")]);

        let err = cache.label("ghost").await.unwrap_err();
        assert!(matches!(err, VigilError::Enrichment(_)));
        assert_eq!(directory.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn refresh_replaces_the_whole_map() {
        let (directory, _clock, cache) = setup(&[("acct-1", "Production"), ("acct-2", "Staging")]);
        cache.label("acct-1").await.unwrap();

        directory.replace(&[("acct-3", "Sandbox")]);
        cache.label("acct-3").await.unwrap();

        assert!(matches!(cache.label("acct-2").await, Err(VigilError::Enrichment(_))));
        assert_eq!(cache.integration_count(), Some(1));
    }

    #[tokio::test]
    async fn directory_failure_is_an_enrichment_error() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let cache = LabelCache::new(Arc::new(DownDirectory), clock, Duration::minutes(5));
        assert!(matches!(cache.label("acct-1").await, Err(VigilError::Enrichment(_))));
        assert_eq!(cache.integration_count(), None);
    }
}
