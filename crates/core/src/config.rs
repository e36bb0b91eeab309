use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

fn profiled_env_u32(profile: &str, key: &str, default: u32) -> u32 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_u64(profile: &str, key: &str, default: u64) -> u64 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub aws: AwsConfig,
    pub cache: CacheConfig,
    pub forwarder: ForwarderConfig,
    pub queue: QueueConfig,
    pub directory: DirectoryConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `VIGIL_PROFILE`. When set (e.g. `PROD`), every
    /// key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("VIGIL_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            profile: p.to_string(),
            aws: AwsConfig::from_env_profiled(p),
            cache: CacheConfig::from_env_profiled(p),
            forwarder: ForwarderConfig::from_env_profiled(p),
            queue: QueueConfig::from_env_profiled(p),
            directory: DirectoryConfig::from_env_profiled(p),
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!("  aws:         region={}, static_credentials={}", self.aws.region, self.aws.has_static_credentials());
        tracing::info!(
            "  cache:       detections_ttl={}s, labels_ttl={}s",
            self.cache.detection_ttl_secs, self.cache.label_ttl_secs
        );
        tracing::info!(
            "  forwarder:   stream={}, max_retries={}, budget={}s",
            self.forwarder.stream_name.as_deref().unwrap_or("(none)"),
            self.forwarder.max_retries,
            self.forwarder.retry_budget_secs
        );
        tracing::info!("  queue:       url={}", self.queue.queue_url.as_deref().unwrap_or("(none)"));
        tracing::info!("  directory:   url={}", self.directory.url);
    }
}

// ── AWS ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AwsConfig {
    pub region: String,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub session_token: Option<String>,
    pub endpoint_url: Option<String>,
}

impl AwsConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            region: profiled_env_or(p, "AWS_REGION", "us-east-1"),
            access_key_id: profiled_env_opt(p, "AWS_ACCESS_KEY_ID"),
            secret_access_key: profiled_env_opt(p, "AWS_SECRET_ACCESS_KEY"),
            session_token: profiled_env_opt(p, "AWS_SESSION_TOKEN"),
            endpoint_url: profiled_env_opt(p, "AWS_ENDPOINT_URL"),
        }
    }

    pub fn has_static_credentials(&self) -> bool {
        self.access_key_id.is_some() && self.secret_access_key.is_some()
    }
}

// ── Caches ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub detection_ttl_secs: u64,
    pub label_ttl_secs: u64,
}

impl CacheConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            detection_ttl_secs: profiled_env_u64(p, "DETECTION_CACHE_TTL_SECS", 30),
            label_ttl_secs: profiled_env_u64(p, "LABEL_CACHE_TTL_SECS", 300),
        }
    }

    pub fn detection_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.detection_ttl_secs as i64)
    }

    pub fn label_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.label_ttl_secs as i64)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            detection_ttl_secs: 30,
            label_ttl_secs: 300,
        }
    }
}

// ── Forwarder / analytics sink ────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForwarderConfig {
    /// Firehose delivery stream receiving the change documents.
    pub stream_name: Option<String>,
    pub max_retries: u32,
    pub retry_budget_secs: u64,
}

impl ForwarderConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            stream_name: profiled_env_opt(p, "FIREHOSE_STREAM"),
            max_retries: profiled_env_u32(p, "FORWARDER_MAX_RETRIES", 3),
            retry_budget_secs: profiled_env_u64(p, "FORWARDER_RETRY_BUDGET_SECS", 30),
        }
    }

    pub fn retry_budget(&self) -> Duration {
        Duration::from_secs(self.retry_budget_secs)
    }
}

// ── Change-log queue ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    pub queue_url: Option<String>,
    pub visibility_timeout_secs: u32,
}

impl QueueConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            queue_url: profiled_env_opt(p, "CHANGELOG_QUEUE_URL"),
            visibility_timeout_secs: profiled_env_u32(p, "VISIBILITY_TIMEOUT_SECS", 60),
        }
    }
}

// ── Integration directory ─────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryConfig {
    pub url: String,
    pub api_token: Option<String>,
}

impl DirectoryConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            url: profiled_env_or(p, "INTEGRATION_DIRECTORY_URL", "http://localhost:8080/integrations"),
            api_token: profiled_env_opt(p, "INTEGRATION_DIRECTORY_TOKEN"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_env() {
        let config = Config::for_profile("VIGIL_TEST_UNUSED_PROFILE");
        assert_eq!(config.profile_label(), "VIGIL_TEST_UNUSED_PROFILE");
        assert_eq!(config.cache.detection_ttl(), chrono::Duration::seconds(30));
        assert_eq!(config.cache.label_ttl(), chrono::Duration::minutes(5));
        assert_eq!(config.forwarder.max_retries, 3);
    }

    #[test]
    fn profiled_key_wins_over_plain_key() {
        env::set_var("VIGILCFGTEST_FORWARDER_MAX_RETRIES", "7");
        let config = Config::for_profile("vigilcfgtest");
        assert_eq!(config.forwarder.max_retries, 7);
        env::remove_var("VIGILCFGTEST_FORWARDER_MAX_RETRIES");
    }
}
