//! HTTP-backed integration directory.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use vigil_core::config::DirectoryConfig;
use vigil_core::{Result, VigilError};

use crate::labels::{Integration, IntegrationDirectory};

/// Lists integrations with a single `GET` against the directory endpoint.
///
/// The endpoint answers either a bare JSON array of integrations or an object
/// wrapping it under `integrations`. A requested type is passed as the `type`
/// query parameter.
pub struct HttpIntegrationDirectory {
    client: reqwest::Client,
    url: String,
    api_token: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Listing {
    Bare(Vec<Integration>),
    Wrapped { integrations: Vec<Integration> },
}

impl HttpIntegrationDirectory {
    pub fn new(config: &DirectoryConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: config.url.clone(),
            api_token: config.api_token.clone(),
        }
    }
}

#[async_trait]
impl IntegrationDirectory for HttpIntegrationDirectory {
    async fn list_integrations(&self, integration_type: Option<&str>) -> Result<Vec<Integration>> {
        let mut request = self.client.get(&self.url);
        if let Some(kind) = integration_type {
            request = request.query(&[("type", kind)]);
        }
        if let Some(token) = &self.api_token {
            request = request.bearer_auth(token);
        }

        let resp = request
            .send()
            .await
            .map_err(|e| VigilError::Enrichment(format!("directory request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(VigilError::Enrichment(format!(
                "directory returned HTTP {status}"
            )));
        }

        let listing: Listing = resp
            .json()
            .await
            .map_err(|e| VigilError::Enrichment(format!("invalid directory response: {e}")))?;

        let integrations = match listing {
            Listing::Bare(list) | Listing::Wrapped { integrations: list } => list,
        };
        debug!(count = integrations.len(), url = %self.url, integration_type, "listed integrations");
        Ok(integrations)
    }
}
