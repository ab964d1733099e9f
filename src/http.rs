//! HTTP access to running app instances.

use std::time::Duration;

use async_trait::async_trait;

use crate::config::HarnessConfig;
use crate::error::{Error, Result};

/// Fetches paths from a running app by name.
#[async_trait]
pub trait AppClient: Send + Sync {
    /// GETs `path` from `app_name` and returns the body of a 2xx response.
    async fn get(&self, app_name: &str, path: &str) -> Result<String>;
}

/// [`AppClient`] reaching apps through their route on the apps domain.
pub struct HttpAppClient {
    client: reqwest::Client,
    protocol: String,
    domain: String,
}

impl HttpAppClient {
    /// Builds a client from harness settings; requires `apps_domain`.
    pub fn from_config(config: &HarnessConfig) -> Result<Self> {
        let domain = config
            .apps_domain
            .clone()
            .ok_or_else(|| Error::Config("apps_domain is required to reach apps".to_string()))?;

        Self::new(
            &config.protocol,
            domain,
            config.default_timeout(),
            config.skip_ssl_validation,
        )
    }

    /// Builds a client for `protocol://<app>.<domain>`.
    pub fn new(
        protocol: &str,
        domain: impl Into<String>,
        timeout: Duration,
        accept_invalid_certs: bool,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(accept_invalid_certs)
            .build()
            .map_err(|e| Error::Http(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            protocol: protocol.to_string(),
            domain: domain.into(),
        })
    }

    /// Returns the URL for `path` on `app_name`.
    pub fn url(&self, app_name: &str, path: &str) -> String {
        format!("{}://{}.{}{}", self.protocol, app_name, self.domain, path)
    }
}

#[async_trait]
impl AppClient for HttpAppClient {
    async fn get(&self, app_name: &str, path: &str) -> Result<String> {
        let url = self.url(app_name, path);
        tracing::debug!(url = %url, "requesting app");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::Http(format!("GET {} failed: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Http(format!("GET {} returned {}", url, status)));
        }

        response
            .text()
            .await
            .map_err(|e| Error::Http(format!("failed to read body of {}: {}", url, e)))
    }
}
