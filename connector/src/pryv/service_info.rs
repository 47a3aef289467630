use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

/// Service info document published by a deployment.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct ServiceInfo {
    #[serde(default)]
    pub name: Option<String>,
    /// API endpoint template, e.g. `https://{token}@{username}.pryv.me/`
    #[serde(default)]
    pub api: Option<String>,
    #[serde(default)]
    pub access: Option<String>,
    #[serde(default)]
    pub register: Option<String>,
}

impl ServiceInfo {
    /// The API template, when it carries both `{token}` and `{username}`.
    pub fn api_template(&self) -> Option<&str> {
        self.api
            .as_deref()
            .filter(|t| t.contains("{token}") && t.contains("{username}"))
    }
}

/// Source of the service info document.
#[async_trait]
pub trait ServiceInfoSource: Send + Sync {
    async fn service_info(&self) -> Result<ServiceInfo>;
}

/// Fetches the service info document over HTTP.
pub struct ServiceInfoClient {
    http_client: Client,
    url: String,
}

impl ServiceInfoClient {
    pub fn new(url: String) -> Self {
        Self {
            http_client: Client::new(),
            url,
        }
    }
}

#[async_trait]
impl ServiceInfoSource for ServiceInfoClient {
    async fn service_info(&self) -> Result<ServiceInfo> {
        let response = self
            .http_client
            .get(&self.url)
            .send()
            .await
            .context("Failed to send service info request")?;
        if !response.status().is_success() {
            anyhow::bail!("Service info request failed with status {}", response.status());
        }
        response
            .json::<ServiceInfo>()
            .await
            .context("Failed to parse service info")
    }
}
