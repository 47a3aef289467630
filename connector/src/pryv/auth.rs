//! Access request flow.
//!
//! The connector asks the service's access URL for read permission on every
//! stream. The user signs in at the returned URL while the connector polls;
//! an accepted request carries the API endpoint of the granted access.

use anyhow::{anyhow, bail, Context, Result};
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

const DEFAULT_POLL_RATE_MS: u64 = 1000;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Permission {
    pub stream_id: String,
    pub level: String,
}

/// Body posted to the access URL.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessRequest {
    pub requesting_app_id: String,
    pub requested_permissions: Vec<Permission>,
    pub language_code: String,
}

impl AccessRequest {
    /// Read permission on all streams (`*`).
    pub fn read_all(app_id: &str) -> Self {
        Self {
            requesting_app_id: app_id.to_string(),
            requested_permissions: vec![Permission {
                stream_id: "*".to_string(),
                level: "read".to_string(),
            }],
            language_code: "en".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccessResponse {
    status: String,
    #[serde(default)]
    api_endpoint: Option<String>,
    #[serde(default)]
    auth_url: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    poll: Option<String>,
    #[serde(default, rename = "poll_rate_ms")]
    poll_rate_ms: Option<u64>,
    #[serde(default, rename = "reasonID")]
    reason_id: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// State of a pending access request.
#[derive(Clone, Debug, PartialEq)]
pub enum AccessState {
    /// Waiting for the user to sign in
    Pending {
        auth_url: Option<String>,
        poll_url: String,
        poll_rate: Duration,
    },
    Accepted {
        api_endpoint: String,
    },
    Refused {
        reason: String,
    },
}

impl TryFrom<AccessResponse> for AccessState {
    type Error = anyhow::Error;

    fn try_from(response: AccessResponse) -> Result<Self> {
        match response.status.as_str() {
            "NEED_SIGNIN" => Ok(AccessState::Pending {
                auth_url: response.auth_url.or(response.url),
                poll_url: response
                    .poll
                    .ok_or_else(|| anyhow!("Access response has no poll URL"))?,
                poll_rate: Duration::from_millis(
                    response.poll_rate_ms.unwrap_or(DEFAULT_POLL_RATE_MS),
                ),
            }),
            "ACCEPTED" => Ok(AccessState::Accepted {
                api_endpoint: response
                    .api_endpoint
                    .ok_or_else(|| anyhow!("Accepted access has no apiEndpoint"))?,
            }),
            "REFUSED" => Ok(AccessState::Refused {
                reason: response
                    .message
                    .or(response.reason_id)
                    .unwrap_or_else(|| "refused".to_string()),
            }),
            other => bail!(
                "Access request error: {}",
                response.message.as_deref().unwrap_or(other)
            ),
        }
    }
}

/// HTTP client for the access service.
#[derive(Default)]
pub struct AccessClient {
    http_client: Client,
}

impl AccessClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Posts `request` to the access URL.
    pub async fn request(&self, access_url: &str, request: &AccessRequest) -> Result<AccessState> {
        let response = self
            .http_client
            .post(access_url)
            .json(request)
            .send()
            .await
            .context("Failed to send access request")?;
        parse_state(response).await
    }

    pub async fn poll(&self, poll_url: &str) -> Result<AccessState> {
        let response = self
            .http_client
            .get(poll_url)
            .send()
            .await
            .context("Failed to poll access request")?;
        parse_state(response).await
    }

    /// Runs the whole flow and returns the granted API endpoint.
    ///
    /// `on_auth_url` is called once with the sign-in URL. Fails when the user
    /// refuses or when nothing is decided within `timeout`.
    pub async fn authorize<F>(
        &self,
        access_url: &str,
        request: &AccessRequest,
        timeout: Duration,
        mut on_auth_url: F,
    ) -> Result<String>
    where
        F: FnMut(&str),
    {
        tokio::time::timeout(timeout, self.run(access_url, request, &mut on_auth_url))
            .await
            .map_err(|_| anyhow!("Access request timed out after {:?}", timeout))?
    }

    async fn run<F>(
        &self,
        access_url: &str,
        request: &AccessRequest,
        on_auth_url: &mut F,
    ) -> Result<String>
    where
        F: FnMut(&str),
    {
        let mut state = self.request(access_url, request).await?;
        let mut announced = false;
        loop {
            match state {
                AccessState::Accepted { api_endpoint } => {
                    info!("Access request accepted");
                    return Ok(api_endpoint);
                }
                AccessState::Refused { reason } => bail!("Access refused: {}", reason),
                AccessState::Pending {
                    auth_url,
                    poll_url,
                    poll_rate,
                } => {
                    if !announced {
                        if let Some(url) = &auth_url {
                            on_auth_url(url);
                        }
                        announced = true;
                    }
                    debug!(poll_url = %poll_url, "Access request pending");
                    tokio::time::sleep(poll_rate).await;
                    state = self.poll(&poll_url).await?;
                }
            }
        }
    }
}

/// Refusals come back with an error status but a regular body.
async fn parse_state(response: Response) -> Result<AccessState> {
    let status = response.status();
    let body = response
        .text()
        .await
        .context("Failed to read access response")?;
    match serde_json::from_str::<AccessResponse>(&body) {
        Ok(parsed) => AccessState::try_from(parsed),
        Err(_) if !status.is_success() => {
            Err(anyhow!("Access request failed with status {}", status))
        }
        Err(e) => Err(e).context("Failed to parse access response"),
    }
}
