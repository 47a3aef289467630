use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use super::{Invitation, InvitationDirectory};
use crate::descriptor::CampaignLink;

const ACCEPTED: &str = "accepted";

#[derive(Debug, Deserialize)]
struct InvitationsResponse {
    #[serde(default)]
    invitations: Vec<ApiInvitation>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiInvitation {
    #[serde(default)]
    status: String,
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    requestee: Option<Requestee>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Requestee {
    #[serde(default)]
    pryv_username: Option<String>,
}

impl ApiInvitation {
    /// Accepted invitations carrying both a token and a username.
    fn into_accepted(self) -> Option<Invitation> {
        if self.status != ACCEPTED {
            return None;
        }
        Some(Invitation {
            access_token: self.access_token.filter(|t| !t.is_empty())?,
            username: self
                .requestee?
                .pryv_username
                .filter(|u| !u.is_empty())?,
        })
    }
}

/// HTTP client of the campaign invitation directory.
pub struct CampaignClient {
    http_client: Client,
    api_url: String,
}

impl CampaignClient {
    pub fn new(api_url: String) -> Self {
        Self {
            http_client: Client::new(),
            api_url: api_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl InvitationDirectory for CampaignClient {
    async fn accepted_invitations(&self, link: &CampaignLink) -> Result<Vec<Invitation>> {
        let url = format!("{}/invitations", self.api_url);
        debug!(url = %url, username = %link.username, "Fetching campaign invitations");

        let response = self
            .http_client
            .get(&url)
            .query(&[("username", link.username.as_str())])
            .header("Authorization", link.token.as_str())
            .send()
            .await
            .context("Failed to reach campaign directory")?;

        if !response.status().is_success() {
            anyhow::bail!("Campaign directory returned status {}", response.status());
        }

        let body: InvitationsResponse = response
            .json()
            .await
            .context("Failed to parse campaign invitations")?;

        Ok(body
            .invitations
            .into_iter()
            .filter_map(ApiInvitation::into_accepted)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    fn link() -> CampaignLink {
        CampaignLink {
            username: "requester".to_string(),
            token: "req-token".to_string(),
        }
    }

    #[tokio::test]
    async fn test_only_accepted_invitations_kept() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/invitations")
            .match_query(Matcher::UrlEncoded("username".into(), "requester".into()))
            .match_header("authorization", "req-token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"invitations": [
                    {"status": "accepted", "accessToken": "t1", "requestee": {"pryvUsername": "alice"}},
                    {"status": "refused", "accessToken": "t2", "requestee": {"pryvUsername": "bob"}},
                    {"status": "accepted", "requestee": {"pryvUsername": "carol"}},
                    {"status": "accepted", "accessToken": "t4", "requestee": {"pryvUsername": "dave"}}
                ]}"#,
            )
            .create_async()
            .await;

        let client = CampaignClient::new(format!("{}/api/", server.url()));
        let invitations = client.accepted_invitations(&link()).await.unwrap();

        assert_eq!(invitations.len(), 2);
        assert_eq!(invitations[0].username, "alice");
        assert_eq!(invitations[0].access_token, "t1");
        assert_eq!(invitations[1].username, "dave");
    }

    #[tokio::test]
    async fn test_directory_error_status() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/invitations")
            .match_query(Matcher::Any)
            .with_status(500)
            .create_async()
            .await;

        let client = CampaignClient::new(format!("{}/api", server.url()));
        let err = client.accepted_invitations(&link()).await.unwrap_err();
        assert!(err.to_string().contains("500"));
    }
}
