//! Campaign indirection links.
//!
//! A campaign link names a requester account; the invitation directory
//! lists the accesses other accounts granted to it. Each accepted invitation
//! becomes one API endpoint. Expansion is a single pass: endpoints produced
//! here are never checked for further indirection.

pub mod api;

use anyhow::Result;
use async_trait::async_trait;

use crate::descriptor::CampaignLink;

pub use api::CampaignClient;

/// One accepted invitation: an access granted by `username`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Invitation {
    pub username: String,
    pub access_token: String,
}

/// Lookup of the invitations accepted for a campaign link.
#[async_trait]
pub trait InvitationDirectory: Send + Sync {
    async fn accepted_invitations(&self, link: &CampaignLink) -> Result<Vec<Invitation>>;
}

/// Builds the API endpoint of an invitation.
///
/// `template` is the service `api` template with `{token}` and `{username}`
/// placeholders; without one the endpoint is `https://<token>@<username>.<domain>/`.
pub fn endpoint_for(invitation: &Invitation, template: Option<&str>, domain: &str) -> String {
    match template {
        Some(template) => template
            .replace("{token}", &invitation.access_token)
            .replace("{username}", &invitation.username),
        None => format!(
            "https://{}@{}.{}/",
            invitation.access_token, invitation.username, domain
        ),
    }
}

/// Expands a campaign link into API endpoints, in directory order.
pub async fn expand(
    directory: &dyn InvitationDirectory,
    link: &CampaignLink,
    template: Option<&str>,
    domain: &str,
) -> Result<Vec<String>> {
    let invitations = directory.accepted_invitations(link).await?;
    Ok(invitations
        .iter()
        .map(|invitation| endpoint_for(invitation, template, domain))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedDirectory(Vec<Invitation>);

    #[async_trait]
    impl InvitationDirectory for FixedDirectory {
        async fn accepted_invitations(&self, _link: &CampaignLink) -> Result<Vec<Invitation>> {
            Ok(self.0.clone())
        }
    }

    fn invitation(username: &str, token: &str) -> Invitation {
        Invitation {
            username: username.to_string(),
            access_token: token.to_string(),
        }
    }

    #[test]
    fn test_endpoint_default_domain() {
        let endpoint = endpoint_for(&invitation("bob", "tk1"), None, "pryv.me");
        assert_eq!(endpoint, "https://tk1@bob.pryv.me/");
    }

    #[test]
    fn test_endpoint_from_template() {
        let endpoint = endpoint_for(
            &invitation("bob", "tk1"),
            Some("https://{token}@{username}.example.org/"),
            "pryv.me",
        );
        assert_eq!(endpoint, "https://tk1@bob.example.org/");
    }

    #[tokio::test]
    async fn test_expand_keeps_directory_order() {
        let directory = FixedDirectory(vec![invitation("zed", "t1"), invitation("amy", "t2")]);
        let link = CampaignLink {
            username: "req".to_string(),
            token: "rt".to_string(),
        };
        let endpoints = expand(&directory, &link, None, "pryv.me").await.unwrap();
        assert_eq!(
            endpoints,
            vec!["https://t1@zed.pryv.me/", "https://t2@amy.pryv.me/"]
        );
    }
}
