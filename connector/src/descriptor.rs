//! Connection descriptors parsed from user input.
//!
//! Input is free text: API endpoints (`https://<token>@<host>/<path>`) or
//! sharing links (`https://<host>/<path>?auth=<token>`) separated by any run of
//! whitespace, commas or newlines. Token order is registration order, which in
//! turn fixes the order of rows across connections.
//!
//! When the first token starts with the configured campaign prefix the whole
//! input is an indirection link instead; see [`ConnectionSource`].

use reqwest::Url;
use serde::Deserialize;
use std::fmt;

/// Descriptor parsing errors.
#[derive(Debug, Clone, PartialEq)]
pub enum DescriptorError {
    /// No tokens in the input
    Empty,
    /// A token is not a usable http(s) endpoint
    InvalidEndpoint { input: String, reason: String },
    /// The indirection link lacks its username/token pair
    InvalidCampaignLink { input: String, reason: String },
}

impl fmt::Display for DescriptorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DescriptorError::Empty => write!(f, "Please provide a apiEndpoint link."),
            DescriptorError::InvalidEndpoint { input, reason } => {
                write!(f, "Invalid apiEndpoint '{}': {}", redact(input), reason)
            }
            DescriptorError::InvalidCampaignLink { input, reason } => {
                write!(f, "Invalid campaign link '{}': {}", redact(input), reason)
            }
        }
    }
}

impl std::error::Error for DescriptorError {}

/// Strips userinfo and query from a URL-ish string before it is displayed.
fn redact(input: &str) -> String {
    match Url::parse(input) {
        Ok(mut url) => {
            let _ = url.set_username("");
            let _ = url.set_password(None);
            url.set_query(None);
            url.to_string()
        }
        Err(_) => "<unparseable>".to_string(),
    }
}

/// Splits raw input into tokens, dropping empty ones and keeping order.
pub fn split_tokens(text: &str) -> Vec<String> {
    text.split(|c: char| c.is_whitespace() || c == ',')
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Normalized description of one remote account endpoint. Immutable.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectionDescriptor {
    api_endpoint: String,
    endpoint: String,
    token: Option<String>,
    username: String,
}

impl ConnectionDescriptor {
    /// Parses an API endpoint or a sharing link.
    pub fn parse(input: &str) -> Result<Self, DescriptorError> {
        let invalid = |reason: &str| DescriptorError::InvalidEndpoint {
            input: input.to_string(),
            reason: reason.to_string(),
        };

        let mut url = Url::parse(input).map_err(|e| invalid(&e.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(invalid("scheme must be http or https"));
        }
        let username = url
            .host_str()
            .ok_or_else(|| invalid("missing host"))?
            .to_string();

        let token = if url.username().is_empty() {
            url.query_pairs()
                .find(|(key, _)| key == "auth")
                .map(|(_, value)| value.into_owned())
        } else {
            Some(
                urlencoding::decode(url.username())
                    .map_err(|e| invalid(&e.to_string()))?
                    .into_owned(),
            )
        };
        let token = token.filter(|t| !t.is_empty());

        let _ = url.set_username("");
        let _ = url.set_password(None);
        url.set_query(None);
        url.set_fragment(None);
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        let endpoint = url.to_string();

        // The persisted list is comma-joined and userinfo keeps `,` as is.
        if let Some(token) = &token {
            url.set_username(&urlencoding::encode(token))
                .map_err(|_| invalid("token cannot be embedded in endpoint"))?;
        }
        let api_endpoint = url.to_string();
        if api_endpoint.contains(',') {
            return Err(invalid("endpoint cannot contain ','"));
        }

        Ok(Self {
            api_endpoint,
            endpoint,
            token,
            username,
        })
    }

    /// Endpoint with embedded token, as persisted between phases.
    pub fn api_endpoint(&self) -> &str {
        &self.api_endpoint
    }

    /// Token-free base URL, always ending with `/`.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Account label derived from the endpoint host (e.g. `alice.pryv.me`).
    pub fn username(&self) -> &str {
        &self.username
    }
}

/// Parses every token; the first invalid one fails the whole list.
pub fn parse_descriptors(tokens: &[String]) -> Result<Vec<ConnectionDescriptor>, DescriptorError> {
    if tokens.is_empty() {
        return Err(DescriptorError::Empty);
    }
    tokens
        .iter()
        .map(|t| ConnectionDescriptor::parse(t))
        .collect()
}

/// Username/token pair carried by a campaign indirection link.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CampaignLink {
    pub username: String,
    pub token: String,
}

#[derive(Deserialize)]
struct CampaignQuery {
    username: Option<String>,
    token: Option<String>,
}

impl CampaignLink {
    /// Reads the `username` and `token` query parameters of the link.
    pub fn parse(input: &str) -> Result<Self, DescriptorError> {
        let invalid = |reason: String| DescriptorError::InvalidCampaignLink {
            input: input.to_string(),
            reason,
        };
        let url = Url::parse(input).map_err(|e| invalid(e.to_string()))?;
        let query: CampaignQuery = serde_urlencoded::from_str(url.query().unwrap_or(""))
            .map_err(|e| invalid(e.to_string()))?;

        match (query.username, query.token) {
            (Some(username), Some(token)) if !username.is_empty() && !token.is_empty() => {
                Ok(Self { username, token })
            }
            _ => Err(invalid("username and token are required".to_string())),
        }
    }
}

/// Where the connection list of a run comes from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConnectionSource {
    /// API endpoints and/or sharing links, in registration order
    Endpoints(Vec<String>),
    /// Indirection link expanded once through the invitation directory
    Campaign(CampaignLink),
}

impl ConnectionSource {
    /// Selects the source from raw input. Only the first token is checked for
    /// the campaign prefix; an empty prefix disables indirection.
    pub fn from_text(text: &str, campaign_prefix: &str) -> Result<Self, DescriptorError> {
        let tokens = split_tokens(text);
        let first = tokens.first().ok_or(DescriptorError::Empty)?;

        if !campaign_prefix.is_empty() && first.starts_with(campaign_prefix) {
            return Ok(ConnectionSource::Campaign(CampaignLink::parse(first)?));
        }
        Ok(ConnectionSource::Endpoints(tokens))
    }
}
