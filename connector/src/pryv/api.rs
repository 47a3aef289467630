use anyhow::{anyhow, Context, Result};
use pryv_wdc::{AccessInfo, Event, EventContent, Filter, Stream};
use reqwest::{header::AUTHORIZATION, Client, Response};
use serde::Deserialize;
use serde_json::Value;

use super::reader::EventArrayReader;
use crate::descriptor::ConnectionDescriptor;

/// Event as returned by the API.
///
/// Newer servers send `streamIds` instead of `streamId`; the first id is kept.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiEvent {
    pub id: String,
    #[serde(default)]
    pub stream_id: Option<String>,
    #[serde(default)]
    pub stream_ids: Option<Vec<String>>,
    #[serde(rename = "type")]
    pub event_type: String,
    pub time: f64,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub content: Value,
}

impl From<ApiEvent> for Event {
    fn from(raw: ApiEvent) -> Self {
        let stream_id = raw
            .stream_id
            .or_else(|| raw.stream_ids.and_then(|ids| ids.into_iter().next()));
        Event {
            id: raw.id,
            stream_id,
            event_type: raw.event_type,
            time: raw.time,
            duration: raw.duration,
            content: EventContent::from(raw.content),
        }
    }
}

#[derive(Debug, Deserialize)]
struct EventsResponse {
    #[serde(default)]
    events: Vec<ApiEvent>,
}

#[derive(Debug, Deserialize)]
struct StreamsResponse {
    #[serde(default)]
    streams: Vec<Stream>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// HTTP client for one account of the remote API.
///
/// Authenticates with the raw access token in the `Authorization` header
/// against the token-free endpoint.
pub struct PryvClient {
    http_client: Client,
    endpoint: String,
    token: Option<String>,
}

impl PryvClient {
    pub fn new(descriptor: &ConnectionDescriptor) -> Result<Self> {
        let http_client = Client::builder()
            .user_agent("pryv-wdc/0.1")
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            http_client,
            endpoint: descriptor.endpoint().to_string(),
            token: descriptor.token().map(str::to_string),
        })
    }

    async fn get(&self, path: &str, query: &[(&str, String)]) -> Result<Response> {
        let url = format!("{}{}", self.endpoint, path);
        let mut request = self.http_client.get(&url).query(query);
        if let Some(token) = &self.token {
            request = request.header(AUTHORIZATION, token);
        }
        let response = request
            .send()
            .await
            .with_context(|| format!("Failed to send {} request", path))?;
        check_response(response).await
    }

    /// Probes the access: succeeds only for a valid token.
    pub async fn access_info(&self) -> Result<AccessInfo> {
        self.get("access-info", &[])
            .await?
            .json::<AccessInfo>()
            .await
            .context("Failed to parse access-info response")
    }

    /// Fetches matching events in one response.
    pub async fn get_events(&self, filter: &Filter) -> Result<Vec<Event>> {
        let response = self
            .get("events", &events_query(filter))
            .await?
            .json::<EventsResponse>()
            .await
            .context("Failed to parse events response")?;
        Ok(response.events.into_iter().map(Event::from).collect())
    }

    /// Fetches matching events, handing each one over as soon as it is read.
    pub async fn stream_events(
        &self,
        filter: &Filter,
        on_event: &mut (dyn FnMut(Event) + Send),
    ) -> Result<usize> {
        let mut response = self.get("events", &events_query(filter)).await?;
        let mut reader = EventArrayReader::new();
        let mut count = 0;

        while let Some(chunk) = response
            .chunk()
            .await
            .context("Failed to read events response")?
        {
            for raw in reader.feed::<ApiEvent>(&chunk)? {
                on_event(Event::from(raw));
                count += 1;
            }
        }
        reader.finish()?;

        Ok(count)
    }

    /// Fetches the stream forest.
    pub async fn get_streams(&self) -> Result<Vec<Stream>> {
        let response = self
            .get("streams", &[])
            .await?
            .json::<StreamsResponse>()
            .await
            .context("Failed to parse streams response")?;
        Ok(response.streams)
    }
}

/// Query parameters for an events request.
fn events_query(filter: &Filter) -> Vec<(&'static str, String)> {
    let mut query = vec![
        ("fromTime", filter.from_time.to_string()),
        ("toTime", filter.to_time.to_string()),
    ];
    if let Some(limit) = filter.limit {
        query.push(("limit", limit.to_string()));
    }
    for event_type in filter.types.iter().flatten() {
        query.push(("types[]", event_type.clone()));
    }
    query
}

/// Maps non-2xx responses to errors, using the API error message when present.
async fn check_response(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    match serde_json::from_str::<ApiErrorBody>(&body) {
        Ok(ApiErrorBody { error }) => Err(anyhow!(
            "API error {} ({}): {}",
            status,
            error.id.as_deref().unwrap_or("unknown"),
            error.message.as_deref().unwrap_or("no message")
        )),
        Err(_) => Err(anyhow!("API error: {}", status)),
    }
}
