use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

mod filter;

pub use filter::{Filter, FilterError};

/// Event type carried by location events.
pub const POSITION_TYPE: &str = "position/wgs84";

/// Event represents one timestamped data point fetched from a remote account.
///
/// Events are read-only copies of remote records: the connector never
/// writes them back and never interprets `stream_id` beyond copying it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    /// Remote event identifier
    pub id: String,

    /// Stream the event belongs to (reference only, may dangle)
    #[serde(default)]
    pub stream_id: Option<String>,

    /// Event type (e.g., "mass/kg", "position/wgs84")
    #[serde(rename = "type")]
    pub event_type: String,

    /// Unix epoch seconds, possibly fractional
    pub time: f64,

    /// Duration in seconds for period events
    #[serde(default)]
    pub duration: Option<f64>,

    /// Scalar value or structured bag of named fields
    #[serde(default)]
    pub content: EventContent,
}

/// Event payload.
///
/// A JSON object is a structured bag whose fields become columns; anything
/// else (number, string, boolean, null, array) is a scalar assigned to the
/// `content` column as-is.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "Value", into = "Value")]
pub enum EventContent {
    Scalar(Value),
    Structured(Map<String, Value>),
}

impl Default for EventContent {
    fn default() -> Self {
        EventContent::Scalar(Value::Null)
    }
}

impl From<Value> for EventContent {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(fields) => EventContent::Structured(fields),
            other => EventContent::Scalar(other),
        }
    }
}

impl From<EventContent> for Value {
    fn from(content: EventContent) -> Self {
        match content {
            EventContent::Scalar(value) => value,
            EventContent::Structured(fields) => Value::Object(fields),
        }
    }
}

/// Hierarchical stream node.
///
/// `parent_id` is a back-reference copied from the remote record; ownership of
/// the hierarchy is expressed by `children` only.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stream {
    pub id: String,

    #[serde(default)]
    pub parent_id: Option<String>,

    #[serde(default)]
    pub name: String,

    #[serde(default, deserialize_with = "null_as_empty")]
    pub children: Vec<Stream>,
}

/// Account information returned by the access probe.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AccessInfo {
    #[serde(default)]
    pub id: Option<String>,

    #[serde(default)]
    pub name: Option<String>,

    #[serde(default, rename = "type")]
    pub access_type: Option<String>,
}

impl AccessInfo {
    /// Name shown next to a checked endpoint: access name, else id.
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .or(self.id.as_deref())
            .unwrap_or("unnamed access")
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<Stream>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<Stream>>::deserialize(deserializer)?.unwrap_or_default())
}
