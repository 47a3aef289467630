use serde::{Deserialize, Serialize};
use std::fmt;

/// Time/limit filter applied to every connection of a run.
///
/// Serialized as the connection data handed from the interactive phase to the
/// data-gathering phase: `{ "fromTime", "toTime", "limit"?, "types"? }`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Filter {
    /// Unix epoch seconds (inclusive lower bound)
    pub from_time: i64,

    /// Unix epoch seconds (upper bound), never before `from_time`
    pub to_time: i64,

    /// Maximum number of events per connection
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,

    /// Restricts events to these types
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub types: Option<Vec<String>>,
}

/// Filter validation errors.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterError {
    InvalidRange { from_time: i64, to_time: i64 },
    InvalidLimit(i64),
    Unparseable(String),
}

impl fmt::Display for FilterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterError::InvalidRange { .. } => write!(
                f,
                "Invalid from/to, please make sure \"from\" is earlier than \"to\"."
            ),
            FilterError::InvalidLimit(_) => {
                write!(f, "Invalid limit, please provide a number greater than 0.")
            }
            FilterError::Unparseable(reason) => {
                write!(f, "Invalid connection data: {}", reason)
            }
        }
    }
}

impl std::error::Error for FilterError {}

impl Filter {
    /// Builds a filter from user input.
    ///
    /// `limit` of `None` means "no limit"; any provided limit must be at least 1.
    pub fn new(from_time: i64, to_time: i64, limit: Option<i64>) -> Result<Self, FilterError> {
        if to_time < from_time {
            return Err(FilterError::InvalidRange { from_time, to_time });
        }
        let limit = match limit {
            Some(l) if l < 1 => return Err(FilterError::InvalidLimit(l)),
            Some(l) => Some(l as u64),
            None => None,
        };
        Ok(Self {
            from_time,
            to_time,
            limit,
            types: None,
        })
    }

    /// Returns a copy restricted to the given event types.
    pub fn with_types<I, S>(&self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            types: Some(types.into_iter().map(Into::into).collect()),
            ..self.clone()
        }
    }

    /// Re-checks the invariants of a deserialized filter.
    pub fn validate(&self) -> Result<(), FilterError> {
        if self.to_time < self.from_time {
            return Err(FilterError::InvalidRange {
                from_time: self.from_time,
                to_time: self.to_time,
            });
        }
        if self.limit == Some(0) {
            return Err(FilterError::InvalidLimit(0));
        }
        Ok(())
    }

    /// Serializes the filter as host connection data.
    pub fn to_connection_data(&self) -> String {
        // A struct of integers and strings always serializes.
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Parses and validates connection data produced by [`Filter::to_connection_data`].
    pub fn from_connection_data(data: &str) -> Result<Self, FilterError> {
        let filter: Filter =
            serde_json::from_str(data).map_err(|e| FilterError::Unparseable(e.to_string()))?;
        filter.validate()?;
        Ok(filter)
    }
}
