//! Flat output rows handed to the host sink.
//!
//! A row is a mapping of column id to scalar JSON value. Rows have no identity
//! beyond their emission order and are consumed by the host as soon as they
//! are appended.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

mod assembler;
mod streams;

pub use assembler::{RowAssembler, TimeFormatter, TimeZoneMode};
pub use streams::flatten_streams;

/// One flat row of a host table.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OutputRow(Map<String, Value>);

impl OutputRow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a column, replacing any previous value.
    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(column.into(), value.into());
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.0.get(column)
    }

    pub fn contains(&self, column: &str) -> bool {
        self.0.contains_key(column)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Map<String, Value>> for OutputRow {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Users table row: the connection's username is both id and display name.
pub fn user_row(username: &str) -> OutputRow {
    let mut row = OutputRow::new();
    row.insert("id", username);
    row.insert("username", username);
    row
}
