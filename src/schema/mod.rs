//! Static table schema declared to the host.
//!
//! Four tables are exposed: users, streams, numerical events and location
//! events. Foreign keys link every `username` column to `users.id` and every
//! `streamId`/`parentId` column to `stream.id`. The host does not enforce these
//! links; dangling references are passed through verbatim.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifies one of the tables declared by [`get_schema`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TableId {
    #[serde(rename = "users")]
    Users,
    #[serde(rename = "stream")]
    Streams,
    #[serde(rename = "eventNum")]
    NumericEvents,
    #[serde(rename = "eventLocation")]
    LocationEvents,
}

impl TableId {
    /// All tables, in declaration order.
    pub const ALL: [TableId; 4] = [
        TableId::Users,
        TableId::Streams,
        TableId::NumericEvents,
        TableId::LocationEvents,
    ];

    /// Identifier used by the host.
    pub fn as_str(&self) -> &'static str {
        match self {
            TableId::Users => "users",
            TableId::Streams => "stream",
            TableId::NumericEvents => "eventNum",
            TableId::LocationEvents => "eventLocation",
        }
    }
}

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TableId {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TableId::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| anyhow::anyhow!("Unknown table '{}'", s))
    }
}

/// Semantic column type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    String,
    Float,
    Datetime,
}

/// Analytical role hint for a column.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnRole {
    Dimension,
    Measure,
}

/// Link from a column to another table's id column.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForeignKey {
    pub table_id: TableId,
    pub column_id: String,
}

/// One column of a table definition.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnInfo {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    pub data_type: DataType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub foreign_key: Option<ForeignKey>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column_role: Option<ColumnRole>,
}

impl ColumnInfo {
    fn new(id: &str, data_type: DataType) -> Self {
        Self {
            id: id.to_string(),
            alias: None,
            data_type,
            foreign_key: None,
            column_role: None,
        }
    }

    fn aliased(mut self) -> Self {
        self.alias = Some(self.id.clone());
        self
    }

    fn references(mut self, table_id: TableId) -> Self {
        self.foreign_key = Some(ForeignKey {
            table_id,
            column_id: "id".to_string(),
        });
        self
    }

    fn role(mut self, role: ColumnRole) -> Self {
        self.column_role = Some(role);
        self
    }
}

/// Table definition.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TableInfo {
    pub id: TableId,
    pub alias: String,
    pub columns: Vec<ColumnInfo>,
}

impl TableInfo {
    /// Looks up a column by id.
    pub fn column(&self, id: &str) -> Option<&ColumnInfo> {
        self.columns.iter().find(|c| c.id == id)
    }
}

fn username_column() -> ColumnInfo {
    ColumnInfo::new("username", DataType::String)
        .aliased()
        .references(TableId::Users)
        .role(ColumnRole::Dimension)
}

/// Columns shared by both event tables, in declaration order.
fn event_columns(stream_role: Option<ColumnRole>) -> Vec<ColumnInfo> {
    let mut stream_id = ColumnInfo::new("streamId", DataType::String)
        .aliased()
        .references(TableId::Streams);
    stream_id.column_role = stream_role;

    vec![
        username_column(),
        ColumnInfo::new("id", DataType::String),
        stream_id,
        ColumnInfo::new("time", DataType::Datetime).aliased(),
        ColumnInfo::new("duration", DataType::Float).aliased(),
        ColumnInfo::new("type", DataType::String)
            .aliased()
            .role(ColumnRole::Dimension),
    ]
}

/// Returns the fixed table definitions. Never varies at runtime.
pub fn get_schema() -> Vec<TableInfo> {
    let users = TableInfo {
        id: TableId::Users,
        alias: "Users".to_string(),
        columns: vec![
            ColumnInfo::new("id", DataType::String),
            ColumnInfo::new("username", DataType::String),
        ],
    };

    let streams = TableInfo {
        id: TableId::Streams,
        alias: "Streams table".to_string(),
        columns: vec![
            username_column(),
            ColumnInfo::new("id", DataType::String),
            ColumnInfo::new("name", DataType::String)
                .aliased()
                .role(ColumnRole::Dimension),
            ColumnInfo::new("parentId", DataType::String)
                .aliased()
                .references(TableId::Streams)
                .role(ColumnRole::Dimension),
        ],
    };

    let mut numeric_columns = event_columns(Some(ColumnRole::Dimension));
    numeric_columns.push(
        ColumnInfo::new("content", DataType::Float)
            .aliased()
            .role(ColumnRole::Measure),
    );
    let numeric_events = TableInfo {
        id: TableId::NumericEvents,
        alias: "Numerical Events".to_string(),
        columns: numeric_columns,
    };

    let mut location_columns = event_columns(None);
    for coordinate in ["latitude", "longitude"] {
        location_columns.push(
            ColumnInfo::new(coordinate, DataType::Float)
                .aliased()
                .role(ColumnRole::Dimension),
        );
    }
    let location_events = TableInfo {
        id: TableId::LocationEvents,
        alias: "Location Events".to_string(),
        columns: location_columns,
    };

    vec![users, streams, numeric_events, location_events]
}
