use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};

use super::OutputRow;
use crate::model::{Event, EventContent};

/// Host timestamp format (`YYYY-MM-DD HH:mm:ss`).
const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Time zone used when rendering event times.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeZoneMode {
    #[default]
    Local,
    Utc,
}

/// Converts epoch seconds to host datetime strings.
#[derive(Clone, Copy, Debug, Default)]
pub struct TimeFormatter {
    zone: TimeZoneMode,
}

impl TimeFormatter {
    pub fn new(zone: TimeZoneMode) -> Self {
        Self { zone }
    }

    /// Formats fractional epoch seconds, truncated to whole seconds after
    /// rounding to the millisecond. Returns `None` when out of range.
    pub fn format(&self, epoch_seconds: f64) -> Option<String> {
        if !epoch_seconds.is_finite() {
            return None;
        }
        let millis = (epoch_seconds * 1000.0).round() as i64;
        let utc = DateTime::<Utc>::from_timestamp_millis(millis)?;
        let formatted = match self.zone {
            TimeZoneMode::Utc => utc.format(TIME_FORMAT).to_string(),
            TimeZoneMode::Local => utc.with_timezone(&Local).format(TIME_FORMAT).to_string(),
        };
        Some(formatted)
    }
}

/// Builds event rows for one connection.
///
/// Fixed columns come first; a structured payload is then merged over them,
/// so a payload field named like a fixed column (e.g. `time`) replaces it.
#[derive(Clone, Debug)]
pub struct RowAssembler {
    username: Option<String>,
    time: TimeFormatter,
}

impl RowAssembler {
    /// `username` is `Some` in multi-connection mode only.
    pub fn new(username: Option<String>, time: TimeFormatter) -> Self {
        Self { username, time }
    }

    pub fn event_row(&self, event: &Event) -> OutputRow {
        let mut row = OutputRow::new();
        if let Some(username) = &self.username {
            row.insert("username", username.as_str());
        }
        row.insert("id", event.id.as_str());
        row.insert("streamId", event.stream_id.clone());
        row.insert("type", event.event_type.as_str());
        row.insert("time", self.time.format(event.time));
        row.insert("duration", event.duration);

        match &event.content {
            EventContent::Structured(fields) => {
                for (key, value) in fields {
                    row.insert(key.as_str(), value.clone());
                }
            }
            EventContent::Scalar(value) => row.insert("content", value.clone()),
        }
        row
    }

    /// Rows in the order the events were received.
    pub fn event_rows<'a, I>(&self, events: I) -> Vec<OutputRow>
    where
        I: IntoIterator<Item = &'a Event>,
    {
        events.into_iter().map(|e| self.event_row(e)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn make_event(content: Value) -> Event {
        Event {
            id: "ev1".to_string(),
            stream_id: Some("weight".to_string()),
            event_type: "mass/kg".to_string(),
            time: 1_700_000_000.0,
            duration: None,
            content: EventContent::from(content),
        }
    }

    fn utc_assembler(username: Option<&str>) -> RowAssembler {
        RowAssembler::new(
            username.map(str::to_string),
            TimeFormatter::new(TimeZoneMode::Utc),
        )
    }

    #[test]
    fn test_time_format_utc() {
        let formatter = TimeFormatter::new(TimeZoneMode::Utc);
        assert_eq!(formatter.format(0.0).unwrap(), "1970-01-01 00:00:00");
        assert_eq!(
            formatter.format(1_700_000_000.0).unwrap(),
            "2023-11-14 22:13:20"
        );
        assert_eq!(
            formatter.format(1_700_000_000.4).unwrap(),
            "2023-11-14 22:13:20"
        );
        assert!(formatter.format(f64::NAN).is_none());
    }

    #[test]
    fn test_time_format_local_shape() {
        let formatted = TimeFormatter::new(TimeZoneMode::Local)
            .format(1_700_000_000.0)
            .unwrap();
        assert_eq!(formatted.len(), 19);
        assert_eq!(&formatted[4..5], "-");
        assert_eq!(&formatted[10..11], " ");
        assert_eq!(&formatted[13..14], ":");
    }

    #[test]
    fn test_scalar_content_row() {
        let row = utc_assembler(Some("alice.pryv.me")).event_row(&make_event(json!(5.2)));
        assert_eq!(row.get("content").unwrap(), &json!(5.2));
        assert_eq!(row.get("username").unwrap(), "alice.pryv.me");
        assert_eq!(row.get("id").unwrap(), "ev1");
        assert_eq!(row.get("streamId").unwrap(), "weight");
        assert_eq!(row.get("type").unwrap(), "mass/kg");
        assert_eq!(row.get("time").unwrap(), "2023-11-14 22:13:20");
        assert_eq!(row.get("duration").unwrap(), &Value::Null);
    }

    #[test]
    fn test_structured_content_is_splatted() {
        let row = utc_assembler(None)
            .event_row(&make_event(json!({"latitude": 1, "longitude": 2})));
        assert_eq!(row.get("latitude").unwrap(), 1);
        assert_eq!(row.get("longitude").unwrap(), 2);
        assert!(!row.contains("content"));
        assert!(!row.contains("username"));
    }

    #[test]
    fn test_structured_field_overwrites_fixed_column() {
        // A payload field named `time` replaces the formatted event time.
        let row = utc_assembler(None).event_row(&make_event(json!({"time": "payload"})));
        assert_eq!(row.get("time").unwrap(), "payload");
    }

    #[test]
    fn test_null_and_string_scalars_kept_verbatim() {
        let assembler = utc_assembler(None);
        let row = assembler.event_row(&make_event(Value::Null));
        assert_eq!(row.get("content").unwrap(), &Value::Null);
        let row = assembler.event_row(&make_event(json!("3.14")));
        assert_eq!(row.get("content").unwrap(), "3.14");
    }

    #[test]
    fn test_rows_keep_arrival_order() {
        let mut first = make_event(json!(1));
        first.id = "b".to_string();
        let mut second = make_event(json!(2));
        second.id = "a".to_string();
        second.duration = Some(60.0);

        let rows = utc_assembler(None).event_rows(&[first, second]);
        assert_eq!(rows[0].get("id").unwrap(), "b");
        assert_eq!(rows[1].get("id").unwrap(), "a");
        assert_eq!(rows[1].get("duration").unwrap(), &json!(60.0));
    }
}
