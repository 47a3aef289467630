//! Event fetching with optional post-filters.

use anyhow::Result;
use pryv_wdc::model::POSITION_TYPE;
use pryv_wdc::{Event, EventContent, Filter};
use serde_json::Value;
use tracing::debug;

use crate::connection::{Connection, EventDelivery};

/// Predicate narrowing fetched events; `None` keeps everything.
pub type PostFilter = fn(&Event) -> bool;

/// Content is a finite number, or a string holding one.
pub fn is_numeric(event: &Event) -> bool {
    match &event.content {
        EventContent::Scalar(Value::Number(n)) => n.as_f64().map_or(false, f64::is_finite),
        EventContent::Scalar(Value::String(s)) => parse_number(s).is_some(),
        _ => false,
    }
}

/// Event type is the position sentinel, whatever the content.
pub fn is_location(event: &Event) -> bool {
    event.event_type == POSITION_TYPE
}

fn parse_number(text: &str) -> Option<f64> {
    let text = text.trim();
    let plain = !text.is_empty()
        && text
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | '.' | 'e' | 'E'));
    if !plain {
        return None;
    }
    text.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Fetches the events of one connection matching `filter`, keeping those
/// that pass `post_filter`, in arrival order.
///
/// Buffered and streamed deliveries produce the same list. On failure
/// nothing is returned, including events already streamed.
pub async fn fetch_events(
    connection: &dyn Connection,
    filter: &Filter,
    post_filter: Option<PostFilter>,
) -> Result<Vec<Event>> {
    let keep = |event: &Event| post_filter.map_or(true, |f| f(event));

    let events = match connection.delivery() {
        EventDelivery::Buffered => connection
            .get_events(filter)
            .await?
            .into_iter()
            .filter(|e| keep(e))
            .collect(),
        EventDelivery::Streamed => {
            let mut kept = Vec::new();
            let mut on_event = |event: Event| {
                if keep(&event) {
                    kept.push(event);
                }
            };
            let delivered = connection.stream_events(filter, &mut on_event).await?;
            debug!(delivered = delivered, kept = kept.len(), "Streamed events");
            kept
        }
    };

    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ConnectionFactory;
    use crate::descriptor::ConnectionDescriptor;
    use crate::memory::{MemoryAccount, MemoryConnectionFactory};
    use serde_json::json;

    fn event(id: &str, event_type: &str, content: Value) -> Event {
        Event {
            id: id.to_string(),
            stream_id: Some("s".to_string()),
            event_type: event_type.to_string(),
            time: 10.0,
            duration: None,
            content: EventContent::from(content),
        }
    }

    fn connection(account: MemoryAccount) -> Box<dyn Connection> {
        let endpoint = "https://tk@alice.pryv.me/";
        let factory = MemoryConnectionFactory::new().with_account(endpoint, account);
        factory
            .connect(&ConnectionDescriptor::parse(endpoint).unwrap())
            .unwrap()
    }

    fn ids(events: &[Event]) -> Vec<&str> {
        events.iter().map(|e| e.id.as_str()).collect()
    }

    #[test]
    fn test_numeric_predicate() {
        let rejected = [
            json!("abc"),
            json!("NaN"),
            json!("Infinity"),
            json!("-Infinity"),
            json!(f64::NAN),
            json!(""),
            json!(true),
            json!(null),
            json!([1]),
            json!({"value": 1}),
        ];
        for content in rejected {
            assert!(!is_numeric(&event("e", "t", content.clone())), "{}", content);
        }

        let accepted = [json!(42), json!("3.14"), json!(0), json!(-1.5), json!(" 7 "), json!("1e3")];
        for content in accepted {
            assert!(is_numeric(&event("e", "t", content.clone())), "{}", content);
        }
    }

    #[test]
    fn test_location_predicate() {
        assert!(is_location(&event("e", "position/wgs84", json!({"latitude": 1}))));
        assert!(is_location(&event("e", "position/wgs84", json!("x"))));
        assert!(!is_location(&event("e", "position/other", json!({"latitude": 1}))));
        assert!(!is_location(&event("e", "count/generic", json!(1))));
    }

    #[tokio::test]
    async fn test_both_deliveries_yield_same_rows() {
        let events = vec![
            event("e1", "count/generic", json!(1)),
            event("e2", "note/txt", json!("hello")),
            event("e3", "count/generic", json!("2.5")),
        ];
        let filter = Filter::new(0, 100, None).unwrap();

        let buffered = connection(MemoryAccount::new("a").with_events(events.clone()));
        let streamed = connection(
            MemoryAccount::new("a")
                .with_events(events)
                .with_delivery(EventDelivery::Streamed),
        );

        let from_buffered = fetch_events(buffered.as_ref(), &filter, Some(is_numeric))
            .await
            .unwrap();
        let from_streamed = fetch_events(streamed.as_ref(), &filter, Some(is_numeric))
            .await
            .unwrap();

        assert_eq!(ids(&from_buffered), vec!["e1", "e3"]);
        assert_eq!(from_buffered, from_streamed);
    }

    #[tokio::test]
    async fn test_no_post_filter_keeps_all() {
        let conn = connection(MemoryAccount::new("a").with_events(vec![
            event("e1", "a", json!(null)),
            event("e2", "b", json!({"x": 1})),
        ]));
        let filter = Filter::new(0, 100, None).unwrap();
        let events = fetch_events(conn.as_ref(), &filter, None).await.unwrap();
        assert_eq!(ids(&events), vec!["e1", "e2"]);
    }

    #[tokio::test]
    async fn test_empty_result() {
        let conn = connection(MemoryAccount::new("a"));
        let filter = Filter::new(0, 100, None).unwrap();
        assert!(fetch_events(conn.as_ref(), &filter, Some(is_location))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_streamed_failure_discards_partial_events() {
        let conn = connection(
            MemoryAccount::new("a")
                .with_events(vec![event("e1", "t", json!(1)), event("e2", "t", json!(2))])
                .with_delivery(EventDelivery::Streamed)
                .failing_events("connection reset", 1),
        );
        let filter = Filter::new(0, 100, None).unwrap();
        let err = fetch_events(conn.as_ref(), &filter, None).await.unwrap_err();
        assert_eq!(err.to_string(), "connection reset");
    }
}
