// Integration tests for multi-connection data gathering

use mockito::{Matcher, Server};
use pryv_connector::memory::{MemoryAccount, MemoryConnectionFactory};
use pryv_connector::pryv::PryvConnectionFactory;
use pryv_connector::{EventDelivery, RunState, Session};
use pryv_wdc::config::WdcConfig;
use pryv_wdc::credentials::{CredentialVault, MemoryVault};
use pryv_wdc::host::{Phase, RecordingHost};
use pryv_wdc::rows::TimeZoneMode;
use pryv_wdc::{Event, EventContent, Filter, OutputRow, TableId};
use serde_json::{json, Value};
use std::sync::Arc;

const C1: &str = "https://t1@one.pryv.me/";
const C2: &str = "https://t2@two.pryv.me/";
const C3: &str = "https://t3@three.pryv.me/";

fn utc_config() -> WdcConfig {
    let mut config = WdcConfig::default();
    config.rows.timezone = TimeZoneMode::Utc;
    config
}

fn event(id: &str, time: f64, content: Value) -> Event {
    Event {
        id: id.to_string(),
        stream_id: Some("heart".to_string()),
        event_type: "frequency/bpm".to_string(),
        time,
        duration: None,
        content: EventContent::from(content),
    }
}

fn ids(rows: &[OutputRow]) -> Vec<String> {
    rows.iter()
        .map(|r| r.get("id").and_then(Value::as_str).unwrap_or("").to_string())
        .collect()
}

fn filter_data() -> String {
    Filter::new(1_600_000_000, 1_800_000_000, Some(100))
        .unwrap()
        .to_connection_data()
}

/// Two endpoints, the second one rejected by its access probe.
#[tokio::test]
async fn test_second_connection_invalid() {
    let factory = Arc::new(
        MemoryConnectionFactory::new()
            .with_account(
                C1,
                MemoryAccount::new("acc-1").with_events(vec![
                    event("e1", 1_700_000_000.0, json!(72)),
                    event("e2", 1_700_000_060.0, json!("abc")),
                    event("e3", 1_700_000_120.0, json!("68.5")),
                ]),
            )
            .with_account(
                C2,
                MemoryAccount::invalid("The access token is invalid")
                    .with_events(vec![event("x1", 1_700_000_000.0, json!(1))]),
            ),
    );
    let vault = Arc::new(MemoryVault::new());
    let mut session = Session::new(utc_config(), vault, factory);
    let host = RecordingHost::new();

    session
        .load_endpoints(&format!("{}, {}", C1, C2), &host)
        .await
        .unwrap();
    let submission = session
        .submit_filter(1_600_000_000, 1_800_000_000, None, &host)
        .unwrap();

    session.init(Phase::GatherData).await;
    for table in TableId::ALL {
        session
            .get_data(table, &submission.connection_data, &host)
            .await
            .unwrap();
    }

    let users = host.rows(TableId::Users);
    assert_eq!(users.len(), 1);
    assert_eq!(users[0].get("id"), Some(&json!("one.pryv.me")));
    assert_eq!(users[0].get("username"), Some(&json!("one.pryv.me")));

    let numeric = host.rows(TableId::NumericEvents);
    assert_eq!(ids(&numeric), vec!["e1", "e3"]);
    assert_eq!(numeric[0].get("time"), Some(&json!("2023-11-14 22:13:20")));
    assert_eq!(numeric[1].get("time"), Some(&json!("2023-11-14 22:15:20")));
    assert_eq!(numeric[0].get("content"), Some(&json!(72)));
    assert_eq!(numeric[1].get("content"), Some(&json!("68.5")));
    assert!(numeric
        .iter()
        .all(|r| r.get("username") == Some(&json!("one.pryv.me"))));

    assert!(host.aborts().is_empty());
    assert_eq!(session.state(), &RunState::Done);
}

/// Rows are grouped by connection in registration order.
#[tokio::test]
async fn test_rows_follow_registration_order() {
    let factory = Arc::new(
        MemoryConnectionFactory::new()
            .with_account(
                C1,
                MemoryAccount::new("a").with_events(vec![
                    event("1b", 1_700_000_010.0, json!(2)),
                    event("1a", 1_700_000_000.0, json!(1)),
                ]),
            )
            .with_account(
                C2,
                MemoryAccount::invalid("expired")
                    .with_events(vec![event("2a", 1_700_000_000.0, json!(1))]),
            )
            .with_account(
                C3,
                MemoryAccount::new("c")
                    .with_events(vec![event("3a", 1_700_000_000.0, json!(1))])
                    .with_delivery(EventDelivery::Streamed),
            ),
    );
    let mut session = Session::new(utc_config(), Arc::new(MemoryVault::new()), factory.clone());
    let host = RecordingHost::new();

    session
        .load_endpoints(&format!("{}\n{}\n{}", C3, C2, C1), &host)
        .await
        .unwrap();
    let outcome = session
        .get_data(TableId::NumericEvents, &filter_data(), &host)
        .await
        .unwrap();

    assert_eq!(ids(&host.rows(TableId::NumericEvents)), vec!["3a", "1b", "1a"]);
    assert_eq!(outcome.summary.visited, 2);
    assert_eq!(outcome.summary.skipped, 1);
    assert_eq!(host.append_calls(), 2);

    session
        .get_data(TableId::Users, "", &host)
        .await
        .unwrap();
    assert_eq!(
        ids(&host.rows(TableId::Users)),
        vec!["three.pryv.me", "one.pryv.me"]
    );
    assert_eq!(factory.connects(), 3);
    assert_eq!(factory.account(C2).unwrap().probes(), 1);
}

/// Loading new endpoints replaces the connections of the previous list.
#[tokio::test]
async fn test_reloading_endpoints_rebuilds_pool() {
    let factory = Arc::new(
        MemoryConnectionFactory::new()
            .with_account(C1, MemoryAccount::new("a"))
            .with_account(C2, MemoryAccount::new("b")),
    );
    let vault = Arc::new(MemoryVault::new());
    let mut session = Session::new(utc_config(), vault.clone(), factory);
    let host = RecordingHost::new();

    session.load_endpoints(C1, &host).await.unwrap();
    session.get_data(TableId::Users, "", &host).await.unwrap();

    session.load_endpoints(C2, &host).await.unwrap();
    session.get_data(TableId::Users, "", &host).await.unwrap();

    assert_eq!(
        ids(&host.rows(TableId::Users)),
        vec!["one.pryv.me", "two.pryv.me"]
    );
    assert_eq!(
        vault.load().unwrap().unwrap().endpoints(),
        vec![C2.to_string()]
    );
}

/// Full gather against the HTTP API, one token rejected by the server.
#[tokio::test]
async fn test_gather_over_http() {
    let mut server = Server::new_async().await;
    let _valid = server
        .mock("GET", "/access-info")
        .match_header("authorization", "good")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"id": "acc-1", "name": "Tableau", "type": "shared"}"#)
        .create_async()
        .await;
    let _invalid = server
        .mock("GET", "/access-info")
        .match_header("authorization", "bad")
        .with_status(403)
        .with_header("content-type", "application/json")
        .with_body(r#"{"error": {"id": "invalid-access-token", "message": "Cannot find access"}}"#)
        .create_async()
        .await;
    let events = server
        .mock("GET", "/events")
        .match_query(Matcher::Any)
        .match_header("authorization", "good")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{"events": [
                {"id": "e1", "streamId": "heart", "type": "frequency/bpm", "time": 1700000000, "content": 72},
                {"id": "e2", "streamIds": ["diary"], "type": "note/txt", "time": 1700000001, "content": "hello"},
                {"id": "e3", "streamId": "heart", "type": "frequency/bpm", "time": 1700000002.4, "content": "70"}
            ], "meta": {"apiVersion": "1.9.0"}}"#,
        )
        .expect(1)
        .create_async()
        .await;

    let base = server.url();
    let good = base.replacen("://", "://good@", 1);
    let bad = base.replacen("://", "://bad@", 1);

    let mut session = Session::new(
        utc_config(),
        Arc::new(MemoryVault::new()),
        Arc::new(PryvConnectionFactory::new(EventDelivery::Streamed)),
    );
    let host = RecordingHost::new();

    session
        .load_endpoints(&format!("{} {}", bad, good), &host)
        .await
        .unwrap();

    let checks = session.check_endpoints().await.unwrap();
    assert!(!checks[0].ok);
    assert!(checks[0].message.contains("Cannot find access"));
    assert!(checks[1].ok);
    assert_eq!(checks[1].message, "Tableau");

    let outcome = session
        .get_data(TableId::NumericEvents, &filter_data(), &host)
        .await
        .unwrap();

    let rows = host.rows(TableId::NumericEvents);
    assert_eq!(ids(&rows), vec!["e1", "e3"]);
    assert_eq!(rows[1].get("time"), Some(&json!("2023-11-14 22:13:22")));
    assert_eq!(outcome.summary.skipped, 1);
    events.assert_async().await;
}
