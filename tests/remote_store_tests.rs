//! HTTP tests for the REST remote store against a mock server.

use std::time::Duration;

use chrono::{TimeZone, Utc};
use mockito::Matcher;

use focusdot::sync::{RemoteError, RemoteStore, RestRemoteStore};
use focusdot::types::{
    CompletedSessionEntry, Identity, SessionKind, Settings, SyncRecord, TimerPhase, TimerSession,
};

// ============================================================================
// Test Helpers
// ============================================================================

fn identity() -> Identity {
    Identity {
        user_id: "user-1".to_string(),
        access_token: "tok".to_string(),
        email: None,
    }
}

fn store(server: &mockito::Server) -> RestRemoteStore {
    RestRemoteStore::new(server.url(), "anon", Duration::from_secs(5)).unwrap()
}

fn owner_query() -> Matcher {
    Matcher::AllOf(vec![
        Matcher::UrlEncoded("select".into(), "*".into()),
        Matcher::UrlEncoded("user_id".into(), "eq.user-1".into()),
    ])
}

fn record() -> SyncRecord {
    let mut session = TimerSession::new(SessionKind::Focus, &Settings::default());
    session.phase = TimerPhase::Paused;
    session.remaining_seconds = 600;
    session.updated_at = Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap();
    SyncRecord::from_session("user-1", &session, "device-a")
}

// ============================================================================
// timer_state
// ============================================================================

#[tokio::test]
async fn test_fetch_returns_none_for_empty_result() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/rest/v1/timer_state")
        .match_query(owner_query())
        .match_header("apikey", "anon")
        .match_header("authorization", "Bearer tok")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body("[]")
        .create_async()
        .await;

    let result = store(&server).fetch_timer_state(&identity()).await.unwrap();

    assert!(result.is_none());
    mock.assert_async().await;
}

#[tokio::test]
async fn test_fetch_returns_first_row() {
    let mut server = mockito::Server::new_async().await;
    let body = serde_json::to_string(&vec![record()]).unwrap();
    let _mock = server
        .mock("GET", "/rest/v1/timer_state")
        .match_query(owner_query())
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(body)
        .create_async()
        .await;

    let fetched = store(&server)
        .fetch_timer_state(&identity())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(fetched, record());
}

#[tokio::test]
async fn test_server_error_maps_to_status() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/rest/v1/timer_state")
        .match_query(Matcher::Any)
        .with_status(503)
        .with_body("maintenance")
        .create_async()
        .await;

    let err = store(&server).fetch_timer_state(&identity()).await.unwrap_err();

    match &err {
        RemoteError::Status { status, body } => {
            assert_eq!(*status, 503);
            assert_eq!(body, "maintenance");
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_unauthorized_is_not_transient() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/rest/v1/timer_state")
        .match_query(Matcher::Any)
        .with_status(401)
        .create_async()
        .await;

    let err = store(&server).fetch_timer_state(&identity()).await.unwrap_err();

    assert!(err.is_unauthorized());
    assert!(!err.is_transient());
}

#[tokio::test]
async fn test_garbage_body_maps_to_decode() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/rest/v1/timer_state")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body("{not json")
        .create_async()
        .await;

    let err = store(&server).fetch_timer_state(&identity()).await.unwrap_err();

    assert!(matches!(err, RemoteError::Decode(_)));
}

#[tokio::test]
async fn test_upsert_sends_merge_preference() {
    let mut server = mockito::Server::new_async().await;
    let body = serde_json::to_string(&vec![record()]).unwrap();
    let mock = server
        .mock("POST", "/rest/v1/timer_state")
        .match_query(Matcher::UrlEncoded("on_conflict".into(), "user_id".into()))
        .match_header("prefer", "return=representation,resolution=merge-duplicates")
        .match_header("content-type", "application/json")
        .match_body(Matcher::PartialJson(serde_json::json!({
            "user_id": "user-1",
            "phase": "paused",
            "remaining_seconds": 600,
            "origin": "device-a",
        })))
        .with_status(201)
        .with_header("content-type", "application/json")
        .with_body(body)
        .create_async()
        .await;

    let stored = store(&server)
        .upsert_timer_state(&identity(), &record())
        .await
        .unwrap();

    assert_eq!(stored.user_id, "user-1");
    mock.assert_async().await;
}

// ============================================================================
// user_settings / sessions
// ============================================================================

#[tokio::test]
async fn test_fetch_settings_maps_columns() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/rest/v1/user_settings")
        .match_query(owner_query())
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"[{"user_id":"user-1","pomodoro_minutes":50,"short_break_minutes":10,
                "long_break_minutes":20,"pomodoros_before_long_break":3,
                "auto_start_breaks":false,"auto_start_pomodoros":false,
                "notifications_enabled":true}]"#,
        )
        .create_async()
        .await;

    let settings = store(&server)
        .fetch_settings(&identity())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(settings.pomodoro_minutes, 50);
    assert_eq!(settings.pomodoros_before_long_break, 3);
    assert!(!settings.auto_start_breaks);
}

#[tokio::test]
async fn test_insert_session_row() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/rest/v1/sessions")
        .match_header("prefer", "return=representation")
        .match_body(Matcher::PartialJson(serde_json::json!({
            "user_id": "user-1",
            "kind": "focus",
            "duration_minutes": 25,
            "completed": true,
        })))
        .with_status(201)
        .with_body("[]")
        .create_async()
        .await;

    let entry = CompletedSessionEntry::focus(Utc::now(), 1500, true);
    store(&server)
        .insert_session(&identity(), &entry)
        .await
        .unwrap();

    mock.assert_async().await;
}
