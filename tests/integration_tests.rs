use axum::{
    body::Body,
    http::{Request, StatusCode, header},
};
use httpmock::prelude::*;
use school_calendar::client::HttpEventsApi;
use school_calendar::service::FanOutMode;
use school_calendar::settings::Settings;
use school_calendar::{AppState, build_router};
use serde_json::{Value, json};
use std::sync::Arc;
use tower::Service;
use url::Url;

const TOKEN: &str = "test-token-123";
const UPSTREAM_TOKEN: &str = "upstream-token";

/// Helper function to create test app state against a mocked Events API
fn create_test_state(events_api_url: Url) -> AppState {
    create_test_state_with(events_api_url, FanOutMode::Batched)
}

fn create_test_state_with(events_api_url: Url, fan_out: FanOutMode) -> AppState {
    let settings = Settings {
        events_api_url: events_api_url.clone(),
        events_api_token: Some(UPSTREAM_TOKEN.to_string()),
        debug: true,
        auth_token: TOKEN.to_string(),
        enable_swagger: true,
        port: 8080,
        timezone: "Asia/Kolkata".to_string(),
        fan_out,
        calendar_name: "Test School".to_string(),
    };
    let api = HttpEventsApi::new(events_api_url, settings.events_api_token.clone());
    AppState::new(settings, Arc::new(api)).unwrap()
}

fn mock_state(server: &MockServer) -> AppState {
    create_test_state(Url::parse(&server.base_url()).unwrap())
}

/// Builds an authenticated request on behalf of a viewer
fn request(method: &str, uri: &str, viewer: (&str, &str), body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {TOKEN}"))
        .header("x-user-id", viewer.0)
        .header("x-user-role", viewer.1);
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

/// Helper to extract response body as string
async fn response_body_string(body: Body) -> String {
    let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn event_json(id: &str, status: &str, created_by: &str, creator_role: &str) -> Value {
    json!({
        "id": id,
        "title": format!("Event {id}"),
        "description": "School event",
        "event_date": "2025-09-10T04:30:00Z",
        "start_time": "10:00:00",
        "end_time": "12:00:00",
        "event_type": "school_wide",
        "event_category": "general",
        "status": status,
        "created_by": created_by,
        "creator_role": creator_role,
        "timezone": "Asia/Kolkata"
    })
}

fn events_envelope(events: Vec<Value>) -> Value {
    json!({"status": "success", "data": {"events": events}})
}

fn event_envelope(event: Value) -> Value {
    json!({"status": "success", "data": {"event": event}})
}

const TEACHER_A: (&str, &str) = ("teacherA", "teacher");
const ADMIN: (&str, &str) = ("admin-1", "admin");

#[tokio::test]
async fn test_root_endpoint() {
    // Arrange
    let state = create_test_state(Url::parse("http://example.com").unwrap());
    let mut app = build_router(state);

    // Act
    let response = app
        .call(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();

    // Assert
    assert_eq!(response.status(), StatusCode::OK);

    let body = response_body_string(response.into_body()).await;
    assert!(body.contains("School Calendar API"));
    assert!(body.contains("/events"));
    assert!(body.contains("/events.ics"));
}

#[tokio::test]
async fn test_healthz_endpoints() {
    let state = create_test_state(Url::parse("http://example.com").unwrap());
    let mut app = build_router(state);

    for uri in ["/healthz/live", "/healthz/ready"] {
        let response = app
            .call(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = response_body_string(response.into_body()).await;
        assert!(body.contains(r#""status":"ok"#));
    }
}

#[tokio::test]
async fn test_events_no_auth_token() {
    // Arrange
    let state = create_test_state(Url::parse("http://example.com").unwrap());
    let mut app = build_router(state);

    // Act
    let response = app
        .call(
            Request::builder()
                .uri("/events")
                .header("x-user-id", "teacherA")
                .header("x-user-role", "teacher")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    // Assert
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_events_missing_viewer() {
    // Arrange
    let state = create_test_state(Url::parse("http://example.com").unwrap());
    let mut app = build_router(state);

    // Act - valid token in the query, but no identity headers
    let response = app
        .call(
            Request::builder()
                .uri(format!("/events?token={TOKEN}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    // Assert
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_teacher_listing_is_filtered() {
    // Arrange
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET)
            .path("/events")
            .header("authorization", format!("Bearer {UPSTREAM_TOKEN}"));
        then.status(200).json_body(events_envelope(vec![
            event_json("ev-own-pending", "pending", "teacherA", "teacher"),
            event_json("ev-other-pending", "pending", "teacherB", "teacher"),
            event_json("ev-approved", "approved", "teacherB", "teacher"),
            event_json("ev-rejected", "rejected", "teacherA", "teacher"),
        ]));
    });
    let mut app = build_router(mock_state(&server));

    // Act
    let response = app
        .call(request("GET", "/events", TEACHER_A, None))
        .await
        .unwrap();

    // Assert
    assert_eq!(response.status(), StatusCode::OK);
    mock.assert();

    let body: Value = serde_json::from_str(&response_body_string(response.into_body()).await).unwrap();
    let ids: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["ev-own-pending", "ev-approved"]);
}

#[tokio::test]
async fn test_range_listing_forwards_dates() {
    // Arrange
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET)
            .path("/events")
            .query_param("start_date", "2025-09-01")
            .query_param("end_date", "2025-09-30");
        then.status(200).json_body(events_envelope(vec![event_json(
            "ev-1", "approved", "admin-1", "admin",
        )]));
    });
    let mut app = build_router(mock_state(&server));

    // Act
    let response = app
        .call(request(
            "GET",
            "/events?start_date=2025-09-01&end_date=2025-09-30",
            ("parent-1", "parent"),
            None,
        ))
        .await
        .unwrap();

    // Assert
    assert_eq!(response.status(), StatusCode::OK);
    mock.assert();
    let body = response_body_string(response.into_body()).await;
    assert!(body.contains("ev-1"));
}

#[tokio::test]
async fn test_range_listing_rejects_bad_ranges() {
    let state = create_test_state(Url::parse("http://example.com").unwrap());
    let mut app = build_router(state);

    for uri in [
        "/events?start_date=2025-09-01",
        "/events?start_date=2025-09-30&end_date=2025-09-01",
    ] {
        let response = app.call(request("GET", uri, TEACHER_A, None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{uri}");
    }
}

#[tokio::test]
async fn test_create_school_wide_event_as_admin() {
    // Arrange
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST)
            .path("/events")
            .header("authorization", format!("Bearer {UPSTREAM_TOKEN}"));
        then.status(201)
            .json_body(event_envelope(event_json("ev-1", "approved", "admin-1", "admin")));
    });
    let mut app = build_router(mock_state(&server));

    // Act
    let response = app
        .call(request(
            "POST",
            "/events",
            ADMIN,
            Some(json!({
                "title": "Independence Day",
                "description": "Flag hoisting",
                "date": "2025-08-15",
                "is_full_day": true,
                "event_type": "school_wide",
                "event_category": "holiday"
            })),
        ))
        .await
        .unwrap();

    // Assert
    assert_eq!(response.status(), StatusCode::CREATED);
    mock.assert();
    let body = response_body_string(response.into_body()).await;
    assert!(body.contains("Event created and approved"));
    assert!(body.contains(r#""status":"approved""#));
}

#[tokio::test]
async fn test_create_class_specific_batch() {
    // Arrange
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST).path("/events");
        let mut first = event_json("ev-1", "pending", "teacherA", "teacher");
        first["event_type"] = json!("class_specific");
        first["class_division_id"] = json!("g5a");
        let mut second = event_json("ev-2", "pending", "teacherA", "teacher");
        second["event_type"] = json!("class_specific");
        second["class_division_id"] = json!("g5b");
        then.status(201).json_body(events_envelope(vec![first, second]));
    });
    let mut app = build_router(mock_state(&server));

    // Act
    let response = app
        .call(request(
            "POST",
            "/events",
            TEACHER_A,
            Some(json!({
                "title": "Sports Day",
                "description": "Athletics",
                "date": "2025-09-10",
                "start_time": "10:00",
                "end_time": "12:00",
                "event_type": "class_specific",
                "event_category": "sports",
                "class_ids": ["g5a", "g5b"]
            })),
        ))
        .await
        .unwrap();

    // Assert
    assert_eq!(response.status(), StatusCode::CREATED);
    mock.assert();
    let body: Value = serde_json::from_str(&response_body_string(response.into_body()).await).unwrap();
    assert_eq!(body["message"], "Event created, pending approval");
    assert_eq!(body["events"].as_array().unwrap().len(), 2);
    assert!(body["failed"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_create_per_class_partial_failure() {
    // Arrange
    let server = MockServer::start();
    let ok = server.mock(|when, then| {
        when.method(POST).path("/events").body_includes("g5a");
        let mut event = event_json("ev-1", "pending", "teacherA", "teacher");
        event["event_type"] = json!("class_specific");
        event["class_division_id"] = json!("g5a");
        then.status(201).json_body(event_envelope(event));
    });
    let failing = server.mock(|when, then| {
        when.method(POST).path("/events").body_includes("g5b");
        then.status(500)
            .json_body(json!({"status": "error", "message": "Division g5b is archived"}));
    });
    let state = create_test_state_with(
        Url::parse(&server.base_url()).unwrap(),
        FanOutMode::PerClass,
    );
    let mut app = build_router(state);

    // Act
    let response = app
        .call(request(
            "POST",
            "/events",
            TEACHER_A,
            Some(json!({
                "title": "Sports Day",
                "description": "Athletics",
                "date": "2025-09-10",
                "start_time": "10:00",
                "end_time": "12:00",
                "event_type": "class_specific",
                "class_ids": ["g5a", "g5b"]
            })),
        ))
        .await
        .unwrap();

    // Assert
    assert_eq!(response.status(), StatusCode::MULTI_STATUS);
    ok.assert();
    failing.assert();
    let body: Value = serde_json::from_str(&response_body_string(response.into_body()).await).unwrap();
    assert_eq!(body["message"], "Event created, pending approval; failed for g5b");
    assert_eq!(body["events"].as_array().unwrap().len(), 1);
    assert_eq!(body["failed"][0]["class_id"], "g5b");
    assert_eq!(body["failed"][0]["retryable"], true);
    assert!(
        body["failed"][0]["error"]
            .as_str()
            .unwrap()
            .contains("Division g5b is archived")
    );
}

#[tokio::test]
async fn test_create_store_returns_nothing() {
    // Arrange
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/events");
        then.status(201).json_body(events_envelope(Vec::new()));
    });
    let mut app = build_router(mock_state(&server));

    // Act
    let response = app
        .call(request(
            "POST",
            "/events",
            ADMIN,
            Some(json!({
                "title": "Founders Day",
                "description": "Assembly",
                "date": "2025-11-14",
                "is_full_day": true,
                "event_type": "school_wide"
            })),
        ))
        .await
        .unwrap();

    // Assert
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let body = response_body_string(response.into_body()).await;
    assert!(body.contains("events API stored no event"));
}

#[tokio::test]
async fn test_create_class_specific_without_classes() {
    // Arrange - no upstream; the request must never leave the service
    let state = create_test_state(Url::parse("http://127.0.0.1:9").unwrap());
    let mut app = build_router(state);

    // Act
    let response = app
        .call(request(
            "POST",
            "/events",
            TEACHER_A,
            Some(json!({
                "title": "Field Trip",
                "description": "Museum",
                "date": "2025-09-10",
                "start_time": "09:00",
                "end_time": "15:00",
                "event_type": "class_specific"
            })),
        ))
        .await
        .unwrap();

    // Assert
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = response_body_string(response.into_body()).await;
    assert!(body.contains("at least one class"));
    assert!(body.contains(r#""retryable":false"#));
}

#[tokio::test]
async fn test_create_invalid_date() {
    let state = create_test_state(Url::parse("http://127.0.0.1:9").unwrap());
    let mut app = build_router(state);

    let response = app
        .call(request(
            "POST",
            "/events",
            ADMIN,
            Some(json!({
                "title": "Staff Meeting",
                "description": "Monthly",
                "date": "2025-02-30",
                "start_time": "15:00",
                "end_time": "16:00",
                "event_type": "teacher_specific"
            })),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_create_forbidden_for_parent() {
    let state = create_test_state(Url::parse("http://127.0.0.1:9").unwrap());
    let mut app = build_router(state);

    let response = app
        .call(request(
            "POST",
            "/events",
            ("parent-1", "parent"),
            Some(json!({
                "title": "Birthday",
                "description": "Party",
                "date": "2025-09-10",
                "is_full_day": true,
                "event_type": "school_wide"
            })),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_create_surfaces_api_error() {
    // Arrange
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/events");
        then.status(422)
            .json_body(json!({"status": "error", "message": "Class division not found"}));
    });
    let mut app = build_router(mock_state(&server));

    // Act
    let response = app
        .call(request(
            "POST",
            "/events",
            TEACHER_A,
            Some(json!({
                "title": "Sports Day",
                "description": "Athletics",
                "date": "2025-09-10",
                "start_time": "10:00",
                "end_time": "12:00",
                "event_type": "class_specific",
                "class_ids": ["g9z"]
            })),
        ))
        .await
        .unwrap();

    // Assert
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let body = response_body_string(response.into_body()).await;
    assert!(body.contains("Class division not found"));
    assert!(body.contains(r#""retryable":true"#));
}

#[tokio::test]
async fn test_events_api_unreachable() {
    let state = create_test_state(Url::parse("http://127.0.0.1:9").unwrap());
    let mut app = build_router(state);

    let response = app
        .call(request("GET", "/events/upcoming", TEACHER_A, None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let body = response_body_string(response.into_body()).await;
    assert!(body.contains(r#""retryable":true"#));
}

#[tokio::test]
async fn test_approve_pending_event() {
    // Arrange
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/events/ev-1");
        then.status(200)
            .json_body(event_envelope(event_json("ev-1", "pending", "teacherA", "teacher")));
    });
    let approve = server.mock(|when, then| {
        when.method(POST).path("/events/ev-1/approve");
        then.status(200)
            .json_body(event_envelope(event_json("ev-1", "approved", "teacherA", "teacher")));
    });
    let mut app = build_router(mock_state(&server));

    // Act
    let response = app
        .call(request("POST", "/events/ev-1/approve", ADMIN, None))
        .await
        .unwrap();

    // Assert
    assert_eq!(response.status(), StatusCode::OK);
    approve.assert();
    let body = response_body_string(response.into_body()).await;
    assert!(body.contains(r#""status":"approved""#));
}

#[tokio::test]
async fn test_approve_already_approved_event() {
    // Arrange
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/events/ev-1");
        then.status(200)
            .json_body(event_envelope(event_json("ev-1", "approved", "admin-1", "admin")));
    });
    let mut app = build_router(mock_state(&server));

    // Act
    let response = app
        .call(request("POST", "/events/ev-1/approve", ("principal-1", "principal"), None))
        .await
        .unwrap();

    // Assert
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = response_body_string(response.into_body()).await;
    assert!(body.contains("cannot approve event ev-1: it is approved"));
}

#[tokio::test]
async fn test_teacher_cannot_approve() {
    let state = create_test_state(Url::parse("http://127.0.0.1:9").unwrap());
    let mut app = build_router(state);

    let response = app
        .call(request("POST", "/events/ev-1/approve", TEACHER_A, None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_reject_with_reason() {
    // Arrange
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/events/ev-2");
        then.status(200)
            .json_body(event_envelope(event_json("ev-2", "pending", "teacherA", "teacher")));
    });
    let reject = server.mock(|when, then| {
        when.method(POST).path("/events/ev-2/reject");
        let mut rejected = event_json("ev-2", "rejected", "teacherA", "teacher");
        rejected["rejection_reason"] = json!("Clashes with exams");
        then.status(200).json_body(event_envelope(rejected));
    });
    let mut app = build_router(mock_state(&server));

    // Act
    let response = app
        .call(request(
            "POST",
            "/events/ev-2/reject",
            ADMIN,
            Some(json!({"rejection_reason": "Clashes with exams"})),
        ))
        .await
        .unwrap();

    // Assert
    assert_eq!(response.status(), StatusCode::OK);
    reject.assert();
    let body = response_body_string(response.into_body()).await;
    assert!(body.contains("Clashes with exams"));
}

#[tokio::test]
async fn test_pending_queue_for_admin() {
    // Arrange
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/events/pending");
        then.status(200).json_body(events_envelope(vec![
            event_json("ev-1", "pending", "teacherA", "teacher"),
            event_json("ev-2", "pending", "teacherB", "teacher"),
            event_json("ev-3", "approved", "teacherB", "teacher"),
        ]));
    });
    let mut app = build_router(mock_state(&server));

    // Act
    let response = app
        .call(request("GET", "/events/pending", ADMIN, None))
        .await
        .unwrap();

    // Assert
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_body_string(response.into_body()).await;
    assert!(body.contains("ev-1"));
    assert!(body.contains("ev-2"));
    assert!(!body.contains("ev-3"));
}

#[tokio::test]
async fn test_update_own_event() {
    // Arrange
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/events/ev-1");
        then.status(200)
            .json_body(event_envelope(event_json("ev-1", "pending", "teacherA", "teacher")));
    });
    let patch = server.mock(|when, then| {
        when.method(PATCH).path("/events/ev-1");
        let mut updated = event_json("ev-1", "pending", "teacherA", "teacher");
        updated["title"] = json!("Science Fair");
        then.status(200).json_body(event_envelope(updated));
    });
    let mut app = build_router(mock_state(&server));

    // Act
    let response = app
        .call(request(
            "PATCH",
            "/events/ev-1",
            TEACHER_A,
            Some(json!({"title": "Science Fair"})),
        ))
        .await
        .unwrap();

    // Assert
    assert_eq!(response.status(), StatusCode::OK);
    patch.assert();
    let body = response_body_string(response.into_body()).await;
    assert!(body.contains("Science Fair"));
}

#[tokio::test]
async fn test_update_to_school_wide_clears_both_class_fields() {
    // Arrange
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/events/ev-multi");
        let mut stored = event_json("ev-multi", "approved", "admin-1", "admin");
        stored["event_type"] = json!("class_specific");
        stored["class_division_ids"] = json!(["g5a", "g5b"]);
        then.status(200).json_body(event_envelope(stored));
    });
    let patch = server.mock(|when, then| {
        when.method(PATCH).path("/events/ev-multi").json_body(json!({
            "event_type": "school_wide",
            "class_division_id": null,
            "class_division_ids": null
        }));
        then.status(200)
            .json_body(event_envelope(event_json("ev-multi", "approved", "admin-1", "admin")));
    });
    let mut app = build_router(mock_state(&server));

    // Act
    let response = app
        .call(request(
            "PATCH",
            "/events/ev-multi",
            ADMIN,
            Some(json!({"event_type": "school_wide"})),
        ))
        .await
        .unwrap();

    // Assert
    assert_eq!(response.status(), StatusCode::OK);
    patch.assert();
}

#[tokio::test]
async fn test_delete_own_event() {
    // Arrange
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/events/ev-1");
        then.status(200)
            .json_body(event_envelope(event_json("ev-1", "pending", "teacherA", "teacher")));
    });
    let delete = server.mock(|when, then| {
        when.method(DELETE).path("/events/ev-1");
        then.status(204);
    });
    let mut app = build_router(mock_state(&server));

    // Act
    let response = app
        .call(request("DELETE", "/events/ev-1", TEACHER_A, None))
        .await
        .unwrap();

    // Assert
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    delete.assert();
}

#[tokio::test]
async fn test_ical_endpoint_with_events() {
    // Arrange
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/events");
        then.status(200).json_body(events_envelope(vec![
            event_json("ev-1", "approved", "admin-1", "admin"),
            event_json("ev-2", "pending", "teacherB", "teacher"),
        ]));
    });
    let mut app = build_router(mock_state(&server));

    // Act
    let response = app
        .call(request("GET", "/events.ics", ("student-1", "student"), None))
        .await
        .unwrap();

    // Assert
    assert_eq!(response.status(), StatusCode::OK);

    let content_type = response.headers().get(header::CONTENT_TYPE).unwrap();
    assert_eq!(content_type, "text/calendar");

    let content_disposition = response.headers().get(header::CONTENT_DISPOSITION).unwrap();
    assert!(
        content_disposition
            .to_str()
            .unwrap()
            .contains("school_calendar.ics")
    );

    let body = response_body_string(response.into_body()).await;
    assert!(body.contains("BEGIN:VCALENDAR"));
    assert!(body.contains("SUMMARY:Event ev-1"));
    assert!(!body.contains("Event ev-2"));
}
