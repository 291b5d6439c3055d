use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use boxoffice_api::{app, AppState};
use boxoffice_core::{Backoff, InMemoryLockCoordinator, InMemoryTicketStore, LockCoordinator, LockPolicy, Ticket};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

struct Harness {
    router: Router,
    coordinator: Arc<InMemoryLockCoordinator>,
}

async fn harness(wait: Duration) -> Harness {
    let coordinator = Arc::new(InMemoryLockCoordinator::with_backoff(Backoff::new(
        Duration::from_millis(1),
        Duration::from_millis(10),
    )));
    let store = Arc::new(
        InMemoryTicketStore::with_tickets([
            Ticket::available("T-100", "P-1", "A1"),
            Ticket::available("T-101", "P-1", "A2"),
        ])
        .await,
    );
    let policy = LockPolicy::new(wait, Duration::from_secs(3)).with_key_prefix("lock:ticket:");
    let state = AppState::new(coordinator.clone(), store, policy).unwrap();
    Harness {
        router: app(state),
        coordinator,
    }
}

async fn send(router: &Router, method: &str, uri: &str) -> (StatusCode, Option<String>, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    let response = router.clone().oneshot(request).await.unwrap();

    let status = response.status();
    let retry_after = response
        .headers()
        .get(header::RETRY_AFTER)
        .map(|v| v.to_str().unwrap().to_string());
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, retry_after, body)
}

#[tokio::test]
async fn test_reserve_then_conflict() {
    let h = harness(Duration::from_secs(1)).await;

    let (status, _, body) = send(&h.router, "POST", "/api/v1/tickets/T-100/reserve?userId=U1&userName=Alice").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ticketId"], "T-100");
    assert_eq!(body["userId"], "U1");
    assert!(body["bookingId"].as_str().is_some());

    let (status, _, body) = send(&h.router, "POST", "/api/v1/tickets/T-100/reserve?userId=U2&userName=Bob").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["kind"], "already_reserved");
    assert_eq!(body["retryable"], false);
}

#[tokio::test]
async fn test_unknown_ticket_is_not_found() {
    let h = harness(Duration::from_secs(1)).await;
    let (status, _, body) = send(&h.router, "POST", "/api/v1/tickets/nope/reserve?userId=U1&userName=Alice").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["kind"], "ticket_not_found");
}

#[tokio::test]
async fn test_missing_user_is_bad_request() {
    let h = harness(Duration::from_secs(1)).await;
    let (status, _, body) = send(&h.router, "POST", "/api/v1/tickets/T-100/reserve?userName=Alice").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "bad_request");
}

#[tokio::test]
async fn test_held_lock_is_congested_with_retry_after() {
    let h = harness(Duration::from_millis(50)).await;
    assert!(h
        .coordinator
        .try_acquire("lock:ticket:T-100", "someone-else", Duration::from_secs(60))
        .await
        .unwrap());

    let (status, retry_after, body) =
        send(&h.router, "POST", "/api/v1/tickets/T-100/reserve?userId=U1&userName=Alice").await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(retry_after.as_deref(), Some("1"));
    assert_eq!(body["kind"], "congested");
    assert_eq!(body["retryable"], true);

    // Other tickets are unaffected
    let (status, _, _) = send(&h.router, "POST", "/api/v1/tickets/T-101/reserve?userId=U1&userName=Alice").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_my_bookings_lists_only_successes() {
    let h = harness(Duration::from_secs(1)).await;
    send(&h.router, "POST", "/api/v1/tickets/T-100/reserve?userId=U1&userName=Alice").await;
    send(&h.router, "POST", "/api/v1/tickets/T-100/reserve?userId=U2&userName=Bob").await;
    send(&h.router, "POST", "/api/v1/tickets/T-101/reserve?userId=U1&userName=Alice").await;

    let (status, _, body) = send(&h.router, "GET", "/api/v1/tickets/my?userId=U1").await;
    assert_eq!(status, StatusCode::OK);
    let tickets: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|b| b["ticketId"].as_str().unwrap())
        .collect();
    assert_eq!(tickets.len(), 2);
    assert!(tickets.contains(&"T-100") && tickets.contains(&"T-101"));

    let (status, _, body) = send(&h.router, "GET", "/api/v1/tickets/my?userId=U2").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_concurrent_requests_book_once() {
    let h = harness(Duration::from_secs(5)).await;

    let mut tasks = Vec::new();
    for i in 0..16 {
        let router = h.router.clone();
        tasks.push(tokio::spawn(async move {
            let uri = format!("/api/v1/tickets/T-100/reserve?userId=U{}&userName=Fan{}", i, i);
            send(&router, "POST", &uri).await.0
        }));
    }

    let mut ok = 0;
    let mut conflict = 0;
    for task in tasks {
        match task.await.unwrap() {
            StatusCode::OK => ok += 1,
            StatusCode::CONFLICT => conflict += 1,
            other => panic!("unexpected status {}", other),
        }
    }
    assert_eq!(ok, 1);
    assert_eq!(conflict, 15);
}

#[tokio::test]
async fn test_health_and_metrics() {
    let h = harness(Duration::from_secs(1)).await;

    let (status, _, body) = send(&h.router, "GET", "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    send(&h.router, "POST", "/api/v1/tickets/T-100/reserve?userId=U1&userName=Alice").await;
    send(&h.router, "POST", "/api/v1/tickets/T-100/reserve?userId=U2&userName=Bob").await;

    let response = h
        .router
        .clone()
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let text = String::from_utf8(to_bytes(response.into_body(), usize::MAX).await.unwrap().to_vec()).unwrap();
    assert!(text.contains(r#"boxoffice_reservation_outcomes_total{outcome="succeeded"} 1"#));
    assert!(text.contains(r#"boxoffice_reservation_outcomes_total{outcome="already_reserved"} 1"#));
}
