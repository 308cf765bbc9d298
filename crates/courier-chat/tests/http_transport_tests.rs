//! `HttpTransport` + `NetworkClient` against a local axum stub of the reply
//! service.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

use courier_chat::{HttpTransport, NetworkClient, RetryPolicy};
use courier_core::error::ApiError;
use courier_core::types::ChatRequest;

// =============================================================================
// Helpers
// =============================================================================

#[derive(Clone, Default)]
struct Stub {
    hits: Arc<AtomicUsize>,
}

async fn chat_ok(State(stub): State<Stub>, Json(req): Json<ChatRequest>) -> Json<Value> {
    stub.hits.fetch_add(1, Ordering::SeqCst);
    Json(json!({
        "message": format!("{} says hi back", req.agent_id),
        "agentId": req.agent_id,
        "timestamp": "2026-01-02T03:04:05Z",
    }))
}

async fn chat_rejected(State(stub): State<Stub>) -> (StatusCode, Json<Value>) {
    stub.hits.fetch_add(1, Ordering::SeqCst);
    (
        StatusCode::UNPROCESSABLE_ENTITY,
        Json(json!({ "error": "message too long" })),
    )
}

async fn chat_plain_failure(State(stub): State<Stub>) -> StatusCode {
    stub.hits.fetch_add(1, Ordering::SeqCst);
    StatusCode::SERVICE_UNAVAILABLE
}

async fn chat_slow(State(stub): State<Stub>) -> Json<Value> {
    stub.hits.fetch_add(1, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_secs(5)).await;
    Json(json!({}))
}

async fn agents() -> Json<Value> {
    Json(json!({
        "agents": [
            { "id": "tutor", "name": "Tutor", "voiceId": "alloy", "language": "en-US" },
            { "id": "chef", "name": "Chef" }
        ]
    }))
}

/// Serve `router` on an ephemeral port and return its base URL.
async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

fn fast_policy() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        backoff_base: Duration::from_millis(10),
        timeout: Duration::from_millis(500),
    }
}

fn client(base_url: &str) -> NetworkClient {
    NetworkClient::new(
        Arc::new(HttpTransport::new(base_url).unwrap()),
        fast_policy(),
    )
}

// =============================================================================
// Tests
// =============================================================================

#[tokio::test]
async fn test_chat_round_trip() {
    let stub = Stub::default();
    let router = Router::new()
        .route("/api/chat", post(chat_ok))
        .with_state(stub.clone());
    let base = serve(router).await;

    let reply = client(&base).send("tutor", "hello").await.unwrap();
    assert_eq!(reply.message, "tutor says hi back");
    assert_eq!(reply.agent_id, "tutor");
    assert_eq!(reply.timestamp.to_datetime().to_rfc3339(), "2026-01-02T03:04:05+00:00");
    assert_eq!(stub.hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_structured_error_is_not_retried() {
    let stub = Stub::default();
    let router = Router::new()
        .route("/api/chat", post(chat_rejected))
        .with_state(stub.clone());
    let base = serve(router).await;

    let err = client(&base).send("tutor", "hello").await.unwrap_err();
    assert_eq!(
        err,
        ApiError::ServerError {
            status: 422,
            details: "message too long".into()
        }
    );
    assert_eq!(stub.hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_bodyless_error_falls_back_to_status_line() {
    let stub = Stub::default();
    let router = Router::new()
        .route("/api/chat", post(chat_plain_failure))
        .with_state(stub.clone());
    let base = serve(router).await;

    let err = client(&base).send("tutor", "hello").await.unwrap_err();
    assert_eq!(
        err,
        ApiError::ServerError {
            status: 503,
            details: "503 Service Unavailable".into()
        }
    );
}

#[tokio::test]
async fn test_slow_server_times_out_once() {
    let stub = Stub::default();
    let router = Router::new()
        .route("/api/chat", post(chat_slow))
        .with_state(stub.clone());
    let base = serve(router).await;

    let err = client(&base).send("tutor", "hello").await.unwrap_err();
    assert_eq!(err, ApiError::Timeout { duration_ms: 500 });
    assert_eq!(stub.hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_connection_refused_is_network_error() {
    // Bind then drop to get a port nobody listens on.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = client(&format!("http://{}", addr))
        .send("tutor", "hello")
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::NetworkError { .. }), "got {:?}", err);
}

#[tokio::test]
async fn test_list_agents() {
    let router = Router::new().route("/api/agents", get(agents));
    let base = serve(router).await;

    let agents = client(&base).list_agents().await.unwrap();
    assert_eq!(agents.len(), 2);
    assert_eq!(agents[0].voice_id.as_deref(), Some("alloy"));
    assert_eq!(agents[1].description, None);
}
