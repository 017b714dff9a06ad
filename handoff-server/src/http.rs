//! Handoff HTTP REST API
//!
//! Axum-based HTTP server exposing the pairing relay.
//!
//! Architecture: each endpoint has a thin axum handler that delegates to a pure
//! inner function. The inner functions are directly testable without axum dispatch
//! machinery.
//!
//! Endpoints:
//! - POST /session            — create a session, returns its id and code
//! - GET  /session?code=      — resolve a code to a live session
//! - POST /messages           — append a message to a live session
//! - GET  /messages?sessionId= — full ordered message list
//! - GET  /health             — store health
//! - GET  /version            — server version info

use std::sync::Arc;

use anyhow::Result;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use handoff_core::models::{AppendRequest, ErrorBody};
use handoff_core::relay::{self, SessionSettings};
use handoff_core::{HandoffConfig, HandoffError, PairingStore};
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Shared state for all HTTP handlers
#[derive(Clone)]
pub struct HttpState {
    pub store: Arc<dyn PairingStore>,
    pub config: HandoffConfig,
    pub settings: SessionSettings,
}

impl HttpState {
    pub fn new(store: Arc<dyn PairingStore>, config: HandoffConfig) -> Self {
        let settings = SessionSettings::from(&config.session);
        Self {
            store,
            config,
            settings,
        }
    }
}

/// Build the Axum router with all endpoints
pub fn build_router(state: Arc<HttpState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        .route(
            "/session",
            get(resolve_session_handler).post(create_session_handler),
        )
        .route(
            "/messages",
            get(list_messages_handler).post(append_message_handler),
        )
        .with_state(state)
}

/// Start the HTTP server on the configured address.
/// Gracefully shuts down when the broadcast shutdown signal fires.
pub async fn start_http_server(
    store: Arc<dyn PairingStore>,
    config: HandoffConfig,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let addr = format!("{}:{}", config.http.host, config.http.port);
    let state = Arc::new(HttpState::new(store, config));

    let app = build_router(state);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Handoff HTTP API listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
            tracing::info!("HTTP server shutting down...");
        })
        .await?;

    Ok(())
}

// ============================================================================
// Request DTOs
// ============================================================================

#[derive(Debug, Deserialize, Default)]
pub struct SessionQuery {
    pub code: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct MessagesQuery {
    #[serde(rename = "sessionId")]
    pub session_id: Option<String>,
}

// ============================================================================
// Error mapping
// ============================================================================

pub fn status_for(err: &HandoffError) -> StatusCode {
    match err {
        HandoffError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        HandoffError::NotFound => StatusCode::NOT_FOUND,
        HandoffError::CollisionExhausted { .. }
        | HandoffError::Backend(_)
        | HandoffError::Config(_)
        | HandoffError::Io(_)
        | HandoffError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Convert a relay error into `(status, {error, details?, code?})` and log it.
pub fn error_response(route: &str, err: &HandoffError) -> (StatusCode, serde_json::Value) {
    let status = status_for(err);
    let body = match err {
        HandoffError::InvalidInput(_) | HandoffError::NotFound | HandoffError::CollisionExhausted { .. } => {
            ErrorBody::new(err.to_string())
        }
        _ => ErrorBody {
            error: "Internal server error".to_string(),
            details: Some(err.to_string()),
            code: err.sqlstate(),
        },
    };

    if status.is_server_error() {
        tracing::error!(route, error = %err, "Request failed");
    } else {
        tracing::debug!(route, error = %err, "Request rejected");
    }

    (status, serde_json::json!(body))
}

/// Extractor rejections (bad JSON, bad query string) answered as a 400 `ErrorBody`.
pub fn rejection_response<R: std::fmt::Display>(
    route: &str,
    error: &str,
    rejection: &R,
) -> (StatusCode, serde_json::Value) {
    let body = ErrorBody {
        error: error.to_string(),
        details: Some(rejection.to_string()),
        code: None,
    };
    tracing::debug!(route, error = %rejection, "Request rejected");
    (StatusCode::BAD_REQUEST, serde_json::json!(body))
}

fn parse_session_id(raw: Option<&str>, missing_msg: &str) -> std::result::Result<Uuid, HandoffError> {
    let raw = match raw.map(str::trim) {
        Some(s) if !s.is_empty() => s,
        _ => return Err(HandoffError::invalid(missing_msg)),
    };
    Uuid::parse_str(raw).map_err(|_| HandoffError::invalid("Invalid session id"))
}

// ============================================================================
// Inner (directly testable) business logic functions
// ============================================================================

/// Inner create — `POST /session`.
pub async fn create_session_inner(
    store: &dyn PairingStore,
    settings: &SessionSettings,
) -> (StatusCode, serde_json::Value) {
    match relay::create_session(store, settings).await {
        Ok(created) => (StatusCode::OK, serde_json::json!(created)),
        Err(e) => error_response("POST /session", &e),
    }
}

/// Inner resolve — `GET /session?code=`.
pub async fn resolve_session_inner(
    store: &dyn PairingStore,
    query: SessionQuery,
) -> (StatusCode, serde_json::Value) {
    let code = query.code.unwrap_or_default();
    match relay::resolve_session(store, &code).await {
        Ok(handle) => (StatusCode::OK, serde_json::json!(handle)),
        Err(e) => error_response("GET /session", &e),
    }
}

/// Inner append — `POST /messages`.
pub async fn append_message_inner(
    store: &dyn PairingStore,
    req: AppendRequest,
) -> (StatusCode, serde_json::Value) {
    let (session_id, content, sender_type) = match (req.session_id, req.content, req.sender_type) {
        (Some(id), Some(content), Some(sender)) if !content.is_empty() && !sender.is_empty() => {
            (id, content, sender)
        }
        _ => {
            return error_response(
                "POST /messages",
                &HandoffError::invalid("Missing required fields"),
            )
        }
    };

    let session_id = match parse_session_id(Some(&session_id), "Missing required fields") {
        Ok(id) => id,
        Err(e) => return error_response("POST /messages", &e),
    };

    match relay::append_message(store, session_id, &content, &sender_type).await {
        Ok(message) => (StatusCode::OK, serde_json::json!(message)),
        Err(e) => error_response("POST /messages", &e),
    }
}

/// Inner list — `GET /messages?sessionId=`.
pub async fn list_messages_inner(
    store: &dyn PairingStore,
    query: MessagesQuery,
) -> (StatusCode, serde_json::Value) {
    let session_id = match parse_session_id(query.session_id.as_deref(), "Session ID is required") {
        Ok(id) => id,
        Err(e) => return error_response("GET /messages", &e),
    };

    match relay::list_messages(store, session_id).await {
        Ok(messages) => (StatusCode::OK, serde_json::json!(messages)),
        Err(e) => error_response("GET /messages", &e),
    }
}

/// Inner health check — pings the store and returns (status_code, json_body).
pub async fn health_inner(store: &dyn PairingStore) -> (StatusCode, serde_json::Value) {
    match store.ping().await {
        Ok(backend) => (
            StatusCode::OK,
            serde_json::json!({
                "status": "healthy",
                "version": env!("CARGO_PKG_VERSION"),
                "store": store.name(),
                "backend": backend,
            }),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            serde_json::json!({
                "status": "unhealthy",
                "store": store.name(),
                "error": e.to_string(),
            }),
        ),
    }
}

/// Inner version — returns version info (pure, no IO).
pub fn version_inner() -> serde_json::Value {
    serde_json::json!({
        "version": env!("CARGO_PKG_VERSION"),
        "protocol": "handoff/1",
    })
}

// ============================================================================
// Axum handler wrappers (thin — delegate to inner functions)
// ============================================================================

pub async fn create_session_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    let (status, body) = create_session_inner(state.store.as_ref(), &state.settings).await;
    if let Some(code) = body["sessionCode"].as_str() {
        tracing::debug!(pairing_url = %state.config.pairing_url(code), "Pairing link ready");
    }
    (status, Json(body))
}

pub async fn resolve_session_handler(
    State(state): State<Arc<HttpState>>,
    query: std::result::Result<Query<SessionQuery>, QueryRejection>,
) -> impl IntoResponse {
    let (status, body) = match query {
        Ok(Query(query)) => resolve_session_inner(state.store.as_ref(), query).await,
        Err(rejection) => rejection_response("GET /session", "Invalid query string", &rejection),
    };
    (status, Json(body))
}

pub async fn append_message_handler(
    State(state): State<Arc<HttpState>>,
    payload: std::result::Result<Json<AppendRequest>, JsonRejection>,
) -> impl IntoResponse {
    let (status, body) = match payload {
        Ok(Json(req)) => append_message_inner(state.store.as_ref(), req).await,
        Err(rejection) => rejection_response("POST /messages", "Invalid request body", &rejection),
    };
    (status, Json(body))
}

pub async fn list_messages_handler(
    State(state): State<Arc<HttpState>>,
    query: std::result::Result<Query<MessagesQuery>, QueryRejection>,
) -> impl IntoResponse {
    let (status, body) = match query {
        Ok(Query(query)) => list_messages_inner(state.store.as_ref(), query).await,
        Err(rejection) => rejection_response("GET /messages", "Invalid query string", &rejection),
    };
    (status, Json(body))
}

pub async fn health_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    let (status, body) = health_inner(state.store.as_ref()).await;
    (status, Json(body))
}

pub async fn version_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(version_inner()))
}

// ============================================================================
// Unit Tests — call inner functions directly
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use handoff_core::clock::ManualClock;
    use handoff_core::MemoryStore;

    fn settings() -> SessionSettings {
        SessionSettings::default()
    }

    fn append_req(session_id: &str, content: &str, sender: &str) -> AppendRequest {
        AppendRequest {
            session_id: Some(session_id.to_string()),
            content: Some(content.to_string()),
            sender_type: Some(sender.to_string()),
        }
    }

    // ========================================================================
    // version_inner is pure and returns correct fields
    // ========================================================================
    #[test]
    fn test_version_inner_pure() {
        let v = version_inner();
        assert!(v["version"].is_string(), "version must be string");
        assert_eq!(v["protocol"], "handoff/1");
    }

    // ========================================================================
    // status mapping follows the error taxonomy
    // ========================================================================
    #[test]
    fn test_status_for_taxonomy() {
        assert_eq!(status_for(&HandoffError::invalid("x")), StatusCode::BAD_REQUEST);
        assert_eq!(status_for(&HandoffError::NotFound), StatusCode::NOT_FOUND);
        assert_eq!(
            status_for(&HandoffError::CollisionExhausted { attempts: 5 }),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status_for(&storage_failure()),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    fn storage_failure() -> HandoffError {
        HandoffError::Io(std::io::Error::new(std::io::ErrorKind::Other, "disk unavailable"))
    }

    // ========================================================================
    // backend failures hide internals behind a generic message plus details
    // ========================================================================
    #[test]
    fn test_error_response_backend_has_details() {
        let (status, body) = error_response("test", &storage_failure());
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Internal server error");
        assert_eq!(body["details"], "IO error: disk unavailable");
        assert!(body.get("code").is_none());
    }

    #[test]
    fn test_error_response_collision_keeps_own_message() {
        let (status, body) =
            error_response("test", &HandoffError::CollisionExhausted { attempts: 5 });
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body["error"],
            "Failed to generate unique session code after 5 attempts"
        );
    }

    #[test]
    fn test_rejection_response_is_error_body() {
        let (status, body) = rejection_response("test", "Invalid query string", &"duplicate field `sessionId`");
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            body,
            serde_json::json!({
                "error": "Invalid query string",
                "details": "duplicate field `sessionId`",
            })
        );
    }

    #[test]
    fn test_error_response_not_found_is_terse() {
        let (status, body) = error_response("test", &HandoffError::NotFound);
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, serde_json::json!({"error": "Session not found or expired"}));
    }

    // ========================================================================
    // create → resolve (lowercase) → append → list
    // ========================================================================
    #[tokio::test]
    async fn test_session_flow_inner() {
        let store = MemoryStore::new();

        let (status, created) = create_session_inner(&store, &settings()).await;
        assert_eq!(status, StatusCode::OK);
        let code = created["sessionCode"].as_str().unwrap().to_string();
        let session_id = created["sessionId"].as_str().unwrap().to_string();
        assert_eq!(code.len(), 6);

        let (status, resolved) = resolve_session_inner(
            &store,
            SessionQuery {
                code: Some(code.to_lowercase()),
            },
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(resolved["sessionId"], session_id.as_str());
        assert!(resolved["expiresAt"].is_string());

        let (status, msg) =
            append_message_inner(&store, append_req(&session_id, "  hello  ", "desktop")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(msg["content"], "hello");
        assert_eq!(msg["senderType"], "desktop");
        assert!(msg["createdAt"].is_string());

        let (status, list) = list_messages_inner(
            &store,
            MessagesQuery {
                session_id: Some(session_id.clone()),
            },
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(list.as_array().unwrap().len(), 1);
        assert_eq!(list[0]["id"], msg["id"]);
    }

    #[tokio::test]
    async fn test_resolve_missing_code_is_400() {
        let store = MemoryStore::new();
        let (status, body) = resolve_session_inner(&store, SessionQuery::default()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Session code is required");
    }

    #[tokio::test]
    async fn test_resolve_unknown_code_is_404() {
        let store = MemoryStore::new();
        let (status, body) = resolve_session_inner(
            &store,
            SessionQuery {
                code: Some("QWERTY".to_string()),
            },
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Session not found or expired");
    }

    #[tokio::test]
    async fn test_append_missing_fields_is_400() {
        let store = MemoryStore::new();
        let (status, body) = append_message_inner(
            &store,
            AppendRequest {
                session_id: Some(Uuid::new_v4().to_string()),
                content: None,
                sender_type: Some("desktop".to_string()),
            },
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Missing required fields");
    }

    #[tokio::test]
    async fn test_append_bad_session_id_is_400() {
        let store = MemoryStore::new();
        let (status, body) = append_message_inner(&store, append_req("42", "hi", "mobile")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Invalid session id");
    }

    #[tokio::test]
    async fn test_append_whitespace_content_is_400() {
        let store = MemoryStore::new();
        let (_, created) = create_session_inner(&store, &settings()).await;
        let session_id = created["sessionId"].as_str().unwrap();
        let (status, _) = append_message_inner(&store, append_req(session_id, "   ", "mobile")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_append_unknown_sender_is_400() {
        let store = MemoryStore::new();
        let (_, created) = create_session_inner(&store, &settings()).await;
        let session_id = created["sessionId"].as_str().unwrap();
        let (status, _) = append_message_inner(&store, append_req(session_id, "hi", "watch")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_append_to_expired_session_is_404() {
        let clock = Arc::new(ManualClock::new(chrono::Utc::now()));
        let store = MemoryStore::with_clock(clock.clone());
        let (_, created) = create_session_inner(&store, &settings()).await;
        let session_id = created["sessionId"].as_str().unwrap();

        clock.advance(chrono::Duration::hours(2) + chrono::Duration::seconds(1));
        let (status, body) = append_message_inner(&store, append_req(session_id, "late", "mobile")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Session not found or expired");
    }

    #[tokio::test]
    async fn test_list_missing_session_id_is_400() {
        let store = MemoryStore::new();
        let (status, body) = list_messages_inner(&store, MessagesQuery::default()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Session ID is required");
    }

    #[tokio::test]
    async fn test_health_inner_memory_store() {
        let store = MemoryStore::new();
        let (status, body) = health_inner(&store).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["store"], "memory");
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    }
}
