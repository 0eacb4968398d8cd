use crate::routes::chat::{api_error, valid_session_id, ApiError, DEFAULT_SESSION};
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;
use wayfarer::conversation::ConversationLog;

#[derive(Debug, Default, Deserialize)]
struct ResetRequest {
    #[serde(default)]
    session_id: Option<String>,
}

async fn reset_session(
    State(state): State<AppState>,
    request: Option<Json<ResetRequest>>,
) -> Result<Json<Value>, ApiError> {
    let request = request.map(|Json(request)| request).unwrap_or_default();
    let session_id = request
        .session_id
        .unwrap_or_else(|| DEFAULT_SESSION.to_string());

    if !state.reset(&session_id) {
        return Err(api_error(StatusCode::CONFLICT, "Session is busy"));
    }
    info!(%session_id, "session reset");
    Ok(Json(json!({ "status": "ok", "session_id": session_id })))
}

async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<ConversationLog>, ApiError> {
    if !valid_session_id(&session_id) {
        return Err(api_error(StatusCode::BAD_REQUEST, "Invalid session id"));
    }
    state
        .snapshot(&session_id)
        .map(Json)
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "Session not found"))
}

// Configure routes for this module
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/api/reset", post(reset_session))
        .route("/api/sessions/:session_id", get(get_session))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{app_state, ScriptedProvider};
    use axum::{body::Body, http::Request};
    use tower::ServiceExt;
    use wayfarer::models::message::Message;
    use wayfarer::tools::ToolRegistry;

    fn seeded_state() -> AppState {
        let state = app_state(ScriptedProvider::new(vec![]), ToolRegistry::new());
        let mut log = state.checkout("trip-1").unwrap();
        log.append(Message::user().with_text("Lisbon in May?"));
        log.append(Message::assistant().with_text("Lovely time to go."));
        state.checkin("trip-1", log);
        state
    }

    #[tokio::test]
    async fn test_snapshot_session() {
        let app = routes(seeded_state());

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/sessions/trip-1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let log: ConversationLog = serde_json::from_slice(&body).unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log.last().and_then(|m| m.text()), Some("Lovely time to go."));
    }

    #[tokio::test]
    async fn test_reset_session() {
        let state = seeded_state();
        let app = routes(state.clone());

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/api/reset")
                    .method("POST")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"session_id": "trip-1"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(state.snapshot("trip-1").is_none());

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/sessions/trip-1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_reset_without_body_clears_default() {
        let state = app_state(ScriptedProvider::new(vec![]), ToolRegistry::new());
        let log = state.checkout(DEFAULT_SESSION).unwrap();
        state.checkin(DEFAULT_SESSION, log);

        let response = routes(state.clone())
            .oneshot(
                Request::builder()
                    .uri("/api/reset")
                    .method("POST")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(state.snapshot(DEFAULT_SESSION).is_none());
    }

    #[tokio::test]
    async fn test_reset_busy_session_conflicts() {
        let state = app_state(ScriptedProvider::new(vec![]), ToolRegistry::new());
        let _held = state.checkout("trip-2").unwrap();

        let response = routes(state)
            .oneshot(
                Request::builder()
                    .uri("/api/reset")
                    .method("POST")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"session_id": "trip-2"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }
}
