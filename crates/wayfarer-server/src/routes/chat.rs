use crate::state::AppState;
use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use futures::{stream::StreamExt, Stream};
use serde::Deserialize;
use serde_json::{json, Value};
use std::{
    convert::Infallible,
    pin::Pin,
    task::{Context, Poll},
    time::Duration,
};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use wayfarer::orchestrator::{Orchestrator, UserInput};

/// Session used when a request does not name one
pub const DEFAULT_SESSION: &str = "default";

pub const SESSION_HEADER: &str = "x-session-id";

// How often a quiet run checks whether the client is still there
const HEARTBEAT: Duration = Duration::from_millis(500);

#[derive(Debug, Deserialize)]
struct ChatRequest {
    #[serde(default)]
    message: String,
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    attachment: Option<AttachmentPayload>,
}

#[derive(Debug, Deserialize)]
struct AttachmentPayload {
    mime_type: String,
    /// Standard base64
    data: String,
}

pub type ApiError = (StatusCode, Json<Value>);

pub fn api_error(status: StatusCode, message: &str) -> ApiError {
    (status, Json(json!({ "error": message })))
}

/// Newline-delimited json body fed by the run task
pub struct NdjsonResponse {
    rx: ReceiverStream<String>,
}

impl NdjsonResponse {
    fn new(rx: ReceiverStream<String>) -> Self {
        Self { rx }
    }
}

impl Stream for NdjsonResponse {
    type Item = Result<Bytes, Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.rx)
            .poll_next(cx)
            .map(|opt| opt.map(|s| Ok(Bytes::from(s))))
    }
}

impl IntoResponse for NdjsonResponse {
    fn into_response(self) -> Response {
        (
            [
                (header::CONTENT_TYPE, "application/x-ndjson"),
                (header::CACHE_CONTROL, "no-cache"),
            ],
            Body::from_stream(self),
        )
            .into_response()
    }
}

/// Session ids end up in a response header, so keep them to a safe alphabet
pub fn valid_session_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 128
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn user_input(request: ChatRequest) -> Result<UserInput, ApiError> {
    let mut input = UserInput::new(request.message);
    if let Some(attachment) = request.attachment {
        let data = STANDARD
            .decode(attachment.data.as_bytes())
            .map_err(|_| api_error(StatusCode::BAD_REQUEST, "Attachment data is not valid base64"))?;
        input = input.with_attachment(attachment.mime_type, data);
    }
    Ok(input)
}

async fn chat_handler(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Response, ApiError> {
    if request.message.trim().is_empty() && request.attachment.is_none() {
        return Err(api_error(StatusCode::BAD_REQUEST, "No message provided"));
    }

    let session_id = request
        .session_id
        .clone()
        .unwrap_or_else(|| DEFAULT_SESSION.to_string());
    if !valid_session_id(&session_id) {
        return Err(api_error(StatusCode::BAD_REQUEST, "Invalid session id"));
    }

    let input = user_input(request)?;
    let log = state
        .checkout(&session_id)
        .ok_or_else(|| api_error(StatusCode::CONFLICT, "Session is busy"))?;

    // Create channel for streaming
    let (tx, rx) = mpsc::channel(100);
    let cancel = CancellationToken::new();
    let mut orchestrator = Orchestrator::new(state.provider.clone(), state.tools.clone())
        .with_log(log)
        .with_config(state.agent.clone());

    let task_session = session_id.clone();
    tokio::spawn(async move {
        {
            let mut events = orchestrator.run_with_cancel(input, cancel.clone());
            loop {
                match timeout(HEARTBEAT, events.next()).await {
                    Ok(Some(event)) => {
                        if tx.send(event.to_ndjson()).await.is_err() && !cancel.is_cancelled() {
                            warn!(session_id = %task_session, "client went away, cancelling run");
                            cancel.cancel();
                        }
                    }
                    Ok(None) => break,
                    // Heartbeat, used to detect disconnected clients and then stop the run
                    Err(_) => {
                        if tx.is_closed() && !cancel.is_cancelled() {
                            warn!(session_id = %task_session, "client went away, cancelling run");
                            cancel.cancel();
                        }
                    }
                }
            }
        }

        info!(
            session_id = %task_session,
            stop = ?orchestrator.last_stop(),
            messages = orchestrator.log().len(),
            "run finished"
        );
        state.checkin(&task_session, orchestrator.into_log());
    });

    Ok((
        [(SESSION_HEADER, session_id)],
        NdjsonResponse::new(ReceiverStream::new(rx)),
    )
        .into_response())
}

// Configure routes for this module
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/api/chat", post(chat_handler))
        .with_state(state)
}
